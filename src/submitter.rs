//! Batch submitter - creates and tags alarms
//!
//! Definitions are grouped into fixed-size batches for throughput and log
//! readability. The monitoring service has no batch create, so each definition
//! is still its own create call, followed by a tag call on success.
//!
//! ## Failure isolation
//!
//! - Create failure: logged, tagging skipped, next definition continues
//! - Tag failure: logged, the created alarm stays in place

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, error, info, instrument};

use crate::error::ProvisionError;
use crate::services::{IdentityResolver, Monitoring};
use crate::util::alarm_arn;
use crate::{AlarmDefinition, TagRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitStage {
    Create,
    Tag,
}

/// An alarm whose submission did not complete
#[derive(Debug)]
pub struct AlarmFailure {
    pub alarm_name: String,
    pub stage: SubmitStage,
    pub error: ProvisionError,
}

#[derive(Debug, Default)]
pub struct SubmissionReport {
    pub batches: usize,
    pub created: usize,
    pub tagged: usize,
    pub failures: Vec<AlarmFailure>,
}

impl SubmissionReport {
    pub fn create_failures(&self) -> usize {
        self.failures
            .iter()
            .filter(|failure| failure.stage == SubmitStage::Create)
            .count()
    }

    pub fn tag_failures(&self) -> usize {
        self.failures
            .iter()
            .filter(|failure| failure.stage == SubmitStage::Tag)
            .count()
    }
}

pub struct BatchSubmitter {
    monitoring: Arc<dyn Monitoring>,
    identity: Arc<dyn IdentityResolver>,
    region: String,
    tag_key: String,
    batch_size: usize,
}

impl BatchSubmitter {
    pub fn new(
        monitoring: Arc<dyn Monitoring>,
        identity: Arc<dyn IdentityResolver>,
        region: impl Into<String>,
        tag_key: impl Into<String>,
        batch_size: usize,
    ) -> Self {
        Self {
            monitoring,
            identity,
            region: region.into(),
            tag_key: tag_key.into(),
            batch_size: batch_size.max(1),
        }
    }

    /// Number of batches `alarm_count` definitions are split into.
    pub fn batch_count(&self, alarm_count: usize) -> usize {
        alarm_count.div_ceil(self.batch_size)
    }

    /// Submit every definition, tagging with today's date.
    pub async fn submit(&self, alarms: &[AlarmDefinition]) -> SubmissionReport {
        self.submit_on(alarms, Utc::now().date_naive()).await
    }

    /// Submit every definition, tagging with `date`.
    #[instrument(skip_all, fields(alarms = alarms.len()))]
    pub async fn submit_on(&self, alarms: &[AlarmDefinition], date: NaiveDate) -> SubmissionReport {
        let mut report = SubmissionReport::default();
        if alarms.is_empty() {
            return report;
        }

        // tagging needs the account id; creation does not
        let account_id = match self.identity.account_id().await {
            Ok(account_id) => Some(account_id),
            Err(e) => {
                error!("cannot resolve account id, alarms will not be tagged: {e}");
                None
            }
        };
        let tags = [TagRecord::provenance(&self.tag_key, date)];

        for (index, batch) in alarms.chunks(self.batch_size).enumerate() {
            report.batches += 1;
            debug!(
                "submitting batch {}/{} ({} alarms)",
                index + 1,
                self.batch_count(alarms.len()),
                batch.len()
            );

            for alarm in batch {
                if let Err(e) = self.monitoring.create_alarm(alarm).await {
                    error!("error creating alarm {}: {e}", alarm.alarm_name);
                    report.failures.push(AlarmFailure {
                        alarm_name: alarm.alarm_name.clone(),
                        stage: SubmitStage::Create,
                        error: e,
                    });
                    continue;
                }
                info!("successfully created alarm: {}", alarm.alarm_name);
                report.created += 1;

                let tagged = match &account_id {
                    Some(account_id) => self.tag(account_id, &alarm.alarm_name, &tags).await,
                    None => Err(ProvisionError::service(
                        "TagResource",
                        "account id unavailable",
                    )),
                };
                match tagged {
                    Ok(()) => report.tagged += 1,
                    Err(e) => {
                        error!("failed to tag alarm {}: {e}", alarm.alarm_name);
                        report.failures.push(AlarmFailure {
                            alarm_name: alarm.alarm_name.clone(),
                            stage: SubmitStage::Tag,
                            error: e,
                        });
                    }
                }
            }
        }

        info!(
            "submitted {} alarms in {} batches: {} created, {} tagged, {} failures",
            alarms.len(),
            report.batches,
            report.created,
            report.tagged,
            report.failures.len()
        );

        report
    }

    /// Attach the provenance tag to an existing alarm without recreating it.
    pub async fn tag_existing(&self, alarm_name: &str, date: NaiveDate) -> Result<(), ProvisionError> {
        let account_id = self.identity.account_id().await?;
        let tags = [TagRecord::provenance(&self.tag_key, date)];
        self.tag(&account_id, alarm_name, &tags).await
    }

    async fn tag(
        &self,
        account_id: &str,
        alarm_name: &str,
        tags: &[TagRecord],
    ) -> Result<(), ProvisionError> {
        let resource_arn = alarm_arn(&self.region, account_id, alarm_name);
        self.monitoring.tag_alarm(&resource_arn, tags).await?;
        info!("tags added to alarm {alarm_name}: {tags:?}");
        Ok(())
    }
}
