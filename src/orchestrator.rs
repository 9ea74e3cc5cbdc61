//! Orchestrator - drives one provisioning run
//!
//! ## Message Flow
//!
//! ```text
//! validate config → resolve topic + alias → for each discovery page: process page
//!                                                        ↓
//!                          submit all alarms in batches ← aggregate
//! ```
//!
//! Fatal: invalid configuration, unresolvable topic, failed discovery.
//! Everything else is recorded in the `RunReport` and the run continues.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::AlarmDefinition;
use crate::config::{RunConfig, Selection};
use crate::error::ProvisionResult;
use crate::processor::{InstanceFailure, InstanceProcessor};
use crate::rules::{AlarmRuleEngine, RuleContext};
use crate::services::{
    Discovery, IdentityResolver, MetricCatalog, Monitoring, NotificationResolver,
};
use crate::submitter::{BatchSubmitter, SubmissionReport, SubmitStage};
use crate::util::{BATCH_SIZE, DEFAULT_ACCOUNT_ALIAS, WORKER_POOL_SIZE};

/// Cloud collaborators of a run
#[derive(Clone)]
pub struct Services {
    pub discovery: Arc<dyn Discovery>,
    pub catalog: Arc<dyn MetricCatalog>,
    pub notifications: Arc<dyn NotificationResolver>,
    pub identity: Arc<dyn IdentityResolver>,
    pub monitoring: Arc<dyn Monitoring>,
}

impl Services {
    /// Use one backend for every collaborator.
    pub fn uniform<T>(backend: Arc<T>) -> Self
    where
        T: Discovery + MetricCatalog + NotificationResolver + IdentityResolver + Monitoring + 'static,
    {
        Self {
            discovery: backend.clone(),
            catalog: backend.clone(),
            notifications: backend.clone(),
            identity: backend.clone(),
            monitoring: backend,
        }
    }

    /// Replace the monitoring collaborator, keeping the others.
    pub fn with_monitoring(mut self, monitoring: Arc<dyn Monitoring>) -> Self {
        self.monitoring = monitoring;
        self
    }
}

/// An alarm name derived for more than one instance.
///
/// Only the definition submitted last survives in the monitoring service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameCollision {
    pub alarm_name: String,
    /// Instances in submission order; the last one owns the alarm
    pub instance_ids: Vec<String>,
}

#[derive(Debug)]
pub struct RunReport {
    pub account_alias: String,
    pub topic_arn: String,
    pub pages: usize,
    pub instances: usize,
    pub alarms: Vec<AlarmDefinition>,
    pub instance_failures: Vec<InstanceFailure>,
    pub collisions: Vec<NameCollision>,
    pub submission: SubmissionReport,
}

/// Serializable overview of a `RunReport`
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub account_alias: String,
    pub topic_arn: String,
    pub pages: usize,
    pub instances: usize,
    pub alarms: usize,
    pub batches: usize,
    pub created: usize,
    pub tagged: usize,
    pub collisions: Vec<NameCollision>,
    pub failures: Vec<FailureSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureSummary {
    /// Instance id or alarm name
    pub subject: String,
    pub stage: &'static str,
    pub error: String,
}

impl RunReport {
    pub fn summary(&self) -> RunSummary {
        let instance_failures = self.instance_failures.iter().map(|failure| FailureSummary {
            subject: failure.instance_id.clone(),
            stage: "derive",
            error: failure.error.to_string(),
        });
        let alarm_failures = self.submission.failures.iter().map(|failure| FailureSummary {
            subject: failure.alarm_name.clone(),
            stage: match failure.stage {
                SubmitStage::Create => "create",
                SubmitStage::Tag => "tag",
            },
            error: failure.error.to_string(),
        });

        RunSummary {
            account_alias: self.account_alias.clone(),
            topic_arn: self.topic_arn.clone(),
            pages: self.pages,
            instances: self.instances,
            alarms: self.alarms.len(),
            batches: self.submission.batches,
            created: self.submission.created,
            tagged: self.submission.tagged,
            collisions: self.collisions.clone(),
            failures: instance_failures.chain(alarm_failures).collect(),
        }
    }
}

pub struct Provisioner {
    config: RunConfig,
    services: Services,
    workers: usize,
    batch_size: usize,
}

impl Provisioner {
    pub fn new(config: RunConfig, services: Services) -> Self {
        Self {
            config,
            services,
            workers: WORKER_POOL_SIZE,
            batch_size: BATCH_SIZE,
        }
    }

    /// Execute the run: discovery, derivation, submission.
    #[instrument(skip(self), fields(region = %self.config.region))]
    pub async fn run(&self) -> ProvisionResult<RunReport> {
        let selection = self.config.validate()?;

        let topic_arn = self
            .services
            .notifications
            .resolve_topic_arn(&self.config.topic_name)
            .await?;
        info!("resolved notification topic {topic_arn}");

        let account_alias = self.account_alias().await;

        let context = RuleContext {
            alarm_prefix: self.config.alarm_prefix.clone(),
            account_alias: account_alias.clone(),
            topic_arn: topic_arn.clone(),
        };
        let engine = Arc::new(AlarmRuleEngine::new(context, self.services.catalog.clone()));
        let processor = InstanceProcessor::new(engine, self.workers);

        let mut pages = 0;
        let mut instances = 0;
        let mut alarms = vec![];
        let mut instance_failures = vec![];
        let mut page_token = None;

        loop {
            let page = self
                .services
                .discovery
                .list_instances(&selection, page_token.take())
                .await?;
            pages += 1;
            info!(
                "discovery page {pages}: {} instances ({})",
                page.instances.len(),
                describe(&selection)
            );

            let outcome = processor.process_page(page.instances).await;
            instances += outcome.instances;
            alarms.extend(outcome.alarms);
            instance_failures.extend(outcome.failures);

            match page.next_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        info!("derived {} alarms for {instances} instances", alarms.len());

        let collisions = find_collisions(&alarms);
        for collision in &collisions {
            warn!(
                "alarm {} is derived for instances {}, only the last one is kept",
                collision.alarm_name,
                collision.instance_ids.join(", ")
            );
        }

        let submitter = BatchSubmitter::new(
            self.services.monitoring.clone(),
            self.services.identity.clone(),
            &self.config.region,
            &self.config.tag_key,
            self.batch_size,
        );
        let submission = submitter.submit(&alarms).await;

        Ok(RunReport {
            account_alias,
            topic_arn,
            pages,
            instances,
            alarms,
            instance_failures,
            collisions,
            submission,
        })
    }

    async fn account_alias(&self) -> String {
        match self.services.identity.account_alias().await {
            Ok(Some(alias)) => alias,
            Ok(None) => DEFAULT_ACCOUNT_ALIAS.to_string(),
            Err(e) => {
                warn!("cannot resolve account alias, using {DEFAULT_ACCOUNT_ALIAS}: {e}");
                DEFAULT_ACCOUNT_ALIAS.to_string()
            }
        }
    }
}

/// Alarm names shared by definitions of different instances, sorted by name.
pub fn find_collisions(alarms: &[AlarmDefinition]) -> Vec<NameCollision> {
    let mut owners: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for alarm in alarms {
        let instance_ids = owners.entry(alarm.alarm_name.as_str()).or_default();
        if !instance_ids.contains(&alarm.instance_id) {
            instance_ids.push(alarm.instance_id.clone());
        }
    }

    owners
        .into_iter()
        .filter(|(_, instance_ids)| instance_ids.len() > 1)
        .map(|(alarm_name, instance_ids)| NameCollision {
            alarm_name: alarm_name.to_string(),
            instance_ids,
        })
        .collect()
}

fn describe(selection: &Selection) -> String {
    match selection {
        Selection::InstanceIds(ids) => format!("{} requested ids", ids.len()),
        Selection::Tag { name, value } => format!("tag {name}={value}"),
    }
}
