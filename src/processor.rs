//! Instance processor - bounded fan-out of the rule engine
//!
//! Each discovery page is processed by its own pool of at most `workers`
//! concurrent tasks. Tasks never touch shared results: every task returns its
//! own `InstanceAlarms`, and the page outcome is assembled after all tasks have
//! been joined.
//!
//! ```text
//! page ──► spawn(derive i-1) ─┐
//!      ──► spawn(derive i-2) ─┼─► join all (submission order) ──► PageOutcome
//!      ──► spawn(derive i-N) ─┘
//!          (≤ workers running)
//! ```

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, error, instrument};

use crate::error::ProvisionError;
use crate::rules::{AlarmRuleEngine, InstanceAlarms};
use crate::{AlarmDefinition, InstanceDescriptor};

/// An instance whose alarms could not be fully derived
#[derive(Debug)]
pub struct InstanceFailure {
    pub instance_id: String,
    pub error: ProvisionError,
}

/// Result of processing one discovery page
#[derive(Debug, Default)]
pub struct PageOutcome {
    /// Alarms of all instances; each instance's alarms are contiguous and in
    /// rule-engine order
    pub alarms: Vec<AlarmDefinition>,

    pub failures: Vec<InstanceFailure>,

    pub instances: usize,
}

pub struct InstanceProcessor {
    engine: Arc<AlarmRuleEngine>,
    workers: usize,
}

impl InstanceProcessor {
    pub fn new(engine: Arc<AlarmRuleEngine>, workers: usize) -> Self {
        Self {
            engine,
            workers: workers.max(1),
        }
    }

    /// Derive the alarms of every instance on a page.
    ///
    /// Returns once every task has finished. A failing or panicking task only
    /// affects its own instance.
    #[instrument(skip_all, fields(instances = instances.len()))]
    pub async fn process_page(&self, instances: Vec<InstanceDescriptor>) -> PageOutcome {
        let permits = Arc::new(Semaphore::new(self.workers));
        let mut ids = Vec::with_capacity(instances.len());
        let mut handles = Vec::with_capacity(instances.len());

        for instance in instances {
            let engine = self.engine.clone();
            let permits = permits.clone();
            ids.push(instance.instance_id.clone());

            handles.push(tokio::spawn(async move {
                let _permit = permits.acquire_owned().await?;
                Ok::<_, tokio::sync::AcquireError>(engine.derive(&instance).await)
            }));
        }

        let mut outcome = PageOutcome {
            instances: ids.len(),
            ..PageOutcome::default()
        };

        for (instance_id, joined) in ids.into_iter().zip(join_all(handles).await) {
            let result = match joined {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => InstanceAlarms {
                    instance_id,
                    alarms: vec![],
                    failure: Some(ProvisionError::Worker(e.to_string())),
                },
                Err(e) => InstanceAlarms {
                    instance_id,
                    alarms: vec![],
                    failure: Some(e.into()),
                },
            };

            if let Some(error) = result.failure {
                error!("processing of instance {} failed: {error}", result.instance_id);
                outcome.failures.push(InstanceFailure {
                    instance_id: result.instance_id,
                    error,
                });
            }
            outcome.alarms.extend(result.alarms);
        }

        debug!(
            "page done: {} alarms from {} instances, {} failures",
            outcome.alarms.len(),
            outcome.instances,
            outcome.failures.len()
        );

        outcome
    }
}
