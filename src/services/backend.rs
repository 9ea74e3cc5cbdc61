//! Collaborator trait definitions
//!
//! The provisioning pipeline talks to five cloud collaborators. Each one is a
//! trait here so the pipeline can run against AWS or against the in-memory
//! backend used by tests and dry runs.
//!
//! ## Thread Safety
//!
//! Implementations must be `Send + Sync`; a single instance is shared by every
//! worker of a discovery page.

use async_trait::async_trait;

use crate::config::Selection;
use crate::error::ProvisionResult;
use crate::{AlarmDefinition, Dimension, InstanceDescriptor, MetricSample, TagRecord};

/// One page of discovery results
#[derive(Debug, Clone, Default)]
pub struct InstancePage {
    pub instances: Vec<InstanceDescriptor>,

    /// Token for the next page, `None` on the last page
    pub next_token: Option<String>,
}

/// Lists compute instances page by page
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Fetch the page identified by `page_token` (`None` for the first page).
    async fn list_instances(
        &self,
        selection: &Selection,
        page_token: Option<String>,
    ) -> ProvisionResult<InstancePage>;
}

/// Enumerates custom metrics currently published for an instance
#[async_trait]
pub trait MetricCatalog: Send + Sync {
    /// List all metrics in `namespace` that carry every dimension in `filters`.
    ///
    /// An empty result is not an error.
    async fn list_metrics(
        &self,
        namespace: &str,
        filters: &[Dimension],
    ) -> ProvisionResult<Vec<MetricSample>>;
}

/// Resolves a notification topic name to its ARN
#[async_trait]
pub trait NotificationResolver: Send + Sync {
    /// Returns `ProvisionError::TopicNotFound` once every page has been searched.
    async fn resolve_topic_arn(&self, topic_name: &str) -> ProvisionResult<String>;
}

/// Answers questions about the calling account
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// The account alias, `None` when the account has none configured.
    async fn account_alias(&self) -> ProvisionResult<Option<String>>;

    /// The numeric account id.
    async fn account_id(&self) -> ProvisionResult<String>;
}

/// Creates and tags alarms
///
/// The service has no batch create; every definition is a separate call.
#[async_trait]
pub trait Monitoring: Send + Sync {
    /// Create (or replace) the alarm described by `alarm`.
    async fn create_alarm(&self, alarm: &AlarmDefinition) -> ProvisionResult<()>;

    /// Attach `tags` to the alarm identified by `resource_arn`.
    async fn tag_alarm(&self, resource_arn: &str, tags: &[TagRecord]) -> ProvisionResult<()>;
}
