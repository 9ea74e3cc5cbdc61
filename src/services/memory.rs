//! In-memory cloud backend (no network access)
//!
//! Implements every collaborator trait over plain collections. It is used for:
//! - Testing the pipeline without AWS credentials
//! - Dry runs, where alarms are recorded instead of created
//!
//! Failures can be injected per instance (metric catalog) and per alarm
//! (create, tag) to exercise the isolation rules of the pipeline.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::debug;

use super::backend::{
    Discovery, IdentityResolver, InstancePage, MetricCatalog, Monitoring, NotificationResolver,
};
use crate::config::Selection;
use crate::error::{ProvisionError, ProvisionResult};
use crate::{AlarmDefinition, Dimension, InstanceDescriptor, MetricSample, TagRecord};

const DEFAULT_PAGE_SIZE: usize = 50;

const DEFAULT_ACCOUNT_ID: &str = "000000000000";

#[derive(Debug, Clone)]
struct StoredInstance {
    descriptor: InstanceDescriptor,
    tags: HashMap<String, String>,
}

#[derive(Debug, Clone)]
struct StoredMetric {
    namespace: String,
    sample: MetricSample,
}

/// Number of calls each collaborator operation received
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub list_instances: usize,
    pub list_metrics: usize,
    pub resolve_topic: usize,
    pub create_alarm: usize,
    pub tag_alarm: usize,
}

#[derive(Debug, Default)]
struct Counters {
    list_instances: AtomicUsize,
    list_metrics: AtomicUsize,
    resolve_topic: AtomicUsize,
    create_alarm: AtomicUsize,
    tag_alarm: AtomicUsize,
}

/// In-memory implementation of every collaborator
#[derive(Debug)]
pub struct MemoryCloud {
    instances: Vec<StoredInstance>,
    page_size: usize,
    metrics: Vec<StoredMetric>,
    topics: Vec<String>,
    account_alias: Option<String>,
    account_id: String,

    failing_catalog: HashSet<String>,
    failing_creates: HashSet<String>,
    failing_tags: Mutex<HashSet<String>>,
    failing_discovery: bool,
    failing_identity: bool,

    alarms: Mutex<BTreeMap<String, AlarmDefinition>>,
    create_attempts: Mutex<Vec<String>>,
    tags: Mutex<HashMap<String, Vec<TagRecord>>>,
    counters: Counters,
}

impl MemoryCloud {
    pub fn new() -> Self {
        Self {
            instances: vec![],
            page_size: DEFAULT_PAGE_SIZE,
            metrics: vec![],
            topics: vec![],
            account_alias: None,
            account_id: DEFAULT_ACCOUNT_ID.to_string(),
            failing_catalog: HashSet::new(),
            failing_creates: HashSet::new(),
            failing_tags: Mutex::new(HashSet::new()),
            failing_discovery: false,
            failing_identity: false,
            alarms: Mutex::new(BTreeMap::new()),
            create_attempts: Mutex::new(vec![]),
            tags: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    pub fn with_instance(mut self, descriptor: InstanceDescriptor) -> Self {
        self.instances.push(StoredInstance {
            descriptor,
            tags: HashMap::new(),
        });
        self
    }

    /// Adds an instance carrying the tag `key=value`, visible to tag selection.
    pub fn with_tagged_instance(
        mut self,
        descriptor: InstanceDescriptor,
        key: &str,
        value: &str,
    ) -> Self {
        self.instances.push(StoredInstance {
            descriptor,
            tags: HashMap::from([(key.to_string(), value.to_string())]),
        });
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_metric(mut self, namespace: &str, sample: MetricSample) -> Self {
        self.metrics.push(StoredMetric {
            namespace: namespace.to_string(),
            sample,
        });
        self
    }

    pub fn with_topic(mut self, arn: &str) -> Self {
        self.topics.push(arn.to_string());
        self
    }

    pub fn with_account(mut self, alias: Option<&str>, account_id: &str) -> Self {
        self.account_alias = alias.map(String::from);
        self.account_id = account_id.to_string();
        self
    }

    /// Metric lookups filtered on this instance id fail.
    pub fn failing_catalog_for(mut self, instance_id: &str) -> Self {
        self.failing_catalog.insert(instance_id.to_string());
        self
    }

    pub fn failing_create_for(mut self, alarm_name: &str) -> Self {
        self.failing_creates.insert(alarm_name.to_string());
        self
    }

    pub fn failing_tag_for(self, alarm_name: &str) -> Self {
        self.lock_failing_tags().insert(alarm_name.to_string());
        self
    }

    pub fn failing_discovery(mut self) -> Self {
        self.failing_discovery = true;
        self
    }

    pub fn failing_identity(mut self) -> Self {
        self.failing_identity = true;
        self
    }

    /// Lets tagging of `alarm_name` succeed from now on.
    pub fn restore_tagging(&self, alarm_name: &str) {
        self.lock_failing_tags().remove(alarm_name);
    }

    /// Alarms created so far, keyed by name.
    pub fn alarms(&self) -> BTreeMap<String, AlarmDefinition> {
        self.alarms
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Alarm names in the order creation was attempted, failures included.
    pub fn create_attempts(&self) -> Vec<String> {
        self.create_attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Tags attached to the resource `resource_arn`.
    pub fn tags_for(&self, resource_arn: &str) -> Vec<TagRecord> {
        self.tags
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(resource_arn)
            .cloned()
            .unwrap_or_default()
    }

    pub fn call_counts(&self) -> CallCounts {
        CallCounts {
            list_instances: self.counters.list_instances.load(Ordering::SeqCst),
            list_metrics: self.counters.list_metrics.load(Ordering::SeqCst),
            resolve_topic: self.counters.resolve_topic.load(Ordering::SeqCst),
            create_alarm: self.counters.create_alarm.load(Ordering::SeqCst),
            tag_alarm: self.counters.tag_alarm.load(Ordering::SeqCst),
        }
    }

    fn lock_failing_tags(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.failing_tags
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn selected(&self, selection: &Selection) -> Vec<InstanceDescriptor> {
        self.instances
            .iter()
            .filter(|instance| match selection {
                Selection::InstanceIds(ids) => ids.contains(&instance.descriptor.instance_id),
                Selection::Tag { name, value } => instance.tags.get(name) == Some(value),
            })
            .map(|instance| instance.descriptor.clone())
            .collect()
    }
}

impl Default for MemoryCloud {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Discovery for MemoryCloud {
    async fn list_instances(
        &self,
        selection: &Selection,
        page_token: Option<String>,
    ) -> ProvisionResult<InstancePage> {
        self.counters.list_instances.fetch_add(1, Ordering::SeqCst);

        if self.failing_discovery {
            return Err(ProvisionError::service(
                "DescribeInstances",
                "injected discovery failure",
            ));
        }

        let start = match page_token {
            Some(token) => token.parse::<usize>().map_err(|_| {
                ProvisionError::service("DescribeInstances", format!("invalid page token {token}"))
            })?,
            None => 0,
        };

        let selected = self.selected(selection);
        let end = (start + self.page_size).min(selected.len());
        let instances = selected.get(start..end).map(<[_]>::to_vec).unwrap_or_default();
        let next_token = (end < selected.len()).then(|| end.to_string());

        debug!(
            "in-memory discovery: page at {start} with {} instances",
            instances.len()
        );

        Ok(InstancePage {
            instances,
            next_token,
        })
    }
}

#[async_trait]
impl MetricCatalog for MemoryCloud {
    async fn list_metrics(
        &self,
        namespace: &str,
        filters: &[Dimension],
    ) -> ProvisionResult<Vec<MetricSample>> {
        self.counters.list_metrics.fetch_add(1, Ordering::SeqCst);

        if filters
            .iter()
            .any(|filter| filter.name == "InstanceId" && self.failing_catalog.contains(&filter.value))
        {
            return Err(ProvisionError::service(
                "ListMetrics",
                "injected metric catalog failure",
            ));
        }

        Ok(self
            .metrics
            .iter()
            .filter(|metric| metric.namespace == namespace)
            .filter(|metric| {
                filters
                    .iter()
                    .all(|filter| metric.sample.has_dimension(&filter.name, &filter.value))
            })
            .map(|metric| metric.sample.clone())
            .collect())
    }
}

#[async_trait]
impl NotificationResolver for MemoryCloud {
    async fn resolve_topic_arn(&self, topic_name: &str) -> ProvisionResult<String> {
        self.counters.resolve_topic.fetch_add(1, Ordering::SeqCst);

        self.topics
            .iter()
            .find(|arn| arn.contains(topic_name))
            .cloned()
            .ok_or_else(|| ProvisionError::TopicNotFound(topic_name.to_string()))
    }
}

#[async_trait]
impl IdentityResolver for MemoryCloud {
    async fn account_alias(&self) -> ProvisionResult<Option<String>> {
        if self.failing_identity {
            return Err(ProvisionError::service(
                "ListAccountAliases",
                "injected identity failure",
            ));
        }
        Ok(self.account_alias.clone())
    }

    async fn account_id(&self) -> ProvisionResult<String> {
        if self.failing_identity {
            return Err(ProvisionError::service(
                "GetCallerIdentity",
                "injected identity failure",
            ));
        }
        Ok(self.account_id.clone())
    }
}

#[async_trait]
impl Monitoring for MemoryCloud {
    async fn create_alarm(&self, alarm: &AlarmDefinition) -> ProvisionResult<()> {
        self.counters.create_alarm.fetch_add(1, Ordering::SeqCst);
        self.create_attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(alarm.alarm_name.clone());

        if self.failing_creates.contains(&alarm.alarm_name) {
            return Err(ProvisionError::service(
                "PutMetricAlarm",
                "injected create failure",
            ));
        }

        self.alarms
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(alarm.alarm_name.clone(), alarm.clone());
        Ok(())
    }

    async fn tag_alarm(&self, resource_arn: &str, tags: &[TagRecord]) -> ProvisionResult<()> {
        self.counters.tag_alarm.fetch_add(1, Ordering::SeqCst);

        let Some((_, alarm_name)) = resource_arn.split_once(":alarm:") else {
            return Err(ProvisionError::service(
                "TagResource",
                format!("{resource_arn} is not an alarm ARN"),
            ));
        };

        if self.lock_failing_tags().contains(alarm_name) {
            return Err(ProvisionError::service("TagResource", "injected tag failure"));
        }

        let exists = self
            .alarms
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(alarm_name);
        if !exists {
            return Err(ProvisionError::service(
                "TagResource",
                format!("alarm {alarm_name} does not exist"),
            ));
        }

        let mut stored = self.tags.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = stored.entry(resource_arn.to_string()).or_default();
        for tag in tags {
            entry.retain(|existing| existing.key != tag.key);
            entry.push(tag.clone());
        }
        Ok(())
    }
}
