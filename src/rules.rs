//! Alarm rule engine
//!
//! Derives the alarm definitions for a single instance. Every instance gets the
//! two baseline alarms (status check, CPU). The platform then decides which
//! memory and disk alarms follow:
//!
//! - **Linux**: the CloudWatch agent publishes `mem_used_percent` and
//!   `disk_used_percent` with host-specific dimensions, so the metric catalog is
//!   queried and the reported dimension sets are reused as-is.
//! - **Windows**: the agent's dimension set is fixed, so both alarms are built
//!   statically without a catalog lookup.
//!
//! Alarm names follow `{prefix}_{alias}_ec2_{display name}_{suffix}`. Two
//! instances with the same display name produce the same names, and the later
//! submission replaces the earlier alarm. This is not guarded against.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::error::ProvisionError;
use crate::services::MetricCatalog;
use crate::{
    AlarmDefinition, AlarmKind, Comparison, Dimension, InstanceDescriptor, MetricSample,
    MissingData, Platform, Statistic,
};

pub const EC2_NAMESPACE: &str = "AWS/EC2";
pub const AGENT_NAMESPACE: &str = "CWAgent";

pub const ALARM_PERIOD_SECS: i32 = 60;
pub const ALARM_EVALUATION_PERIODS: i32 = 5;

const LINUX_MEMORY_METRIC: &str = "mem_used_percent";
const LINUX_DISK_METRIC: &str = "disk_used_percent";
const LINUX_ROOT_PATH: &str = "/";

const WINDOWS_MEMORY_METRIC: &str = "Memory % Committed Bytes In Use";
const WINDOWS_DISK_METRIC: &str = "LogicalDisk % Free Space";
const WINDOWS_SYSTEM_DRIVE: &str = "C:";

const USAGE_THRESHOLD: f64 = 95.0;
const STATUS_CHECK_THRESHOLD: f64 = 1.0;
const FREE_SPACE_THRESHOLD: f64 = 5.0;

/// Run-wide inputs shared by every derivation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleContext {
    pub alarm_prefix: String,
    pub account_alias: String,
    pub topic_arn: String,
}

impl RuleContext {
    pub fn alarm_name(&self, display_name: &str, kind: AlarmKind) -> String {
        alarm_name(&self.alarm_prefix, &self.account_alias, display_name, kind)
    }
}

/// `{prefix}_{alias}_ec2_{display name}_{suffix}`
pub fn alarm_name(prefix: &str, account_alias: &str, display_name: &str, kind: AlarmKind) -> String {
    format!(
        "{prefix}_{account_alias}_ec2_{display_name}_{}",
        kind.suffix()
    )
}

/// Alarms derived for one instance
#[derive(Debug)]
pub struct InstanceAlarms {
    pub instance_id: String,

    /// Ordered: status check, CPU, then memory and disk when applicable
    pub alarms: Vec<AlarmDefinition>,

    /// Set when the platform alarms could not be derived. `alarms` then holds
    /// only the baseline alarms.
    pub failure: Option<ProvisionError>,
}

/// Metric, namespace, dimensions and trigger of one alarm
struct AlarmTemplate {
    kind: AlarmKind,
    metric_name: String,
    namespace: &'static str,
    dimensions: Vec<Dimension>,
    threshold: f64,
    comparison: Comparison,
}

pub struct AlarmRuleEngine {
    context: RuleContext,
    catalog: Arc<dyn MetricCatalog>,
}

impl AlarmRuleEngine {
    pub fn new(context: RuleContext, catalog: Arc<dyn MetricCatalog>) -> Self {
        Self { context, catalog }
    }

    /// Derive all alarms for `instance`.
    ///
    /// A failed catalog lookup is reported in `InstanceAlarms::failure`; the
    /// baseline alarms are still returned.
    #[instrument(skip_all, fields(instance = %instance.instance_id))]
    pub async fn derive(&self, instance: &InstanceDescriptor) -> InstanceAlarms {
        let mut templates = baseline_alarms(instance);

        let failure = match instance.platform {
            Platform::Linux => match self.linux_alarms(instance).await {
                Ok(linux) => {
                    templates.extend(linux);
                    None
                }
                Err(e) => {
                    warn!(
                        "skipping agent alarms for {}: {e}",
                        instance.instance_id
                    );
                    Some(e)
                }
            },
            Platform::Windows => {
                templates.extend(windows_alarms(instance));
                None
            }
        };

        let alarms: Vec<_> = templates
            .into_iter()
            .map(|template| self.build(instance, template))
            .collect();

        debug!(
            "derived {} alarms for {} ({:?})",
            alarms.len(),
            instance.instance_id,
            instance.platform
        );

        InstanceAlarms {
            instance_id: instance.instance_id.clone(),
            alarms,
            failure,
        }
    }

    async fn linux_alarms(
        &self,
        instance: &InstanceDescriptor,
    ) -> Result<Vec<AlarmTemplate>, ProvisionError> {
        let filter = [Dimension::new("InstanceId", &instance.instance_id)];
        let samples = self.catalog.list_metrics(AGENT_NAMESPACE, &filter).await?;

        Ok(linux_alarms_from_samples(&samples))
    }

    fn build(&self, instance: &InstanceDescriptor, template: AlarmTemplate) -> AlarmDefinition {
        AlarmDefinition {
            alarm_name: self.context.alarm_name(&instance.display_name, template.kind),
            kind: template.kind,
            instance_id: instance.instance_id.clone(),
            metric_name: template.metric_name,
            namespace: template.namespace.to_string(),
            dimensions: template.dimensions,
            threshold: template.threshold,
            comparison: template.comparison,
            statistic: Statistic::Average,
            period_secs: ALARM_PERIOD_SECS,
            evaluation_periods: ALARM_EVALUATION_PERIODS,
            missing_data: MissingData::Breaching,
            actions_enabled: true,
            alarm_actions: vec![self.context.topic_arn.clone()],
            ok_actions: vec![self.context.topic_arn.clone()],
        }
    }
}

fn baseline_alarms(instance: &InstanceDescriptor) -> Vec<AlarmTemplate> {
    let instance_dimension = || vec![Dimension::new("InstanceId", &instance.instance_id)];

    vec![
        AlarmTemplate {
            kind: AlarmKind::StatusCheck,
            metric_name: "StatusCheckFailed".to_string(),
            namespace: EC2_NAMESPACE,
            dimensions: instance_dimension(),
            threshold: STATUS_CHECK_THRESHOLD,
            comparison: Comparison::GreaterThanOrEqualToThreshold,
        },
        AlarmTemplate {
            kind: AlarmKind::CpuUsed,
            metric_name: "CPUUtilization".to_string(),
            namespace: EC2_NAMESPACE,
            dimensions: instance_dimension(),
            threshold: USAGE_THRESHOLD,
            comparison: Comparison::GreaterThanOrEqualToThreshold,
        },
    ]
}

/// Memory and root-disk alarms for the agent metrics reported by the catalog.
///
/// Only the first matching sample of each metric is used. Memory always comes
/// before disk, regardless of catalog order.
fn linux_alarms_from_samples(samples: &[MetricSample]) -> Vec<AlarmTemplate> {
    let memory = samples
        .iter()
        .find(|sample| sample.metric_name == LINUX_MEMORY_METRIC);
    let root_disk = samples.iter().find(|sample| is_root_disk(sample));

    let mut templates = vec![];

    if let Some(sample) = memory {
        templates.push(AlarmTemplate {
            kind: AlarmKind::MemUsed,
            metric_name: sample.metric_name.clone(),
            namespace: AGENT_NAMESPACE,
            dimensions: sample.dimensions.clone(),
            threshold: USAGE_THRESHOLD,
            comparison: Comparison::GreaterThanOrEqualToThreshold,
        });
    }

    if let Some(sample) = root_disk {
        templates.push(AlarmTemplate {
            kind: AlarmKind::DiskUsed,
            metric_name: sample.metric_name.clone(),
            namespace: AGENT_NAMESPACE,
            dimensions: sample.dimensions.clone(),
            threshold: USAGE_THRESHOLD,
            comparison: Comparison::GreaterThanOrEqualToThreshold,
        });
    }

    templates
}

/// Whether `sample` is the disk usage of the root filesystem.
pub fn is_root_disk(sample: &MetricSample) -> bool {
    sample.metric_name == LINUX_DISK_METRIC && sample.has_dimension("path", LINUX_ROOT_PATH)
}

fn windows_alarms(instance: &InstanceDescriptor) -> Vec<AlarmTemplate> {
    let dimensions = |object_name: &str| {
        vec![
            Dimension::new("InstanceId", &instance.instance_id),
            Dimension::new("ImageId", &instance.image_id),
            Dimension::new("objectname", object_name),
            Dimension::new("InstanceType", &instance.instance_type),
        ]
    };

    let mut disk_dimensions = dimensions("LogicalDisk");
    disk_dimensions.push(Dimension::new("instance", WINDOWS_SYSTEM_DRIVE));

    vec![
        AlarmTemplate {
            kind: AlarmKind::MemUsed,
            metric_name: WINDOWS_MEMORY_METRIC.to_string(),
            namespace: AGENT_NAMESPACE,
            dimensions: dimensions("Memory"),
            threshold: USAGE_THRESHOLD,
            comparison: Comparison::GreaterThanOrEqualToThreshold,
        },
        // free space, so the breach is at or below the floor
        AlarmTemplate {
            kind: AlarmKind::DiskUsed,
            metric_name: WINDOWS_DISK_METRIC.to_string(),
            namespace: AGENT_NAMESPACE,
            dimensions: disk_dimensions,
            threshold: FREE_SPACE_THRESHOLD,
            comparison: Comparison::LessThanOrEqualToThreshold,
        },
    ]
}
