pub mod config;
pub mod error;
pub mod orchestrator;
pub mod processor;
pub mod rules;
pub mod services;
pub mod submitter;
pub mod util;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Display name used when an instance carries no `Name` tag.
pub const UNNAMED_INSTANCE: &str = "UnnamedInstance";

/// Image identifier used when discovery reports none.
pub const UNKNOWN_IMAGE: &str = "UnknownImage";

/// Operating system family of an instance, as reported by discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Linux,
    Windows,
}

impl Platform {
    /// Interprets the platform value reported by discovery.
    ///
    /// Matching is case-insensitive. A missing value means Linux, and so does any
    /// value other than `windows`.
    pub fn from_source(value: Option<&str>) -> Self {
        match value {
            Some(value) if value.trim().eq_ignore_ascii_case("windows") => Platform::Windows,
            _ => Platform::Linux,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    pub instance_id: String,
    pub instance_type: String,
    pub display_name: String,
    pub image_id: String,
    pub platform: Platform,
}

impl InstanceDescriptor {
    /// Builds a descriptor, substituting the sentinels for absent name and image.
    pub fn new(
        instance_id: impl Into<String>,
        instance_type: impl Into<String>,
        display_name: Option<String>,
        image_id: Option<String>,
        platform: Platform,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            instance_type: instance_type.into(),
            display_name: display_name.unwrap_or_else(|| UNNAMED_INSTANCE.to_string()),
            image_id: image_id.unwrap_or_else(|| UNKNOWN_IMAGE.to_string()),
            platform,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

impl Dimension {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A metric published for an instance, as returned by the metric catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSample {
    pub metric_name: String,
    pub dimensions: Vec<Dimension>,
}

impl MetricSample {
    pub fn has_dimension(&self, name: &str, value: &str) -> bool {
        self.dimensions
            .iter()
            .any(|dimension| dimension.name == name && dimension.value == value)
    }
}

/// The four alarms the rule engine knows how to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlarmKind {
    StatusCheck,
    CpuUsed,
    MemUsed,
    DiskUsed,
}

impl AlarmKind {
    pub fn suffix(&self) -> &'static str {
        match self {
            AlarmKind::StatusCheck => "status-check",
            AlarmKind::CpuUsed => "cpu-used",
            AlarmKind::MemUsed => "mem-used",
            AlarmKind::DiskUsed => "disk-used",
        }
    }
}

impl fmt::Display for AlarmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    GreaterThanOrEqualToThreshold,
    LessThanOrEqualToThreshold,
}

impl Comparison {
    /// Operator name as the monitoring service spells it.
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparison::GreaterThanOrEqualToThreshold => "GreaterThanOrEqualToThreshold",
            Comparison::LessThanOrEqualToThreshold => "LessThanOrEqualToThreshold",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Statistic {
    #[default]
    Average,
}

impl Statistic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Statistic::Average => "Average",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingData {
    #[default]
    Breaching,
}

impl MissingData {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissingData::Breaching => "breaching",
        }
    }
}

/// A complete alarm, ready to be handed to the monitoring service.
///
/// `alarm_name` is the alarm's identity in the account and region. Creating a
/// definition whose name already exists replaces the existing alarm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmDefinition {
    pub alarm_name: String,
    pub kind: AlarmKind,
    pub instance_id: String,
    pub metric_name: String,
    pub namespace: String,
    pub dimensions: Vec<Dimension>,
    pub threshold: f64,
    pub comparison: Comparison,
    pub statistic: Statistic,
    pub period_secs: i32,
    pub evaluation_periods: i32,
    pub missing_data: MissingData,
    pub actions_enabled: bool,
    pub alarm_actions: Vec<String>,
    pub ok_actions: Vec<String>,
}

/// Provenance tag attached to an alarm after it has been created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    pub key: String,
    pub value: String,
}

impl TagRecord {
    /// Tag whose value is the given date in `YYYY-MM-DD` form.
    pub fn provenance(key: impl Into<String>, date: chrono::NaiveDate) -> Self {
        Self {
            key: key.into(),
            value: date.format("%Y-%m-%d").to_string(),
        }
    }
}
