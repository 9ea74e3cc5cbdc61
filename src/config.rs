use tracing::trace;

use crate::error::{ProvisionError, ProvisionResult};

/// How the instances of a run are selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Explicit list of instance identifiers
    InstanceIds(Vec<String>),

    /// All instances carrying the tag `name` with value `value`
    Tag { name: String, value: String },
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct RunConfig {
    #[serde(default = "crate::util::get_region")]
    pub region: String,

    /// Name of the notification topic every alarm reports to
    #[serde(default = "default_topic_name")]
    pub topic_name: String,

    #[serde(default)]
    pub instance_ids: Vec<String>,

    /// Prefix of every alarm name
    #[serde(default = "default_alarm_prefix")]
    pub alarm_prefix: String,

    /// Key of the provenance tag attached to created alarms
    #[serde(default = "default_tag_key")]
    pub tag_key: String,

    pub instance_tag_name: Option<String>,
    pub instance_tag_value: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            region: crate::util::get_region(),
            topic_name: default_topic_name(),
            instance_ids: vec![],
            alarm_prefix: default_alarm_prefix(),
            tag_key: default_tag_key(),
            instance_tag_name: None,
            instance_tag_value: None,
        }
    }
}

fn default_topic_name() -> String {
    String::from("Infrastructure_Topic")
}

fn default_alarm_prefix() -> String {
    String::from("gl")
}

fn default_tag_key() -> String {
    String::from("gl_monitoring")
}

/// The value itself, unless it is missing or whitespace only.
fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.trim().is_empty())
}

impl RunConfig {
    /// Determines the selection mode of this run.
    ///
    /// Exactly one of a non-empty instance id list or a complete tag filter must
    /// be present. Blank ids are dropped; all other values are passed on as given.
    pub fn selection(&self) -> ProvisionResult<Selection> {
        let ids: Vec<String> = self
            .instance_ids
            .iter()
            .filter(|id| !id.trim().is_empty())
            .cloned()
            .collect();

        let tag = match (
            non_blank(&self.instance_tag_name),
            non_blank(&self.instance_tag_value),
        ) {
            (Some(name), Some(value)) => Some((name.to_string(), value.to_string())),
            _ => None,
        };

        match (ids.is_empty(), tag) {
            (false, None) => Ok(Selection::InstanceIds(ids)),
            (true, Some((name, value))) => Ok(Selection::Tag { name, value }),
            (false, Some(_)) => Err(ProvisionError::InvalidConfig(
                "provide either instance_ids or instance_tag_name/instance_tag_value, not both"
                    .to_string(),
            )),
            (true, None) => Err(ProvisionError::InvalidConfig(
                "you must provide either instance_ids or both instance_tag_name and instance_tag_value"
                    .to_string(),
            )),
        }
    }

    pub fn validate(&self) -> ProvisionResult<Selection> {
        for (field, value) in [
            ("region", &self.region),
            ("topic_name", &self.topic_name),
            ("alarm_prefix", &self.alarm_prefix),
            ("tag_key", &self.tag_key),
        ] {
            if value.trim().is_empty() {
                return Err(ProvisionError::InvalidConfig(format!("{field} must not be empty")));
            }
        }

        self.selection()
    }
}

pub fn read_config_file(path: &str) -> ProvisionResult<RunConfig> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| ProvisionError::ConfigFile(format!("{path}: {e}")))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
