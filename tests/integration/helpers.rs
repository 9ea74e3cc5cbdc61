//! Helper functions for integration tests

use std::sync::Arc;

use ec2_alarms::{
    Dimension, InstanceDescriptor, MetricSample, Platform,
    config::RunConfig,
    orchestrator::{Provisioner, Services},
    rules::AGENT_NAMESPACE,
    services::memory::MemoryCloud,
};

pub const TOPIC_ARN: &str = "arn:aws:sns:us-east-1:123456789012:Infrastructure_Topic";
pub const ACCOUNT_ID: &str = "123456789012";
pub const SELECTION_TAG: (&str, &str) = ("gl_env", "prod");

/// Run configuration selecting instances by the `gl_env=prod` tag
pub fn tag_config() -> RunConfig {
    RunConfig {
        region: "us-east-1".to_string(),
        topic_name: "Infrastructure_Topic".to_string(),
        instance_ids: vec![],
        alarm_prefix: "gl".to_string(),
        tag_key: "gl_monitoring".to_string(),
        instance_tag_name: Some(SELECTION_TAG.0.to_string()),
        instance_tag_value: Some(SELECTION_TAG.1.to_string()),
    }
}

/// Run configuration selecting instances by id
pub fn id_config(ids: &[&str]) -> RunConfig {
    RunConfig {
        instance_ids: ids.iter().map(|id| id.to_string()).collect(),
        instance_tag_name: None,
        instance_tag_value: None,
        ..tag_config()
    }
}

/// Cloud with the topic and the `acme` account alias configured
pub fn create_test_cloud() -> MemoryCloud {
    MemoryCloud::new()
        .with_topic(TOPIC_ARN)
        .with_account(Some("acme"), ACCOUNT_ID)
}

pub fn linux_instance(id: &str, name: &str) -> InstanceDescriptor {
    InstanceDescriptor::new(id, "t3.micro", Some(name.to_string()), None, Platform::Linux)
}

pub fn windows_instance(id: &str, name: &str) -> InstanceDescriptor {
    InstanceDescriptor::new(
        id,
        "m5.large",
        Some(name.to_string()),
        Some("ami-0abc".to_string()),
        Platform::Windows,
    )
}

/// Adds the memory and root disk metrics the CloudWatch agent publishes on Linux
pub fn with_agent_metrics(cloud: MemoryCloud, instance_id: &str) -> MemoryCloud {
    cloud
        .with_metric(
            AGENT_NAMESPACE,
            MetricSample {
                metric_name: "mem_used_percent".to_string(),
                dimensions: vec![Dimension::new("InstanceId", instance_id)],
            },
        )
        .with_metric(
            AGENT_NAMESPACE,
            MetricSample {
                metric_name: "disk_used_percent".to_string(),
                dimensions: vec![
                    Dimension::new("InstanceId", instance_id),
                    Dimension::new("path", "/"),
                    Dimension::new("device", "nvme0n1p1"),
                    Dimension::new("fstype", "xfs"),
                ],
            },
        )
}

pub fn provisioner(config: RunConfig, cloud: &Arc<MemoryCloud>) -> Provisioner {
    Provisioner::new(config, Services::uniform(cloud.clone()))
}

pub fn alarm_arn(alarm_name: &str) -> String {
    format!("arn:aws:cloudwatch:us-east-1:{ACCOUNT_ID}:alarm:{alarm_name}")
}
