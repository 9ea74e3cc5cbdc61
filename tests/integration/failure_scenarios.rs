//! Failure tests for the provisioning pipeline
//!
//! These tests verify that failures stay at their isolation boundary:
//! - Configuration errors abort before any service call
//! - A missing notification topic aborts the run
//! - Metric catalog failures only affect one instance
//! - Create and tag failures only affect one alarm

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::NaiveDate;
use ec2_alarms::{
    config::RunConfig, error::ProvisionError, orchestrator::Services, services::memory::MemoryCloud,
    submitter::{BatchSubmitter, SubmitStage},
};

use crate::helpers::*;

#[tokio::test]
async fn test_empty_selection_fails_before_any_call() {
    let cloud = Arc::new(create_test_cloud().with_instance(linux_instance("i-1", "web1")));
    let config = RunConfig {
        instance_ids: vec![],
        instance_tag_name: Some(String::new()),
        instance_tag_value: Some(String::new()),
        ..tag_config()
    };

    let result = provisioner(config, &cloud).run().await;

    assert_matches!(result, Err(ProvisionError::InvalidConfig(_)));
    let calls = cloud.call_counts();
    assert_eq!(calls.resolve_topic, 0);
    assert_eq!(calls.list_instances, 0);
    assert_eq!(calls.create_alarm, 0);
}

#[tokio::test]
async fn test_unknown_topic_is_fatal() {
    let cloud = Arc::new(
        MemoryCloud::new()
            .with_topic("arn:aws:sns:us-east-1:1:Other_Topic")
            .with_instance(linux_instance("i-1", "web1")),
    );

    let result = provisioner(id_config(&["i-1"]), &cloud).run().await;

    assert_matches!(result, Err(ProvisionError::TopicNotFound(topic)) if topic == "Infrastructure_Topic");
    assert_eq!(cloud.call_counts().list_instances, 0);
}

#[tokio::test]
async fn test_catalog_failure_only_skips_that_instances_agent_alarms() {
    let cloud = create_test_cloud()
        .with_instance(linux_instance("i-1", "web1"))
        .with_instance(linux_instance("i-2", "web2"))
        .failing_catalog_for("i-1");
    let cloud = with_agent_metrics(with_agent_metrics(cloud, "i-1"), "i-2");
    let cloud = Arc::new(cloud);

    let report = provisioner(id_config(&["i-1", "i-2"]), &cloud)
        .run()
        .await
        .unwrap();

    assert_eq!(report.instance_failures.len(), 1);
    assert_eq!(report.instance_failures[0].instance_id, "i-1");
    assert_eq!(report.alarms.len(), 6);

    let alarms = cloud.alarms();
    assert!(alarms.contains_key("gl_acme_ec2_web1_cpu-used"));
    assert!(!alarms.contains_key("gl_acme_ec2_web1_mem-used"));
    assert!(alarms.contains_key("gl_acme_ec2_web2_mem-used"));
    assert!(alarms.contains_key("gl_acme_ec2_web2_disk-used"));
}

#[tokio::test]
async fn test_create_failure_does_not_stop_later_batches() {
    let mut cloud = create_test_cloud().failing_create_for("gl_acme_ec2_node0_status-check");
    let mut ids = vec![];
    for i in 0..7 {
        let id = format!("i-{i}");
        cloud = cloud.with_instance(linux_instance(&id, &format!("node{i}")));
        ids.push(id);
    }
    let cloud = Arc::new(cloud);
    let ids: Vec<&str> = ids.iter().map(String::as_str).collect();

    let report = provisioner(id_config(&ids), &cloud).run().await.unwrap();

    assert_eq!(report.submission.batches, 2);
    assert_eq!(cloud.create_attempts().len(), 14);
    assert_eq!(report.submission.created, 13);
    assert_eq!(report.submission.create_failures(), 1);
    assert_eq!(report.submission.failures[0].stage, SubmitStage::Create);
    assert_eq!(cloud.call_counts().tag_alarm, 13);
}

#[tokio::test]
async fn test_tag_failure_leaves_alarm_and_retag_does_not_recreate() {
    let cloud = Arc::new(
        create_test_cloud()
            .with_instance(linux_instance("i-1", "web1"))
            .failing_tag_for("gl_acme_ec2_web1_status-check"),
    );

    let report = provisioner(id_config(&["i-1"]), &cloud).run().await.unwrap();

    assert_eq!(report.submission.created, 2);
    assert_eq!(report.submission.tag_failures(), 1);
    assert!(cloud.alarms().contains_key("gl_acme_ec2_web1_status-check"));
    assert!(cloud.tags_for(&alarm_arn("gl_acme_ec2_web1_status-check")).is_empty());

    cloud.restore_tagging("gl_acme_ec2_web1_status-check");
    let services = Services::uniform(cloud.clone());
    let submitter = BatchSubmitter::new(
        services.monitoring,
        services.identity,
        "us-east-1",
        "gl_monitoring",
        10,
    );
    let date = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
    tokio_test::assert_ok!(
        submitter
            .tag_existing("gl_acme_ec2_web1_status-check", date)
            .await
    );

    assert_eq!(cloud.call_counts().create_alarm, 2);
    let tags = cloud.tags_for(&alarm_arn("gl_acme_ec2_web1_status-check"));
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].value, "2025-01-31");
}

#[tokio::test]
async fn test_identity_failure_uses_default_alias() {
    let cloud = Arc::new(
        create_test_cloud()
            .with_instance(linux_instance("i-1", "web1"))
            .failing_identity(),
    );

    let report = provisioner(id_config(&["i-1"]), &cloud).run().await.unwrap();

    assert_eq!(report.account_alias, "default-account");
    assert_eq!(report.submission.created, 2);
    assert_eq!(report.submission.tag_failures(), 2);
}
