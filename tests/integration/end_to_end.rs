//! End-to-end runs against the in-memory cloud

use std::sync::Arc;

use chrono::Utc;
use ec2_alarms::{Comparison, Dimension};
use pretty_assertions::assert_eq;

use crate::helpers::*;

#[tokio::test]
async fn test_linux_instance_with_agent_metrics() {
    let cloud = create_test_cloud().with_tagged_instance(
        linux_instance("i-0web", "web1"),
        SELECTION_TAG.0,
        SELECTION_TAG.1,
    );
    let cloud = Arc::new(with_agent_metrics(cloud, "i-0web"));

    let report = provisioner(tag_config(), &cloud).run().await.unwrap();

    let names: Vec<_> = report.alarms.iter().map(|a| a.alarm_name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "gl_acme_ec2_web1_status-check",
            "gl_acme_ec2_web1_cpu-used",
            "gl_acme_ec2_web1_mem-used",
            "gl_acme_ec2_web1_disk-used",
        ]
    );
    assert_eq!(report.submission.created, 4);
    assert_eq!(report.submission.tagged, 4);
    assert_eq!(report.submission.batches, 1);
    assert_eq!(cloud.alarms().len(), 4);
    assert!(report.collisions.is_empty());

    let tags = cloud.tags_for(&alarm_arn("gl_acme_ec2_web1_disk-used"));
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].key, "gl_monitoring");
    assert_eq!(tags[0].value, Utc::now().date_naive().format("%Y-%m-%d").to_string());
}

#[tokio::test]
async fn test_windows_instance() {
    let cloud = Arc::new(
        create_test_cloud().with_tagged_instance(
            windows_instance("i-0db", "db1"),
            SELECTION_TAG.0,
            SELECTION_TAG.1,
        ),
    );

    let report = provisioner(tag_config(), &cloud).run().await.unwrap();

    let names: Vec<_> = report.alarms.iter().map(|a| a.alarm_name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "gl_acme_ec2_db1_status-check",
            "gl_acme_ec2_db1_cpu-used",
            "gl_acme_ec2_db1_mem-used",
            "gl_acme_ec2_db1_disk-used",
        ]
    );

    let created = cloud.alarms();
    let disk = &created["gl_acme_ec2_db1_disk-used"];
    assert_eq!(disk.comparison, Comparison::LessThanOrEqualToThreshold);
    assert_eq!(disk.threshold, 5.0);
    assert!(disk.dimensions.contains(&Dimension::new("instance", "C:")));

    for name in &names[..3] {
        assert_eq!(
            created[*name].comparison,
            Comparison::GreaterThanOrEqualToThreshold
        );
    }
    assert_eq!(cloud.call_counts().list_metrics, 0);
}

#[tokio::test]
async fn test_selection_by_instance_ids() {
    let cloud = Arc::new(
        create_test_cloud()
            .with_instance(linux_instance("i-1", "app1"))
            .with_instance(linux_instance("i-2", "app2"))
            .with_instance(linux_instance("i-3", "app3")),
    );

    let report = provisioner(id_config(&["i-1", "i-3"]), &cloud)
        .run()
        .await
        .unwrap();

    assert_eq!(report.instances, 2);
    assert!(cloud.alarms().contains_key("gl_acme_ec2_app1_cpu-used"));
    assert!(cloud.alarms().contains_key("gl_acme_ec2_app3_cpu-used"));
    assert!(!cloud.alarms().contains_key("gl_acme_ec2_app2_cpu-used"));
}

#[tokio::test]
async fn test_every_page_is_processed_before_submission() {
    let mut cloud = create_test_cloud().with_page_size(3);
    for i in 0..8 {
        cloud = cloud.with_tagged_instance(
            linux_instance(&format!("i-{i}"), &format!("node{i}")),
            SELECTION_TAG.0,
            SELECTION_TAG.1,
        );
    }
    let cloud = Arc::new(cloud);

    let report = provisioner(tag_config(), &cloud).run().await.unwrap();

    assert_eq!(report.pages, 3);
    assert_eq!(report.instances, 8);
    assert_eq!(report.alarms.len(), 16);
    assert_eq!(report.submission.batches, 2);
    assert_eq!(cloud.call_counts().list_instances, 3);
    assert_eq!(cloud.call_counts().resolve_topic, 1);
    assert_eq!(cloud.alarms().len(), 16);
}

#[tokio::test]
async fn test_duplicate_display_names_collide() {
    let cloud = Arc::new(
        create_test_cloud()
            .with_instance(linux_instance("i-1", "web"))
            .with_instance(linux_instance("i-2", "web")),
    );

    let report = provisioner(id_config(&["i-1", "i-2"]), &cloud)
        .run()
        .await
        .unwrap();

    assert_eq!(report.alarms.len(), 4);
    assert_eq!(report.submission.created, 4);
    // the second instance's alarms replaced the first's
    assert_eq!(cloud.alarms().len(), 2);
    let created = cloud.alarms();
    assert_eq!(created["gl_acme_ec2_web_cpu-used"].instance_id, "i-2");

    let names: Vec<_> = report
        .collisions
        .iter()
        .map(|collision| collision.alarm_name.as_str())
        .collect();
    assert_eq!(names, vec!["gl_acme_ec2_web_cpu-used", "gl_acme_ec2_web_status-check"]);
    for collision in &report.collisions {
        assert_eq!(collision.instance_ids, vec!["i-1", "i-2"]);
    }
    assert_eq!(report.summary().collisions.len(), 2);
}
