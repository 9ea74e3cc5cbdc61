//! Concurrency tests
//!
//! These tests verify the fan-out of the instance processor:
//! - Lookups for many instances overlap but stay within the pool size
//! - Per-instance alarm order survives nondeterministic completion order

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ec2_alarms::{
    AlarmKind, Dimension, MetricSample,
    error::ProvisionResult,
    orchestrator::{Provisioner, Services},
    services::MetricCatalog,
    util::WORKER_POOL_SIZE,
};

use crate::helpers::*;

/// Catalog that answers slowly, reports memory metrics for every instance and
/// tracks how many lookups overlap.
#[derive(Default)]
struct SlowCatalog {
    running: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl MetricCatalog for SlowCatalog {
    async fn list_metrics(
        &self,
        _namespace: &str,
        filters: &[Dimension],
    ) -> ProvisionResult<Vec<MetricSample>> {
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);

        // later instances answer faster, so completion order differs from submission order
        let delay = 40u64.saturating_sub(self.calls.load(Ordering::SeqCst) as u64);
        tokio::time::sleep(Duration::from_millis(delay)).await;

        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(vec![MetricSample {
            metric_name: "mem_used_percent".to_string(),
            dimensions: filters.to_vec(),
        }])
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fan_out_is_bounded_and_ordered() {
    let mut cloud = create_test_cloud();
    for i in 0..35 {
        cloud = cloud.with_tagged_instance(
            linux_instance(&format!("i-{i:02}"), &format!("node{i:02}")),
            SELECTION_TAG.0,
            SELECTION_TAG.1,
        );
    }
    let cloud = Arc::new(cloud);
    let catalog = Arc::new(SlowCatalog::default());

    let services = Services {
        catalog: catalog.clone(),
        ..Services::uniform(cloud.clone())
    };
    let report = Provisioner::new(tag_config(), services).run().await.unwrap();

    assert_eq!(catalog.calls.load(Ordering::SeqCst), 35);
    let peak = catalog.peak.load(Ordering::SeqCst);
    assert!(peak <= WORKER_POOL_SIZE, "peak concurrency {peak} exceeds pool size");
    assert!(peak > 1, "lookups never overlapped");

    assert_eq!(report.alarms.len(), 105);
    for chunk in report.alarms.chunks(3) {
        let kinds: Vec<_> = chunk.iter().map(|alarm| alarm.kind).collect();
        assert_eq!(kinds, vec![AlarmKind::StatusCheck, AlarmKind::CpuUsed, AlarmKind::MemUsed]);
        assert!(chunk.iter().all(|alarm| alarm.instance_id == chunk[0].instance_id));
    }
    assert_eq!(cloud.alarms().len(), 105);
}
