//! Desired replica computation and publication.

use swarmwatch_cluster::{Service, ServiceMode};
use swarmwatch_metrics::{GaugeStore, MetricsResult};

use crate::metadata::ServiceMetadata;

/// Replicas the orchestrator aims to run for `service` on a swarm of
/// `cluster_size` nodes.
///
/// Placement constraints are not considered: a global service is assumed
/// to run one replica on every node.
pub fn compute(service: &Service, cluster_size: u64) -> f64 {
    match service.mode {
        ServiceMode::Replicated { replicas } => replicas as f64,
        ServiceMode::Global => cluster_size as f64,
    }
}

/// Writes `swarm_service_desired_replicas` series.
#[derive(Clone)]
pub struct DesiredReplicaTracker {
    gauges: GaugeStore,
}

impl DesiredReplicaTracker {
    pub fn new(gauges: GaugeStore) -> Self {
        Self { gauges }
    }

    pub fn publish(&self, metadata: &ServiceMetadata, value: f64) -> MetricsResult<()> {
        self.gauges
            .set_desired_replicas(&metadata.desired_labels(), value)
    }

    /// Zero the series of a service that no longer exists (or no longer
    /// exists under this identity).
    pub fn retire(&self, metadata: &ServiceMetadata) -> MetricsResult<()> {
        self.publish(metadata, 0.0)
    }

    pub fn current(&self, metadata: &ServiceMetadata) -> Option<f64> {
        self.gauges.desired_replicas(&metadata.desired_labels())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn service(mode: ServiceMode) -> Service {
        Service {
            id: "svc".into(),
            version: 3,
            name: "web".into(),
            labels: HashMap::new(),
            mode,
        }
    }

    #[test]
    fn replicated_ignores_cluster_size() {
        let svc = service(ServiceMode::Replicated { replicas: 3 });
        for nodes in [0, 1, 5, 100] {
            assert_eq!(compute(&svc, nodes), 3.0);
        }
    }

    #[test]
    fn global_follows_cluster_size() {
        let svc = service(ServiceMode::Global);
        assert_eq!(compute(&svc, 5), 5.0);
        assert_eq!(compute(&svc, 0), 0.0);
    }

    #[test]
    fn retire_sets_zero() {
        let gauges = GaugeStore::new(&[]).unwrap();
        let tracker = DesiredReplicaTracker::new(gauges);
        let md = ServiceMetadata::from_service(&service(ServiceMode::Global), &[]);

        tracker.publish(&md, 4.0).unwrap();
        assert_eq!(tracker.current(&md), Some(4.0));

        tracker.retire(&md).unwrap();
        assert_eq!(tracker.current(&md), Some(0.0));
    }
}
