//! Snapshot poller — rebuilds the task state histogram on a fixed cadence.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use swarmwatch_cluster::TaskState;

use crate::error::ReconcileResult;
use crate::histogram::TaskStateHistogram;
use crate::reconciler::Reconciler;

/// Default delay between two polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

pub struct SnapshotPoller {
    reconciler: Reconciler,
    interval: Duration,
}

impl SnapshotPoller {
    pub fn new(reconciler: Reconciler, interval: Duration) -> Self {
        Self {
            reconciler,
            interval,
        }
    }

    /// One full cycle: list tasks, resolve their services, aggregate, and
    /// publish every cached service's histogram.
    ///
    /// Nothing is published when the task listing fails, so the previous
    /// values stay in place.
    pub async fn poll_once(&self) -> ReconcileResult<TaskStateHistogram> {
        let tasks = self.reconciler.cluster().list_tasks().await?;
        let mut known = self.reconciler.cache().snapshot().await;
        let mut missing = HashSet::new();

        for task in &tasks {
            if known.contains_key(&task.service_id) || missing.contains(&task.service_id) {
                continue;
            }
            match self.reconciler.resolve_metadata(&task.service_id).await? {
                Some(metadata) => {
                    known.insert(task.service_id.clone(), metadata);
                }
                None => {
                    missing.insert(task.service_id.clone());
                }
            }
        }

        let mut histogram = TaskStateHistogram::aggregate(&tasks, |id| known.get(id).map(Arc::clone));
        for metadata in known.values() {
            histogram.seed(Arc::clone(metadata));
        }

        let series = histogram.publish(self.reconciler.gauges())?;
        debug!(
            tasks = tasks.len(),
            services = histogram.len(),
            unresolved = histogram.unresolved(),
            series,
            "replica states published"
        );
        Ok(histogram)
    }

    /// Poll immediately, then every `interval` until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            states = TaskState::COUNT,
            "snapshot poller started"
        );

        loop {
            if let Err(e) = self.poll_once().await {
                warn!(error = %e, "snapshot poll failed, keeping previous values");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => {
                    info!("snapshot poller shutting down");
                    break;
                }
            }
        }
    }
}
