//! Event dispatch — one FIFO lane per service, bounded concurrency overall.
//!
//! Events for the same service (and all node events) are applied strictly
//! in delivery order by a dedicated lane task. Lanes for different services
//! run in parallel, limited by a shared semaphore. A lane that has been
//! idle for `idle_timeout` removes itself from the lane table.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc, watch};
use tracing::{debug, error, info};

use swarmwatch_cluster::{ClusterError, ClusterEvent, EventKind, EventStream, ServiceId};

use crate::error::ReconcileResult;
use crate::reconciler::Reconciler;

/// Default upper bound on events processed at the same time.
pub const DEFAULT_MAX_CONCURRENT: usize = 16;

/// Default time an empty lane lingers before retiring.
pub const DEFAULT_LANE_IDLE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum LaneKey {
    Nodes,
    Service(ServiceId),
}

impl LaneKey {
    fn of(event: &ClusterEvent) -> Option<Self> {
        match event.kind {
            EventKind::Node => Some(LaneKey::Nodes),
            EventKind::Service => Some(LaneKey::Service(event.actor_id.clone())),
            EventKind::Other(_) => None,
        }
    }
}

type LaneTable = HashMap<LaneKey, mpsc::UnboundedSender<ClusterEvent>>;

#[derive(Clone)]
pub struct EventDispatcher {
    reconciler: Reconciler,
    lanes: Arc<Mutex<LaneTable>>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
    idle_timeout: Duration,
}

impl EventDispatcher {
    pub fn new(reconciler: Reconciler, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            reconciler,
            lanes: Arc::new(Mutex::new(HashMap::new())),
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            idle_timeout: DEFAULT_LANE_IDLE,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Number of lanes currently alive.
    pub fn active_lanes(&self) -> usize {
        self.lock_lanes().len()
    }

    /// A lane that panicked while holding the table leaves it consistent:
    /// every mutation is a single insert or remove.
    fn lock_lanes(&self) -> MutexGuard<'_, LaneTable> {
        self.lanes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consume `events` until shutdown.
    ///
    /// A subscription error or the stream closing is fatal: the error is
    /// returned and no further events are dispatched.
    pub async fn run(
        &self,
        mut events: EventStream,
        mut shutdown: watch::Receiver<bool>,
    ) -> ReconcileResult<()> {
        info!(max_concurrent = self.max_concurrent, "event dispatcher started");

        loop {
            tokio::select! {
                next = events.recv() => match next {
                    Some(Ok(event)) => self.dispatch(event),
                    Some(Err(e)) => {
                        error!(error = %e, "event subscription failed");
                        return Err(e.into());
                    }
                    None => {
                        error!("event subscription closed");
                        return Err(ClusterError::StreamClosed.into());
                    }
                },
                _ = shutdown.changed() => {
                    info!("event dispatcher shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// Queue an event on its lane, starting the lane if needed.
    pub fn dispatch(&self, event: ClusterEvent) {
        info!(
            kind = %event.kind,
            action = %event.action,
            actor.id = %event.actor_id,
            actor.name = event.actor_name().unwrap_or(""),
            "new event received"
        );

        let Some(key) = LaneKey::of(&event) else {
            debug!(kind = %event.kind, "ignoring event of unhandled type");
            return;
        };

        let mut lanes = self.lock_lanes();
        let event = match lanes.get(&key) {
            Some(lane) => match lane.send(event) {
                Ok(()) => return,
                Err(mpsc::error::SendError(event)) => event,
            },
            None => event,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(event);
        lanes.insert(key.clone(), tx);
        drop(lanes);

        debug!(lane = ?key, "lane started");
        tokio::spawn(self.clone().drain_lane(key, rx));
    }

    async fn drain_lane(self, key: LaneKey, mut rx: mpsc::UnboundedReceiver<ClusterEvent>) {
        loop {
            let event = match tokio::time::timeout(self.idle_timeout, rx.recv()).await {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(_) => {
                    // Check for a late event under the table lock so nothing
                    // is queued on a lane that is about to go away.
                    let next = {
                        let mut lanes = self.lock_lanes();
                        let next = rx.try_recv().ok();
                        if next.is_none() {
                            lanes.remove(&key);
                        }
                        next
                    };
                    match next {
                        Some(event) => event,
                        None => break,
                    }
                }
            };
            self.handle(event).await;
        }
        debug!(lane = ?key, "lane retired");
    }

    async fn handle(&self, event: ClusterEvent) {
        let Ok(_permit) = self.permits.acquire().await else {
            return;
        };

        match self.reconciler.process(&event).await {
            Ok(outcome) => debug!(?outcome, "event processed"),
            Err(e) => error!(
                kind = %event.kind,
                action = %event.action,
                actor.id = %event.actor_id,
                error = %e,
                "failed to process event"
            ),
        }
    }
}
