//! Event-driven reconciliation of desired replicas.
//!
//! The [`Reconciler`] owns the metadata cache and the cluster size and is
//! the only writer of `swarm_service_desired_replicas`. Every cache write
//! and the gauge writes that follow it happen under one commit lock, so
//! concurrent lanes cannot publish values out of order with the cache.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use swarmwatch_cluster::{
    ClusterApi, ClusterEvent, EventAction, EventKind, Service, ServiceId,
};
use swarmwatch_metrics::GaugeStore;

use crate::cache::{ClusterSize, MetadataCache, PutOutcome};
use crate::desired::{self, DesiredReplicaTracker};
use crate::error::{ReconcileError, ReconcileResult};
use crate::metadata::ServiceMetadata;

/// What processing one event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Desired replicas published for the service's current version.
    Applied { service_id: ServiceId, version: u64 },
    /// A newer version was already cached; nothing published.
    Stale {
        service_id: ServiceId,
        version: u64,
        cached: u64,
    },
    /// The service was gone by the time it was inspected, or was removed
    /// while its definition was being fetched.
    Vanished { service_id: ServiceId },
    /// The service's desired replicas were zeroed and its metadata evicted.
    Removed { service_id: ServiceId },
    /// Node membership changed and every service was re-derived.
    Reinitialized(InitStats),
    /// The event does not affect any gauge.
    Ignored,
}

/// Summary of a full re-derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitStats {
    pub services: usize,
    pub nodes: u64,
    /// Cached services that no longer exist and were zeroed.
    pub evicted: usize,
}

#[derive(Clone)]
pub struct Reconciler {
    cluster: Arc<dyn ClusterApi>,
    cache: MetadataCache,
    nodes: Arc<ClusterSize>,
    desired: DesiredReplicaTracker,
    gauges: GaugeStore,
    commit: Arc<Mutex<()>>,
}

impl Reconciler {
    /// Custom labels are taken from the gauge store's configuration.
    pub fn new(cluster: Arc<dyn ClusterApi>, gauges: GaugeStore) -> Self {
        Self {
            cluster,
            cache: MetadataCache::new(),
            nodes: Arc::new(ClusterSize::default()),
            desired: DesiredReplicaTracker::new(gauges.clone()),
            gauges,
            commit: Arc::new(Mutex::new(())),
        }
    }

    pub fn cluster(&self) -> &Arc<dyn ClusterApi> {
        &self.cluster
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    pub fn gauges(&self) -> &GaugeStore {
        &self.gauges
    }

    pub fn cluster_size(&self) -> u64 {
        self.nodes.get()
    }

    /// Derive desired replicas for every service from a fresh listing.
    ///
    /// Runs at startup and again whenever node membership changes. Cached
    /// services missing from the listing are evicted and zeroed.
    pub async fn initialize(&self) -> ReconcileResult<InitStats> {
        let services = self.cluster.list_services().await?;
        let nodes = self.cluster.list_nodes().await?;
        self.nodes.set(nodes.len() as u64);

        for service in &services {
            self.apply_service(service).await?;
        }

        let live: HashSet<ServiceId> = services.iter().map(|s| s.id.clone()).collect();
        let evicted = {
            let _commit = self.commit.lock().await;
            let gone = self.cache.retain(&live).await;
            for metadata in &gone {
                self.desired.retire(metadata)?;
            }
            gone.len()
        };

        let stats = InitStats {
            services: services.len(),
            nodes: self.nodes.get(),
            evicted,
        };
        info!(
            services = stats.services,
            nodes = stats.nodes,
            evicted = stats.evicted,
            "desired replicas initialized"
        );
        Ok(stats)
    }

    /// Apply one cluster event.
    pub async fn process(&self, event: &ClusterEvent) -> ReconcileResult<EventOutcome> {
        match (&event.kind, &event.action) {
            (EventKind::Node, EventAction::Create) => {
                let nodes = self.nodes.increment();
                debug!(node_id = %event.actor_id, nodes, "node joined");
                Ok(EventOutcome::Reinitialized(self.initialize().await?))
            }
            (EventKind::Node, EventAction::Remove) => {
                let nodes = self.nodes.decrement();
                debug!(node_id = %event.actor_id, nodes, "node left");
                Ok(EventOutcome::Reinitialized(self.initialize().await?))
            }
            (EventKind::Service, EventAction::Remove) => self.remove_service(&event.actor_id).await,
            (EventKind::Service, EventAction::Create | EventAction::Update) => {
                self.refresh_service(&event.actor_id).await
            }
            _ => Ok(EventOutcome::Ignored),
        }
    }

    /// Zero a removed service's desired replicas and evict its metadata.
    ///
    /// The service stays tombstoned in the cache, so a definition fetched
    /// before the removal is discarded when it lands. Fails with [`ReconcileError::NotFound`] when nothing was cached for
    /// the service, leaving the gauges untouched.
    pub async fn remove_service(&self, service_id: &str) -> ReconcileResult<EventOutcome> {
        let _commit = self.commit.lock().await;
        let previous = self
            .cache
            .remove(service_id)
            .await
            .ok_or_else(|| ReconcileError::NotFound(service_id.to_string()))?;

        self.desired.retire(&previous)?;
        info!(
            service_id,
            service = %previous.service,
            version = previous.version,
            "service removed, desired replicas zeroed"
        );
        Ok(EventOutcome::Removed {
            service_id: service_id.to_string(),
        })
    }

    /// Re-read a created or updated service and publish its desired replicas.
    pub async fn refresh_service(&self, service_id: &str) -> ReconcileResult<EventOutcome> {
        let service = match self.cluster.inspect_service(service_id).await {
            Ok(service) => service,
            Err(e) if e.is_not_found() => {
                info!(service_id, "service vanished before it could be inspected");
                return Ok(EventOutcome::Vanished {
                    service_id: service_id.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        self.apply_service(&service).await
    }

    /// Cached metadata for a service, inspecting and caching it on a miss.
    ///
    /// Returns `None` when the service no longer exists.
    pub async fn resolve_metadata(
        &self,
        service_id: &str,
    ) -> ReconcileResult<Option<Arc<ServiceMetadata>>> {
        if let Some(metadata) = self.cache.get(service_id).await {
            return Ok(Some(metadata));
        }

        match self.cluster.inspect_service(service_id).await {
            Ok(service) => {
                debug!(service_id, "metadata cache miss, service inspected");
                self.apply_service(&service).await?;
                Ok(self.cache.get(service_id).await)
            }
            Err(e) if e.is_not_found() => {
                debug!(service_id, "task references a service that no longer exists");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn apply_service(&self, service: &Service) -> ReconcileResult<EventOutcome> {
        let metadata = ServiceMetadata::from_service(service, self.gauges.custom_labels());

        let _commit = self.commit.lock().await;
        let current = match self.cache.put(metadata).await {
            PutOutcome::Inserted(current) => current,
            PutOutcome::Replaced { current, previous } => {
                if previous.desired_labels() != current.desired_labels() {
                    self.desired.retire(&previous)?;
                }
                current
            }
            PutOutcome::Stale { cached } => {
                warn!(
                    service_id = %service.id,
                    version = service.version,
                    cached = cached.version,
                    "discarding stale service definition"
                );
                return Ok(EventOutcome::Stale {
                    service_id: service.id.clone(),
                    version: service.version,
                    cached: cached.version,
                });
            }
            PutOutcome::Removed => {
                debug!(
                    service_id = %service.id,
                    version = service.version,
                    "discarding definition of a removed service"
                );
                return Ok(EventOutcome::Vanished {
                    service_id: service.id.clone(),
                });
            }
        };

        let value = desired::compute(service, self.nodes.get());
        self.desired.publish(&current, value)?;
        debug!(
            service_id = %service.id,
            service = %service.name,
            mode = %service.mode,
            version = service.version,
            desired = value,
            "desired replicas published"
        );

        Ok(EventOutcome::Applied {
            service_id: service.id.clone(),
            version: service.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use swarmwatch_cluster::ServiceMode;
    use swarmwatch_metrics::DESIRED_REPLICAS;

    use crate::fake::{FakeCluster, global, replicated};

    fn setup(custom: &[&str]) -> (Arc<FakeCluster>, Reconciler) {
        let custom: Vec<String> = custom.iter().map(|s| s.to_string()).collect();
        let gauges = GaugeStore::new(&custom).unwrap();
        let cluster = FakeCluster::new();
        let reconciler = Reconciler::new(cluster.clone(), gauges);
        (cluster, reconciler)
    }

    fn desired(reconciler: &Reconciler, service: &Service) -> Option<f64> {
        let md = ServiceMetadata::from_service(service, reconciler.gauges().custom_labels());
        reconciler.gauges().desired_replicas(&md.desired_labels())
    }

    fn event(kind: EventKind, action: EventAction, id: &str) -> ClusterEvent {
        ClusterEvent::new(kind, action, id)
    }

    #[tokio::test]
    async fn initialize_publishes_every_service() {
        let (cluster, reconciler) = setup(&[]);
        let web = replicated("s1", "web", 1, 3);
        let agent = global("s2", "agent", 1);
        cluster.add_service(web.clone());
        cluster.add_service(agent.clone());
        cluster.set_nodes(5);

        let stats = reconciler.initialize().await.unwrap();

        assert_eq!(stats, InitStats { services: 2, nodes: 5, evicted: 0 });
        assert_eq!(desired(&reconciler, &web), Some(3.0));
        assert_eq!(desired(&reconciler, &agent), Some(5.0));
        assert_eq!(reconciler.cache().len().await, 2);
    }

    #[tokio::test]
    async fn replicated_desired_ignores_node_changes() {
        let (cluster, reconciler) = setup(&[]);
        let web = replicated("s1", "web", 1, 3);
        cluster.add_service(web.clone());
        cluster.set_nodes(2);
        reconciler.initialize().await.unwrap();

        cluster.set_nodes(3);
        reconciler
            .process(&event(EventKind::Node, EventAction::Create, "n3"))
            .await
            .unwrap();

        assert_eq!(desired(&reconciler, &web), Some(3.0));
    }

    #[tokio::test]
    async fn node_removal_rederives_global_services() {
        let (cluster, reconciler) = setup(&[]);
        let agent = global("s2", "agent", 1);
        cluster.add_service(agent.clone());
        cluster.set_nodes(5);
        reconciler.initialize().await.unwrap();
        assert_eq!(desired(&reconciler, &agent), Some(5.0));

        cluster.set_nodes(4);
        let outcome = reconciler
            .process(&event(EventKind::Node, EventAction::Remove, "n5"))
            .await
            .unwrap();

        assert!(matches!(outcome, EventOutcome::Reinitialized(InitStats { nodes: 4, .. })));
        assert_eq!(desired(&reconciler, &agent), Some(4.0));
        assert_eq!(reconciler.cluster_size(), 4);
    }

    #[tokio::test]
    async fn node_join_rederives_global_services() {
        let (cluster, reconciler) = setup(&[]);
        let agent = global("s2", "agent", 1);
        let web = replicated("s1", "web", 1, 3);
        cluster.add_service(agent.clone());
        cluster.add_service(web.clone());
        cluster.set_nodes(5);
        reconciler.initialize().await.unwrap();
        assert_eq!(desired(&reconciler, &agent), Some(5.0));

        cluster.set_nodes(6);
        let outcome = reconciler
            .process(&event(EventKind::Node, EventAction::Create, "n6"))
            .await
            .unwrap();

        assert!(matches!(outcome, EventOutcome::Reinitialized(InitStats { nodes: 6, .. })));
        assert_eq!(desired(&reconciler, &agent), Some(6.0));
        assert_eq!(desired(&reconciler, &web), Some(3.0));
        assert_eq!(reconciler.cluster_size(), 6);
    }

    #[tokio::test]
    async fn node_update_is_ignored() {
        let (_cluster, reconciler) = setup(&[]);
        let outcome = reconciler
            .process(&event(EventKind::Node, EventAction::Update, "n1"))
            .await
            .unwrap();
        assert_eq!(outcome, EventOutcome::Ignored);
    }

    #[tokio::test]
    async fn removal_zeroes_and_second_removal_fails() {
        let (cluster, reconciler) = setup(&[]);
        let web = replicated("s1", "web", 1, 3);
        cluster.add_service(web.clone());
        reconciler.initialize().await.unwrap();

        cluster.remove_service("s1");
        let remove = event(EventKind::Service, EventAction::Remove, "s1");
        let outcome = reconciler.process(&remove).await.unwrap();

        assert!(matches!(outcome, EventOutcome::Removed { .. }));
        assert_eq!(desired(&reconciler, &web), Some(0.0));
        assert!(reconciler.cache().get("s1").await.is_none());

        let again = reconciler.process(&remove).await;
        assert!(matches!(again, Err(ReconcileError::NotFound(id)) if id == "s1"));
        assert_eq!(desired(&reconciler, &web), Some(0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn update_fetched_before_removal_is_discarded() {
        let (cluster, reconciler) = setup(&[]);
        let v1 = replicated("s1", "web", 1, 3);
        let v2 = replicated("s1", "web", 2, 5);
        cluster.add_service(v1.clone());
        reconciler.initialize().await.unwrap();
        cluster.script_inspect("s1", Duration::from_millis(100), Ok(v2.clone()));

        let refresh = reconciler.refresh_service("s1");
        let remove = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cluster.remove_service("s1");
            reconciler
                .process(&event(EventKind::Service, EventAction::Remove, "s1"))
                .await
        };
        let (refreshed, removed) = tokio::join!(refresh, remove);

        assert!(matches!(removed.unwrap(), EventOutcome::Removed { .. }));
        assert_eq!(
            refreshed.unwrap(),
            EventOutcome::Vanished { service_id: "s1".into() }
        );
        assert!(reconciler.cache().get("s1").await.is_none());
        assert_eq!(desired(&reconciler, &v1), Some(0.0));
        assert_eq!(desired(&reconciler, &v2), None);
    }

    #[tokio::test]
    async fn reinitialize_with_listing_older_than_removal_keeps_zero() {
        let (cluster, reconciler) = setup(&[]);
        let web = replicated("s1", "web", 1, 3);
        cluster.add_service(web.clone());
        reconciler.initialize().await.unwrap();

        // The listing still carries s1, as if taken before the removal landed.
        reconciler
            .process(&event(EventKind::Service, EventAction::Remove, "s1"))
            .await
            .unwrap();
        let stats = reconciler.initialize().await.unwrap();

        assert_eq!(stats.evicted, 0);
        assert_eq!(desired(&reconciler, &web), Some(0.0));
        assert!(reconciler.cache().get("s1").await.is_none());
    }

    #[tokio::test]
    async fn update_retires_previous_version() {
        let (cluster, reconciler) = setup(&[]);
        let v1 = replicated("s1", "web", 1, 3);
        cluster.add_service(v1.clone());
        reconciler.initialize().await.unwrap();

        let v2 = replicated("s1", "web", 2, 5);
        cluster.add_service(v2.clone());
        let outcome = reconciler
            .process(&event(EventKind::Service, EventAction::Update, "s1"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            EventOutcome::Applied { service_id: "s1".into(), version: 2 }
        );
        assert_eq!(desired(&reconciler, &v1), Some(0.0));
        assert_eq!(desired(&reconciler, &v2), Some(5.0));
        assert_eq!(reconciler.gauges().series_count(DESIRED_REPLICAS), 2);
    }

    #[tokio::test]
    async fn stale_definition_is_not_published() {
        let (cluster, reconciler) = setup(&[]);
        let v5 = replicated("s1", "web", 5, 2);
        cluster.add_service(v5.clone());
        reconciler.initialize().await.unwrap();

        let v4 = replicated("s1", "web", 4, 9);
        cluster.add_service(v4.clone());
        let outcome = reconciler.refresh_service("s1").await.unwrap();

        assert!(matches!(outcome, EventOutcome::Stale { version: 4, cached: 5, .. }));
        assert_eq!(desired(&reconciler, &v4), None);
        assert_eq!(desired(&reconciler, &v5), Some(2.0));
    }

    #[tokio::test]
    async fn vanished_service_is_not_an_error() {
        let (_cluster, reconciler) = setup(&[]);
        let outcome = reconciler
            .process(&event(EventKind::Service, EventAction::Create, "ghost"))
            .await
            .unwrap();

        assert_eq!(outcome, EventOutcome::Vanished { service_id: "ghost".into() });
        assert!(reconciler.cache().is_empty().await);
    }

    #[tokio::test]
    async fn reinitialize_evicts_missing_services() {
        let (cluster, reconciler) = setup(&[]);
        let web = replicated("s1", "web", 1, 3);
        let api = replicated("s2", "api", 1, 2);
        cluster.add_service(web.clone());
        cluster.add_service(api.clone());
        reconciler.initialize().await.unwrap();

        cluster.remove_service("s2");
        let stats = reconciler.initialize().await.unwrap();

        assert_eq!(stats.evicted, 1);
        assert_eq!(desired(&reconciler, &api), Some(0.0));
        assert_eq!(desired(&reconciler, &web), Some(3.0));
    }

    #[tokio::test]
    async fn absent_custom_label_exports_empty() {
        let (cluster, reconciler) = setup(&["com.example.team"]);
        let mut web = replicated("s1", "web", 1, 3);
        let plain = replicated("s2", "plain", 1, 1);
        web.labels.insert("com.example.team".into(), "core".into());
        cluster.add_service(web);
        cluster.add_service(plain);
        reconciler.initialize().await.unwrap();

        let text = reconciler.gauges().render().unwrap();
        assert!(text.contains("com_example_team=\"core\""), "{text}");
        assert!(text.contains("com_example_team=\"\""), "{text}");
    }

    #[tokio::test]
    async fn resolve_caches_on_miss() {
        let (cluster, reconciler) = setup(&[]);
        cluster.add_service(Service {
            mode: ServiceMode::Global,
            ..replicated("s1", "agent", 3, 0)
        });

        let md = reconciler.resolve_metadata("s1").await.unwrap().unwrap();
        assert_eq!(md.version, 3);
        assert!(reconciler.cache().get("s1").await.is_some());

        assert!(reconciler.resolve_metadata("missing").await.unwrap().is_none());
    }
}
