//! Shared reconciliation state: the service metadata cache and the
//! cluster size.
//!
//! Records are stored behind `Arc` and swapped whole, so a reader holding
//! a record never observes a half-applied update. Removed services leave a
//! tombstone behind: a definition fetched before the removal can no longer
//! bring them back.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;

use swarmwatch_cluster::ServiceId;

use crate::metadata::ServiceMetadata;

/// Result of [`MetadataCache::put`].
#[derive(Debug, Clone, PartialEq)]
pub enum PutOutcome {
    /// No record existed for the service.
    Inserted(Arc<ServiceMetadata>),
    /// A record with the same or an older version was replaced.
    Replaced {
        current: Arc<ServiceMetadata>,
        previous: Arc<ServiceMetadata>,
    },
    /// The cached record is newer; the offered one was discarded.
    Stale { cached: Arc<ServiceMetadata> },
    /// The service was removed; the offered record was discarded.
    Removed,
}

/// Service ID → latest known metadata.
#[derive(Debug, Clone, Default)]
pub struct MetadataCache {
    inner: Arc<RwLock<Entries>>,
}

#[derive(Debug, Default)]
struct Entries {
    records: HashMap<ServiceId, Arc<ServiceMetadata>>,
    /// Service IDs are never reused, so a removed ID stays removed.
    removed: HashSet<ServiceId>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, service_id: &str) -> Option<Arc<ServiceMetadata>> {
        self.inner.read().await.records.get(service_id).cloned()
    }

    /// Insert or replace the record for `metadata.service_id`.
    ///
    /// A record whose version is lower than the cached one is rejected, as
    /// is any record for a service that has been removed.
    pub async fn put(&self, metadata: ServiceMetadata) -> PutOutcome {
        let mut inner = self.inner.write().await;

        if inner.removed.contains(&metadata.service_id) {
            return PutOutcome::Removed;
        }
        if let Some(cached) = inner.records.get(&metadata.service_id) {
            if cached.version > metadata.version {
                return PutOutcome::Stale {
                    cached: Arc::clone(cached),
                };
            }
        }

        let current = Arc::new(metadata);
        match inner
            .records
            .insert(current.service_id.clone(), Arc::clone(&current))
        {
            Some(previous) => PutOutcome::Replaced { current, previous },
            None => PutOutcome::Inserted(current),
        }
    }

    /// Evict a service and tombstone its ID, whether or not it was cached.
    pub async fn remove(&self, service_id: &str) -> Option<Arc<ServiceMetadata>> {
        let mut inner = self.inner.write().await;
        inner.removed.insert(service_id.to_string());
        inner.records.remove(service_id)
    }

    /// Whether `service_id` has been removed.
    pub async fn is_removed(&self, service_id: &str) -> bool {
        self.inner.read().await.removed.contains(service_id)
    }

    /// Keep only the services in `live`, returning the evicted records.
    ///
    /// Tombstones of services absent from `live` are dropped too: a listing
    /// taken after the removal no longer carries them.
    pub async fn retain(&self, live: &HashSet<ServiceId>) -> Vec<Arc<ServiceMetadata>> {
        let mut inner = self.inner.write().await;
        inner.removed.retain(|id| live.contains(id));

        let gone: Vec<ServiceId> = inner
            .records
            .keys()
            .filter(|id| !live.contains(*id))
            .cloned()
            .collect();

        gone.iter().filter_map(|id| inner.records.remove(id)).collect()
    }

    /// Point-in-time copy of every record.
    pub async fn snapshot(&self) -> HashMap<ServiceId, Arc<ServiceMetadata>> {
        self.inner.read().await.records.clone()
    }

    /// IDs of every cached service, sorted.
    pub async fn ids(&self) -> Vec<ServiceId> {
        let mut ids: Vec<ServiceId> = self.inner.read().await.records.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.records.is_empty()
    }
}

/// Number of member nodes in the swarm.
#[derive(Debug, Default)]
pub struct ClusterSize(AtomicU64);

impl ClusterSize {
    pub fn new(nodes: u64) -> Self {
        Self(AtomicU64::new(nodes))
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, nodes: u64) {
        self.0.store(nodes, Ordering::SeqCst);
    }

    /// Add one node, returning the new size.
    pub fn increment(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Remove one node, returning the new size. Never goes below zero.
    pub fn decrement(&self) -> u64 {
        let previous = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)))
            .unwrap_or_else(|n| n);
        previous.saturating_sub(1)
    }
}
