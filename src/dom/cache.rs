use crate::dom::service::BuildParams;
use crate::dom::tree::DomState;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct CacheSlot {
    key: BuildParams,
    stored_at: Instant,
    state: Arc<DomState>,
}

/// Single-slot memo of the last reconstruction.
///
/// A hit requires the exact same parameters and an entry younger than the TTL.
/// A zero TTL disables the cache.
#[derive(Debug)]
pub struct BuildCache {
    ttl: Duration,
    slot: Option<CacheSlot>,
}

impl BuildCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, slot: None }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached state for `key`, if still fresh
    pub fn get(&self, key: &BuildParams) -> Option<Arc<DomState>> {
        self.entry(key).map(|(state, _)| state)
    }

    /// Cached state for `key` together with the time it was built
    pub fn entry(&self, key: &BuildParams) -> Option<(Arc<DomState>, Instant)> {
        self.slot
            .as_ref()
            .filter(|slot| slot.key == *key && slot.stored_at.elapsed() < self.ttl)
            .map(|slot| (Arc::clone(&slot.state), slot.stored_at))
    }

    /// Replace the slot with an entry built now; returns its timestamp
    pub fn store(&mut self, key: BuildParams, state: Arc<DomState>) -> Instant {
        let stored_at = Instant::now();
        self.store_at(key, state, stored_at);
        stored_at
    }

    /// Replace the slot with an entry built at `stored_at`.
    ///
    /// Ages count from `stored_at`, so a state copied from another cache
    /// keeps its original age.
    pub fn store_at(&mut self, key: BuildParams, state: Arc<DomState>, stored_at: Instant) {
        self.slot = Some(CacheSlot { key, stored_at, state });
    }

    /// Drop the cached entry
    pub fn invalidate(&mut self) {
        self.slot = None;
    }

    pub fn is_empty(&self) -> bool {
        self.slot.is_none()
    }
}
