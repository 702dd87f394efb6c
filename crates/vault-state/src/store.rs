//! In-memory store for the current system state

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use vault_core::SystemState;

/// Single authoritative record of the current `SystemState`.
///
/// Writers swap in a whole new state under the write lock, and only when
/// nobody changed it since they read it, so concurrent writers never
/// interleave partially. Readers get a copied snapshot.
#[derive(Debug, Clone)]
pub struct StateStore {
    state: Arc<RwLock<SystemState>>,
    stats: Arc<StoreStats>,
}

/// Store statistics
#[derive(Debug, Default)]
pub struct StoreStats {
    pub updates: AtomicU64,
    pub snapshots: AtomicU64,
    pub rejected_swaps: AtomicU64,
}

impl StateStore {
    /// Create a store holding the given initial state
    pub fn new(initial: SystemState) -> Self {
        Self {
            state: Arc::new(RwLock::new(initial)),
            stats: Arc::new(StoreStats::default()),
        }
    }

    /// Copy of the current state
    pub async fn snapshot(&self) -> SystemState {
        self.stats.snapshots.fetch_add(1, Ordering::Relaxed);
        *self.state.read().await
    }

    /// Replace the state only if it still equals `expected`.
    ///
    /// Returns `false` without mutating when another writer got there first.
    pub async fn compare_and_set(&self, expected: &SystemState, new: SystemState) -> bool {
        let mut state = self.state.write().await;
        if *state != *expected {
            self.stats.rejected_swaps.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        *state = new;
        self.stats.updates.fetch_add(1, Ordering::Relaxed);
        debug!("System state updated: {:?}", new);
        true
    }

    /// Get store statistics
    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(SystemState::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_core::{FanSpeed, SwitchState};

    #[tokio::test]
    async fn test_snapshot_reflects_swaps() {
        let store = StateStore::new(SystemState::with_temperature(71.5));
        let seen = store.snapshot().await;

        let mut next = seen;
        next.fan_speed_percent = FanSpeed::clamped(30);
        assert!(store.compare_and_set(&seen, next).await);

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.temperature_c, 71.5);
        assert_eq!(snapshot.fan_speed_percent.percent(), 30);
    }

    #[tokio::test]
    async fn test_compare_and_set() {
        let store = StateStore::default();
        let seen = store.snapshot().await;

        let mut next = seen;
        next.fan_speed_percent = FanSpeed::FULL;
        assert!(store.compare_and_set(&seen, next).await);

        // `seen` is stale now
        let mut other = seen;
        other.diode_state = SwitchState::On;
        assert!(!store.compare_and_set(&seen, other).await);

        let current = store.snapshot().await;
        assert_eq!(current.fan_speed_percent, FanSpeed::FULL);
        assert_eq!(current.diode_state, SwitchState::Off);
        assert_eq!(store.stats().rejected_swaps.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_concurrent_writers_do_not_interleave() {
        let store = StateStore::default();
        let mut handles = Vec::new();

        for i in 0..50i64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let seen = store.snapshot().await;
                    let mut next = seen;
                    // Both fields always move together
                    next.temperature_c = i as f64;
                    next.fan_speed_percent = FanSpeed::clamped(i);
                    if store.compare_and_set(&seen, next).await {
                        break;
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = store.snapshot().await;
        assert_eq!(
            snapshot.temperature_c as i64,
            snapshot.fan_speed_percent.percent() as i64
        );
        assert_eq!(store.stats().updates.load(Ordering::Relaxed), 50);
    }
}
