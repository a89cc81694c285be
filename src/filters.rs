//! Filter Set: in-memory snapshot of active user filters,
//! refreshed by a reload signal or a periodic interval.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::domain::UserFilter;
use crate::store::StoreGateway;

/// Owns the current filter snapshot. Read only by the orchestrator — the
/// delivery worker never touches it — so a single reference swap on reload
/// is sufficient; no finer-grained locking is needed.
pub struct FilterSet {
    snapshot: RwLock<Arc<Vec<UserFilter>>>,
    last_reload: RwLock<Instant>,
    reload_interval: Duration,
}

impl FilterSet {
    pub fn new(reload_interval: Duration) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Vec::new())),
            // Force a reload on the very first cycle.
            last_reload: RwLock::new(Instant::now() - reload_interval),
            reload_interval,
        }
    }

    pub fn current(&self) -> Arc<Vec<UserFilter>> {
        self.snapshot.read().clone()
    }

    /// Checked at the top of every poll cycle, *before* fetching trades:
    /// checking the signal first guarantees a save committed at time T
    /// takes effect on trades processed after T, within one poll interval.
    pub async fn reload_if_needed<S: StoreGateway>(&self, store: &S) {
        let signal_set = store.read_reload_signal().await.unwrap_or_else(|e| {
            warn!(error = %e, "failed to read reload signal, assuming unset");
            false
        });

        let stale = self.last_reload.read().elapsed() >= self.reload_interval;

        if !signal_set && !stale {
            return;
        }

        match store.list_active_user_filters().await {
            Ok(filters) => {
                let previous_len = self.snapshot.read().len();
                info!(
                    previous = previous_len,
                    current = filters.len(),
                    signal_driven = signal_set,
                    interval_driven = stale,
                    "reloading filter snapshot"
                );
                *self.snapshot.write() = Arc::new(filters);
                *self.last_reload.write() = Instant::now();

                if signal_set {
                    if let Err(e) = store.clear_reload_signal().await {
                        warn!(error = %e, "failed to clear reload signal after reload");
                    }
                }
            }
            Err(e) => {
                debug!(error = %e, "filter reload skipped this cycle due to store error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Side;
    use crate::store::MemoryStore;
    use std::collections::HashSet;

    fn a_filter(chat_id: &str) -> UserFilter {
        UserFilter {
            user_id: "u1".into(),
            chat_id: chat_id.into(),
            enabled: true,
            min_notional_usd: 0.0,
            min_price: 0.0,
            max_price: 1.0,
            sides: HashSet::from([Side::Buy, Side::Sell]),
            selected_categories: vec![],
            markets_filter: vec![],
        }
    }

    #[tokio::test]
    async fn first_cycle_always_reloads_even_without_a_signal() {
        let store = MemoryStore::new();
        store.set_filters(vec![a_filter("c1")]);
        let filters = FilterSet::new(Duration::from_secs(3600));

        assert!(filters.current().is_empty());
        filters.reload_if_needed(&store).await;
        assert_eq!(filters.current().len(), 1);
    }

    #[tokio::test]
    async fn reload_signal_triggers_reload_and_is_cleared() {
        let store = MemoryStore::new();
        let filters = FilterSet::new(Duration::from_secs(3600));
        filters.reload_if_needed(&store).await;

        store.set_filters(vec![a_filter("c1")]);
        store.request_reload();
        filters.reload_if_needed(&store).await;

        assert_eq!(filters.current().len(), 1);
        assert!(!store.read_reload_signal().await.unwrap());
    }

    #[tokio::test]
    async fn without_signal_or_staleness_the_snapshot_does_not_change() {
        let store = MemoryStore::new();
        let filters = FilterSet::new(Duration::from_secs(3600));
        filters.reload_if_needed(&store).await;

        store.set_filters(vec![a_filter("c1")]);
        filters.reload_if_needed(&store).await;

        assert!(filters.current().is_empty());
    }

    #[tokio::test]
    async fn staleness_triggers_reload_without_a_signal() {
        let store = MemoryStore::new();
        let filters = FilterSet::new(Duration::from_millis(0));
        filters.reload_if_needed(&store).await;

        store.set_filters(vec![a_filter("c1")]);
        tokio::time::sleep(Duration::from_millis(5)).await;
        filters.reload_if_needed(&store).await;

        assert_eq!(filters.current().len(), 1);
    }
}
