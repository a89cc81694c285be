//! Deduper & Cursor. The dedup set, not the cursor, is the
//! primary reprocessing guard — the upstream does not reliably honor a
//! minimum-timestamp parameter, so the cursor is informational only.

use chrono::{Duration, Utc};
use tracing::warn;

use crate::domain::Cursor;
use crate::store::StoreGateway;

/// `true` iff `tx_hash` has not been seen before. On a store error, treats
/// the trade as already seen (fail closed) and skips it this cycle — the
/// alternative (fail open) risks processing and enqueueing a trade whose
/// `mark_seen` call then also fails against the same outage, which would
/// let the next cycle reprocess and re-enqueue it once the store recovers.
/// A spuriously skipped trade is a lost alert; a fail-open duplicate is the
/// one failure mode this whole pipeline exists to prevent.
pub async fn is_new<S: StoreGateway>(store: &S, tx_hash: &str) -> bool {
    match store.is_seen(tx_hash).await {
        Ok(seen) => !seen,
        Err(e) => {
            warn!(tx_hash, error = %e, "dedup check failed, treating trade as seen and skipping");
            false
        }
    }
}

/// Marks `tx_hash` seen. Must be called *before* any enrichment or
/// delivery side effect for that trade — a crash between mark and enqueue
/// loses that one alert, but marking-after-delivery could double-send on
/// restart, and losing an alert is strictly preferable to spamming a user.
pub async fn mark_seen<S: StoreGateway>(store: &S, tx_hash: &str, ttl: Duration) {
    if let Err(e) = store.mark_seen(tx_hash, ttl).await {
        warn!(tx_hash, error = %e, "failed to mark trade seen");
    }
}

/// Advance the persisted cursor to `(timestamp, tx_hash)` if doing so
/// would not move it backwards. Cursor monotonicity is maintained here,
/// not by the store.
pub async fn advance_cursor<S: StoreGateway>(store: &S, timestamp: i64, tx_hash: &str) {
    let current = match store.load_cursor().await {
        Ok(cursor) => cursor,
        Err(e) => {
            warn!(error = %e, "failed to load cursor before advancing, skipping save");
            return;
        }
    };

    if let Some(current) = &current {
        if !current.advances_to(timestamp) {
            return;
        }
    }

    let cursor = Cursor {
        last_timestamp: timestamp,
        last_tx_hash: tx_hash.to_string(),
        updated_at: Utc::now(),
    };
    if let Err(e) = store.save_cursor(&cursor).await {
        warn!(error = %e, "failed to save cursor");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn mark_then_check_is_seen() {
        let store = MemoryStore::new();
        assert!(is_new(&store, "t1").await);
        mark_seen(&store, "t1", Duration::minutes(15)).await;
        assert!(!is_new(&store, "t1").await);
    }

    #[tokio::test]
    async fn marking_twice_is_a_no_op_aside_from_ttl_refresh() {
        let store = MemoryStore::new();
        mark_seen(&store, "t1", Duration::minutes(15)).await;
        mark_seen(&store, "t1", Duration::minutes(15)).await;
        assert!(!is_new(&store, "t1").await);
    }

    #[tokio::test]
    async fn cursor_does_not_move_backwards() {
        let store = MemoryStore::new();
        advance_cursor(&store, 2000, "t2").await;
        advance_cursor(&store, 1000, "t1").await;
        let cursor = store.cursor().expect("cursor saved");
        assert_eq!(cursor.last_timestamp, 2000);
        assert_eq!(cursor.last_tx_hash, "t2");
    }
}
