use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted `{timestamp, txHash}` of the newest processed trade. A
/// singleton document (`id: "global"`); informational across restarts —
/// the orchestrator never uses it to skip trades, only the dedup set does
/// that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub last_timestamp: i64,
    pub last_tx_hash: String,
    pub updated_at: DateTime<Utc>,
}

impl Cursor {
    /// Whether `timestamp` is newer than (or equal to) this cursor, i.e.
    /// advancing to it would not violate cursor monotonicity.
    pub fn advances_to(&self, timestamp: i64) -> bool {
        timestamp >= self.last_timestamp
    }
}
