use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cached, categorized metadata for a prediction market, keyed by
/// `conditionId`. TTL'd at 24h by the Metadata Cache;
/// `isSports = (tagIds ∩ sportsTagIds) ≠ ∅` is an invariant maintained by
/// whoever constructs this, not re-derived on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketMetadata {
    pub condition_id: String,
    pub title: String,
    pub slug: Option<String>,
    pub tags: Vec<String>,
    pub tag_ids: Vec<String>,
    pub is_sports: bool,
    pub categories: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl MarketMetadata {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now - self.updated_at < ttl
    }
}
