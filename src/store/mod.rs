//! Store Gateway: typed operations over the document
//! store. This module owns every write; all other components only read or
//! request mutations through the [`StoreGateway`] trait.

mod mongo;
#[cfg(any(test, feature = "testkit"))]
mod memory;

pub use mongo::MongoStore;
#[cfg(any(test, feature = "testkit"))]
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::Duration;

use crate::domain::{Cursor, MarketMetadata, UserFilter};
use crate::error::Result;
use crate::taxonomy::TaxonomySnapshot;

/// Typed operations a document store with TTL-index support must provide.
/// Implementations surface transient errors as `Error::Store` and never
/// retry internally — callers treat a failure as "skip this cycle".
#[async_trait]
pub trait StoreGateway: Send + Sync {
    /// Filters whose config is `enabled=true` and whose chat account has
    /// `isActive=true`. Stable ordering is not required.
    async fn list_active_user_filters(&self) -> Result<Vec<UserFilter>>;

    async fn load_cursor(&self) -> Result<Option<Cursor>>;

    /// Upsert the singleton cursor; read-your-write within this process.
    async fn save_cursor(&self, cursor: &Cursor) -> Result<()>;

    async fn is_seen(&self, tx_hash: &str) -> Result<bool>;

    /// Marks `tx_hash` seen with the given TTL. Idempotent aside from TTL
    /// refresh — calling twice for the same hash is a no-op otherwise.
    async fn mark_seen(&self, tx_hash: &str, ttl: Duration) -> Result<()>;

    async fn get_market(&self, condition_id: &str, ttl: Duration) -> Result<Option<MarketMetadata>>;

    async fn put_market(&self, market: &MarketMetadata) -> Result<()>;

    async fn get_tag_category(&self, tag_id: &str) -> Result<Option<Vec<String>>>;

    async fn put_tag_category(&self, tag_id: &str, categories: &[String]) -> Result<()>;

    /// `true` iff the reload latch is present, i.e. the filter snapshot is
    /// stale.
    async fn read_reload_signal(&self) -> Result<bool>;

    async fn clear_reload_signal(&self) -> Result<()>;

    async fn load_taxonomy(&self, ttl: Duration) -> Result<Option<TaxonomySnapshot>>;

    async fn store_taxonomy(&self, snapshot: &TaxonomySnapshot) -> Result<()>;

    /// Idempotent: sets `isActive=false` for the chat account with this id.
    async fn deactivate_chat(&self, chat_id: &str) -> Result<()>;

    /// Ensure the indexes this store depends on exist, creating or
    /// recreating them as needed. Called once at startup. `market_ttl` and
    /// `taxonomy_ttl` size the TTL indexes on the market-metadata and
    /// taxonomy-derived cache collections, so a live cache document expires
    /// from storage no sooner than the freshness window `get_market`/
    /// `load_taxonomy` already enforce at read time. A no-op for in-memory
    /// test doubles.
    async fn ensure_indexes(
        &self,
        market_ttl: std::time::Duration,
        taxonomy_ttl: std::time::Duration,
    ) -> Result<()> {
        let _ = (market_ttl, taxonomy_ttl);
        Ok(())
    }
}
