//! Upstream Client: HTTP access to the trade feed, the
//! market-metadata service, the taxonomy service, and the chat platform.

mod http;

pub use http::HttpUpstreamClient;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::{MarketMetadata, Trade};
use crate::error::Result;
use crate::taxonomy::TaxonomySnapshot;

/// Outcome of a single chat-send attempt, mapped from the chat platform's
/// HTTP response: 2xx → `Delivered`; 429 →
/// `RateLimited`; 403 → `PermanentReject(Blocked)`; 400 →
/// `PermanentReject(InvalidRecipient)`; anything else → `TransientError`.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Delivered,
    RateLimited { retry_after_seconds: u64 },
    PermanentReject(RejectReason),
    TransientError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Blocked,
    InvalidRecipient,
}

#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Always requests the most recent `limit` trades (taker-only,
    /// cash-market) — the upstream's time-window parameter is not
    /// trustworthy across runs, so the caller relies on the Deduper
    /// instead. Newest-first, deduplicated by `txHash` within the batch;
    /// trades lacking a `txHash` are dropped silently.
    async fn fetch_recent_trades(&self, limit: u32, min_notional_usd: f64) -> Result<Vec<Trade>>;

    /// Batched call first, then bounded (≤32) concurrent per-id fallback
    /// for ids the batch didn't return. Missing ids are simply absent from
    /// the result map — callers treat that as "market unknown".
    async fn fetch_markets_batch(
        &self,
        condition_ids: &[String],
    ) -> Result<HashMap<String, MarketMetadata>>;

    async fn load_taxonomy(&self) -> Result<TaxonomySnapshot>;

    async fn send_chat_message(&self, chat_id: &str, text: &str) -> Result<SendOutcome>;
}
