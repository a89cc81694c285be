//! Orchestrator: the main poll loop tying every other
//! component together.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::dedup;
use crate::delivery::{self, DeliveryHandle, DeliveryWorker};
use crate::filters::FilterSet;
use crate::matcher;
use crate::metadata_cache::MetadataCache;
use crate::store::StoreGateway;
use crate::taxonomy::TaxonomyLoader;
use crate::upstream::UpstreamClient;

/// Owns the two long-lived tasks (orchestrator loop, delivery worker) and
/// the shared, read-mostly state between them (the filter snapshot and the
/// metadata cache both sit behind the store; neither task holds a lock the
/// other contends on).
pub struct Orchestrator<S, U> {
    store: Arc<S>,
    upstream: Arc<U>,
    filters: FilterSet,
    config: Config,
}

impl<S, U> Orchestrator<S, U>
where
    S: StoreGateway + 'static,
    U: UpstreamClient + 'static,
{
    pub fn new(store: Arc<S>, upstream: Arc<U>, config: Config) -> Self {
        let filters = FilterSet::new(StdDuration::from_secs(config.filter_reload_interval_seconds));
        Self {
            store,
            upstream,
            filters,
            config,
        }
    }

    fn caches(
        &self,
    ) -> (
        MetadataCache<SharedStore<S>, SharedUpstream<U>>,
        TaxonomyLoader<SharedStore<S>, SharedUpstream<U>>,
    ) {
        let metadata_cache = MetadataCache::new(
            SharedStore(self.store.clone()),
            SharedUpstream(self.upstream.clone()),
            Duration::hours(self.config.market_ttl_hours as i64),
        );
        let taxonomy_loader = TaxonomyLoader::new(
            SharedStore(self.store.clone()),
            SharedUpstream(self.upstream.clone()),
            Duration::hours(self.config.taxonomy_ttl_hours as i64),
        );
        (metadata_cache, taxonomy_loader)
    }

    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        self.store
            .ensure_indexes(
                StdDuration::from_secs(self.config.market_ttl_hours * 3600),
                StdDuration::from_secs(self.config.taxonomy_ttl_hours * 3600),
            )
            .await
            .unwrap_or_else(|e| warn!(error = %e, "index setup failed, continuing without it"));

        let (delivery, worker): (DeliveryHandle, DeliveryWorker) =
            delivery::spawn(self.upstream.clone(), self.store.clone(), 4096);

        let (metadata_cache, taxonomy_loader) = self.caches();

        let poll_interval = StdDuration::from_secs(self.config.poll_interval_seconds);

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.run_cycle(&metadata_cache, &taxonomy_loader, &delivery)
                .await;

            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        }

        drop(delivery);
        worker.shutdown().await;
    }

    /// Runs a fixed number of poll cycles against the given delivery handle
    /// without sleeping between them or listening for shutdown. Exposed for
    /// integration tests, which need deterministic, immediately-observable
    /// cycles rather than the infinite poll loop in [`Orchestrator::run`].
    #[cfg(any(test, feature = "testkit"))]
    pub async fn run_cycles_for_test(&self, delivery: &DeliveryHandle, cycles: usize) {
        let (metadata_cache, taxonomy_loader) = self.caches();
        for _ in 0..cycles {
            self.run_cycle(&metadata_cache, &taxonomy_loader, delivery).await;
        }
    }

    async fn run_cycle(
        &self,
        metadata_cache: &MetadataCache<SharedStore<S>, SharedUpstream<U>>,
        taxonomy_loader: &TaxonomyLoader<SharedStore<S>, SharedUpstream<U>>,
        delivery: &DeliveryHandle,
    ) {
        // 1. Filter reload check (signal first, then interval).
        self.filters.reload_if_needed(self.store.as_ref()).await;
        let filters = self.filters.current();
        if filters.is_empty() {
            debug!("no active filters this cycle, still polling for cursor progress");
        }

        // 2. Fetch recent trades.
        let trades = match self
            .upstream
            .fetch_recent_trades(self.config.max_trades_per_poll, self.config.global_min_notional_usd)
            .await
        {
            Ok(trades) => trades,
            Err(e) => {
                warn!(error = %e, "upstream trade fetch failed, sleeping normally");
                return;
            }
        };
        if trades.is_empty() {
            return;
        }

        // 3. Per-trade dedup; collect new trades and unknown condition ids.
        let mut new_trades = Vec::with_capacity(trades.len());
        let mut unknown_condition_ids = HashSet::new();
        for trade in trades {
            if !dedup::is_new(self.store.as_ref(), &trade.tx_hash).await {
                continue;
            }
            dedup::mark_seen(
                self.store.as_ref(),
                &trade.tx_hash,
                Duration::minutes(self.config.seen_hash_ttl_minutes as i64),
            )
            .await;

            if metadata_cache.get(&trade.condition_id).await.is_none() {
                unknown_condition_ids.insert(trade.condition_id.clone());
            }
            new_trades.push(trade);
        }

        if new_trades.is_empty() {
            return;
        }

        // 4. Batch-enrich unknown markets.
        if !unknown_condition_ids.is_empty() {
            let taxonomy = taxonomy_loader.load().await;
            let ids: Vec<String> = unknown_condition_ids.into_iter().collect();
            metadata_cache.fill_missing(&ids, &taxonomy).await;
        }

        // 5. Evaluate every filter per trade; enqueue matches.
        let mut newest: Option<(i64, String)> = None;
        for trade in &new_trades {
            let market = metadata_cache.get(&trade.condition_id).await;
            if let Some(market) = &market {
                for filter in filters.iter() {
                    if matcher::matches(trade, Some(market), filter) {
                        let text = format_alert(trade, market);
                        delivery.enqueue(filter.chat_id.clone(), text);
                    }
                }
            }

            newest = match newest {
                Some((ts, _)) if ts >= trade.timestamp => newest,
                _ => Some((trade.timestamp, trade.tx_hash.clone())),
            };
        }

        // 6. Advance cursor to the newest processed trade.
        if let Some((timestamp, tx_hash)) = newest {
            dedup::advance_cursor(self.store.as_ref(), timestamp, &tx_hash).await;
        }

        info!(processed = new_trades.len(), "cycle complete");
    }
}

fn format_alert(trade: &crate::domain::Trade, market: &crate::domain::MarketMetadata) -> String {
    format!(
        "\u{1F40B} <b>Whale trade</b>\n\
         Market: {}\n\
         Side: {}\n\
         Size: {:.2}\n\
         Price: {:.3}\n\
         Notional: ${:.2}",
        html_escape(&market.title),
        trade.side,
        trade.size,
        trade.price,
        trade.notional(),
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Thin `Arc`-sharing wrapper so [`MetadataCache`]/[`TaxonomyLoader`], which
/// take their store/upstream by value, can share the same instances the
/// orchestrator and delivery worker hold.
pub struct SharedStore<S>(Arc<S>);

#[async_trait::async_trait]
impl<S: StoreGateway> StoreGateway for SharedStore<S> {
    async fn list_active_user_filters(&self) -> crate::error::Result<Vec<crate::domain::UserFilter>> {
        self.0.list_active_user_filters().await
    }
    async fn load_cursor(&self) -> crate::error::Result<Option<crate::domain::Cursor>> {
        self.0.load_cursor().await
    }
    async fn save_cursor(&self, cursor: &crate::domain::Cursor) -> crate::error::Result<()> {
        self.0.save_cursor(cursor).await
    }
    async fn is_seen(&self, tx_hash: &str) -> crate::error::Result<bool> {
        self.0.is_seen(tx_hash).await
    }
    async fn mark_seen(&self, tx_hash: &str, ttl: Duration) -> crate::error::Result<()> {
        self.0.mark_seen(tx_hash, ttl).await
    }
    async fn get_market(
        &self,
        condition_id: &str,
        ttl: Duration,
    ) -> crate::error::Result<Option<crate::domain::MarketMetadata>> {
        self.0.get_market(condition_id, ttl).await
    }
    async fn put_market(&self, market: &crate::domain::MarketMetadata) -> crate::error::Result<()> {
        self.0.put_market(market).await
    }
    async fn get_tag_category(&self, tag_id: &str) -> crate::error::Result<Option<Vec<String>>> {
        self.0.get_tag_category(tag_id).await
    }
    async fn put_tag_category(&self, tag_id: &str, categories: &[String]) -> crate::error::Result<()> {
        self.0.put_tag_category(tag_id, categories).await
    }
    async fn read_reload_signal(&self) -> crate::error::Result<bool> {
        self.0.read_reload_signal().await
    }
    async fn clear_reload_signal(&self) -> crate::error::Result<()> {
        self.0.clear_reload_signal().await
    }
    async fn load_taxonomy(&self, ttl: Duration) -> crate::error::Result<Option<crate::taxonomy::TaxonomySnapshot>> {
        self.0.load_taxonomy(ttl).await
    }
    async fn store_taxonomy(&self, snapshot: &crate::taxonomy::TaxonomySnapshot) -> crate::error::Result<()> {
        self.0.store_taxonomy(snapshot).await
    }
    async fn deactivate_chat(&self, chat_id: &str) -> crate::error::Result<()> {
        self.0.deactivate_chat(chat_id).await
    }
}

pub struct SharedUpstream<U>(Arc<U>);

#[async_trait::async_trait]
impl<U: UpstreamClient> UpstreamClient for SharedUpstream<U> {
    async fn fetch_recent_trades(&self, limit: u32, min_notional_usd: f64) -> crate::error::Result<Vec<crate::domain::Trade>> {
        self.0.fetch_recent_trades(limit, min_notional_usd).await
    }
    async fn fetch_markets_batch(
        &self,
        condition_ids: &[String],
    ) -> crate::error::Result<std::collections::HashMap<String, crate::domain::MarketMetadata>> {
        self.0.fetch_markets_batch(condition_ids).await
    }
    async fn load_taxonomy(&self) -> crate::error::Result<crate::taxonomy::TaxonomySnapshot> {
        self.0.load_taxonomy().await
    }
    async fn send_chat_message(&self, chat_id: &str, text: &str) -> crate::error::Result<crate::upstream::SendOutcome> {
        self.0.send_chat_message(chat_id, text).await
    }
}
