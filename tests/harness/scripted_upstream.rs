use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use whalewatch::domain::{MarketMetadata, Trade};
use whalewatch::error::Result;
use whalewatch::taxonomy::TaxonomySnapshot;
use whalewatch::upstream::{SendOutcome, UpstreamClient};

/// Scripted [`UpstreamClient`] double: trade batches and markets are fixed
/// at construction, chat-send outcomes are consumed one at a time from a
/// queue (repeating the last entry once exhausted), and every send is
/// recorded for assertions.
#[derive(Default)]
pub struct ScriptedUpstreamClient {
    trade_batches: Mutex<VecDeque<Vec<Trade>>>,
    markets: HashMap<String, MarketMetadata>,
    taxonomy: TaxonomySnapshot,
    send_outcomes: Mutex<Vec<SendOutcome>>,
    sent: Mutex<Vec<(String, String)>>,
}

impl ScriptedUpstreamClient {
    /// A single fixed batch of trades returned on every poll cycle.
    pub fn new(trades: Vec<Trade>, markets: Vec<MarketMetadata>) -> Self {
        Self {
            trade_batches: Mutex::new(VecDeque::from([trades])),
            markets: markets
                .into_iter()
                .map(|m| (m.condition_id.clone(), m))
                .collect(),
            taxonomy: TaxonomySnapshot::default(),
            send_outcomes: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the fixed trade batch with one batch per
    /// `fetch_recent_trades` call, consumed in order and repeating the last
    /// batch once exhausted — lets a test vary what the upstream returns
    /// across successive poll cycles (e.g. to exercise hot-reload against a
    /// threshold change that only some of the batches satisfy).
    pub fn with_trade_batches(self, batches: Vec<Vec<Trade>>) -> Self {
        *self.trade_batches.lock().unwrap() = batches.into();
        self
    }

    pub fn with_send_outcomes(mut self, outcomes: Vec<SendOutcome>) -> Self {
        self.send_outcomes = Mutex::new(outcomes);
        self
    }

    pub fn sent_messages(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpstreamClient for ScriptedUpstreamClient {
    async fn fetch_recent_trades(&self, _limit: u32, _min_notional_usd: f64) -> Result<Vec<Trade>> {
        let mut batches = self.trade_batches.lock().unwrap();
        if batches.len() > 1 {
            Ok(batches.pop_front().unwrap_or_default())
        } else {
            Ok(batches.front().cloned().unwrap_or_default())
        }
    }

    async fn fetch_markets_batch(
        &self,
        condition_ids: &[String],
    ) -> Result<HashMap<String, MarketMetadata>> {
        Ok(condition_ids
            .iter()
            .filter_map(|id| self.markets.get(id).cloned().map(|m| (id.clone(), m)))
            .collect())
    }

    async fn load_taxonomy(&self) -> Result<TaxonomySnapshot> {
        Ok(self.taxonomy.clone())
    }

    async fn send_chat_message(&self, chat_id: &str, text: &str) -> Result<SendOutcome> {
        self.sent
            .lock()
            .unwrap()
            .push((chat_id.to_string(), text.to_string()));

        let mut outcomes = self.send_outcomes.lock().unwrap();
        if outcomes.is_empty() {
            return Ok(SendOutcome::Delivered);
        }
        if outcomes.len() == 1 {
            Ok(outcomes[0].clone())
        } else {
            Ok(outcomes.remove(0))
        }
    }
}
