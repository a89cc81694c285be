//! In-memory [`StoreGateway`] double used by unit and integration tests.
//! Mirrors the mongo-backed semantics closely enough to drive the
//! scenarios without a live database.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;

use super::StoreGateway;
use crate::domain::{Cursor, MarketMetadata, UserFilter};
use crate::error::Result;
use crate::taxonomy::TaxonomySnapshot;

#[derive(Default)]
struct State {
    filters: Vec<UserFilter>,
    cursor: Option<Cursor>,
    seen: HashMap<String, chrono::DateTime<Utc>>,
    markets: HashMap<String, MarketMetadata>,
    tag_categories: HashMap<String, Vec<String>>,
    reload_signal: bool,
    taxonomy: Option<(TaxonomySnapshot, chrono::DateTime<Utc>)>,
    deactivated_chats: Vec<String>,
}

/// In-memory store double. `set_filters`/`request_reload`/etc. let tests
/// drive the scenarios directly instead of seeding a real
/// database.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_filters(&self, filters: Vec<UserFilter>) {
        self.state.lock().filters = filters;
    }

    pub fn request_reload(&self) {
        self.state.lock().reload_signal = true;
    }

    pub fn deactivated_chats(&self) -> Vec<String> {
        self.state.lock().deactivated_chats.clone()
    }

    pub fn cursor(&self) -> Option<Cursor> {
        self.state.lock().cursor.clone()
    }
}

#[async_trait]
impl StoreGateway for MemoryStore {
    async fn list_active_user_filters(&self) -> Result<Vec<UserFilter>> {
        Ok(self
            .state
            .lock()
            .filters
            .iter()
            .filter(|f| f.enabled && f.is_well_formed())
            .cloned()
            .collect())
    }

    async fn load_cursor(&self) -> Result<Option<Cursor>> {
        Ok(self.state.lock().cursor.clone())
    }

    async fn save_cursor(&self, cursor: &Cursor) -> Result<()> {
        self.state.lock().cursor = Some(cursor.clone());
        Ok(())
    }

    async fn is_seen(&self, tx_hash: &str) -> Result<bool> {
        let state = self.state.lock();
        Ok(state
            .seen
            .get(tx_hash)
            .is_some_and(|expires_at| *expires_at > Utc::now()))
    }

    async fn mark_seen(&self, tx_hash: &str, ttl: Duration) -> Result<()> {
        self.state
            .lock()
            .seen
            .insert(tx_hash.to_string(), Utc::now() + ttl);
        Ok(())
    }

    async fn get_market(&self, condition_id: &str, ttl: Duration) -> Result<Option<MarketMetadata>> {
        let state = self.state.lock();
        Ok(state
            .markets
            .get(condition_id)
            .filter(|m| m.is_fresh(Utc::now(), ttl))
            .cloned())
    }

    async fn put_market(&self, market: &MarketMetadata) -> Result<()> {
        self.state
            .lock()
            .markets
            .insert(market.condition_id.clone(), market.clone());
        Ok(())
    }

    async fn get_tag_category(&self, tag_id: &str) -> Result<Option<Vec<String>>> {
        Ok(self.state.lock().tag_categories.get(tag_id).cloned())
    }

    async fn put_tag_category(&self, tag_id: &str, categories: &[String]) -> Result<()> {
        self.state
            .lock()
            .tag_categories
            .insert(tag_id.to_string(), categories.to_vec());
        Ok(())
    }

    async fn read_reload_signal(&self) -> Result<bool> {
        Ok(self.state.lock().reload_signal)
    }

    async fn clear_reload_signal(&self) -> Result<()> {
        self.state.lock().reload_signal = false;
        Ok(())
    }

    async fn load_taxonomy(&self, ttl: Duration) -> Result<Option<TaxonomySnapshot>> {
        let state = self.state.lock();
        Ok(state
            .taxonomy
            .as_ref()
            .filter(|(_, updated_at)| Utc::now() - *updated_at < ttl)
            .map(|(snapshot, _)| snapshot.clone()))
    }

    async fn store_taxonomy(&self, snapshot: &TaxonomySnapshot) -> Result<()> {
        self.state.lock().taxonomy = Some((snapshot.clone(), Utc::now()));
        Ok(())
    }

    async fn deactivate_chat(&self, chat_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        for f in state.filters.iter_mut() {
            if f.chat_id == chat_id {
                f.enabled = false;
            }
        }
        state.deactivated_chats.push(chat_id.to_string());
        Ok(())
    }
}
