//! MongoDB-backed implementation of [`StoreGateway`].
//!
//! Collection names:
//! `userFilterConfigs`, `chatAccounts`, `filterReloadSignal`,
//! `lastProcessedTradeMarker`, `processedTrades`, `marketMetadata`,
//! `tagCategoryMap`, `sportsTagIds`, `tagsDictionary`.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use mongodb::bson::{doc, Document};
use mongodb::options::{IndexOptions, UpdateOptions};
use mongodb::{Client, Collection, Database, IndexModel};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::StoreGateway;
use crate::domain::{Cursor, MarketMetadata, Side, UserFilter};
use crate::error::Result;
use crate::taxonomy::{TagInfo, TaxonomySnapshot};

const GLOBAL_ID: &str = "global";

#[derive(Debug, Serialize, Deserialize)]
struct FilterConfigDoc {
    user_id: String,
    enabled: bool,
    min_notional_usd: f64,
    min_price: f64,
    max_price: f64,
    sides: Vec<String>,
    selected_categories: Vec<String>,
    markets_filter: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatAccountDoc {
    user_id: String,
    chat_id: String,
    is_active: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct SeenHashDoc {
    tx_hash: String,
    expires_at: mongodb::bson::DateTime,
}

#[derive(Debug, Serialize, Deserialize)]
struct TagCategoryDoc {
    tag_id: String,
    categories: Vec<String>,
    #[serde(default = "mongodb::bson::DateTime::now")]
    updated_at: mongodb::bson::DateTime,
}

/// MongoDB-backed Store Gateway. Owns index creation and is the only
/// component that writes to the store.
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri).await?;
        Ok(Self {
            db: client.database(database),
        })
    }

    fn filter_configs(&self) -> Collection<FilterConfigDoc> {
        self.db.collection("userFilterConfigs")
    }

    fn chat_accounts(&self) -> Collection<ChatAccountDoc> {
        self.db.collection("chatAccounts")
    }

    fn reload_signal(&self) -> Collection<Document> {
        self.db.collection("filterReloadSignal")
    }

    fn cursor_collection(&self) -> Collection<Document> {
        self.db.collection("lastProcessedTradeMarker")
    }

    fn seen_hashes(&self) -> Collection<SeenHashDoc> {
        self.db.collection("processedTrades")
    }

    fn market_metadata(&self) -> Collection<Document> {
        self.db.collection("marketMetadata")
    }

    fn tag_category_map(&self) -> Collection<TagCategoryDoc> {
        self.db.collection("tagCategoryMap")
    }

    fn sports_tag_ids(&self) -> Collection<Document> {
        self.db.collection("sportsTagIds")
    }

    fn tags_dictionary(&self) -> Collection<Document> {
        self.db.collection("tagsDictionary")
    }

    /// Idempotently ensure an index exists with the given spec, dropping
    /// and recreating it if a same-named index already exists with an
    /// incompatible spec.
    async fn ensure_index(
        &self,
        collection: &str,
        model: IndexModel,
        index_name: &str,
    ) -> Result<()> {
        let coll: Collection<Document> = self.db.collection(collection);
        match coll.create_index(model.clone()).await {
            Ok(_) => Ok(()),
            Err(e) => {
                debug!(collection, index = index_name, error = %e, "index create failed, attempting drop+recreate");
                // A conflicting index with the same name/keys but different
                // options is the only case create_index can't repair itself.
                let _ = coll.drop_index(index_name).await;
                coll.create_index(model).await?;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl StoreGateway for MongoStore {
    async fn list_active_user_filters(&self) -> Result<Vec<UserFilter>> {
        use futures_util::TryStreamExt;

        let mut active_chats: HashMap<String, String> = HashMap::new();
        let mut cursor = self
            .chat_accounts()
            .find(doc! { "is_active": true })
            .await?;
        while let Some(account) = cursor.try_next().await? {
            active_chats.insert(account.user_id, account.chat_id);
        }

        let mut out = Vec::new();
        let mut configs = self.filter_configs().find(doc! { "enabled": true }).await?;
        while let Some(cfg) = configs.try_next().await? {
            let Some(chat_id) = active_chats.get(&cfg.user_id) else {
                continue;
            };
            let sides = cfg
                .sides
                .iter()
                .filter_map(|s| match s.as_str() {
                    "BUY" => Some(Side::Buy),
                    "SELL" => Some(Side::Sell),
                    _ => None,
                })
                .collect::<std::collections::HashSet<_>>();

            let filter = UserFilter {
                user_id: cfg.user_id,
                chat_id: chat_id.clone(),
                enabled: cfg.enabled,
                min_notional_usd: cfg.min_notional_usd,
                min_price: cfg.min_price,
                max_price: cfg.max_price,
                sides,
                selected_categories: cfg.selected_categories,
                markets_filter: cfg.markets_filter,
            };
            if filter.is_well_formed() {
                out.push(filter);
            } else {
                warn!(user_id = %filter.user_id, "dropping malformed filter (empty sides or minPrice > maxPrice)");
            }
        }
        Ok(out)
    }

    async fn load_cursor(&self) -> Result<Option<Cursor>> {
        let doc = self
            .cursor_collection()
            .find_one(doc! { "_id": GLOBAL_ID })
            .await?;
        Ok(doc.and_then(|d| mongodb::bson::from_document(d).ok()))
    }

    async fn save_cursor(&self, cursor: &Cursor) -> Result<()> {
        let mut doc = mongodb::bson::to_document(cursor)?;
        doc.insert("_id", GLOBAL_ID);
        self.cursor_collection()
            .update_one(
                doc! { "_id": GLOBAL_ID },
                doc! { "$set": doc },
            )
            .with_options(UpdateOptions::builder().upsert(true).build())
            .await?;
        Ok(())
    }

    async fn is_seen(&self, tx_hash: &str) -> Result<bool> {
        let found = self
            .seen_hashes()
            .find_one(doc! { "tx_hash": tx_hash })
            .await?;
        Ok(found.is_some())
    }

    async fn mark_seen(&self, tx_hash: &str, ttl: Duration) -> Result<()> {
        let expires_at = mongodb::bson::DateTime::from_chrono(Utc::now() + ttl);
        self.seen_hashes()
            .update_one(
                doc! { "tx_hash": tx_hash },
                doc! { "$set": { "tx_hash": tx_hash, "expires_at": expires_at } },
            )
            .with_options(UpdateOptions::builder().upsert(true).build())
            .await?;
        Ok(())
    }

    async fn get_market(&self, condition_id: &str, ttl: Duration) -> Result<Option<MarketMetadata>> {
        let doc = self
            .market_metadata()
            .find_one(doc! { "condition_id": condition_id })
            .await?;
        let Some(doc) = doc else { return Ok(None) };
        let market: MarketMetadata = mongodb::bson::from_document(doc)?;
        if market.is_fresh(Utc::now(), ttl) {
            Ok(Some(market))
        } else {
            Ok(None)
        }
    }

    async fn put_market(&self, market: &MarketMetadata) -> Result<()> {
        let doc = mongodb::bson::to_document(market)?;
        self.market_metadata()
            .update_one(
                doc! { "condition_id": &market.condition_id },
                doc! { "$set": doc },
            )
            .with_options(UpdateOptions::builder().upsert(true).build())
            .await?;
        Ok(())
    }

    async fn get_tag_category(&self, tag_id: &str) -> Result<Option<Vec<String>>> {
        let found = self
            .tag_category_map()
            .find_one(doc! { "tag_id": tag_id })
            .await?;
        Ok(found.map(|d| d.categories))
    }

    async fn put_tag_category(&self, tag_id: &str, categories: &[String]) -> Result<()> {
        let now = mongodb::bson::DateTime::now();
        self.tag_category_map()
            .update_one(
                doc! { "tag_id": tag_id },
                doc! { "$set": { "tag_id": tag_id, "categories": categories, "updated_at": now } },
            )
            .with_options(UpdateOptions::builder().upsert(true).build())
            .await?;
        Ok(())
    }

    async fn read_reload_signal(&self) -> Result<bool> {
        let found = self
            .reload_signal()
            .find_one(doc! { "_id": GLOBAL_ID })
            .await?;
        Ok(found.is_some())
    }

    async fn clear_reload_signal(&self) -> Result<()> {
        self.reload_signal()
            .delete_one(doc! { "_id": GLOBAL_ID })
            .await?;
        Ok(())
    }

    async fn load_taxonomy(&self, ttl: Duration) -> Result<Option<TaxonomySnapshot>> {
        let sports_doc = self
            .sports_tag_ids()
            .find_one(doc! { "_id": GLOBAL_ID })
            .await?;
        let tags_doc = self
            .tags_dictionary()
            .find_one(doc! { "_id": GLOBAL_ID })
            .await?;

        let (Some(sports_doc), Some(tags_doc)) = (sports_doc, tags_doc) else {
            return Ok(None);
        };

        let updated_at = sports_doc
            .get_datetime("updated_at")
            .map(|d| d.to_chrono())
            .unwrap_or(Utc::now() - ttl - Duration::seconds(1));
        if Utc::now() - updated_at >= ttl {
            return Ok(None);
        }

        let sports_tag_ids: HashSet<String> = sports_doc
            .get_array("tag_ids")
            .map(|a| {
                a.iter()
                    .filter_map(|b| b.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        let mut tags_dictionary = HashMap::new();
        if let Ok(dict) = tags_doc.get_document("dictionary") {
            for (tag_id, value) in dict {
                if let Some(info_doc) = value.as_document() {
                    let label = info_doc.get_str("label").unwrap_or_default().to_string();
                    let slug = info_doc.get_str("slug").ok().map(String::from);
                    tags_dictionary.insert(tag_id.clone(), TagInfo { label, slug });
                }
            }
        }

        Ok(Some(TaxonomySnapshot {
            sports_tag_ids,
            tags_dictionary,
        }))
    }

    async fn store_taxonomy(&self, snapshot: &TaxonomySnapshot) -> Result<()> {
        let now = mongodb::bson::DateTime::from_chrono(Utc::now());
        let tag_ids: Vec<&str> = snapshot.sports_tag_ids.iter().map(|s| s.as_str()).collect();
        self.sports_tag_ids()
            .update_one(
                doc! { "_id": GLOBAL_ID },
                doc! { "$set": { "tag_ids": tag_ids, "updated_at": now } },
            )
            .with_options(UpdateOptions::builder().upsert(true).build())
            .await?;

        let mut dictionary = Document::new();
        for (tag_id, info) in &snapshot.tags_dictionary {
            let mut entry = doc! { "label": &info.label };
            if let Some(slug) = &info.slug {
                entry.insert("slug", slug);
            }
            dictionary.insert(tag_id, entry);
        }
        self.tags_dictionary()
            .update_one(
                doc! { "_id": GLOBAL_ID },
                doc! { "$set": { "dictionary": dictionary, "updated_at": now } },
            )
            .with_options(UpdateOptions::builder().upsert(true).build())
            .await?;
        Ok(())
    }

    async fn deactivate_chat(&self, chat_id: &str) -> Result<()> {
        self.chat_accounts()
            .update_one(
                doc! { "chat_id": chat_id },
                doc! { "$set": { "is_active": false } },
            )
            .await?;
        Ok(())
    }

    async fn ensure_indexes(
        &self,
        market_ttl: std::time::Duration,
        taxonomy_ttl: std::time::Duration,
    ) -> Result<()> {
        self.ensure_index(
            "processedTrades",
            IndexModel::builder()
                .keys(doc! { "tx_hash": 1 })
                .options(IndexOptions::builder().unique(true).name("tx_hash_unique".to_string()).build())
                .build(),
            "tx_hash_unique",
        )
        .await?;

        self.ensure_index(
            "processedTrades",
            IndexModel::builder()
                .keys(doc! { "expires_at": 1 })
                .options(
                    IndexOptions::builder()
                        .expire_after(std::time::Duration::from_secs(0))
                        .name("expires_at_ttl".to_string())
                        .build(),
                )
                .build(),
            "expires_at_ttl",
        )
        .await?;

        self.ensure_index(
            "marketMetadata",
            IndexModel::builder()
                .keys(doc! { "condition_id": 1 })
                .options(IndexOptions::builder().unique(true).name("condition_id_unique".to_string()).build())
                .build(),
            "condition_id_unique",
        )
        .await?;

        // TTL indexes on every cache collection's `updated_at`, so a stale
        // cache document expires from storage even if nothing ever reads
        // (and thus notices the staleness of) that particular document
        // again. The freshness window matches what `get_market`/
        // `load_taxonomy` already enforce at read time.
        self.ensure_index(
            "marketMetadata",
            IndexModel::builder()
                .keys(doc! { "updated_at": 1 })
                .options(
                    IndexOptions::builder()
                        .expire_after(market_ttl)
                        .name("updated_at_ttl".to_string())
                        .build(),
                )
                .build(),
            "updated_at_ttl",
        )
        .await?;

        for collection in ["tagCategoryMap", "sportsTagIds", "tagsDictionary"] {
            self.ensure_index(
                collection,
                IndexModel::builder()
                    .keys(doc! { "updated_at": 1 })
                    .options(
                        IndexOptions::builder()
                            .expire_after(taxonomy_ttl)
                            .name("updated_at_ttl".to_string())
                            .build(),
                    )
                    .build(),
                "updated_at_ttl",
            )
            .await?;
        }

        Ok(())
    }
}
