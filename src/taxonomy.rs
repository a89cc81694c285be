//! Taxonomy Loader: read-through cache of the sports tag-id
//! set and the tag-id→label dictionary used for categorization.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::store::StoreGateway;
use crate::upstream::UpstreamClient;

/// A tag's display label and URL slug, as returned by the taxonomy service.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TagInfo {
    pub label: String,
    pub slug: Option<String>,
}

/// The two taxonomy singletons: the set of tag ids that mark a market as
/// sports, and the tag-id→label/slug dictionary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaxonomySnapshot {
    pub sports_tag_ids: HashSet<String>,
    pub tags_dictionary: HashMap<String, TagInfo>,
}

/// Read-through taxonomy loader. On cache miss or TTL expiry it calls the
/// Upstream Client and persists the result; if both cache and fetch fail it
/// returns empty sets and logs — downstream categorization degrades
/// gracefully rather than blocking the pipeline.
pub struct TaxonomyLoader<S, U> {
    store: S,
    upstream: U,
    ttl: chrono::Duration,
}

impl<S, U> TaxonomyLoader<S, U>
where
    S: StoreGateway,
    U: UpstreamClient,
{
    pub fn new(store: S, upstream: U, ttl: chrono::Duration) -> Self {
        Self {
            store,
            upstream,
            ttl,
        }
    }

    pub async fn load(&self) -> TaxonomySnapshot {
        match self.store.load_taxonomy(self.ttl).await {
            Ok(Some(snapshot)) => return snapshot,
            Ok(None) => {}
            Err(e) => warn!(error = %e, "taxonomy cache read failed"),
        }

        match self.upstream.load_taxonomy().await {
            Ok(snapshot) => {
                if let Err(e) = self.store.store_taxonomy(&snapshot).await {
                    warn!(error = %e, "failed to persist fetched taxonomy");
                }
                snapshot
            }
            Err(e) => {
                warn!(error = %e, "taxonomy fetch failed; categorization will degrade");
                TaxonomySnapshot::default()
            }
        }
    }
}
