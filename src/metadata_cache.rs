//! Metadata Cache: read-through cache over the store,
//! keyed by `conditionId`, TTL-refreshed, with batch-fill of misses.

use std::collections::HashMap;

use chrono::Duration;
use tracing::warn;

use crate::domain::MarketMetadata;
use crate::store::StoreGateway;
use crate::taxonomy::TaxonomySnapshot;
use crate::upstream::UpstreamClient;

/// `categoriesOf` keyword table. Matched case-insensitively
/// against a tag's label or slug.
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("Politics", &["politic", "election", "senate", "congress", "president"]),
    ("Sports", &["sport", "nfl", "nba", "mlb", "soccer", "football", "basketball"]),
    ("Crypto", &["crypto", "bitcoin", "btc", "eth", "ethereum", "token"]),
    ("Finance", &["finance", "stock", "market", "fed", "rate"]),
    ("Geopolitics", &["geopolitic", "war", "ukraine", "israel", "china"]),
    ("Earnings", &["earnings", "revenue", "quarterly"]),
    ("Tech", &["tech", "ai", "software", "startup"]),
    ("Culture", &["culture", "movie", "music", "celebrity"]),
    ("World", &["world", "global", "international"]),
    ("Economy", &["economy", "economic", "inflation", "gdp"]),
    ("Trump", &["trump"]),
    ("Elections", &["election", "vote", "ballot"]),
    ("Mentions", &["mention", "tweet", "says"]),
];

fn infer_categories(label: &str, slug: Option<&str>) -> Vec<String> {
    let haystack = format!("{} {}", label, slug.unwrap_or("")).to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|kw| haystack.contains(kw)))
        .map(|(category, _)| category.to_string())
        .collect()
}

/// Read-through market metadata cache. `get` only ever reads; callers that
/// get misses are expected to batch them and call [`MetadataCache::fill_missing`].
pub struct MetadataCache<S, U> {
    store: S,
    upstream: U,
    ttl: Duration,
}

impl<S, U> MetadataCache<S, U>
where
    S: StoreGateway,
    U: UpstreamClient,
{
    pub fn new(store: S, upstream: U, ttl: Duration) -> Self {
        Self {
            store,
            upstream,
            ttl,
        }
    }

    pub async fn get(&self, condition_id: &str) -> Option<MarketMetadata> {
        match self.store.get_market(condition_id, self.ttl).await {
            Ok(market) => market,
            Err(e) => {
                warn!(condition_id, error = %e, "metadata cache read failed");
                None
            }
        }
    }

    /// Fetches every given id through the Upstream Client's batch path and
    /// persists the categorized result via the Store Gateway. Concurrent
    /// calls for overlapping id sets are permitted — at-least-once write of
    /// the same freshness is acceptable.
    pub async fn fill_missing(&self, ids: &[String], taxonomy: &TaxonomySnapshot) {
        if ids.is_empty() {
            return;
        }
        let fetched = match self.upstream.fetch_markets_batch(ids).await {
            Ok(map) => map,
            Err(e) => {
                warn!(error = %e, "market enrichment fetch failed for this cycle");
                return;
            }
        };

        for (condition_id, mut market) in fetched {
            market.is_sports = market
                .tag_ids
                .iter()
                .any(|id| taxonomy.sports_tag_ids.contains(id));
            market.categories = self.categorize(&market, taxonomy).await;
            market.updated_at = chrono::Utc::now();

            if let Err(e) = self.store.put_market(&market).await {
                warn!(condition_id, error = %e, "failed to persist enriched market");
            }
        }
    }

    async fn categorize(&self, market: &MarketMetadata, taxonomy: &TaxonomySnapshot) -> Vec<String> {
        let mut categories = std::collections::BTreeSet::new();
        for tag_id in &market.tag_ids {
            if let Ok(Some(cached)) = self.store.get_tag_category(tag_id).await {
                categories.extend(cached);
                continue;
            }

            let info = taxonomy.tags_dictionary.get(tag_id);
            let label = info.map(|i| i.label.as_str()).unwrap_or_default();
            let slug = info.and_then(|i| i.slug.as_deref());
            let inferred = infer_categories(label, slug);

            if let Err(e) = self.store.put_tag_category(tag_id, &inferred).await {
                warn!(tag_id, error = %e, "failed to persist inferred tag category");
            }
            categories.extend(inferred);
        }
        categories.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_sports_category_from_label() {
        let categories = infer_categories("NFL Playoffs", Some("nfl-playoffs"));
        assert!(categories.contains(&"Sports".to_string()));
    }

    #[test]
    fn infers_no_category_for_unrelated_label() {
        let categories = infer_categories("Will it rain tomorrow", None);
        assert!(categories.is_empty());
    }
}
