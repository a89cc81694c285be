use std::collections::HashMap;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{RejectReason, SendOutcome, UpstreamClient};
use crate::domain::{MarketMetadata, Side, Trade};
use crate::error::Result;
use crate::taxonomy::{TagInfo, TaxonomySnapshot};

/// Market-metadata fan-out is capped at this many concurrent per-id
/// requests.
const MAX_FANOUT: usize = 32;

#[derive(Debug, Deserialize)]
struct TradeDto {
    #[serde(rename = "transactionHash")]
    transaction_hash: Option<String>,
    #[serde(rename = "proxyWallet")]
    proxy_wallet: String,
    side: String,
    size: f64,
    price: f64,
    #[serde(rename = "conditionId")]
    condition_id: String,
    timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct TagDto {
    id: String,
    label: String,
    slug: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MarketDto {
    #[serde(rename = "conditionId")]
    condition_id: String,
    question: String,
    slug: Option<String>,
    #[serde(default)]
    tags: Vec<TagDto>,
}

#[derive(Debug, Deserialize)]
struct SportsDto {
    #[serde(rename = "tagIds", default)]
    tag_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    #[allow(dead_code)]
    ok: bool,
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    parameters: Option<RateLimitParameters>,
}

#[derive(Debug, Deserialize)]
struct RateLimitParameters {
    retry_after: Option<u64>,
}

/// `reqwest`-backed [`UpstreamClient`], grounded on the same thin
/// base-url-plus-`Client` shape as the rest of this codebase's HTTP
/// wrappers. Every call carries an explicit timeout; none of the
/// connections are kept open beyond HTTP keep-alive.
pub struct HttpUpstreamClient {
    client: Client,
    trade_feed_url: String,
    market_service_url: String,
    taxonomy_sports_url: String,
    taxonomy_tags_url: String,
    chat_api_base_url: String,
}

impl HttpUpstreamClient {
    pub fn new(
        trade_feed_url: String,
        market_service_url: String,
        taxonomy_sports_url: String,
        taxonomy_tags_url: String,
        chat_api_base_url: String,
    ) -> Self {
        let client = Client::builder()
            .timeout(StdDuration::from_secs(30))
            .build()
            .expect("reqwest client builds with default TLS backend");
        Self {
            client,
            trade_feed_url,
            market_service_url,
            taxonomy_sports_url,
            taxonomy_tags_url,
            chat_api_base_url,
        }
    }

    async fn fetch_markets_one(&self, condition_id: &str, only_open: bool) -> Result<Vec<MarketDto>> {
        let mut query = vec![
            ("condition_ids".to_string(), condition_id.to_string()),
            ("include_tag".to_string(), "true".to_string()),
            ("limit".to_string(), "1".to_string()),
        ];
        if only_open {
            query.push(("closed".to_string(), "false".to_string()));
        }
        let resp = self
            .client
            .get(&self.market_service_url)
            .query(&query)
            .send()
            .await?;
        Ok(resp.json::<Vec<MarketDto>>().await.unwrap_or_default())
    }

    fn to_metadata(dto: MarketDto, sports_tag_ids: &std::collections::HashSet<String>) -> MarketMetadata {
        let tag_ids: Vec<String> = dto.tags.iter().map(|t| t.id.clone()).collect();
        let tags: Vec<String> = dto.tags.iter().map(|t| t.label.clone()).collect();
        let is_sports = tag_ids.iter().any(|id| sports_tag_ids.contains(id));
        MarketMetadata {
            condition_id: dto.condition_id,
            title: dto.question,
            slug: dto.slug,
            tags,
            tag_ids,
            is_sports,
            categories: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstreamClient {
    async fn fetch_recent_trades(&self, limit: u32, min_notional_usd: f64) -> Result<Vec<Trade>> {
        let mut query = vec![
            ("takerOnly".to_string(), "true".to_string()),
            ("limit".to_string(), limit.to_string()),
            ("filterType".to_string(), "CASH".to_string()),
        ];
        if min_notional_usd > 0.0 {
            query.push(("filterAmount".to_string(), min_notional_usd.to_string()));
        }

        let resp = self
            .client
            .get(&self.trade_feed_url)
            .query(&query)
            .send()
            .await?;
        let raw: Vec<TradeDto> = resp.json().await?;

        let mut seen_in_batch = std::collections::HashSet::new();
        let mut trades = Vec::with_capacity(raw.len());
        for dto in raw {
            let Some(tx_hash) = dto.transaction_hash else {
                continue;
            };
            if !seen_in_batch.insert(tx_hash.clone()) {
                continue;
            }
            let side = match dto.side.as_str() {
                "BUY" => Side::Buy,
                "SELL" => Side::Sell,
                other => {
                    warn!(side = other, "unrecognized trade side, dropping trade");
                    continue;
                }
            };
            trades.push(Trade {
                tx_hash,
                proxy_wallet: dto.proxy_wallet,
                side,
                size: dto.size,
                price: dto.price,
                condition_id: dto.condition_id,
                timestamp: dto.timestamp,
            });
        }
        Ok(trades)
    }

    async fn fetch_markets_batch(
        &self,
        condition_ids: &[String],
    ) -> Result<HashMap<String, MarketMetadata>> {
        if condition_ids.is_empty() {
            return Ok(HashMap::new());
        }

        // Taxonomy isn't re-fetched here; categorization against
        // sportsTagIds is layered on by the Metadata Cache, which already
        // holds the taxonomy snapshot. This client only shapes the wire
        // response into MarketMetadata with is_sports left false, and lets
        // the cache recompute it once it has the snapshot in hand.
        let empty_sports = std::collections::HashSet::new();

        let mut results = HashMap::new();

        let joined = condition_ids.join(",");
        let resp = self
            .client
            .get(&self.market_service_url)
            .query(&[
                ("condition_ids", joined.as_str()),
                ("include_tag", "true"),
                ("closed", "false"),
                ("limit", &condition_ids.len().to_string()),
            ])
            .send()
            .await;

        if let Ok(resp) = resp {
            if let Ok(markets) = resp.json::<Vec<MarketDto>>().await {
                for dto in markets {
                    let id = dto.condition_id.clone();
                    results.insert(id, Self::to_metadata(dto, &empty_sports));
                }
            }
        }

        let missing: Vec<&String> = condition_ids
            .iter()
            .filter(|id| !results.contains_key(id.as_str()))
            .collect();

        if missing.is_empty() {
            return Ok(results);
        }

        debug!(count = missing.len(), "falling back to per-id market fetch");

        let fetched: Vec<(String, Option<MarketDto>)> = stream::iter(missing)
            .map(|id| async move {
                match self.fetch_markets_one(id, true).await {
                    Ok(found) if !found.is_empty() => (id.clone(), found.into_iter().next()),
                    _ => match self.fetch_markets_one(id, false).await {
                        Ok(found) => (id.clone(), found.into_iter().next()),
                        Err(_) => (id.clone(), None),
                    },
                }
            })
            .buffer_unordered(MAX_FANOUT)
            .collect()
            .await;

        for (id, dto) in fetched {
            if let Some(dto) = dto {
                results.insert(id, Self::to_metadata(dto, &empty_sports));
            }
        }

        Ok(results)
    }

    async fn load_taxonomy(&self) -> Result<TaxonomySnapshot> {
        let sports: Vec<SportsDto> = self
            .client
            .get(&self.taxonomy_sports_url)
            .send()
            .await?
            .json()
            .await?;
        let tags: Vec<TagDto> = self
            .client
            .get(&self.taxonomy_tags_url)
            .send()
            .await?
            .json()
            .await?;

        let sports_tag_ids = sports.into_iter().flat_map(|s| s.tag_ids).collect();
        let tags_dictionary = tags
            .into_iter()
            .map(|t| {
                (
                    t.id,
                    TagInfo {
                        label: t.label,
                        slug: t.slug,
                    },
                )
            })
            .collect();

        Ok(TaxonomySnapshot {
            sports_tag_ids,
            tags_dictionary,
        })
    }

    async fn send_chat_message(&self, chat_id: &str, text: &str) -> Result<SendOutcome> {
        let url = format!("{}/sendMessage", self.chat_api_base_url);
        let resp = self
            .client
            .post(&url)
            .timeout(StdDuration::from_secs(10))
            .json(&serde_json::json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "HTML",
                "disable_web_page_preview": false,
            }))
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            let _ = resp.json::<SendMessageResponse>().await;
            return Ok(SendOutcome::Delivered);
        }

        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after_seconds = resp
                    .json::<RateLimitBody>()
                    .await
                    .ok()
                    .and_then(|b| b.parameters)
                    .and_then(|p| p.retry_after)
                    .unwrap_or(1);
                Ok(SendOutcome::RateLimited {
                    retry_after_seconds,
                })
            }
            StatusCode::FORBIDDEN => Ok(SendOutcome::PermanentReject(RejectReason::Blocked)),
            StatusCode::BAD_REQUEST => {
                Ok(SendOutcome::PermanentReject(RejectReason::InvalidRecipient))
            }
            _ => Ok(SendOutcome::TransientError),
        }
    }
}
