//! Crate-wide error taxonomy.
//!
//! Fatal errors (`ConfigError`) abort startup. Everything else is a
//! recoverable kind the orchestrator or delivery worker catches locally
//! and treats as "skip this cycle" rather than propagating.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("store unavailable: {0}")]
    Store(#[from] mongodb::error::Error),

    #[error("bson serialization error: {0}")]
    BsonSer(#[from] mongodb::bson::ser::Error),

    #[error("bson deserialization error: {0}")]
    BsonDe(#[from] mongodb::bson::de::Error),

    #[error("upstream unavailable: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, Error>;
