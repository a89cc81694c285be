//! Core domain types for the alerting pipeline.
//!
//! ## Trade pipeline
//!
//! - [`Trade`] - a single executed order on the upstream venue
//! - [`Side`] - `BUY`/`SELL`
//!
//! ## Market metadata
//!
//! - [`MarketMetadata`] - cached, categorized market info keyed by condition id
//!
//! ## Filters
//!
//! - [`UserFilter`] - a user's predicate plus the chat recipient to notify
//!
//! ## Cursor & dedup
//!
//! - [`Cursor`] - persisted `{timestamp, txHash}` of the newest processed trade
//!
//! ## Chat accounts
//!
//! - [`ChatAccount`] - read/update-only view of a user's linked chat recipient

mod chat_account;
mod cursor;
mod filter;
mod market;
mod trade;

pub use chat_account::ChatAccount;
pub use cursor::Cursor;
pub use filter::UserFilter;
pub use market::MarketMetadata;
pub use trade::{Side, Trade};
