use std::collections::HashSet;

use crate::domain::Side;

/// In-memory snapshot of a persisted filter config joined with its user's
/// chat account. Invariants (enforced by the Store Gateway before a row is
/// returned by `listActiveUserFilters`): `minPrice ≤ maxPrice`, `sides` is
/// non-empty. Empty `selectedCategories`/`marketsFilter` means "all".
#[derive(Debug, Clone, PartialEq)]
pub struct UserFilter {
    pub user_id: String,
    pub chat_id: String,
    pub enabled: bool,
    pub min_notional_usd: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub sides: HashSet<Side>,
    pub selected_categories: Vec<String>,
    pub markets_filter: Vec<String>,
}

impl UserFilter {
    /// `true` iff this filter satisfies the structural invariants the Store
    /// Gateway is responsible for enforcing before the filter ever reaches
    /// the in-memory snapshot.
    pub fn is_well_formed(&self) -> bool {
        !self.sides.is_empty() && self.min_price <= self.max_price
    }
}
