//! Matcher: a pure, total predicate over
//! `(trade, market, filter)`. No I/O, no shared state — safe to call from
//! any number of orchestrator cycles with identical results for identical
//! inputs.

use crate::domain::{MarketMetadata, Trade, UserFilter};

/// Evaluate `trade` against `filter`, given the trade's known `market`.
///
/// `market: None` means the trade's market is unknown. This is a
/// deliberate policy choice: no filter matches an unknown-market trade,
/// even one that doesn't constrain categories or markets, to avoid the
/// "unknown-as-match" paradox. Callers are expected
/// to skip unknown-market trades entirely rather than call this at all,
/// but the function still encodes the policy so it holds regardless of
/// caller discipline.
pub fn matches(trade: &Trade, market: Option<&MarketMetadata>, filter: &UserFilter) -> bool {
    let Some(market) = market else {
        return false;
    };

    if !filter.enabled {
        return false;
    }
    if trade.notional() < filter.min_notional_usd {
        return false;
    }
    if trade.price < filter.min_price || trade.price > filter.max_price {
        return false;
    }
    if !filter.sides.contains(&trade.side) {
        return false;
    }
    if !filter.markets_filter.is_empty() && !filter.markets_filter.contains(&trade.condition_id) {
        return false;
    }
    if !filter.selected_categories.is_empty()
        && !market
            .categories
            .iter()
            .any(|c| filter.selected_categories.contains(c))
    {
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Side;
    use std::collections::HashSet;

    fn base_trade() -> Trade {
        Trade {
            tx_hash: "t1".into(),
            proxy_wallet: "0xabc".into(),
            side: Side::Buy,
            size: 200.0,
            price: 0.5,
            condition_id: "m1".into(),
            timestamp: 1000,
        }
    }

    fn base_market() -> MarketMetadata {
        MarketMetadata {
            condition_id: "m1".into(),
            title: "Will X happen?".into(),
            slug: None,
            tags: vec![],
            tag_ids: vec![],
            is_sports: false,
            categories: vec!["Crypto".into()],
            updated_at: chrono::Utc::now(),
        }
    }

    fn base_filter() -> UserFilter {
        UserFilter {
            user_id: "u1".into(),
            chat_id: "C1".into(),
            enabled: true,
            min_notional_usd: 100.0,
            min_price: 0.05,
            max_price: 0.95,
            sides: HashSet::from([Side::Buy, Side::Sell]),
            selected_categories: vec![],
            markets_filter: vec![],
        }
    }

    #[test]
    fn happy_path_matches() {
        assert!(matches(&base_trade(), Some(&base_market()), &base_filter()));
    }

    #[test]
    fn unknown_market_never_matches_even_unconstrained_filter() {
        assert!(!matches(&base_trade(), None, &base_filter()));
    }

    #[test]
    fn disabled_filter_never_matches() {
        let mut filter = base_filter();
        filter.enabled = false;
        assert!(!matches(&base_trade(), Some(&base_market()), &filter));
    }

    #[test]
    fn notional_boundary_is_inclusive() {
        let mut filter = base_filter();
        filter.min_notional_usd = base_trade().notional();
        assert!(matches(&base_trade(), Some(&base_market()), &filter));
    }

    #[test]
    fn price_boundaries_are_inclusive() {
        let mut trade = base_trade();
        let mut filter = base_filter();
        filter.min_price = 0.5;
        filter.max_price = 0.5;
        trade.price = 0.5;
        assert!(matches(&trade, Some(&base_market()), &filter));
    }

    #[test]
    fn side_must_be_in_filter_sides() {
        let mut filter = base_filter();
        filter.sides = HashSet::from([Side::Sell]);
        assert!(!matches(&base_trade(), Some(&base_market()), &filter));
    }

    #[test]
    fn markets_filter_restricts_condition_id() {
        let mut filter = base_filter();
        filter.markets_filter = vec!["other-market".into()];
        assert!(!matches(&base_trade(), Some(&base_market()), &filter));
    }

    #[test]
    fn empty_selected_categories_matches_any_nonempty_categories() {
        let filter = base_filter();
        assert!(filter.selected_categories.is_empty());
        assert!(matches(&base_trade(), Some(&base_market()), &filter));
    }

    #[test]
    fn selected_categories_excludes_non_matching_market() {
        let mut filter = base_filter();
        filter.selected_categories = vec!["Politics".into()];
        assert!(!matches(&base_trade(), Some(&base_market()), &filter));
    }

    #[test]
    fn deterministic_across_repeated_calls() {
        let trade = base_trade();
        let market = base_market();
        let filter = base_filter();
        let first = matches(&trade, Some(&market), &filter);
        let second = matches(&trade, Some(&market), &filter);
        assert_eq!(first, second);
    }
}
