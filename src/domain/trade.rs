use serde::{Deserialize, Serialize};

/// Which side of the book a trade executed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// An executed order on the upstream venue, uniquely identified by its
/// transaction hash. Transient: produced by the Upstream Client, consumed
/// by the Orchestrator, persisted nowhere except the dedup set (by hash).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub tx_hash: String,
    pub proxy_wallet: String,
    pub side: Side,
    pub size: f64,
    pub price: f64,
    pub condition_id: String,
    /// Unix seconds.
    pub timestamp: i64,
}

impl Trade {
    /// `size × price` — the dollar value of the trade at its execution price.
    pub fn notional(&self) -> f64 {
        self.size * self.price
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notional_is_size_times_price() {
        let t = Trade {
            tx_hash: "t1".into(),
            proxy_wallet: "0xabc".into(),
            side: Side::Buy,
            size: 200.0,
            price: 0.5,
            condition_id: "m1".into(),
            timestamp: 1000,
        };
        assert_eq!(t.notional(), 100.0);
    }
}
