use super::amount::Balance;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuoteId(pub u64);

impl fmt::Display for QuoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A time-bounded offer returned by `GetQuote`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub quote_id: QuoteId,
    /// As reported by the server; may be zero.
    pub recv_amount: Balance,
    /// Validity window as reported by the server.
    pub ttl: u64,
    pub txid: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapStatus {
    NotFound,
    Mempool,
    Confirmed,
}

/// One exchange transaction known to the server, keyed by `txid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Swap {
    pub txid: String,
    pub status: SwapStatus,
}

/// Finds the record for `txid` in a `GetSwaps` listing.
///
/// Later entries win when the server repeats a txid, since a record is only ever
/// replaced as a whole.
pub fn find_swap<'a>(swaps: &'a [Swap], txid: &str) -> Option<&'a Swap> {
    swaps.iter().rev().find(|swap| swap.txid == txid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_deserialization_ignores_extra_fields() {
        let json = r#"{"txid":"abc","status":"Mempool","created_at":1700000000}"#;
        let swap: Swap = serde_json::from_str(json).unwrap();
        assert_eq!(swap.txid, "abc");
        assert_eq!(swap.status, SwapStatus::Mempool);
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let json = r#"{"txid":"abc","status":"Exploded"}"#;
        assert!(serde_json::from_str::<Swap>(json).is_err());
    }

    #[test]
    fn test_find_swap_prefers_latest_record() {
        let swaps = vec![
            Swap {
                txid: "abc".to_string(),
                status: SwapStatus::Mempool,
            },
            Swap {
                txid: "def".to_string(),
                status: SwapStatus::Mempool,
            },
            Swap {
                txid: "abc".to_string(),
                status: SwapStatus::Confirmed,
            },
        ];

        assert_eq!(
            find_swap(&swaps, "abc").map(|s| s.status),
            Some(SwapStatus::Confirmed)
        );
        assert!(find_swap(&swaps, "zzz").is_none());
    }
}
