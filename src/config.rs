//! Swap workflow settings.
//!
//! The binary fills these from command-line flags (with environment fallbacks);
//! library users construct them directly or start from `SwapConfig::default()`.

use crate::domain::amount::Amount;
use std::time::Duration;

pub const DEFAULT_SEND_ASSET: &str = "DePix";
pub const DEFAULT_RECV_ASSET: &str = "L-BTC";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 10;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_BALANCE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct SwapConfig {
    /// Asset paid to the server.
    pub send_asset: String,
    /// Asset received in exchange.
    pub recv_asset: String,
    pub send_amount: Amount,
    /// Delay before each `GetSwaps` poll.
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    /// Upper bound on waiting for any single response.
    pub request_timeout: Duration,
    /// Upper bound on waiting for a balance push after requesting an address.
    pub balance_timeout: Duration,
}

impl SwapConfig {
    pub fn new(send_asset: impl Into<String>, recv_asset: impl Into<String>, send_amount: Amount) -> Self {
        Self {
            send_asset: send_asset.into(),
            recv_asset: recv_asset.into(),
            send_amount,
            ..Self::default()
        }
    }
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            send_asset: DEFAULT_SEND_ASSET.to_string(),
            recv_asset: DEFAULT_RECV_ASSET.to_string(),
            send_amount: Amount::ONE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            balance_timeout: DEFAULT_BALANCE_TIMEOUT,
        }
    }
}
