//! client configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// client configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// directory for persisted private session state
    pub state_dir: PathBuf,
    /// funding gate poll interval in milliseconds
    pub funding_poll_interval_ms: u64,
    /// max blocks the wallet may lag behind the tip and still count as synced
    pub sync_gap_tolerance: u64,
    /// flat fee charged per submitted transaction
    pub tx_fee: u128,
    /// amount the emulated faucet credits once the wallet has synced
    pub faucet_amount: u128,
    /// token decimals for display
    pub token_decimals: u8,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".bboard"),
            funding_poll_interval_ms: 250,
            sync_gap_tolerance: 1,
            tx_fee: 1_000_000_000,             // 0.001
            faucet_amount: 1_000_000_000_000,  // 1.0
            token_decimals: 12,
        }
    }
}

impl ClientConfig {
    /// config rooted at the given state directory
    pub fn with_state_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: dir.into(),
            ..Default::default()
        }
    }

    pub fn funding_poll_interval(&self) -> Duration {
        Duration::from_millis(self.funding_poll_interval_ms)
    }

    /// format a raw amount with decimals
    pub fn format_balance(&self, amount: u128) -> String {
        let divisor = 10u128.pow(self.token_decimals as u32);
        let whole = amount / divisor;
        let frac = amount % divisor;
        format!("{}.{:0>width$}", whole, frac, width = self.token_decimals as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_balance() {
        let config = ClientConfig::default();
        assert_eq!(config.format_balance(1_000_000_000_000), "1.000000000000");
        assert_eq!(config.format_balance(1_500_000_000), "0.001500000000");
        assert_eq!(config.format_balance(0), "0.000000000000");
    }

    #[test]
    fn test_default_tolerance() {
        let config = ClientConfig::default();
        assert_eq!(config.sync_gap_tolerance, 1);
        assert!(config.tx_fee < config.faucet_amount);
    }
}
