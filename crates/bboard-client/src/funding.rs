//! funding gate: wait for a synced, funded wallet
//!
//! before any session work begins the operating wallet must be caught up
//! with the chain tip and hold a spendable balance. the gate polls the
//! wallet's state at a fixed interval; it never times out on its own,
//! cancellation is the caller's responsibility.

use crate::config::ClientConfig;
use crate::error::Result;
use crate::providers::Wallet;

/// block until the wallet is synced within tolerance and funded
///
/// returns the first observed spendable balance satisfying both
/// conditions.
pub async fn await_funds(wallet: &dyn Wallet, config: &ClientConfig) -> Result<u128> {
    let state_rx = wallet.state();
    let mut ticker = tokio::time::interval(config.funding_poll_interval());
    let mut last_logged_gap = u64::MAX;

    loop {
        ticker.tick().await;
        let state = state_rx.borrow().clone();
        let gap = state.sync.gap();

        if gap <= config.sync_gap_tolerance && state.balance > 0 {
            tracing::info!(
                "wallet {} funded with {} (sync gap {gap})",
                state.address,
                config.format_balance(state.balance),
            );
            return Ok(state.balance);
        }

        // log sync progress only when it moves
        if gap != last_logged_gap {
            tracing::debug!(
                "waiting for funds: balance {}, {} blocks behind tip",
                state.balance,
                gap,
            );
            last_logged_gap = gap;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulated::{EmulatedChain, EmulatedWallet};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    fn test_wallet() -> Arc<EmulatedWallet> {
        Arc::new(EmulatedWallet::new(Arc::new(EmulatedChain::new()), 100))
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_while_balance_is_zero() {
        let wallet = test_wallet();
        let config = ClientConfig::default();
        wallet.set_sync(100, 100);

        // synced but broke: the gate must keep waiting
        let gate = await_funds(&*wallet, &config);
        tokio::pin!(gate);
        assert!(timeout(Duration::from_secs(5), &mut gate).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_while_out_of_sync() {
        let wallet = test_wallet();
        let config = ClientConfig::default();
        wallet.fund(500);
        wallet.set_sync(10, 100);

        // funded but lagging: still waiting
        let gate = await_funds(&*wallet, &config);
        tokio::pin!(gate);
        assert!(timeout(Duration::from_secs(5), &mut gate).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_balance_once_synced_and_funded() {
        let wallet = test_wallet();
        let config = ClientConfig::default();

        let gate = tokio::spawn({
            let wallet = Arc::clone(&wallet);
            let config = config.clone();
            async move { await_funds(&*wallet, &config).await }
        });

        tokio::time::sleep(Duration::from_secs(2)).await;
        wallet.set_sync(99, 100); // within default tolerance of 1
        wallet.fund(750);

        let balance = timeout(Duration::from_secs(5), gate)
            .await
            .expect("gate should return")
            .unwrap()
            .unwrap();
        assert_eq!(balance, 750);
    }
}
