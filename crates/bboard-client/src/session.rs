//! session establishment: deploy a fresh board or join an existing one
//!
//! a session binds a contract address, a provider bundle, and a
//! private-state key, and owns the derived-state pipeline for its
//! lifetime. establishment either returns a fully wired session or an
//! error; no partial session ever escapes.

use crate::dispatch::CommandDispatcher;
use crate::error::{ClientError, Result};
use crate::ledger::{decode_ledger_state, read_ledger_state, ContractAddress, LedgerSnapshot};
use crate::pipeline::{DerivedState, StatePipeline};
use crate::private_state::{ensure_private_state, PrivateState};
use crate::providers::{DeployArgs, Providers};

use rand::RngCore;
use tokio::sync::mpsc;

/// one established contract session
pub struct Session {
    address: ContractAddress,
    providers: Providers,
    private_state_key: String,
    pipeline: StatePipeline,
    dispatcher: CommandDispatcher,
}

impl Session {
    /// deploy a new board instance and bind a session to it
    ///
    /// the private state is resolved (or generated) and persisted before
    /// the deployment transaction is submitted, so a failed deploy can be
    /// retried without losing the key material.
    pub async fn deploy(
        providers: Providers,
        private_state_key: &str,
        init: DeployArgs,
        rng: &mut dyn RngCore,
    ) -> Result<Self> {
        let private =
            ensure_private_state(&*providers.private, private_state_key, rng).await?;

        let address = providers.deployer.deploy_contract(init).await?;
        tracing::info!("deployed board at {address}");

        Self::open(providers, private_state_key, private, address).await
    }

    /// attach to an existing board at `address`
    ///
    /// fails with `NotFound` if nothing is deployed there and `Decode`
    /// if the deployed contract has an incompatible cell layout.
    pub async fn join(
        providers: Providers,
        private_state_key: &str,
        address: ContractAddress,
        rng: &mut dyn RngCore,
    ) -> Result<Self> {
        let private =
            ensure_private_state(&*providers.private, private_state_key, rng).await?;

        let raw = providers.deployer.find_deployed_contract(address).await?;
        let snapshot = decode_ledger_state(&raw)?;
        tracing::info!(
            "joined board at {address} (instance {}, posts {})",
            snapshot.instance,
            snapshot.posts,
        );

        Self::open(providers, private_state_key, private, address).await
    }

    async fn open(
        providers: Providers,
        private_state_key: &str,
        private: PrivateState,
        address: ContractAddress,
    ) -> Result<Self> {
        let pipeline = StatePipeline::start(
            providers.public.clone(),
            providers.private.clone(),
            private_state_key,
            address,
        )
        .await?;

        let dispatcher =
            CommandDispatcher::new(providers.clone(), address, private.commitment());

        Ok(Self {
            address,
            providers,
            private_state_key: private_state_key.into(),
            pipeline,
            dispatcher,
        })
    }

    /// the session's contract address; fixed at establishment
    pub fn address(&self) -> ContractAddress {
        self.address
    }

    /// derived-state pipeline owned by this session
    pub fn pipeline(&self) -> &StatePipeline {
        &self.pipeline
    }

    /// take the ordered derived-state feed (single UI sink)
    pub fn subscribe(&mut self) -> Option<mpsc::UnboundedReceiver<DerivedState>> {
        self.pipeline.take_feed()
    }

    /// dispatcher for state-changing calls on this session
    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    /// fresh read of the board's public ledger state
    pub async fn ledger_snapshot(&self) -> Result<Option<LedgerSnapshot>> {
        read_ledger_state(&*self.providers.public, self.address).await
    }

    /// this session's private state record
    pub async fn private_state(&self) -> Result<PrivateState> {
        self.providers
            .private
            .get(&self.private_state_key)
            .await?
            .ok_or_else(|| {
                ClientError::StoreUnavailable(format!(
                    "no private state for session key '{}'",
                    self.private_state_key
                ))
            })
    }

    /// ordered best-effort teardown: stop observing, then close the wallet
    ///
    /// teardown-step failures are logged, never propagated, so later
    /// steps always run.
    pub async fn close(self) {
        self.pipeline.release();
        if let Err(e) = self.providers.wallet.close().await {
            tracing::warn!("wallet close failed: {e}");
        }
        tracing::debug!("session on {} closed", self.address);
    }
}
