//! collaborator traits consumed by the core
//!
//! the ledger, wallet, and proof system are external systems with fixed
//! method surfaces; the client only ever talks to them through these
//! traits. [`Providers`] bundles one implementation of each for a session.

use crate::error::Result;
use crate::ledger::ContractAddress;
use crate::private_state::PrivateStateProvider;

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;
use tokio::sync::watch;

/// raw on-chain contract state bytes
pub type RawContractState = Vec<u8>;

/// wallet sync progress against the chain tip
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncProgress {
    pub current: u64,
    pub target: u64,
}

impl SyncProgress {
    /// blocks still to apply before the wallet is caught up
    pub fn gap(&self) -> u64 {
        self.target.saturating_sub(self.current)
    }
}

/// one observation of the wallet's state stream
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WalletState {
    /// spendable balance
    pub balance: u128,
    /// sync progress against the tip
    pub sync: SyncProgress,
    /// wallet address, for display
    pub address: String,
}

/// a zero-knowledge proof for one circuit call, opaque to the client
#[derive(Clone, Debug)]
pub struct Proof(pub Vec<u8>);

/// one contract-call intent: which circuit, with what arguments, by whom
#[derive(Clone, Debug)]
pub struct ContractCall {
    pub address: ContractAddress,
    pub circuit: String,
    /// SCALE-encoded circuit arguments
    pub payload: Vec<u8>,
    /// commitment identifying the calling session
    pub caller_commitment: [u8; 32],
}

/// call plus its circuit proof, before balancing
#[derive(Clone, Debug)]
pub struct CallTransaction {
    pub call: ContractCall,
    pub proof: Proof,
}

/// transaction with its fee reserved by the wallet
#[derive(Clone, Debug)]
pub struct BalancedTransaction {
    pub tx: CallTransaction,
    pub fee: u128,
}

/// fully proven transaction, ready for submission
#[derive(Clone, Debug)]
pub struct ProvenTransaction {
    pub tx: BalancedTransaction,
    pub signature: [u8; 32],
}

/// receipt for a locally accepted transaction
///
/// local acceptance only; finality surfaces asynchronously through the
/// derived-state pipeline.
#[derive(Clone, Debug)]
pub struct CallReceipt {
    pub tx_hash: [u8; 32],
    pub operation: String,
}

/// arguments for a fresh board deployment
#[derive(Clone, Copy, Debug)]
pub struct DeployArgs {
    /// first board round number
    pub initial_instance: u64,
}

impl Default for DeployArgs {
    fn default() -> Self {
        Self { initial_instance: 1 }
    }
}

/// read access to public on-chain contract state
#[async_trait]
pub trait PublicDataProvider: Send + Sync {
    /// raw state at an address; `Ok(None)` when nothing is deployed there
    async fn query_contract_state(
        &self,
        address: ContractAddress,
    ) -> Result<Option<RawContractState>>;

    /// push stream of raw state, starting with the current value
    ///
    /// latency is bounded by the provider's own refresh interval; the
    /// stream ends when the provider drops the subscription.
    async fn contract_state_stream(
        &self,
        address: ContractAddress,
    ) -> Result<BoxStream<'static, RawContractState>>;
}

/// the operating wallet: a state stream plus the transaction lifecycle
#[async_trait]
pub trait Wallet: Send + Sync {
    /// live wallet state (balance, sync progress, address)
    fn state(&self) -> watch::Receiver<WalletState>;

    /// reserve the fee for a transaction
    async fn balance_transaction(&self, tx: CallTransaction) -> Result<BalancedTransaction>;

    /// sign/prove the balanced transaction
    async fn prove_transaction(&self, tx: BalancedTransaction) -> Result<ProvenTransaction>;

    /// submit and wait for local acceptance
    async fn submit_transaction(&self, tx: ProvenTransaction) -> Result<CallReceipt>;

    /// release wallet resources; part of ordered session teardown
    async fn close(&self) -> Result<()>;
}

/// opaque proof generation for a named circuit
#[async_trait]
pub trait ProofProvider: Send + Sync {
    async fn prove(&self, circuit: &str, public_inputs: &[u8]) -> Result<Proof>;
}

/// contract deployment and attachment helper
#[async_trait]
pub trait ContractDeployer: Send + Sync {
    /// submit a deployment transaction; returns the assigned address
    async fn deploy_contract(&self, init: DeployArgs) -> Result<ContractAddress>;

    /// raw state of an existing contract; `NotFound` when absent
    async fn find_deployed_contract(
        &self,
        address: ContractAddress,
    ) -> Result<RawContractState>;
}

/// provider bundle bound to a session
#[derive(Clone)]
pub struct Providers {
    pub public: Arc<dyn PublicDataProvider>,
    pub private: Arc<dyn PrivateStateProvider>,
    pub wallet: Arc<dyn Wallet>,
    pub proofs: Arc<dyn ProofProvider>,
    pub deployer: Arc<dyn ContractDeployer>,
}
