//! in-process implementations of the provider traits
//!
//! no public network for the board contract exists, so the demo runs
//! against an emulated chain that executes the board circuits with real
//! precondition checks and pushes every accepted state change to its
//! subscribers. the session, pipeline, and dispatcher code paths are
//! identical to what a networked deployment would exercise.

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::ledger::{
    encode_ledger_state, BoardStatus, ContractAddress, LedgerSnapshot, CIRCUIT_POST,
    CIRCUIT_TAKE_DOWN,
};
use crate::private_state::PrivateStateProvider;
use crate::providers::{
    BalancedTransaction, CallReceipt, CallTransaction, ContractDeployer, DeployArgs, Proof,
    ProofProvider, ProvenTransaction, Providers, PublicDataProvider, RawContractState,
    SyncProgress, Wallet, WalletState,
};

use async_trait::async_trait;
use futures::stream::BoxStream;
use parity_scale_codec::Decode;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, RwLock};

const ADDRESS_DOMAIN: &[u8] = b"bboard.emulated-address.v1";

struct BoardCell {
    snapshot: LedgerSnapshot,
    /// encoded form of `snapshot`, what the chain actually serves
    raw: RawContractState,
    subscribers: Vec<mpsc::UnboundedSender<RawContractState>>,
}

impl BoardCell {
    fn new(snapshot: LedgerSnapshot) -> Self {
        let raw = encode_ledger_state(&snapshot);
        Self {
            snapshot,
            raw,
            subscribers: Vec::new(),
        }
    }

    fn publish(&mut self) {
        self.raw = encode_ledger_state(&self.snapshot);
        let raw = self.raw.clone();
        self.subscribers.retain(|tx| tx.send(raw.clone()).is_ok());
    }
}

/// emulated ledger hosting board contract instances
pub struct EmulatedChain {
    boards: RwLock<HashMap<ContractAddress, BoardCell>>,
    deploy_counter: AtomicU64,
    fail_deploys: AtomicBool,
}

impl EmulatedChain {
    pub fn new() -> Self {
        Self {
            boards: RwLock::new(HashMap::new()),
            deploy_counter: AtomicU64::new(0),
            fail_deploys: AtomicBool::new(false),
        }
    }

    /// make every subsequent deployment transaction fail
    pub fn set_fail_deploys(&self, fail: bool) {
        self.fail_deploys.store(fail, Ordering::SeqCst);
    }

    fn next_address(&self) -> ContractAddress {
        let n = self.deploy_counter.fetch_add(1, Ordering::SeqCst);
        let mut hasher = blake3::Hasher::new();
        hasher.update(ADDRESS_DOMAIN);
        hasher.update(&n.to_le_bytes());
        ContractAddress(*hasher.finalize().as_bytes())
    }

    /// execute one circuit call against the board at `call.address`
    ///
    /// precondition failures surface as `CallRejected` and leave the
    /// ledger untouched.
    pub async fn execute_call(&self, tx: &ProvenTransaction) -> Result<CallReceipt> {
        let call = &tx.tx.tx.call;
        let mut boards = self.boards.write().await;
        let cell = boards.get_mut(&call.address).ok_or_else(|| ClientError::NotFound {
            address: call.address.to_string(),
        })?;

        let rejected = |reason: &str| ClientError::CallRejected {
            operation: call.circuit.clone(),
            reason: reason.into(),
        };

        match call.circuit.as_str() {
            CIRCUIT_POST => {
                if cell.snapshot.status != BoardStatus::Vacant {
                    return Err(rejected("board is occupied"));
                }
                let message = String::decode(&mut &call.payload[..])
                    .map_err(|_| rejected("malformed call arguments"))?;
                cell.snapshot.status = BoardStatus::Occupied;
                cell.snapshot.message = Some(message);
                cell.snapshot.poster = call.caller_commitment;
                cell.snapshot.posts += 1;
            }
            CIRCUIT_TAKE_DOWN => {
                if cell.snapshot.status != BoardStatus::Occupied {
                    return Err(rejected("board is vacant"));
                }
                if cell.snapshot.poster != call.caller_commitment {
                    return Err(rejected("not the current poster"));
                }
                cell.snapshot.status = BoardStatus::Vacant;
                cell.snapshot.message = None;
                cell.snapshot.poster = [0u8; 32];
                cell.snapshot.instance += 1;
            }
            other => return Err(rejected(&format!("unknown circuit '{other}'"))),
        }

        cell.publish();

        let mut hasher = blake3::Hasher::new();
        hasher.update(call.circuit.as_bytes());
        hasher.update(&call.payload);
        hasher.update(&cell.raw);
        let tx_hash = *hasher.finalize().as_bytes();

        tracing::debug!(
            "accepted '{}' on {} (instance {}, posts {})",
            call.circuit,
            call.address,
            cell.snapshot.instance,
            cell.snapshot.posts,
        );

        Ok(CallReceipt {
            tx_hash,
            operation: call.circuit.clone(),
        })
    }

    /// overwrite the served state with arbitrary bytes and notify
    /// subscribers; lets tests and demos inject stale or corrupt layouts
    pub async fn seed_raw_state(&self, address: ContractAddress, raw: RawContractState) -> Result<()> {
        let mut boards = self.boards.write().await;
        let cell = boards.get_mut(&address).ok_or_else(|| ClientError::NotFound {
            address: address.to_string(),
        })?;
        cell.raw = raw.clone();
        cell.subscribers.retain(|tx| tx.send(raw.clone()).is_ok());
        Ok(())
    }
}

impl Default for EmulatedChain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PublicDataProvider for EmulatedChain {
    async fn query_contract_state(
        &self,
        address: ContractAddress,
    ) -> Result<Option<RawContractState>> {
        Ok(self.boards.read().await.get(&address).map(|c| c.raw.clone()))
    }

    async fn contract_state_stream(
        &self,
        address: ContractAddress,
    ) -> Result<BoxStream<'static, RawContractState>> {
        let mut boards = self.boards.write().await;
        let cell = boards.get_mut(&address).ok_or_else(|| ClientError::NotFound {
            address: address.to_string(),
        })?;

        let (tx, rx) = mpsc::unbounded_channel();
        // the subscriber always sees the current state first
        let _ = tx.send(cell.raw.clone());
        cell.subscribers.push(tx);

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|raw| (raw, rx))
        });
        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl ContractDeployer for EmulatedChain {
    async fn deploy_contract(&self, init: DeployArgs) -> Result<ContractAddress> {
        if self.fail_deploys.load(Ordering::SeqCst) {
            return Err(ClientError::Deployment(
                "deployment transaction rejected".into(),
            ));
        }

        let address = self.next_address();
        let snapshot = LedgerSnapshot::genesis(init.initial_instance);
        self.boards
            .write()
            .await
            .insert(address, BoardCell::new(snapshot));

        tracing::info!("deployed board contract at {address}");
        Ok(address)
    }

    async fn find_deployed_contract(
        &self,
        address: ContractAddress,
    ) -> Result<RawContractState> {
        self.query_contract_state(address)
            .await?
            .ok_or_else(|| ClientError::NotFound {
                address: address.to_string(),
            })
    }
}

/// emulated operating wallet with a scripted sync/faucet sequence
pub struct EmulatedWallet {
    state_tx: watch::Sender<WalletState>,
    chain: Arc<EmulatedChain>,
    fee: u128,
}

impl EmulatedWallet {
    pub fn new(chain: Arc<EmulatedChain>, fee: u128) -> Self {
        let (state_tx, _) = watch::channel(WalletState {
            balance: 0,
            sync: SyncProgress { current: 0, target: 100 },
            address: "emulated-operator-wallet".into(),
        });
        Self { state_tx, chain, fee }
    }

    /// credit the wallet
    pub fn fund(&self, amount: u128) {
        self.state_tx.send_modify(|s| s.balance += amount);
    }

    /// set reported sync progress
    pub fn set_sync(&self, current: u64, target: u64) {
        self.state_tx
            .send_modify(|s| s.sync = SyncProgress { current, target });
    }

    /// background task stepping sync to the tip, then crediting the faucet
    pub fn start_scripted_sync(self: Arc<Self>, faucet_amount: u128) {
        let wallet = self;
        tokio::spawn(async move {
            for step in 1..=10u64 {
                tokio::time::sleep(Duration::from_millis(100)).await;
                wallet.set_sync(step * 10, 100);
            }
            wallet.fund(faucet_amount);
            tracing::info!("wallet synced and funded");
        });
    }
}

#[async_trait]
impl Wallet for EmulatedWallet {
    fn state(&self) -> watch::Receiver<WalletState> {
        self.state_tx.subscribe()
    }

    async fn balance_transaction(&self, tx: CallTransaction) -> Result<BalancedTransaction> {
        let have = self.state_tx.borrow().balance;
        if have < self.fee {
            return Err(ClientError::InsufficientFunds {
                have,
                need: self.fee,
            });
        }
        Ok(BalancedTransaction { tx, fee: self.fee })
    }

    async fn prove_transaction(&self, tx: BalancedTransaction) -> Result<ProvenTransaction> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(tx.tx.call.circuit.as_bytes());
        hasher.update(&tx.tx.call.payload);
        hasher.update(&tx.tx.proof.0);
        let signature = *hasher.finalize().as_bytes();
        Ok(ProvenTransaction { tx, signature })
    }

    async fn submit_transaction(&self, tx: ProvenTransaction) -> Result<CallReceipt> {
        let fee = tx.tx.fee;
        let receipt = self.chain.execute_call(&tx).await?;
        self.state_tx
            .send_modify(|s| s.balance = s.balance.saturating_sub(fee));
        Ok(receipt)
    }

    async fn close(&self) -> Result<()> {
        tracing::debug!("emulated wallet closed");
        Ok(())
    }
}

/// proof provider that fabricates opaque proofs (or fails on demand)
pub struct EmulatedProofProvider {
    fail: bool,
}

impl EmulatedProofProvider {
    pub fn new() -> Self {
        Self { fail: false }
    }

    /// provider whose every proof attempt fails
    pub fn failing() -> Self {
        Self { fail: true }
    }
}

impl Default for EmulatedProofProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProofProvider for EmulatedProofProvider {
    async fn prove(&self, circuit: &str, public_inputs: &[u8]) -> Result<Proof> {
        if self.fail {
            return Err(ClientError::ProofFailed("proof server unavailable".into()));
        }
        let mut hasher = blake3::Hasher::new();
        hasher.update(circuit.as_bytes());
        hasher.update(public_inputs);
        Ok(Proof(hasher.finalize().as_bytes().to_vec()))
    }
}

/// assemble a provider bundle backed by a fresh emulated chain
///
/// the chain and wallet handles are returned alongside so callers can
/// script funding and inspect state directly.
pub fn emulated_providers(
    store: Arc<dyn PrivateStateProvider>,
    config: &ClientConfig,
) -> (Providers, Arc<EmulatedChain>, Arc<EmulatedWallet>) {
    let chain = Arc::new(EmulatedChain::new());
    let wallet = Arc::new(EmulatedWallet::new(Arc::clone(&chain), config.tx_fee));
    let providers = Providers {
        public: chain.clone(),
        private: store,
        wallet: wallet.clone(),
        proofs: Arc::new(EmulatedProofProvider::new()),
        deployer: chain.clone(),
    };
    (providers, chain, wallet)
}
