//! derived-state pipeline
//!
//! combines the latest public ledger snapshot with the session's private
//! state into the view the UI consumes. combine-latest semantics via an
//! explicit two-slot holder: nothing is emitted until both sources have
//! produced a value, and every ledger update after that produces exactly
//! one emission, in arrival order.

use crate::error::{ClientError, Result};
use crate::ledger::{decode_ledger_state, BoardStatus, ContractAddress, LedgerSnapshot};
use crate::private_state::{PrivateState, PrivateStateProvider};
use crate::providers::PublicDataProvider;

use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// view combining the ledger snapshot and private state of one session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DerivedState {
    pub instance: u64,
    pub posts: u64,
    pub status: BoardStatus,
    pub message: Option<String>,
    /// whether this session's secret matches the current poster commitment
    pub is_owner: bool,
}

/// pure function of its two inputs; recomputed wholesale on every update
pub fn derive_state(snapshot: &LedgerSnapshot, private: &PrivateState) -> DerivedState {
    DerivedState {
        instance: snapshot.instance,
        posts: snapshot.posts,
        status: snapshot.status,
        message: snapshot.message.clone(),
        is_owner: snapshot.status == BoardStatus::Occupied
            && snapshot.poster == private.commitment(),
    }
}

/// two-slot combine-latest holder
///
/// emission is gated until both slots are filled; afterwards each slot
/// update yields one recomputed derived state.
struct CombineLatest {
    snapshot: Option<LedgerSnapshot>,
    private: Option<PrivateState>,
}

impl CombineLatest {
    fn new() -> Self {
        Self {
            snapshot: None,
            private: None,
        }
    }

    fn update_snapshot(&mut self, snapshot: LedgerSnapshot) -> Option<DerivedState> {
        self.snapshot = Some(snapshot);
        self.recompute()
    }

    fn update_private(&mut self, private: PrivateState) -> Option<DerivedState> {
        self.private = Some(private);
        self.recompute()
    }

    fn recompute(&self) -> Option<DerivedState> {
        match (&self.snapshot, &self.private) {
            (Some(snapshot), Some(private)) => Some(derive_state(snapshot, private)),
            _ => None,
        }
    }
}

/// live derived-state subscription for one session
///
/// holds the chain-state subscription for its lifetime; [`release`] (or
/// drop) cancels the task and with it the underlying subscription.
///
/// [`release`]: StatePipeline::release
pub struct StatePipeline {
    derived_rx: watch::Receiver<Option<DerivedState>>,
    feed_rx: Option<mpsc::UnboundedReceiver<DerivedState>>,
    task: JoinHandle<()>,
}

impl StatePipeline {
    /// start the pipeline for the contract at `address`
    ///
    /// reads the private state once (it only changes on deploy/join),
    /// then follows the provider's contract-state stream.
    pub async fn start(
        public: Arc<dyn PublicDataProvider>,
        store: Arc<dyn PrivateStateProvider>,
        key: &str,
        address: ContractAddress,
    ) -> Result<Self> {
        let private = store.get(key).await?.ok_or_else(|| {
            ClientError::StoreUnavailable(format!("no private state for session key '{key}'"))
        })?;

        let mut updates = public.contract_state_stream(address).await?;
        let (derived_tx, derived_rx) = watch::channel(None);
        let (feed_tx, feed_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            let mut slots = CombineLatest::new();

            if let Some(derived) = slots.update_private(private) {
                publish(&derived_tx, &feed_tx, derived);
            }

            while let Some(raw) = updates.next().await {
                match decode_ledger_state(&raw) {
                    Ok(snapshot) => {
                        tracing::debug!(
                            "ledger update for {address}: instance {}, posts {}",
                            snapshot.instance,
                            snapshot.posts,
                        );
                        if let Some(derived) = slots.update_snapshot(snapshot) {
                            publish(&derived_tx, &feed_tx, derived);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("skipping undecodable contract state update: {e}");
                    }
                }
            }
            tracing::debug!("contract state stream for {address} ended");
        });

        Ok(Self {
            derived_rx,
            feed_rx: Some(feed_rx),
            task,
        })
    }

    /// most recently derived state, if any emission has happened yet
    pub fn current(&self) -> Option<DerivedState> {
        self.derived_rx.borrow().clone()
    }

    /// watch handle over the latest derived state
    pub fn watch(&self) -> watch::Receiver<Option<DerivedState>> {
        self.derived_rx.clone()
    }

    /// take the ordered emission feed; the single UI sink consumes it
    ///
    /// returns `None` if the feed was already taken.
    pub fn take_feed(&mut self) -> Option<mpsc::UnboundedReceiver<DerivedState>> {
        self.feed_rx.take()
    }

    /// cancel the subscription; no emission is ever delivered afterwards
    pub fn release(&self) {
        self.task.abort();
    }
}

impl Drop for StatePipeline {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn publish(
    watch_tx: &watch::Sender<Option<DerivedState>>,
    feed_tx: &mpsc::UnboundedSender<DerivedState>,
    derived: DerivedState,
) {
    let _ = watch_tx.send(Some(derived.clone()));
    let _ = feed_tx.send(derived);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulated::EmulatedChain;
    use crate::ledger::{encode_ledger_state, CIRCUIT_POST};
    use crate::private_state::MemoryPrivateStateStore;
    use crate::providers::{
        BalancedTransaction, CallTransaction, ContractCall, ContractDeployer, DeployArgs, Proof,
        ProvenTransaction,
    };
    use parity_scale_codec::Encode;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::time::Duration;
    use tokio::time::timeout;

    fn test_private(seed: u64) -> PrivateState {
        let mut rng = StdRng::seed_from_u64(seed);
        PrivateState::generate(&mut rng)
    }

    fn post_tx(address: ContractAddress, message: &str, caller: [u8; 32]) -> ProvenTransaction {
        ProvenTransaction {
            tx: BalancedTransaction {
                tx: CallTransaction {
                    call: ContractCall {
                        address,
                        circuit: CIRCUIT_POST.into(),
                        payload: message.to_string().encode(),
                        caller_commitment: caller,
                    },
                    proof: Proof(vec![]),
                },
                fee: 0,
            },
            signature: [0u8; 32],
        }
    }

    async fn pipeline_fixture() -> (Arc<EmulatedChain>, ContractAddress, PrivateState, StatePipeline)
    {
        let chain = Arc::new(EmulatedChain::new());
        let address = chain.deploy_contract(DeployArgs::default()).await.unwrap();

        let store = Arc::new(MemoryPrivateStateStore::new());
        let private = test_private(42);
        store.put("operator", &private).await.unwrap();

        let pipeline = StatePipeline::start(chain.clone(), store, "operator", address)
            .await
            .unwrap();
        (chain, address, private, pipeline)
    }

    #[test]
    fn test_combine_latest_gates_until_both_slots_filled() {
        let private = test_private(1);
        let snapshot = LedgerSnapshot::genesis(1);

        // snapshot first
        let mut slots = CombineLatest::new();
        assert!(slots.update_snapshot(snapshot.clone()).is_none());
        assert!(slots.update_private(private.clone()).is_some());

        // private first
        let mut slots = CombineLatest::new();
        assert!(slots.update_private(private).is_none());
        assert!(slots.update_snapshot(snapshot).is_some());
    }

    #[test]
    fn test_combine_latest_emits_per_update_once_ready() {
        let mut slots = CombineLatest::new();
        slots.update_private(test_private(2));

        for instance in 1..=3 {
            let derived = slots.update_snapshot(LedgerSnapshot::genesis(instance)).unwrap();
            assert_eq!(derived.instance, instance);
        }
    }

    #[test]
    fn test_derive_state_ownership() {
        let private = test_private(3);
        let mut snapshot = LedgerSnapshot::genesis(1);

        // vacant board: nobody owns it, not even the commitment holder
        assert!(!derive_state(&snapshot, &private).is_owner);

        snapshot.status = BoardStatus::Occupied;
        snapshot.message = Some("mine".into());
        snapshot.poster = private.commitment();
        assert!(derive_state(&snapshot, &private).is_owner);

        snapshot.poster = [0xFF; 32];
        assert!(!derive_state(&snapshot, &private).is_owner);
    }

    #[tokio::test]
    async fn test_pipeline_emits_initial_state() {
        let (_chain, _address, _private, mut pipeline) = pipeline_fixture().await;
        let mut feed = pipeline.take_feed().unwrap();

        let first = feed.recv().await.unwrap();
        assert_eq!(first.posts, 0);
        assert_eq!(first.status, BoardStatus::Vacant);
        assert!(!first.is_owner);
        assert_eq!(pipeline.current(), Some(first));
    }

    #[tokio::test]
    async fn test_pipeline_one_emission_per_ledger_update() {
        let (chain, address, private, mut pipeline) = pipeline_fixture().await;
        let mut feed = pipeline.take_feed().unwrap();
        feed.recv().await.unwrap(); // initial

        chain
            .execute_call(&post_tx(address, "hello", private.commitment()))
            .await
            .unwrap();

        let derived = feed.recv().await.unwrap();
        assert_eq!(derived.posts, 1);
        assert_eq!(derived.status, BoardStatus::Occupied);
        assert_eq!(derived.message.as_deref(), Some("hello"));
        assert!(derived.is_owner);

        // exactly one emission for one update
        let extra = timeout(Duration::from_millis(50), feed.recv()).await;
        assert!(extra.is_err(), "unexpected extra emission: {extra:?}");
    }

    #[tokio::test]
    async fn test_pipeline_skips_undecodable_updates() {
        let (chain, address, _private, mut pipeline) = pipeline_fixture().await;
        let mut feed = pipeline.take_feed().unwrap();
        feed.recv().await.unwrap(); // initial

        chain
            .seed_raw_state(address, vec![0xDE, 0xAD, 0xBE, 0xEF])
            .await
            .unwrap();
        let nothing = timeout(Duration::from_millis(50), feed.recv()).await;
        assert!(nothing.is_err(), "garbage update must not emit");

        // restore a decodable state; the stream is still alive
        chain
            .seed_raw_state(address, encode_ledger_state(&LedgerSnapshot::genesis(5)))
            .await
            .unwrap();
        let derived = feed.recv().await.unwrap();
        assert_eq!(derived.instance, 5);
    }

    #[tokio::test]
    async fn test_release_stops_emissions() {
        let (chain, address, private, mut pipeline) = pipeline_fixture().await;
        let mut feed = pipeline.take_feed().unwrap();
        feed.recv().await.unwrap(); // initial

        pipeline.release();

        // the chain keeps producing updates
        chain
            .execute_call(&post_tx(address, "too late", private.commitment()))
            .await
            .unwrap();

        // feed closes without delivering anything further
        let next = timeout(Duration::from_millis(200), feed.recv())
            .await
            .expect("feed should close promptly after release");
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn test_pipeline_requires_private_state() {
        let chain = Arc::new(EmulatedChain::new());
        let address = chain.deploy_contract(DeployArgs::default()).await.unwrap();
        let store = Arc::new(MemoryPrivateStateStore::new());

        let result = StatePipeline::start(chain, store, "missing", address).await;
        assert!(matches!(result, Err(ClientError::StoreUnavailable(_))));
    }
}
