//! command dispatcher: named board operations to contract calls
//!
//! maps a [`BoardCommand`] to a circuit call, drives it through proof
//! generation and the wallet's balance/prove/submit lifecycle, and waits
//! for local acceptance. calls for one session are serialized behind an
//! async lock so a second call never starts while the first is in flight.

use crate::error::Result;
use crate::ledger::{ContractAddress, CIRCUIT_POST, CIRCUIT_TAKE_DOWN};
use crate::providers::{CallReceipt, CallTransaction, ContractCall, Providers};

use parity_scale_codec::Encode;
use tokio::sync::Mutex;

/// the closed set of state-changing board operations
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BoardCommand {
    /// post a message; requires the board to be vacant
    Post(String),
    /// clear the board; requires this session to be the current poster
    TakeDown,
}

impl BoardCommand {
    /// circuit name this command invokes
    pub fn circuit(&self) -> &'static str {
        match self {
            BoardCommand::Post(_) => CIRCUIT_POST,
            BoardCommand::TakeDown => CIRCUIT_TAKE_DOWN,
        }
    }

    /// SCALE-encoded circuit arguments
    fn payload(&self) -> Vec<u8> {
        match self {
            BoardCommand::Post(message) => message.encode(),
            BoardCommand::TakeDown => Vec::new(),
        }
    }
}

/// per-session dispatcher for state-changing calls
pub struct CommandDispatcher {
    providers: Providers,
    address: ContractAddress,
    caller_commitment: [u8; 32],
    call_lock: Mutex<()>,
}

impl CommandDispatcher {
    pub fn new(
        providers: Providers,
        address: ContractAddress,
        caller_commitment: [u8; 32],
    ) -> Self {
        Self {
            providers,
            address,
            caller_commitment,
            call_lock: Mutex::new(()),
        }
    }

    /// submit one board operation and wait for local acceptance
    ///
    /// finality surfaces asynchronously through the derived-state
    /// pipeline. a `CallRejected` (or any other failure) leaves the
    /// session fully usable; the caller reports and continues.
    pub async fn call(&self, command: BoardCommand) -> Result<CallReceipt> {
        let _serialized = self.call_lock.lock().await;

        let circuit = command.circuit();
        let payload = command.payload();
        tracing::debug!("dispatching '{circuit}' on {}", self.address);

        let proof = self.providers.proofs.prove(circuit, &payload).await?;
        let tx = CallTransaction {
            call: ContractCall {
                address: self.address,
                circuit: circuit.into(),
                payload,
                caller_commitment: self.caller_commitment,
            },
            proof,
        };

        let balanced = self.providers.wallet.balance_transaction(tx).await?;
        let proven = self.providers.wallet.prove_transaction(balanced).await?;
        let receipt = self.providers.wallet.submit_transaction(proven).await?;

        tracing::info!(
            "'{circuit}' accepted on {} (tx {})",
            self.address,
            hex::encode(&receipt.tx_hash[..8]),
        );
        Ok(receipt)
    }
}
