//! typed reads of the board contract's public ledger state
//!
//! the contract stores its public cells as a versioned SCALE blob:
//! one layout-version byte followed by the encoded [`LedgerSnapshot`].
//! decoding is pure and deterministic; a snapshot is produced whole or
//! not at all.

use crate::error::{ClientError, Result};
use crate::providers::PublicDataProvider;

use parity_scale_codec::{Decode, Encode};
use std::fmt;
use std::str::FromStr;

/// current on-chain cell layout version
pub const LEDGER_LAYOUT_VERSION: u8 = 1;

/// circuit name for posting a message
pub const CIRCUIT_POST: &str = "post";
/// circuit name for taking the board down
pub const CIRCUIT_TAKE_DOWN: &str = "take_down";

/// opaque identifier of a deployed board instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Encode, Decode)]
pub struct ContractAddress(pub [u8; 32]);

impl fmt::Display for ContractAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for ContractAddress {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| ClientError::Decode(format!("invalid contract address: {e}")))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ClientError::Decode("contract address must be 32 bytes".into()))?;
        Ok(Self(bytes))
    }
}

/// whether the board currently carries a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode)]
pub enum BoardStatus {
    Vacant,
    Occupied,
}

/// typed projection of the board's public storage at one point in time
///
/// never mutated in place; a fresh snapshot replaces the previous one
/// wholesale on every observed chain update.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct LedgerSnapshot {
    /// board round counter, starts at 1 on deploy, bumps on take_down
    pub instance: u64,
    /// total successful posts across all rounds
    pub posts: u64,
    /// vacant or occupied
    pub status: BoardStatus,
    /// current message, present iff occupied
    pub message: Option<String>,
    /// commitment to the current poster's secret key, zeroed when vacant
    pub poster: [u8; 32],
}

impl LedgerSnapshot {
    /// initial state of a freshly deployed board
    pub fn genesis(instance: u64) -> Self {
        Self {
            instance,
            posts: 0,
            status: BoardStatus::Vacant,
            message: None,
            poster: [0u8; 32],
        }
    }
}

/// encode a snapshot into the versioned on-chain byte layout
pub fn encode_ledger_state(snapshot: &LedgerSnapshot) -> Vec<u8> {
    let mut out = vec![LEDGER_LAYOUT_VERSION];
    snapshot.encode_to(&mut out);
    out
}

/// decode raw contract-state bytes into a snapshot
///
/// fails with `Decode` on a version mismatch, a short read, or trailing
/// bytes; never returns a partially populated snapshot.
pub fn decode_ledger_state(bytes: &[u8]) -> Result<LedgerSnapshot> {
    let (&version, mut rest) = bytes
        .split_first()
        .ok_or_else(|| ClientError::Decode("empty contract state".into()))?;

    if version != LEDGER_LAYOUT_VERSION {
        return Err(ClientError::Decode(format!(
            "unsupported ledger layout version {version} (expected {LEDGER_LAYOUT_VERSION})"
        )));
    }

    let snapshot = LedgerSnapshot::decode(&mut rest)
        .map_err(|e| ClientError::Decode(e.to_string()))?;

    if !rest.is_empty() {
        return Err(ClientError::Decode(format!(
            "{} trailing bytes after ledger state",
            rest.len()
        )));
    }

    Ok(snapshot)
}

/// read and decode the ledger state at an address
///
/// "not deployed" surfaces as `Ok(None)`, distinct from a malformed
/// layout which is a `Decode` error.
pub async fn read_ledger_state(
    provider: &dyn PublicDataProvider,
    address: ContractAddress,
) -> Result<Option<LedgerSnapshot>> {
    match provider.query_contract_state(address).await? {
        Some(raw) => Ok(Some(decode_ledger_state(&raw)?)),
        None => Ok(None),
    }
}
