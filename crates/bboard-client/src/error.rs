//! error types for the board client

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("no contract deployed at {address}")]
    NotFound { address: String },

    #[error("ledger state decode failed: {0}")]
    Decode(String),

    #[error("private state store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("deployment failed: {0}")]
    Deployment(String),

    #[error("call '{operation}' rejected: {reason}")]
    CallRejected { operation: String, reason: String },

    #[error("proof generation failed: {0}")]
    ProofFailed(String),

    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: u128, need: u128 },

    #[error("transaction submission rejected: {0}")]
    SubmissionRejected(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
