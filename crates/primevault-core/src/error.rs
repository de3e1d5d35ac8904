use alloy_primitives::{Address, B256};
use thiserror::Error;

use crate::types::ChainId;

/// Errors raised by deposit/claim orchestration.
///
/// Every variant aborts the call that produced it. Nothing is retried and the account
/// cache is left untouched.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Not connected: {0}")]
    NotConnected(String),

    #[error("No qualifying route from chain {from_chain} to chain {to_chain}")]
    RouteNotFound { from_chain: ChainId, to_chain: ChainId },

    #[error("Unsupported route: {0}")]
    UnsupportedRoute(String),

    #[error("Allowance check failed for token {token}: {message}")]
    AllowanceCheckFailed { token: Address, message: String },

    #[error("Submission failed: {0}")]
    SubmissionFailed(String),

    #[error("Settlement of {tx_hash} failed: {detail}")]
    SettlementFailed { tx_hash: B256, detail: String },

    #[error("Settlement of {tx_hash} reported no received amount")]
    SettlementDataMissing { tx_hash: B256 },

    #[error("Settlement of {tx_hash} still pending after {attempts} polls")]
    SettlementTimeout { tx_hash: B256, attempts: u32 },

    #[error("Receipt {receipt_id} not found ({available} receipts on ledger)")]
    ReceiptNotFound { receipt_id: u64, available: usize },

    #[error("Receipt {receipt_id} is stale: {reason}")]
    StaleReceipt { receipt_id: u64, reason: String },

    #[error("Chain {0} is not supported")]
    UnsupportedChain(ChainId),

    #[error("Network switch to chain {chain_id} failed: {message}")]
    NetworkSwitch { chain_id: ChainId, message: String },

    #[error("Bridge aggregator error: {0}")]
    Aggregator(String),

    #[error("Chain {chain_id} error: {message}")]
    Chain { chain_id: ChainId, message: String },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

impl VaultError {
    pub fn stage_violation(expected: &str, actual: &str) -> Self {
        Self::InvariantViolation(format!(
            "flow stage violation: expected '{}', got '{}'",
            expected, actual
        ))
    }

    pub fn chain(chain_id: ChainId, message: impl Into<String>) -> Self {
        Self::Chain {
            chain_id,
            message: message.into(),
        }
    }

    /// Folds any failure from the account-abstraction layer into `SubmissionFailed`.
    pub fn into_submission(self) -> Self {
        match self {
            err @ Self::SubmissionFailed(_) => err,
            other => Self::SubmissionFailed(other.to_string()),
        }
    }
}
