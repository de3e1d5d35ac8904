//! Deposit/claim orchestration for cross-chain staking through ERC-4337 smart accounts.
//!
//! Deposits move value from any supported chain into the staking pool on the main chain
//! (direct transfer, same-chain swap or bridge), then stake it from the user's smart
//! account. Claims withdraw a receipt and send the principal back to the wallet, routed to
//! another chain or token when asked. Wallets, bundlers, chains and the bridge aggregator
//! are reached through the collaborator traits in [`chain`], [`account`] and [`aggregator`].

#![deny(unsafe_code)]

pub mod abi;
pub mod account;
pub mod admin;
pub mod aggregator;
pub mod allowance;
pub mod chain;
pub mod claim;
pub mod config;
pub mod deposit;
pub mod engine;
pub mod error;
pub mod flow;
pub mod ledger;
pub mod route;
pub mod settlement;
pub mod telemetry;
pub mod types;

#[cfg(test)]
mod testkit;

pub use account::{
    AccountAbstractionProvider, BoundAccount, ReadyState, SessionState, SmartAccountCaller,
    SmartAccountSession,
};
pub use admin::BridgeExecutorAdmin;
pub use aggregator::{
    BridgeAggregator, ChainSummary, ExecutedRoute, ReceivingInfo, Route, RouteExecutor,
    RouteOrder, RouteRequest, RouteStep, StatusQuery, StatusReport, StepAction, StepEstimate,
    StepTransaction, TokenInfo, TransferStatus,
};
pub use allowance::AllowanceGuard;
pub use chain::{ensure_network, send_and_confirm, ChainReader, ChainRegistry, SignerCaller};
pub use claim::{classify_claim, ClaimOrchestrator, ClaimPath, ClaimRequest, ClaimResult};
pub use crate::config::{Environment, VaultConfig};
pub use deposit::{classify_deposit, DepositOrchestrator, DepositOutcome, DepositPath};
pub use engine::{EngineCollaborators, StakingEngine};
pub use error::VaultError;
pub use flow::{FlowStage, FlowTracker};
pub use ledger::StakeLedger;
pub use route::{RouteDestination, RouteResolver, RouteSource};
pub use settlement::{SettlementOutcome, SettlementPolicy, SettlementWaiter};
pub use types::{
    is_native, parse_decimal_units, parse_minor_units, Call, CallBatch, ChainId, DepositResult,
    OperationHash, OperationReceipt, Receipt, ReceiptRef, ReceiptSnapshot, SmartAccount,
    TransferDirection, TransferIntent, TxHash, NATIVE_TOKEN,
};
