//! Collaborator boundary towards the bridge/swap aggregation service.

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chain::SignerCaller;
use crate::error::VaultError;
use crate::types::{ChainId, TxHash};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteOrder {
    #[default]
    Fastest,
    Cheapest,
}

impl RouteOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fastest => "FASTEST",
            Self::Cheapest => "CHEAPEST",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub chain_id: ChainId,
    pub address: Address,
    pub decimals: u8,
    pub symbol: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRequest {
    pub from_chain_id: ChainId,
    pub from_token: Address,
    pub from_amount: U256,
    pub from_address: Address,
    pub to_chain_id: ChainId,
    pub to_token: Address,
    pub to_address: Address,
    pub integrator: String,
    pub order: RouteOrder,
    pub allow_switch_chain: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepAction {
    pub from_chain_id: ChainId,
    pub to_chain_id: ChainId,
    pub from_token: TokenInfo,
    pub to_token: TokenInfo,
    pub from_amount: U256,
    pub from_address: Option<Address>,
    pub to_address: Option<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepEstimate {
    pub to_amount: U256,
    pub approval_address: Option<Address>,
    pub execution_duration_secs: u64,
}

/// One hop of a route. `raw` keeps the aggregator's own representation so the step can be
/// sent back verbatim when requesting its transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteStep {
    pub id: String,
    pub tool: String,
    pub action: StepAction,
    pub estimate: StepEstimate,
    #[serde(default)]
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    pub from_chain_id: ChainId,
    pub to_chain_id: ChainId,
    pub from_amount: U256,
    pub to_amount: U256,
    pub from_token: TokenInfo,
    pub to_token: TokenInfo,
    pub steps: Vec<RouteStep>,
}

impl Route {
    pub fn first_step(&self) -> Result<&RouteStep, VaultError> {
        self.steps
            .first()
            .ok_or_else(|| VaultError::UnsupportedRoute(format!("route {} has no steps", self.id)))
    }

    pub fn estimated_duration_secs(&self) -> u64 {
        self.steps
            .iter()
            .map(|step| step.estimate.execution_duration_secs)
            .sum()
    }
}

/// Ready-to-send transaction for one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepTransaction {
    pub tool: String,
    pub to: Option<Address>,
    pub data: Option<Bytes>,
    pub value: U256,
}

impl StepTransaction {
    /// Target and calldata; a step missing either cannot be executed.
    pub fn target(&self) -> Result<(Address, Bytes), VaultError> {
        match (self.to, self.data.as_ref()) {
            (Some(to), Some(data)) if !data.is_empty() => Ok((to, data.clone())),
            _ => Err(VaultError::UnsupportedRoute(format!(
                "step transaction from '{}' is missing its target or calldata",
                self.tool
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusQuery {
    pub tx_hash: TxHash,
    pub bridge: Option<String>,
    pub from_chain_id: ChainId,
    pub to_chain_id: ChainId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    NotFound,
    Invalid,
    Pending,
    Done,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivingInfo {
    pub chain_id: Option<ChainId>,
    pub tx_hash: Option<TxHash>,
    pub amount: Option<U256>,
    pub token: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: TransferStatus,
    pub substatus: Option<String>,
    pub receiving: Option<ReceivingInfo>,
}

impl StatusReport {
    pub fn pending() -> Self {
        Self {
            status: TransferStatus::Pending,
            substatus: None,
            receiving: None,
        }
    }

    pub fn done(amount: Option<U256>) -> Self {
        Self {
            status: TransferStatus::Done,
            substatus: Some("COMPLETED".to_string()),
            receiving: Some(ReceivingInfo {
                amount,
                ..ReceivingInfo::default()
            }),
        }
    }

    pub fn failed(substatus: impl Into<String>) -> Self {
        Self {
            status: TransferStatus::Failed,
            substatus: Some(substatus.into()),
            receiving: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSummary {
    pub id: ChainId,
    pub key: String,
    pub name: String,
    pub native_token: Option<TokenInfo>,
}

/// Route discovery, step materialization and transfer status.
#[async_trait]
pub trait BridgeAggregator: Send + Sync {
    async fn routes(&self, request: &RouteRequest) -> Result<Vec<Route>, VaultError>;

    async fn step_transaction(&self, step: &RouteStep) -> Result<StepTransaction, VaultError>;

    async fn status(&self, query: &StatusQuery) -> Result<StatusReport, VaultError>;

    async fn chains(&self) -> Result<Vec<ChainSummary>, VaultError> {
        Ok(Vec::new())
    }

    async fn tokens(&self, _chain_id: ChainId) -> Result<Vec<TokenInfo>, VaultError> {
        Ok(Vec::new())
    }
}

/// Outcome of executing a route end to end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutedRoute {
    pub tx_hashes: Vec<TxHash>,
    /// Token the settlement reported as received, or the route's target when it named none.
    pub to_token: Address,
    /// Amount reported by the executor; absent when the status carried none.
    pub to_amount: Option<U256>,
}

/// Executes a route from the caller's wallet, including any approvals it needs.
///
/// The signer is passed per call so the wallet that sends the route is the one the route
/// was quoted for.
#[async_trait]
pub trait RouteExecutor: Send + Sync {
    async fn execute_route(
        &self,
        route: &Route,
        signer: &dyn SignerCaller,
    ) -> Result<ExecutedRoute, VaultError>;
}
