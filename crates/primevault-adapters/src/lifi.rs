//! Client for the LI.FI aggregation REST API.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use primevault_core::config::AggregatorConfig;
use primevault_core::{
    BridgeAggregator, ChainId, ChainSummary, ReceivingInfo, Route, RouteRequest, RouteStep,
    StatusQuery, StatusReport, StepAction, StepEstimate, StepTransaction, TokenInfo,
    TransferStatus, VaultError,
};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::AdapterError;

const API_KEY_HEADER: &str = "x-lifi-api-key";

pub struct LiFiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl LiFiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AdapterError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
        })
    }

    pub fn from_config(config: &AggregatorConfig) -> Result<Self, AdapterError> {
        let mut client = Self::new(
            &config.base_url,
            Duration::from_secs(config.request_timeout_secs),
        )?;
        client.api_key = config.api_key.clone();
        Ok(client)
    }

    pub async fn fetch_routes(&self, request: &RouteRequest) -> Result<Vec<Route>, AdapterError> {
        let body = route_request_body(request);
        let response: WireRoutes = self.post("/advanced/routes", &body).await?;
        debug!(candidates = response.routes.len(), "aggregator routes");
        response.routes.into_iter().map(Route::try_from).collect()
    }

    pub async fn fetch_step_transaction(
        &self,
        step: &RouteStep,
    ) -> Result<StepTransaction, AdapterError> {
        if step.raw.is_null() {
            return Err(AdapterError::decode(format!(
                "step {} carries no aggregator payload",
                step.id
            )));
        }
        let response: WireStep = self.post("/advanced/stepTransaction", &step.raw).await?;
        step_transaction_from(response)
    }

    pub async fn fetch_status(&self, query: &StatusQuery) -> Result<StatusReport, AdapterError> {
        let mut params = vec![
            ("txHash", query.tx_hash.to_string()),
            ("fromChain", query.from_chain_id.to_string()),
            ("toChain", query.to_chain_id.to_string()),
        ];
        if let Some(bridge) = &query.bridge {
            params.push(("bridge", bridge.clone()));
        }
        let url = format!("{}/status", self.base_url);
        let response = self
            .authorized(self.client.get(&url).query(&params))
            .send()
            .await?;
        // The status endpoint answers 404 for hashes it has not indexed yet.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(StatusReport {
                status: TransferStatus::NotFound,
                substatus: None,
                receiving: None,
            });
        }
        let wire: WireStatus = handle_response("/status", response).await?;
        wire.try_into()
    }

    pub async fn fetch_chains(&self) -> Result<Vec<ChainSummary>, AdapterError> {
        let response: WireChains = self.get("/chains?chainTypes=EVM").await?;
        Ok(response
            .chains
            .into_iter()
            .map(|chain| ChainSummary {
                id: chain.id,
                key: chain.key,
                name: chain.name,
                native_token: chain.native_token.map(TokenInfo::from),
            })
            .collect())
    }

    pub async fn fetch_tokens(&self, chain_id: ChainId) -> Result<Vec<TokenInfo>, AdapterError> {
        let response: WireTokens = self.get(&format!("/tokens?chains={}", chain_id)).await?;
        Ok(response
            .tokens
            .get(&chain_id.to_string())
            .map(|tokens| tokens.iter().cloned().map(TokenInfo::from).collect())
            .unwrap_or_default())
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key),
            None => builder,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, AdapterError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.authorized(self.client.get(&url)).send().await?;
        handle_response(path, response).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, AdapterError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .authorized(self.client.post(&url).json(body))
            .send()
            .await?;
        handle_response(path, response).await
    }
}

async fn handle_response<T: DeserializeOwned>(
    endpoint: &str,
    response: reqwest::Response,
) -> Result<T, AdapterError> {
    let status = response.status();
    if status.is_success() {
        Ok(response.json().await?)
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(AdapterError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl BridgeAggregator for LiFiClient {
    async fn routes(&self, request: &RouteRequest) -> Result<Vec<Route>, VaultError> {
        self.fetch_routes(request)
            .await
            .map_err(AdapterError::into_aggregator)
    }

    async fn step_transaction(&self, step: &RouteStep) -> Result<StepTransaction, VaultError> {
        self.fetch_step_transaction(step)
            .await
            .map_err(AdapterError::into_aggregator)
    }

    async fn status(&self, query: &StatusQuery) -> Result<StatusReport, VaultError> {
        self.fetch_status(query)
            .await
            .map_err(AdapterError::into_aggregator)
    }

    async fn chains(&self) -> Result<Vec<ChainSummary>, VaultError> {
        self.fetch_chains().await.map_err(AdapterError::into_aggregator)
    }

    async fn tokens(&self, chain_id: ChainId) -> Result<Vec<TokenInfo>, VaultError> {
        self.fetch_tokens(chain_id)
            .await
            .map_err(AdapterError::into_aggregator)
    }
}

pub fn route_request_body(request: &RouteRequest) -> Value {
    json!({
        "fromChainId": request.from_chain_id,
        "fromAmount": request.from_amount.to_string(),
        "fromTokenAddress": request.from_token,
        "fromAddress": request.from_address,
        "toChainId": request.to_chain_id,
        "toTokenAddress": request.to_token,
        "toAddress": request.to_address,
        "options": {
            "integrator": request.integrator,
            "order": request.order.as_str(),
            "allowSwitchChain": request.allow_switch_chain,
        },
    })
}

fn parse_amount(field: &str, value: &str) -> Result<U256, AdapterError> {
    U256::from_str(value).map_err(|err| AdapterError::decode(format!("{field} '{value}': {err}")))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireToken {
    address: Address,
    chain_id: ChainId,
    #[serde(default)]
    decimals: u8,
    #[serde(default)]
    symbol: String,
}

impl From<WireToken> for TokenInfo {
    fn from(token: WireToken) -> Self {
        Self {
            chain_id: token.chain_id,
            address: token.address,
            decimals: token.decimals,
            symbol: token.symbol,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireRoutes {
    routes: Vec<WireRoute>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRoute {
    id: String,
    from_chain_id: ChainId,
    to_chain_id: ChainId,
    from_amount: String,
    to_amount: String,
    from_token: WireToken,
    to_token: WireToken,
    steps: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStep {
    id: String,
    tool: String,
    action: WireAction,
    estimate: WireEstimate,
    #[serde(default)]
    transaction_request: Option<WireTransactionRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAction {
    from_chain_id: ChainId,
    to_chain_id: ChainId,
    from_token: WireToken,
    to_token: WireToken,
    from_amount: String,
    #[serde(default)]
    from_address: Option<Address>,
    #[serde(default)]
    to_address: Option<Address>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEstimate {
    to_amount: String,
    #[serde(default)]
    approval_address: Option<Address>,
    #[serde(default)]
    execution_duration: f64,
}

#[derive(Debug, Deserialize)]
struct WireTransactionRequest {
    #[serde(default)]
    to: Option<Address>,
    #[serde(default)]
    data: Option<Bytes>,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireStatus {
    status: TransferStatus,
    #[serde(default)]
    substatus: Option<String>,
    #[serde(default)]
    receiving: Option<WireReceiving>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireReceiving {
    #[serde(default)]
    tx_hash: Option<B256>,
    #[serde(default)]
    amount: Option<String>,
    #[serde(default)]
    token: Option<WireToken>,
    #[serde(default)]
    chain_id: Option<ChainId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireChain {
    id: ChainId,
    key: String,
    name: String,
    #[serde(default)]
    native_token: Option<WireToken>,
}

#[derive(Debug, Deserialize)]
struct WireChains {
    chains: Vec<WireChain>,
}

#[derive(Debug, Deserialize)]
struct WireTokens {
    tokens: HashMap<String, Vec<WireToken>>,
}

fn step_from_value(raw: Value) -> Result<RouteStep, AdapterError> {
    let wire: WireStep = serde_json::from_value(raw.clone())
        .map_err(|err| AdapterError::decode(format!("route step: {err}")))?;
    Ok(RouteStep {
        id: wire.id,
        tool: wire.tool,
        action: StepAction {
            from_chain_id: wire.action.from_chain_id,
            to_chain_id: wire.action.to_chain_id,
            from_token: wire.action.from_token.into(),
            to_token: wire.action.to_token.into(),
            from_amount: parse_amount("action.fromAmount", &wire.action.from_amount)?,
            from_address: wire.action.from_address,
            to_address: wire.action.to_address,
        },
        estimate: StepEstimate {
            to_amount: parse_amount("estimate.toAmount", &wire.estimate.to_amount)?,
            approval_address: wire.estimate.approval_address,
            execution_duration_secs: wire.estimate.execution_duration.max(0.0).round() as u64,
        },
        raw,
    })
}

impl TryFrom<WireRoute> for Route {
    type Error = AdapterError;

    fn try_from(wire: WireRoute) -> Result<Self, Self::Error> {
        Ok(Self {
            from_amount: parse_amount("fromAmount", &wire.from_amount)?,
            to_amount: parse_amount("toAmount", &wire.to_amount)?,
            steps: wire
                .steps
                .into_iter()
                .map(step_from_value)
                .collect::<Result<_, _>>()?,
            id: wire.id,
            from_chain_id: wire.from_chain_id,
            to_chain_id: wire.to_chain_id,
            from_token: wire.from_token.into(),
            to_token: wire.to_token.into(),
        })
    }
}

fn step_transaction_from(step: WireStep) -> Result<StepTransaction, AdapterError> {
    let request = step.transaction_request;
    let value = match request.as_ref().and_then(|req| req.value.as_deref()) {
        Some(value) => parse_amount("transactionRequest.value", value)?,
        None => U256::ZERO,
    };
    Ok(StepTransaction {
        tool: step.tool,
        to: request.as_ref().and_then(|req| req.to),
        data: request.and_then(|req| req.data),
        value,
    })
}

impl TryFrom<WireStatus> for StatusReport {
    type Error = AdapterError;

    fn try_from(wire: WireStatus) -> Result<Self, Self::Error> {
        let receiving = match wire.receiving {
            Some(receiving) => Some(ReceivingInfo {
                chain_id: receiving.chain_id,
                tx_hash: receiving.tx_hash,
                amount: receiving
                    .amount
                    .as_deref()
                    .map(|amount| parse_amount("receiving.amount", amount))
                    .transpose()?,
                token: receiving.token.map(|token| token.address),
            }),
            None => None,
        };
        Ok(Self {
            status: wire.status,
            substatus: wire.substatus,
            receiving,
        })
    }
}
