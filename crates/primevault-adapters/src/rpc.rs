use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use primevault_core::abi::{IStakingLedger, IERC20};
use primevault_core::{ChainId, ChainReader, Receipt, VaultError};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::trace;

use crate::error::AdapterError;

/// Reads balances, allowances and stakes over plain EVM JSON-RPC.
pub struct JsonRpcChainReader {
    client: Client,
    url: String,
    chain_id: ChainId,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

impl JsonRpcChainReader {
    pub fn new(chain_id: ChainId, url: &str, timeout: Duration) -> Result<Self, AdapterError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            chain_id,
            next_id: AtomicU64::new(1),
        })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, AdapterError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        trace!(chain_id = self.chain_id, method, id, "json-rpc request");

        let response = self.client.post(&self.url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::Status {
                endpoint: method.to_string(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let decoded: RpcResponse<T> = response.json().await?;
        unwrap_rpc(decoded)
    }

    async fn call(&self, to: Address, data: Vec<u8>) -> Result<Bytes, AdapterError> {
        self.request(
            "eth_call",
            json!([{ "to": to, "data": Bytes::from(data) }, "latest"]),
        )
        .await
    }
}

fn unwrap_rpc<T>(response: RpcResponse<T>) -> Result<T, AdapterError> {
    match (response.result, response.error) {
        (_, Some(error)) => Err(AdapterError::Rpc {
            code: error.code,
            message: error.message,
        }),
        (Some(result), None) => Ok(result),
        (None, None) => Err(AdapterError::decode("response has neither result nor error")),
    }
}

fn decode_uint(data: &[u8]) -> Result<U256, AdapterError> {
    IERC20::balanceOfCall::abi_decode_returns(data)
        .map_err(|err| AdapterError::decode(format!("uint256 return: {err}")))
}

fn decode_stakes(data: &[u8]) -> Result<Vec<Receipt>, AdapterError> {
    let stakes = IStakingLedger::getStakesCall::abi_decode_returns(data)
        .map_err(|err| AdapterError::decode(format!("getStakes return: {err}")))?;
    Ok(stakes.into_iter().map(Receipt::from).collect())
}

#[async_trait]
impl ChainReader for JsonRpcChainReader {
    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    async fn native_balance(&self, owner: Address) -> Result<U256, VaultError> {
        self.request("eth_getBalance", json!([owner, "latest"]))
            .await
            .map_err(|err| err.into_chain(self.chain_id))
    }

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, VaultError> {
        let data = IERC20::balanceOfCall { owner }.abi_encode();
        let raw = self
            .call(token, data)
            .await
            .map_err(|err| err.into_chain(self.chain_id))?;
        decode_uint(&raw).map_err(|err| err.into_chain(self.chain_id))
    }

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, VaultError> {
        let data = IERC20::allowanceCall { owner, spender }.abi_encode();
        let raw = self
            .call(token, data)
            .await
            .map_err(|err| err.into_chain(self.chain_id))?;
        decode_uint(&raw).map_err(|err| err.into_chain(self.chain_id))
    }

    async fn stakes(&self, ledger: Address, account: Address) -> Result<Vec<Receipt>, VaultError> {
        let data = IStakingLedger::getStakesCall { account }.abi_encode();
        let raw = self
            .call(ledger, data)
            .await
            .map_err(|err| err.into_chain(self.chain_id))?;
        decode_stakes(&raw).map_err(|err| err.into_chain(self.chain_id))
    }
}
