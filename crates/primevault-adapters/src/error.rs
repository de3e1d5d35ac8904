use primevault_core::{ChainId, VaultError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Decode error: {0}")]
    Decode(String),
}

impl AdapterError {
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    pub fn into_aggregator(self) -> VaultError {
        VaultError::Aggregator(self.to_string())
    }

    pub fn into_chain(self, chain_id: ChainId) -> VaultError {
        VaultError::chain(chain_id, self.to_string())
    }
}
