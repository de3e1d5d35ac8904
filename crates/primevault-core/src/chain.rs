use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::VaultError;
use crate::types::{is_native, Call, ChainId, Receipt, TxHash};

/// Read-only view of one EVM chain.
#[async_trait]
pub trait ChainReader: Send + Sync {
    fn chain_id(&self) -> ChainId;

    async fn native_balance(&self, owner: Address) -> Result<U256, VaultError>;

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, VaultError>;

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, VaultError>;

    /// `getStakes(account)` on the staking ledger at `ledger`.
    async fn stakes(&self, ledger: Address, account: Address) -> Result<Vec<Receipt>, VaultError>;

    async fn balance(&self, token: Address, owner: Address) -> Result<U256, VaultError> {
        if is_native(token) {
            self.native_balance(owner).await
        } else {
            self.token_balance(token, owner).await
        }
    }
}

/// The user's externally-owned wallet.
///
/// Every send names the chain it is meant for; implementations reject a send while the
/// wallet sits on a different chain instead of silently switching.
#[async_trait]
pub trait SignerCaller: Send + Sync {
    fn address(&self) -> Address;

    async fn active_chain(&self) -> Result<ChainId, VaultError>;

    async fn switch_chain(&self, chain_id: ChainId) -> Result<(), VaultError>;

    async fn send_call(&self, chain_id: ChainId, call: &Call) -> Result<TxHash, VaultError>;

    async fn wait_for_transaction(&self, chain_id: ChainId, tx_hash: TxHash)
        -> Result<(), VaultError>;
}

/// Switches the wallet to `chain_id` unless it is already there.
pub async fn ensure_network(signer: &dyn SignerCaller, chain_id: ChainId) -> Result<(), VaultError> {
    let current = signer.active_chain().await?;
    if current == chain_id {
        return Ok(());
    }
    info!(from_chain = current, to_chain = chain_id, "switching wallet network");
    signer
        .switch_chain(chain_id)
        .await
        .map_err(|err| match err {
            err @ VaultError::NetworkSwitch { .. } => err,
            other => VaultError::NetworkSwitch {
                chain_id,
                message: other.to_string(),
            },
        })
}

/// Sends one call from the wallet and waits until it is mined.
pub async fn send_and_confirm(
    signer: &dyn SignerCaller,
    chain_id: ChainId,
    call: &Call,
) -> Result<TxHash, VaultError> {
    let tx_hash = signer.send_call(chain_id, call).await?;
    debug!(chain_id, %tx_hash, to = %call.to, "transaction sent, waiting for inclusion");
    signer.wait_for_transaction(chain_id, tx_hash).await?;
    Ok(tx_hash)
}

/// Chain readers keyed by chain id.
#[derive(Default, Clone)]
pub struct ChainRegistry {
    readers: HashMap<ChainId, Arc<dyn ChainReader>>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self {
            readers: HashMap::new(),
        }
    }

    pub fn register(&mut self, reader: Arc<dyn ChainReader>) {
        self.readers.insert(reader.chain_id(), reader);
    }

    pub fn with_reader(mut self, reader: Arc<dyn ChainReader>) -> Self {
        self.register(reader);
        self
    }

    pub fn get(&self, chain_id: ChainId) -> Result<Arc<dyn ChainReader>, VaultError> {
        self.readers
            .get(&chain_id)
            .cloned()
            .ok_or(VaultError::UnsupportedChain(chain_id))
    }

    pub fn has(&self, chain_id: ChainId) -> bool {
        self.readers.contains_key(&chain_id)
    }

    pub fn chain_ids(&self) -> Vec<ChainId> {
        let mut ids: Vec<_> = self.readers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
