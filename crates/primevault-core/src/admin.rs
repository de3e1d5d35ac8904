use std::collections::BTreeMap;

use alloy_primitives::Address;
use tracing::info;

use crate::abi;
use crate::chain::{ensure_network, send_and_confirm, SignerCaller};
use crate::error::VaultError;
use crate::types::{ChainId, TxHash};

/// Owner operations on the per-chain bridge executors, sent from the signer's wallet.
#[derive(Debug, Clone, Default)]
pub struct BridgeExecutorAdmin {
    executors: BTreeMap<ChainId, Address>,
}

impl BridgeExecutorAdmin {
    pub fn new(executors: BTreeMap<ChainId, Address>) -> Self {
        Self { executors }
    }

    pub fn executor(&self, chain_id: ChainId) -> Result<Address, VaultError> {
        self.executors
            .get(&chain_id)
            .copied()
            .ok_or(VaultError::UnsupportedChain(chain_id))
    }

    /// Points the executor at a new aggregator diamond.
    pub async fn set_lifi_diamond(
        &self,
        signer: &dyn SignerCaller,
        chain_id: ChainId,
        diamond: Address,
    ) -> Result<TxHash, VaultError> {
        if diamond == Address::ZERO {
            return Err(VaultError::InvariantViolation(
                "diamond address must not be zero".to_string(),
            ));
        }
        let executor = self.executor(chain_id)?;
        ensure_network(signer, chain_id).await?;
        let tx_hash =
            send_and_confirm(signer, chain_id, &abi::set_lifi_diamond(executor, diamond)).await?;
        info!(chain_id, %executor, %diamond, %tx_hash, "bridge executor diamond updated");
        Ok(tx_hash)
    }

    /// Sweeps `token` (zero address for native) held by the executor back to its owner.
    pub async fn emergency_withdraw(
        &self,
        signer: &dyn SignerCaller,
        chain_id: ChainId,
        token: Address,
    ) -> Result<TxHash, VaultError> {
        let executor = self.executor(chain_id)?;
        ensure_network(signer, chain_id).await?;
        let tx_hash =
            send_and_confirm(signer, chain_id, &abi::emergency_withdraw(executor, token)).await?;
        info!(chain_id, %executor, %token, %tx_hash, "bridge executor emergency withdrawal");
        Ok(tx_hash)
    }
}
