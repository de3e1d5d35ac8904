use std::sync::Arc;

use alloy_primitives::{Address, U256};
use tracing::debug;

use crate::abi;
use crate::allowance::AllowanceGuard;
use crate::chain::ChainReader;
use crate::error::VaultError;
use crate::types::{
    Call, CallBatch, ChainId, DepositResult, Receipt, ReceiptRef, ReceiptSnapshot,
};

/// Staking ledger contract on the main chain.
pub struct StakeLedger {
    address: Address,
    reader: Arc<dyn ChainReader>,
}

impl StakeLedger {
    pub fn new(address: Address, reader: Arc<dyn ChainReader>) -> Self {
        Self { address, reader }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn chain_id(&self) -> ChainId {
        self.reader.chain_id()
    }

    pub fn reader(&self) -> &Arc<dyn ChainReader> {
        &self.reader
    }

    pub async fn snapshot(&self, account: Address) -> Result<ReceiptSnapshot, VaultError> {
        let receipts = self.reader.stakes(self.address, account).await?;
        debug!(%account, receipts = receipts.len(), "receipt snapshot");
        Ok(ReceiptSnapshot::new(account, receipts))
    }

    /// Smart account's balance of a pool token that has not been staked yet.
    pub async fn pending_asset(&self, account: Address, token: Address) -> Result<U256, VaultError> {
        self.reader.balance(token, account).await
    }

    /// `[approve?][stake]` for the smart account staking `deposit`.
    pub async fn stake_batch(
        &self,
        account: Address,
        deposit: &DepositResult,
    ) -> Result<CallBatch, VaultError> {
        if deposit.amount.is_zero() {
            return Err(VaultError::InvalidAmount(
                "refusing to stake a zero amount".to_string(),
            ));
        }
        let approval = AllowanceGuard::new(self.reader.as_ref())
            .ensure(account, self.address, deposit.token, deposit.amount)
            .await?;

        let mut batch = CallBatch::new();
        batch
            .push_optional(approval)
            .push(abi::stake(self.address, deposit.token, deposit.amount));
        Ok(batch)
    }

    pub fn withdraw_call(&self, receipt_id: u64) -> Call {
        abi::withdraw(self.address, receipt_id)
    }

    /// Re-reads the ledger and confirms `expected` still sits at its position.
    ///
    /// Appends never move existing positions, so a longer ledger is fine; a shorter one or
    /// a different receipt at the index means positions shifted since the caller looked.
    pub async fn confirm_receipt(
        &self,
        account: Address,
        expected: &ReceiptRef,
    ) -> Result<Receipt, VaultError> {
        let fresh = self.snapshot(account).await?;
        let current = fresh
            .get(expected.receipt_id)
            .ok_or(VaultError::ReceiptNotFound {
                receipt_id: expected.receipt_id,
                available: fresh.len(),
            })?;

        if fresh.len() < expected.ledger_len {
            return Err(VaultError::StaleReceipt {
                receipt_id: expected.receipt_id,
                reason: format!(
                    "ledger shrank from {} to {} receipts",
                    expected.ledger_len,
                    fresh.len()
                ),
            });
        }
        if current.receipt != expected.receipt {
            return Err(VaultError::StaleReceipt {
                receipt_id: expected.receipt_id,
                reason: "receipt at this position changed".to_string(),
            });
        }
        Ok(current.receipt)
    }
}
