use std::sync::{Arc, Mutex, PoisonError};

use alloy_primitives::Address;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::VaultError;
use crate::types::{Call, CallBatch, ChainId, OperationHash, OperationReceipt, SmartAccount};

/// Account-abstraction infrastructure: counterfactual account derivation and the bundler.
#[async_trait]
pub trait AccountAbstractionProvider: Send + Sync {
    /// Chain the bundler submits to.
    fn chain_id(&self) -> ChainId;

    async fn create_account(&self, signer: Address) -> Result<SmartAccount, VaultError>;

    async fn submit_operation(
        &self,
        account: &SmartAccount,
        calls: &[Call],
    ) -> Result<OperationHash, VaultError>;

    async fn wait_for_receipt(
        &self,
        operation_hash: OperationHash,
    ) -> Result<OperationReceipt, VaultError>;
}

/// A smart account ready to execute batches.
#[async_trait]
pub trait SmartAccountCaller: Send + Sync {
    fn account(&self) -> SmartAccount;

    fn chain_id(&self) -> ChainId;

    /// Submits `batch` as one atomic user operation and waits for inclusion.
    async fn submit(&self, batch: CallBatch) -> Result<OperationReceipt, VaultError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyState {
    Uninitialized,
    Initializing,
    Ready,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub signer: Address,
    pub smart_account: Option<Address>,
    pub ready_state: ReadyState,
    pub last_error: Option<String>,
}

struct AccountSlot {
    account: OnceCell<SmartAccount>,
    status: Mutex<(ReadyState, Option<String>)>,
}

impl AccountSlot {
    fn new() -> Self {
        Self {
            account: OnceCell::new(),
            status: Mutex::new((ReadyState::Uninitialized, None)),
        }
    }

    fn set(&self, state: ReadyState, error: Option<String>) {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        *status = (state, error);
    }

    fn get(&self) -> (ReadyState, Option<String>) {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Owns the signer to smart-account mapping for the lifetime of the engine.
///
/// Each signer gets one slot holding a once-cell, so concurrent callers share a single
/// in-flight derivation. A failed derivation leaves the cell empty and the next call retries.
pub struct SmartAccountSession {
    provider: Arc<dyn AccountAbstractionProvider>,
    active_signer: Mutex<Option<Address>>,
    slots: DashMap<Address, Arc<AccountSlot>>,
}

impl SmartAccountSession {
    pub fn new(provider: Arc<dyn AccountAbstractionProvider>) -> Self {
        Self {
            provider,
            active_signer: Mutex::new(None),
            slots: DashMap::new(),
        }
    }

    pub fn chain_id(&self) -> ChainId {
        self.provider.chain_id()
    }

    pub fn connect(&self, signer: Address) {
        info!(%signer, "signer connected");
        *self
            .active_signer
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(signer);
    }

    /// Evicts the signer's cached account and clears it as active signer. A derivation
    /// still in flight for that signer resolves to `NotConnected`.
    pub fn disconnect(&self, signer: Address) {
        self.slots.remove(&signer);
        let mut active = self
            .active_signer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *active == Some(signer) {
            *active = None;
        }
        info!(%signer, "signer disconnected");
    }

    pub fn active_signer(&self) -> Option<Address> {
        *self
            .active_signer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self, signer: Address) -> SessionState {
        match self.slots.get(&signer) {
            Some(slot) => {
                let (ready_state, last_error) = slot.get();
                SessionState {
                    signer,
                    smart_account: slot.account.get().map(|account| account.address),
                    ready_state,
                    last_error,
                }
            }
            None => SessionState {
                signer,
                smart_account: None,
                ready_state: ReadyState::Uninitialized,
                last_error: None,
            },
        }
    }

    /// Smart account of the active signer.
    pub async fn ensure_account(&self) -> Result<SmartAccount, VaultError> {
        let signer = self
            .active_signer()
            .ok_or_else(|| VaultError::NotConnected("no signer connected".to_string()))?;
        self.ensure_account_for(signer).await
    }

    pub async fn ensure_account_for(&self, signer: Address) -> Result<SmartAccount, VaultError> {
        let slot = Arc::clone(
            self.slots
                .entry(signer)
                .or_insert_with(|| Arc::new(AccountSlot::new()))
                .value(),
        );

        if let Some(account) = slot.account.get() {
            debug!(%signer, account = %account.address, "smart account cached");
            return Ok(*account);
        }

        let account = slot
            .account
            .get_or_try_init(|| async {
                slot.set(ReadyState::Initializing, None);
                match self.provider.create_account(signer).await {
                    Ok(account) => {
                        slot.set(ReadyState::Ready, None);
                        info!(%signer, account = %account.address, "smart account derived");
                        Ok(account)
                    }
                    Err(err) => {
                        warn!(%signer, error = %err, "smart account derivation failed");
                        slot.set(ReadyState::Error, Some(err.to_string()));
                        Err(err)
                    }
                }
            })
            .await?;

        let still_cached = self
            .slots
            .get(&signer)
            .is_some_and(|current| Arc::ptr_eq(current.value(), &slot));
        if !still_cached {
            warn!(%signer, "signer disconnected while its account was being derived");
            return Err(VaultError::NotConnected(format!(
                "signer {} disconnected during account derivation",
                signer
            )));
        }
        Ok(*account)
    }

    /// Submits one user operation and waits for its inclusion.
    pub async fn submit(
        &self,
        account: &SmartAccount,
        batch: CallBatch,
    ) -> Result<OperationReceipt, VaultError> {
        if batch.is_empty() {
            return Err(VaultError::InvariantViolation(
                "refusing to submit an empty call batch".to_string(),
            ));
        }

        let operation_hash = self
            .provider
            .submit_operation(account, batch.calls())
            .await
            .map_err(VaultError::into_submission)?;
        debug!(account = %account.address, %operation_hash, calls = batch.len(), "user operation submitted");

        let receipt = self
            .provider
            .wait_for_receipt(operation_hash)
            .await
            .map_err(VaultError::into_submission)?;
        if !receipt.success {
            return Err(VaultError::SubmissionFailed(format!(
                "user operation {} reverted in {}",
                operation_hash, receipt.transaction_hash
            )));
        }

        info!(
            account = %account.address,
            %operation_hash,
            tx_hash = %receipt.transaction_hash,
            "user operation included"
        );
        Ok(receipt)
    }

    /// Binds the active signer's smart account to this session.
    pub async fn handle(self: &Arc<Self>) -> Result<BoundAccount, VaultError> {
        let account = self.ensure_account().await?;
        Ok(BoundAccount {
            session: Arc::clone(self),
            account,
        })
    }

    pub async fn handle_for(self: &Arc<Self>, signer: Address) -> Result<BoundAccount, VaultError> {
        let account = self.ensure_account_for(signer).await?;
        Ok(BoundAccount {
            session: Arc::clone(self),
            account,
        })
    }
}

/// Smart account bound to the session that derived it.
#[derive(Clone)]
pub struct BoundAccount {
    session: Arc<SmartAccountSession>,
    account: SmartAccount,
}

#[async_trait]
impl SmartAccountCaller for BoundAccount {
    fn account(&self) -> SmartAccount {
        self.account
    }

    fn chain_id(&self) -> ChainId {
        self.session.chain_id()
    }

    async fn submit(&self, batch: CallBatch) -> Result<OperationReceipt, VaultError> {
        self.session.submit(&self.account, batch).await
    }
}
