use std::str::FromStr;

use alloy_primitives::utils::parse_units;
use alloy_primitives::{Address, Bytes, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::VaultError;

pub type ChainId = u64;
pub type TxHash = B256;
pub type OperationHash = B256;

/// The zero address stands in for a chain's native asset.
pub const NATIVE_TOKEN: Address = Address::ZERO;

pub fn is_native(token: Address) -> bool {
    token == NATIVE_TOKEN
}

/// Parses an integer amount already expressed in the token's smallest unit.
pub fn parse_minor_units(amount: &str) -> Result<U256, VaultError> {
    let trimmed = amount.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VaultError::InvalidAmount(format!(
            "'{}' is not a minor-unit integer",
            amount
        )));
    }
    U256::from_str(trimmed).map_err(|err| VaultError::InvalidAmount(err.to_string()))
}

/// Parses a human decimal amount (`"1.5"`) into minor units for a token with `decimals`.
pub fn parse_decimal_units(amount: &str, decimals: u8) -> Result<U256, VaultError> {
    let parsed = parse_units(amount.trim(), decimals)
        .map_err(|err| VaultError::InvalidAmount(format!("'{}': {}", amount, err)))?;
    if parsed.is_negative() {
        return Err(VaultError::InvalidAmount(format!(
            "'{}' is negative",
            amount
        )));
    }
    Ok(parsed.get_absolute())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    Deposit,
    Claim,
}

/// Request to move value between a source and a destination (chain, token) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferIntent {
    pub trace_id: String,
    pub from_chain_id: ChainId,
    pub from_token: Address,
    pub to_chain_id: ChainId,
    /// Canonical asset of the pool on the destination chain.
    pub to_token: Address,
    /// Smallest unit of the source token.
    pub amount: U256,
    pub direction: TransferDirection,
}

impl TransferIntent {
    pub fn deposit(
        from_chain_id: ChainId,
        from_token: Address,
        to_chain_id: ChainId,
        to_token: Address,
        amount: U256,
    ) -> Self {
        Self {
            trace_id: Uuid::new_v4().to_string(),
            from_chain_id,
            from_token,
            to_chain_id,
            to_token,
            amount,
            direction: TransferDirection::Deposit,
        }
    }

    /// Deposit whose amount is given as a decimal string of the source token.
    pub fn deposit_decimal(
        from_chain_id: ChainId,
        from_token: Address,
        from_decimals: u8,
        amount: &str,
        to_chain_id: ChainId,
        to_token: Address,
    ) -> Result<Self, VaultError> {
        let amount = parse_decimal_units(amount, from_decimals)?;
        Ok(Self::deposit(
            from_chain_id,
            from_token,
            to_chain_id,
            to_token,
            amount,
        ))
    }

    pub fn claim(
        from_chain_id: ChainId,
        from_token: Address,
        to_chain_id: ChainId,
        to_token: Address,
        amount: U256,
    ) -> Self {
        Self {
            direction: TransferDirection::Claim,
            ..Self::deposit(from_chain_id, from_token, to_chain_id, to_token, amount)
        }
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    pub fn is_cross_chain(&self) -> bool {
        self.from_chain_id != self.to_chain_id
    }
}

/// One contract interaction: target, native value and calldata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

impl Call {
    pub fn new(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            value: U256::ZERO,
            data: data.into(),
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    /// Plain native-asset transfer with empty calldata.
    pub fn native_transfer(to: Address, value: U256) -> Self {
        Self {
            to,
            value,
            data: Bytes::new(),
        }
    }
}

/// Ordered calls executed atomically as one user operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallBatch {
    calls: Vec<Call>,
}

impl CallBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, call: Call) -> &mut Self {
        self.calls.push(call);
        self
    }

    pub fn push_optional(&mut self, call: Option<Call>) -> &mut Self {
        if let Some(call) = call {
            self.calls.push(call);
        }
        self
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn total_value(&self) -> U256 {
        self.calls
            .iter()
            .fold(U256::ZERO, |acc, call| acc.saturating_add(call.value))
    }
}

impl From<Vec<Call>> for CallBatch {
    fn from(calls: Vec<Call>) -> Self {
        Self { calls }
    }
}

/// What a funding leg delivered to the smart account, ready to be staked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositResult {
    pub amount: U256,
    pub token: Address,
}

/// A stake position as returned by `getStakes`, addressed by its position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub token: Address,
    pub amount: U256,
    pub staked_at: DateTime<Utc>,
}

/// A receipt as the caller saw it, together with the ledger length at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptRef {
    pub receipt_id: u64,
    pub receipt: Receipt,
    pub ledger_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptSnapshot {
    pub account: Address,
    pub receipts: Vec<Receipt>,
    pub taken_at: DateTime<Utc>,
}

impl ReceiptSnapshot {
    pub fn new(account: Address, receipts: Vec<Receipt>) -> Self {
        Self {
            account,
            receipts,
            taken_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.receipts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receipts.is_empty()
    }

    pub fn get(&self, receipt_id: u64) -> Option<ReceiptRef> {
        let index = usize::try_from(receipt_id).ok()?;
        self.receipts.get(index).map(|receipt| ReceiptRef {
            receipt_id,
            receipt: receipt.clone(),
            ledger_len: self.receipts.len(),
        })
    }

    pub fn refs(&self) -> impl Iterator<Item = ReceiptRef> + '_ {
        (0..self.receipts.len() as u64).filter_map(|id| self.get(id))
    }
}

/// Counterfactual smart account owned by a signer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SmartAccount {
    pub signer: Address,
    pub address: Address,
}

/// Inclusion result of one user operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationReceipt {
    pub operation_hash: OperationHash,
    pub transaction_hash: TxHash,
    pub success: bool,
}
