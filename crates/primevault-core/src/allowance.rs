use alloy_primitives::{Address, U256};
use tracing::debug;

use crate::abi;
use crate::chain::ChainReader;
use crate::error::VaultError;
use crate::types::{is_native, Call};

/// Decides whether a spender needs an approval before pulling `required` of a token.
pub struct AllowanceGuard<'a> {
    reader: &'a dyn ChainReader,
}

impl<'a> AllowanceGuard<'a> {
    pub fn new(reader: &'a dyn ChainReader) -> Self {
        Self { reader }
    }

    /// Returns the approval call to place first in the batch, or `None` when the current
    /// allowance already covers `required` or the token is native.
    pub async fn ensure(
        &self,
        owner: Address,
        spender: Address,
        token: Address,
        required: U256,
    ) -> Result<Option<Call>, VaultError> {
        if is_native(token) {
            return Ok(None);
        }

        let current = self
            .reader
            .allowance(token, owner, spender)
            .await
            .map_err(|err| VaultError::AllowanceCheckFailed {
                token,
                message: err.to_string(),
            })?;

        if current >= required {
            debug!(%token, %owner, %spender, %current, "allowance sufficient");
            return Ok(None);
        }

        debug!(%token, %owner, %spender, %current, %required, "approval required");
        Ok(Some(abi::approve_max(token, spender)))
    }
}
