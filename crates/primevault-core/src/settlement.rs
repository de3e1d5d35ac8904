use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, U256};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::aggregator::{BridgeAggregator, StatusQuery, StatusReport, TransferStatus};
use crate::error::VaultError;
use crate::types::{ChainId, TxHash};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 360;

/// `DONE` substatuses under which the requested asset never arrived.
const UNDELIVERED_SUBSTATUSES: [&str; 2] = ["REFUNDED", "PARTIAL"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementPolicy {
    pub poll_interval: Duration,
    pub max_attempts: u32,
    /// Wall-clock bound across all polls, on top of the attempt bound.
    pub deadline: Option<Duration>,
}

impl Default for SettlementPolicy {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            deadline: None,
        }
    }
}

/// Terminal `DONE` report for a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementOutcome {
    pub tx_hash: TxHash,
    pub report: StatusReport,
    pub attempts: u32,
    pub elapsed: Duration,
}

impl SettlementOutcome {
    /// Destination amount, or `SettlementDataMissing` when the report carried none.
    pub fn received_amount(&self) -> Result<U256, VaultError> {
        self.report
            .receiving
            .as_ref()
            .and_then(|receiving| receiving.amount)
            .ok_or(VaultError::SettlementDataMissing {
                tx_hash: self.tx_hash,
            })
    }

    pub fn received_token(&self) -> Option<Address> {
        self.report
            .receiving
            .as_ref()
            .and_then(|receiving| receiving.token)
    }

    pub fn received_chain_id(&self) -> Option<ChainId> {
        self.report
            .receiving
            .as_ref()
            .and_then(|receiving| receiving.chain_id)
    }

    /// Fails with `SettlementFailed` when the transfer finished as a refund or a partial
    /// fill rather than delivering what was asked for.
    pub fn ensure_completed(&self) -> Result<(), VaultError> {
        match self.report.substatus.as_deref() {
            Some(substatus) if UNDELIVERED_SUBSTATUSES.contains(&substatus) => {
                Err(VaultError::SettlementFailed {
                    tx_hash: self.tx_hash,
                    detail: format!("transfer finished {}", substatus),
                })
            }
            _ => Ok(()),
        }
    }

    /// Checks that `token` landed on `chain_id`. Fields the report leaves out are not
    /// held against it.
    pub fn ensure_delivered(&self, chain_id: ChainId, token: Address) -> Result<(), VaultError> {
        self.ensure_completed()?;
        if let Some(received_chain) = self.received_chain_id().filter(|id| *id != chain_id) {
            return Err(VaultError::InvariantViolation(format!(
                "transfer {} settled on chain {} instead of {}",
                self.tx_hash, received_chain, chain_id
            )));
        }
        if let Some(received_token) = self.received_token().filter(|t| *t != token) {
            return Err(VaultError::InvariantViolation(format!(
                "transfer {} delivered {} instead of {}",
                self.tx_hash, received_token, token
            )));
        }
        Ok(())
    }
}

/// Polls the aggregator's status endpoint until a transfer reaches a terminal state.
///
/// The first poll is immediate; each further poll follows one `poll_interval`. Dropping
/// the returned future abandons the wait without touching the transfer itself.
pub struct SettlementWaiter {
    aggregator: Arc<dyn BridgeAggregator>,
    policy: SettlementPolicy,
}

impl SettlementWaiter {
    pub fn new(aggregator: Arc<dyn BridgeAggregator>, policy: SettlementPolicy) -> Self {
        Self { aggregator, policy }
    }

    pub fn policy(&self) -> SettlementPolicy {
        self.policy
    }

    pub async fn wait(&self, query: &StatusQuery) -> Result<SettlementOutcome, VaultError> {
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let report = self.aggregator.status(query).await?;
            debug!(
                tx_hash = %query.tx_hash,
                attempt = attempts,
                status = ?report.status,
                substatus = report.substatus.as_deref().unwrap_or_default(),
                "settlement status"
            );

            match report.status {
                TransferStatus::Done => {
                    let elapsed = started.elapsed();
                    info!(tx_hash = %query.tx_hash, attempts, ?elapsed, "transfer settled");
                    return Ok(SettlementOutcome {
                        tx_hash: query.tx_hash,
                        report,
                        attempts,
                        elapsed,
                    });
                }
                TransferStatus::Failed | TransferStatus::Invalid => {
                    warn!(tx_hash = %query.tx_hash, status = ?report.status, "transfer failed");
                    return Err(VaultError::SettlementFailed {
                        tx_hash: query.tx_hash,
                        detail: report
                            .substatus
                            .unwrap_or_else(|| format!("{:?}", report.status)),
                    });
                }
                TransferStatus::Pending | TransferStatus::NotFound => {}
            }

            let next_poll_at = started.elapsed() + self.policy.poll_interval;
            let past_deadline = self
                .policy
                .deadline
                .is_some_and(|deadline| next_poll_at > deadline);
            if attempts >= self.policy.max_attempts || past_deadline {
                warn!(tx_hash = %query.tx_hash, attempts, "settlement wait exhausted");
                return Err(VaultError::SettlementTimeout {
                    tx_hash: query.tx_hash,
                    attempts,
                });
            }

            sleep(self.policy.poll_interval).await;
        }
    }
}
