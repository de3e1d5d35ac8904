use std::collections::BTreeMap;
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::abi;
use crate::account::SmartAccountCaller;
use crate::aggregator::{RouteExecutor, StatusQuery};
use crate::allowance::AllowanceGuard;
use crate::chain::{ensure_network, send_and_confirm, ChainReader, ChainRegistry, SignerCaller};
use crate::error::VaultError;
use crate::flow::{FlowStage, FlowTracker};
use crate::ledger::StakeLedger;
use crate::route::{RouteDestination, RouteResolver, RouteSource};
use crate::settlement::SettlementWaiter;
use crate::types::{
    ChainId, DepositResult, OperationReceipt, TransferDirection, TransferIntent, TxHash,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositPath {
    /// Pool asset already on the main chain; a plain transfer funds the smart account.
    Direct,
    /// Main chain, different token; swapped into the pool asset first.
    SameChainSwap,
    /// Any other chain; bridged through that chain's executor.
    CrossChain,
}

pub fn classify_deposit(
    from_chain_id: ChainId,
    from_token: Address,
    pool_token: Address,
    main_chain_id: ChainId,
) -> DepositPath {
    if from_chain_id != main_chain_id {
        DepositPath::CrossChain
    } else if from_token == pool_token {
        DepositPath::Direct
    } else {
        DepositPath::SameChainSwap
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositOutcome {
    pub trace_id: String,
    pub path: DepositPath,
    /// What reached the smart account and got staked.
    pub funded: DepositResult,
    pub funding_tx: Option<TxHash>,
    pub stake: OperationReceipt,
    pub stages: Vec<FlowStage>,
}

struct Funding {
    result: DepositResult,
    tx_hash: Option<TxHash>,
}

/// Drives a deposit from the user's wallet into the staking pool on the main chain.
pub struct DepositOrchestrator {
    chains: Arc<ChainRegistry>,
    ledger: Arc<StakeLedger>,
    bridge_executors: BTreeMap<ChainId, Address>,
    resolver: Arc<RouteResolver>,
    route_executor: Arc<dyn RouteExecutor>,
    waiter: Arc<SettlementWaiter>,
}

impl DepositOrchestrator {
    pub fn new(
        chains: Arc<ChainRegistry>,
        ledger: Arc<StakeLedger>,
        bridge_executors: BTreeMap<ChainId, Address>,
        resolver: Arc<RouteResolver>,
        route_executor: Arc<dyn RouteExecutor>,
        waiter: Arc<SettlementWaiter>,
    ) -> Self {
        Self {
            chains,
            ledger,
            bridge_executors,
            resolver,
            route_executor,
            waiter,
        }
    }

    pub fn main_chain_id(&self) -> ChainId {
        self.ledger.chain_id()
    }

    pub async fn deposit(
        &self,
        intent: &TransferIntent,
        signer: &dyn SignerCaller,
        account: &dyn SmartAccountCaller,
    ) -> Result<DepositOutcome, VaultError> {
        let main_chain_id = self.main_chain_id();
        self.validate(intent, main_chain_id)?;

        let mut flow = FlowTracker::new(intent.trace_id.clone());
        match self.run(intent, signer, account, &mut flow).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                warn!(
                    trace_id = %intent.trace_id,
                    stage = flow.stage().name(),
                    error = %err,
                    "deposit aborted"
                );
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        intent: &TransferIntent,
        signer: &dyn SignerCaller,
        account: &dyn SmartAccountCaller,
        flow: &mut FlowTracker,
    ) -> Result<DepositOutcome, VaultError> {
        let main_chain_id = self.main_chain_id();
        let path = classify_deposit(
            intent.from_chain_id,
            intent.from_token,
            intent.to_token,
            main_chain_id,
        );
        flow.mark_classified()?;
        info!(
            trace_id = %intent.trace_id,
            ?path,
            from_chain = intent.from_chain_id,
            from_token = %intent.from_token,
            pool_token = %intent.to_token,
            amount = %intent.amount,
            "deposit classified"
        );

        let smart_account = account.account().address;
        let funding = match path {
            DepositPath::Direct => self.fund_direct(intent, signer, smart_account).await?,
            DepositPath::SameChainSwap => self.fund_swap(intent, signer, smart_account).await?,
            DepositPath::CrossChain => {
                self.fund_cross_chain(intent, signer, smart_account).await?
            }
        };
        flow.mark_funded()?;
        info!(
            trace_id = %intent.trace_id,
            amount = %funding.result.amount,
            token = %funding.result.token,
            "smart account funded"
        );

        ensure_network(signer, main_chain_id).await?;
        let batch = self.ledger.stake_batch(smart_account, &funding.result).await?;
        let stake = account.submit(batch).await?;
        flow.mark_submitted()?;
        flow.mark_completed()?;
        info!(
            trace_id = %intent.trace_id,
            operation_hash = %stake.operation_hash,
            tx_hash = %stake.transaction_hash,
            "deposit staked"
        );

        Ok(DepositOutcome {
            trace_id: intent.trace_id.clone(),
            path,
            funded: funding.result,
            funding_tx: funding.tx_hash,
            stake,
            stages: flow.stages().to_vec(),
        })
    }

    fn validate(&self, intent: &TransferIntent, main_chain_id: ChainId) -> Result<(), VaultError> {
        if intent.direction != TransferDirection::Deposit {
            return Err(VaultError::InvariantViolation(format!(
                "intent {} is not a deposit",
                intent.trace_id
            )));
        }
        if intent.amount.is_zero() {
            return Err(VaultError::InvalidAmount("deposit amount is zero".to_string()));
        }
        if intent.to_chain_id != main_chain_id {
            return Err(VaultError::UnsupportedChain(intent.to_chain_id));
        }
        Ok(())
    }

    async fn fund_direct(
        &self,
        intent: &TransferIntent,
        signer: &dyn SignerCaller,
        smart_account: Address,
    ) -> Result<Funding, VaultError> {
        let main_chain_id = self.main_chain_id();
        ensure_network(signer, main_chain_id).await?;
        let call = abi::transfer(intent.from_token, smart_account, intent.amount);
        let tx_hash = send_and_confirm(signer, main_chain_id, &call).await?;
        Ok(Funding {
            result: DepositResult {
                amount: intent.amount,
                token: intent.to_token,
            },
            tx_hash: Some(tx_hash),
        })
    }

    async fn fund_swap(
        &self,
        intent: &TransferIntent,
        signer: &dyn SignerCaller,
        smart_account: Address,
    ) -> Result<Funding, VaultError> {
        let main_chain_id = self.main_chain_id();
        let route = self
            .resolver
            .require(
                &RouteSource {
                    chain_id: main_chain_id,
                    token: intent.from_token,
                    amount: intent.amount,
                    address: signer.address(),
                },
                &RouteDestination {
                    chain_id: main_chain_id,
                    token: intent.to_token,
                    address: smart_account,
                },
            )
            .await?;

        let reader = self.chains.get(main_chain_id)?;
        let before = reader.balance(intent.to_token, smart_account).await?;

        ensure_network(signer, main_chain_id).await?;
        let executed = self.route_executor.execute_route(&route, signer).await?;
        if executed.to_token != intent.to_token {
            return Err(VaultError::InvariantViolation(format!(
                "route {} delivered {} instead of pool token {}",
                route.id, executed.to_token, intent.to_token
            )));
        }

        let amount = match executed.to_amount.filter(|amount| !amount.is_zero()) {
            Some(amount) => amount,
            None => {
                warn!(
                    trace_id = %intent.trace_id,
                    route_id = %route.id,
                    "swap reported no amount, using balance delta"
                );
                balance_delta(reader.as_ref(), intent.to_token, smart_account, before).await?
            }
        };

        Ok(Funding {
            result: DepositResult {
                amount,
                token: intent.to_token,
            },
            tx_hash: executed.tx_hashes.last().copied(),
        })
    }

    async fn fund_cross_chain(
        &self,
        intent: &TransferIntent,
        signer: &dyn SignerCaller,
        smart_account: Address,
    ) -> Result<Funding, VaultError> {
        let main_chain_id = self.main_chain_id();
        let source_chain_id = intent.from_chain_id;
        let executor = *self
            .bridge_executors
            .get(&source_chain_id)
            .ok_or(VaultError::UnsupportedChain(source_chain_id))?;
        let source_reader = self.chains.get(source_chain_id)?;
        let main_reader = self.chains.get(main_chain_id)?;

        let route = self
            .resolver
            .require(
                &RouteSource {
                    chain_id: source_chain_id,
                    token: intent.from_token,
                    amount: intent.amount,
                    address: executor,
                },
                &RouteDestination {
                    chain_id: main_chain_id,
                    token: intent.to_token,
                    address: smart_account,
                },
            )
            .await?;
        let step = route.first_step()?;
        let step_tx = self.resolver.aggregator().step_transaction(step).await?;
        let (_, calldata) = step_tx.target()?;

        let before = main_reader.balance(intent.to_token, smart_account).await?;

        ensure_network(signer, source_chain_id).await?;
        let approval = AllowanceGuard::new(source_reader.as_ref())
            .ensure(signer.address(), executor, intent.from_token, route.from_amount)
            .await?;
        if let Some(approve) = approval {
            info!(trace_id = %intent.trace_id, %executor, "approving bridge executor");
            send_and_confirm(signer, source_chain_id, &approve).await?;
        }

        let execute = abi::bridge_execute(executor, calldata, step_tx.value);
        let tx_hash = send_and_confirm(signer, source_chain_id, &execute).await?;
        info!(
            trace_id = %intent.trace_id,
            %tx_hash,
            tool = %step.tool,
            eta_secs = route.estimated_duration_secs(),
            "bridge transfer sent"
        );

        let outcome = self
            .waiter
            .wait(&StatusQuery {
                tx_hash,
                bridge: Some(step.tool.clone()),
                from_chain_id: source_chain_id,
                to_chain_id: main_chain_id,
            })
            .await?;
        outcome.ensure_delivered(main_chain_id, intent.to_token)?;

        let amount = match outcome.received_amount() {
            Ok(amount) if !amount.is_zero() => amount,
            Ok(_) | Err(VaultError::SettlementDataMissing { .. }) => {
                warn!(
                    trace_id = %intent.trace_id,
                    %tx_hash,
                    "settlement carried no amount, using balance delta"
                );
                balance_delta(main_reader.as_ref(), intent.to_token, smart_account, before)
                    .await?
            }
            Err(err) => return Err(err),
        };

        Ok(Funding {
            result: DepositResult {
                amount,
                token: intent.to_token,
            },
            tx_hash: Some(tx_hash),
        })
    }
}

/// Growth of `owner`'s balance since `before`; zero growth means nothing arrived.
async fn balance_delta(
    reader: &dyn ChainReader,
    token: Address,
    owner: Address,
    before: U256,
) -> Result<U256, VaultError> {
    let after = reader.balance(token, owner).await?;
    let delta = after.saturating_sub(before);
    if delta.is_zero() {
        return Err(VaultError::InvalidAmount(format!(
            "no {} balance arrived at {}",
            token, owner
        )));
    }
    Ok(delta)
}
