use std::sync::Arc;

use alloy_primitives::Address;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::abi;
use crate::account::SmartAccountCaller;
use crate::aggregator::StatusQuery;
use crate::allowance::AllowanceGuard;
use crate::chain::{ensure_network, SignerCaller};
use crate::error::VaultError;
use crate::flow::{FlowStage, FlowTracker};
use crate::ledger::StakeLedger;
use crate::route::{RouteDestination, RouteResolver, RouteSource};
use crate::settlement::{SettlementOutcome, SettlementWaiter};
use crate::types::{
    Call, CallBatch, ChainId, OperationReceipt, Receipt, ReceiptRef, TransferIntent,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimPath {
    /// Principal goes back to the signer on the main chain in the staked token.
    Local,
    /// Principal is swapped and/or bridged on its way out.
    Routed,
}

pub fn classify_claim(
    receipt_token: Address,
    to_chain_id: ChainId,
    to_token: Address,
    main_chain_id: ChainId,
) -> ClaimPath {
    if to_chain_id == main_chain_id && to_token == receipt_token {
        ClaimPath::Local
    } else {
        ClaimPath::Routed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRequest {
    /// Receipt as the caller last saw it in a snapshot.
    pub receipt: ReceiptRef,
    pub to_chain_id: ChainId,
    pub to_token: Address,
    /// Poll the aggregator until the routed transfer lands.
    pub await_settlement: bool,
}

impl ClaimRequest {
    pub fn new(receipt: ReceiptRef, to_chain_id: ChainId, to_token: Address) -> Self {
        Self {
            receipt,
            to_chain_id,
            to_token,
            await_settlement: false,
        }
    }

    pub fn awaiting_settlement(mut self) -> Self {
        self.await_settlement = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimResult {
    pub trace_id: String,
    pub path: ClaimPath,
    pub receipt: Receipt,
    pub operation: OperationReceipt,
    pub settlement: Option<SettlementOutcome>,
    pub stages: Vec<FlowStage>,
}

/// Withdraws a staked receipt and sends the principal to the signer, optionally routed to
/// another chain or token.
///
/// Claims for the same smart account run one at a time, since a withdrawal can shift the
/// positions of the receipts behind it.
pub struct ClaimOrchestrator {
    ledger: Arc<StakeLedger>,
    resolver: Arc<RouteResolver>,
    waiter: Arc<SettlementWaiter>,
    locks: DashMap<Address, Arc<Mutex<()>>>,
}

impl ClaimOrchestrator {
    pub fn new(
        ledger: Arc<StakeLedger>,
        resolver: Arc<RouteResolver>,
        waiter: Arc<SettlementWaiter>,
    ) -> Self {
        Self {
            ledger,
            resolver,
            waiter,
            locks: DashMap::new(),
        }
    }

    fn account_lock(&self, account: Address) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .entry(account)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    pub async fn claim(
        &self,
        request: &ClaimRequest,
        signer: &dyn SignerCaller,
        account: &dyn SmartAccountCaller,
    ) -> Result<ClaimResult, VaultError> {
        let main_chain_id = self.ledger.chain_id();
        let smart_account = account.account().address;
        let lock = self.account_lock(smart_account);
        let _guard = lock.lock().await;

        let receipt = self
            .ledger
            .confirm_receipt(smart_account, &request.receipt)
            .await?;
        let intent = TransferIntent::claim(
            main_chain_id,
            receipt.token,
            request.to_chain_id,
            request.to_token,
            receipt.amount,
        );

        let mut flow = FlowTracker::new(intent.trace_id.clone());
        match self.run(request, &receipt, signer, account, &mut flow).await {
            Ok((path, operation, settlement)) => Ok(ClaimResult {
                trace_id: intent.trace_id,
                path,
                receipt,
                operation,
                settlement,
                stages: flow.stages().to_vec(),
            }),
            Err(err) => {
                warn!(
                    trace_id = %intent.trace_id,
                    receipt_id = request.receipt.receipt_id,
                    stage = flow.stage().name(),
                    error = %err,
                    "claim aborted"
                );
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        request: &ClaimRequest,
        receipt: &Receipt,
        signer: &dyn SignerCaller,
        account: &dyn SmartAccountCaller,
        flow: &mut FlowTracker,
    ) -> Result<(ClaimPath, OperationReceipt, Option<SettlementOutcome>), VaultError> {
        let main_chain_id = self.ledger.chain_id();
        let smart_account = account.account().address;
        let path = classify_claim(
            receipt.token,
            request.to_chain_id,
            request.to_token,
            main_chain_id,
        );
        flow.mark_classified()?;
        info!(
            trace_id = %flow.trace_id(),
            receipt_id = request.receipt.receipt_id,
            ?path,
            token = %receipt.token,
            amount = %receipt.amount,
            to_chain = request.to_chain_id,
            "claim classified"
        );

        let withdraw = self.ledger.withdraw_call(request.receipt.receipt_id);
        let (batch, bridge) = match path {
            ClaimPath::Local => {
                let mut batch = CallBatch::new();
                batch.push(withdraw).push(abi::transfer(
                    receipt.token,
                    signer.address(),
                    receipt.amount,
                ));
                (batch, None)
            }
            ClaimPath::Routed => {
                let route = self
                    .resolver
                    .require(
                        &RouteSource {
                            chain_id: main_chain_id,
                            token: receipt.token,
                            amount: receipt.amount,
                            address: smart_account,
                        },
                        &RouteDestination {
                            chain_id: request.to_chain_id,
                            token: request.to_token,
                            address: signer.address(),
                        },
                    )
                    .await?;
                let step = route.first_step()?;
                let step_tx = self.resolver.aggregator().step_transaction(step).await?;
                if !step_tx.value.is_zero() {
                    return Err(VaultError::UnsupportedRoute(format!(
                        "route {} requires {} native value from the smart account",
                        route.id, step_tx.value
                    )));
                }
                let (target, calldata) = step_tx.target()?;

                let spender = step.estimate.approval_address.unwrap_or(target);
                let approval = AllowanceGuard::new(self.ledger.reader().as_ref())
                    .ensure(
                        smart_account,
                        spender,
                        step.action.from_token.address,
                        step.action.from_amount,
                    )
                    .await?;

                let mut batch = CallBatch::new();
                batch
                    .push_optional(approval)
                    .push(withdraw)
                    .push(Call::new(target, calldata));
                (batch, Some(step.tool.clone()))
            }
        };

        ensure_network(signer, main_chain_id).await?;
        let operation = account.submit(batch).await?;
        flow.mark_submitted()?;
        info!(
            trace_id = %flow.trace_id(),
            operation_hash = %operation.operation_hash,
            tx_hash = %operation.transaction_hash,
            "claim submitted"
        );

        let settlement = if path == ClaimPath::Routed && request.await_settlement {
            let outcome = self
                .waiter
                .wait(&StatusQuery {
                    tx_hash: operation.transaction_hash,
                    bridge,
                    from_chain_id: main_chain_id,
                    to_chain_id: request.to_chain_id,
                })
                .await?;
            outcome.ensure_delivered(request.to_chain_id, request.to_token)?;
            flow.mark_settled()?;
            Some(outcome)
        } else {
            None
        };
        flow.mark_completed()?;

        Ok((path, operation, settlement))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::SmartAccountSession;
    use crate::aggregator::StatusReport;
    use crate::chain::ChainReader;
    use crate::settlement::SettlementPolicy;
    use crate::testkit::{
        route_between, step_transaction, FakeAccountProvider, FakeAggregator, FakeChain,
        FakeSigner,
    };
    use alloy_primitives::U256;
    use chrono::Utc;

    const MAIN: ChainId = 80094;
    const ARBITRUM: ChainId = 42161;
    const LEDGER: Address = Address::repeat_byte(0x1e);
    const SIGNER: Address = Address::repeat_byte(0x5a);
    const WETH: Address = Address::repeat_byte(0x3e);
    const ARB_WETH: Address = Address::repeat_byte(0x3f);
    const DIAMOND: Address = Address::repeat_byte(0xd1);

    struct Harness {
        main: Arc<FakeChain>,
        aggregator: Arc<FakeAggregator>,
        provider: Arc<FakeAccountProvider>,
        session: Arc<SmartAccountSession>,
        signer: FakeSigner,
        orchestrator: ClaimOrchestrator,
    }

    impl Harness {
        fn new(stakes: Vec<Receipt>) -> Self {
            Self::with_provider(stakes, FakeAccountProvider::new(MAIN))
        }

        fn with_provider(stakes: Vec<Receipt>, provider: FakeAccountProvider) -> Self {
            let main = Arc::new(FakeChain::new(MAIN));
            main.set_stakes(stakes);
            let aggregator = Arc::new(FakeAggregator::new());
            let provider = Arc::new(provider);
            let orchestrator = ClaimOrchestrator::new(
                Arc::new(StakeLedger::new(LEDGER, main.clone())),
                Arc::new(RouteResolver::new(aggregator.clone(), "prime-vault-testnet")),
                Arc::new(SettlementWaiter::new(
                    aggregator.clone(),
                    SettlementPolicy::default(),
                )),
            );
            Self {
                session: Arc::new(SmartAccountSession::new(provider.clone())),
                main,
                aggregator,
                provider,
                signer: FakeSigner::new(SIGNER, MAIN),
                orchestrator,
            }
        }

        async fn seen(&self, receipt_id: u64) -> ReceiptRef {
            let account = FakeAccountProvider::account_for(SIGNER).address;
            let receipts = self.main.stakes(LEDGER, account).await.unwrap();
            crate::types::ReceiptSnapshot::new(account, receipts)
                .get(receipt_id)
                .unwrap()
        }
    }

    fn weth_receipt(amount: u64) -> Receipt {
        Receipt {
            token: WETH,
            amount: U256::from(amount),
            staked_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn local_claim_withdraws_and_transfers_to_signer() {
        let h = Harness::new(vec![weth_receipt(7), weth_receipt(9)]);
        let bound = h.session.handle_for(SIGNER).await.unwrap();
        let request = ClaimRequest::new(h.seen(1).await, MAIN, WETH);

        let result = h.orchestrator.claim(&request, &h.signer, &bound).await.unwrap();

        assert_eq!(result.path, ClaimPath::Local);
        assert!(result.settlement.is_none());
        assert_eq!(
            result.stages,
            vec![
                FlowStage::Classified,
                FlowStage::Submitted,
                FlowStage::Completed
            ]
        );
        assert_eq!(
            h.provider.submitted(),
            vec![vec![
                abi::withdraw(LEDGER, 1),
                abi::transfer(WETH, SIGNER, U256::from(9u64)),
            ]]
        );
        assert_eq!(h.aggregator.route_calls(), 0);
    }

    #[tokio::test]
    async fn cross_chain_claim_with_native_value_is_unsupported() {
        let h = Harness::new(vec![weth_receipt(7)]);
        h.aggregator.push_route(route_between(
            "out",
            MAIN,
            WETH,
            U256::from(7u64),
            ARBITRUM,
            ARB_WETH,
            U256::from(6u64),
        ));
        h.aggregator
            .set_step_transaction(step_transaction(DIAMOND, U256::from(1u64)));
        let bound = h.session.handle_for(SIGNER).await.unwrap();
        let request = ClaimRequest::new(h.seen(0).await, ARBITRUM, ARB_WETH);

        let err = h
            .orchestrator
            .claim(&request, &h.signer, &bound)
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::UnsupportedRoute(_)));
        assert!(h.provider.submitted().is_empty());
    }

    #[tokio::test]
    async fn cross_chain_claim_batches_approve_withdraw_forward() {
        let h = Harness::new(vec![weth_receipt(7)]);
        h.aggregator.push_route(route_between(
            "out",
            MAIN,
            WETH,
            U256::from(7u64),
            ARBITRUM,
            ARB_WETH,
            U256::from(6u64),
        ));
        let step = step_transaction(DIAMOND, U256::ZERO);
        h.aggregator.set_step_transaction(step.clone());
        h.aggregator.push_status(StatusReport::done(Some(U256::from(6u64))));
        let bound = h.session.handle_for(SIGNER).await.unwrap();
        let request = ClaimRequest::new(h.seen(0).await, ARBITRUM, ARB_WETH).awaiting_settlement();

        let result = h.orchestrator.claim(&request, &h.signer, &bound).await.unwrap();

        assert_eq!(result.path, ClaimPath::Routed);
        let submitted = h.provider.submitted();
        assert_eq!(
            submitted[0],
            vec![
                abi::approve_max(WETH, DIAMOND),
                abi::withdraw(LEDGER, 0),
                Call::new(DIAMOND, step.data.unwrap()),
            ]
        );
        assert!(result.stages.contains(&FlowStage::Settled));
        let settlement = result.settlement.unwrap();
        assert_eq!(settlement.tx_hash, result.operation.transaction_hash);
        assert_eq!(settlement.received_amount().unwrap(), U256::from(6u64));

        let request = h.aggregator.last_request().unwrap();
        assert_eq!(request.from_address, bound.account().address);
        assert_eq!(request.to_address, SIGNER);
    }

    #[tokio::test]
    async fn receipt_past_the_end_is_not_found() {
        let h = Harness::new(vec![weth_receipt(7), weth_receipt(9)]);
        let bound = h.session.handle_for(SIGNER).await.unwrap();
        let seen = h.seen(1).await;
        h.main.set_stakes(vec![weth_receipt(7)]);

        let err = h
            .orchestrator
            .claim(&ClaimRequest::new(seen, MAIN, WETH), &h.signer, &bound)
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::ReceiptNotFound { receipt_id: 1, .. }));
        assert!(h.provider.submitted().is_empty());
    }

    #[tokio::test]
    async fn replaced_receipt_is_stale() {
        let h = Harness::new(vec![weth_receipt(7), weth_receipt(9)]);
        let bound = h.session.handle_for(SIGNER).await.unwrap();
        let seen = h.seen(1).await;
        h.main.set_stakes(vec![weth_receipt(7), weth_receipt(11)]);

        let err = h
            .orchestrator
            .claim(&ClaimRequest::new(seen, MAIN, WETH), &h.signer, &bound)
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::StaleReceipt { receipt_id: 1, .. }));
        assert!(h.provider.submitted().is_empty());
    }

    #[tokio::test]
    async fn routed_claim_without_route_submits_nothing() {
        let h = Harness::new(vec![weth_receipt(7)]);
        let bound = h.session.handle_for(SIGNER).await.unwrap();
        let request = ClaimRequest::new(h.seen(0).await, ARBITRUM, ARB_WETH);

        let err = h
            .orchestrator
            .claim(&request, &h.signer, &bound)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VaultError::RouteNotFound {
                from_chain: MAIN,
                to_chain: ARBITRUM
            }
        ));
        assert_eq!(h.aggregator.route_calls(), 1);
        assert!(h.provider.submitted().is_empty());
        assert!(h.signer.sent().is_empty());
    }

    #[tokio::test]
    async fn routed_claim_with_allowance_skips_approval() {
        let h = Harness::new(vec![weth_receipt(7)]);
        h.aggregator.push_route(route_between(
            "out",
            MAIN,
            WETH,
            U256::from(7u64),
            ARBITRUM,
            ARB_WETH,
            U256::from(6u64),
        ));
        let step = step_transaction(DIAMOND, U256::ZERO);
        h.aggregator.set_step_transaction(step.clone());
        let bound = h.session.handle_for(SIGNER).await.unwrap();
        h.main
            .set_allowance(WETH, bound.account().address, DIAMOND, U256::MAX);
        let request = ClaimRequest::new(h.seen(0).await, ARBITRUM, ARB_WETH);

        let result = h.orchestrator.claim(&request, &h.signer, &bound).await.unwrap();

        assert!(result.settlement.is_none());
        assert_eq!(h.aggregator.status_calls(), 0);
        assert_eq!(
            h.provider.submitted(),
            vec![vec![
                abi::withdraw(LEDGER, 0),
                Call::new(DIAMOND, step.data.unwrap()),
            ]]
        );
    }

    #[tokio::test]
    async fn refunded_claim_settlement_fails_after_submission() {
        let h = Harness::new(vec![weth_receipt(7)]);
        h.aggregator.push_route(route_between(
            "out",
            MAIN,
            WETH,
            U256::from(7u64),
            ARBITRUM,
            ARB_WETH,
            U256::from(6u64),
        ));
        h.aggregator
            .set_step_transaction(step_transaction(DIAMOND, U256::ZERO));
        let mut refunded = StatusReport::done(Some(U256::from(7u64)));
        refunded.substatus = Some("REFUNDED".to_string());
        h.aggregator.push_status(refunded);
        let bound = h.session.handle_for(SIGNER).await.unwrap();
        let request = ClaimRequest::new(h.seen(0).await, ARBITRUM, ARB_WETH).awaiting_settlement();

        let err = h
            .orchestrator
            .claim(&request, &h.signer, &bound)
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::SettlementFailed { .. }));
        assert_eq!(h.provider.submitted().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn claims_for_one_account_run_one_at_a_time() {
        let h = Harness::with_provider(
            vec![weth_receipt(7), weth_receipt(9)],
            FakeAccountProvider::new(MAIN).with_inclusion_delay_ms(500),
        );
        let bound = h.session.handle_for(SIGNER).await.unwrap();
        let first = ClaimRequest::new(h.seen(0).await, MAIN, WETH);
        let second = ClaimRequest::new(h.seen(1).await, MAIN, WETH);

        let (a, b) = tokio::join!(
            h.orchestrator.claim(&first, &h.signer, &bound),
            h.orchestrator.claim(&second, &h.signer, &bound),
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(h.provider.submitted().len(), 2);
        assert_eq!(h.provider.peak_in_flight(), 1);
    }

    #[tokio::test]
    async fn reverted_withdrawal_surfaces_submission_failed() {
        let h = Harness::new(vec![weth_receipt(7)]);
        h.provider.revert_next_operation();
        let bound = h.session.handle_for(SIGNER).await.unwrap();
        let request = ClaimRequest::new(h.seen(0).await, MAIN, WETH);

        let err = h
            .orchestrator
            .claim(&request, &h.signer, &bound)
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::SubmissionFailed(_)));
    }

    #[test]
    fn classification() {
        assert_eq!(classify_claim(WETH, MAIN, WETH, MAIN), ClaimPath::Local);
        assert_eq!(classify_claim(WETH, MAIN, Address::ZERO, MAIN), ClaimPath::Routed);
        assert_eq!(classify_claim(WETH, ARBITRUM, WETH, MAIN), ClaimPath::Routed);
    }
}
