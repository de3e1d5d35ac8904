use std::sync::Arc;

use async_trait::async_trait;
use primevault_core::{
    ensure_network, send_and_confirm, AllowanceGuard, BridgeAggregator, Call, ChainRegistry,
    ExecutedRoute, Route, RouteExecutor, SettlementWaiter, SignerCaller, StatusQuery, VaultError,
};
use tracing::info;

/// Executes a single-step route from the caller's wallet: approve if needed, send the step
/// transaction, then wait for the aggregator to report what was received.
pub struct SignerRouteExecutor {
    aggregator: Arc<dyn BridgeAggregator>,
    chains: Arc<ChainRegistry>,
    waiter: Arc<SettlementWaiter>,
}

impl SignerRouteExecutor {
    pub fn new(
        aggregator: Arc<dyn BridgeAggregator>,
        chains: Arc<ChainRegistry>,
        waiter: Arc<SettlementWaiter>,
    ) -> Self {
        Self {
            aggregator,
            chains,
            waiter,
        }
    }
}

#[async_trait]
impl RouteExecutor for SignerRouteExecutor {
    async fn execute_route(
        &self,
        route: &Route,
        signer: &dyn SignerCaller,
    ) -> Result<ExecutedRoute, VaultError> {
        let step = route.first_step()?;
        if let Some(quoted) = step.action.from_address.filter(|from| *from != signer.address()) {
            return Err(VaultError::InvariantViolation(format!(
                "route {} was quoted for {} but {} is sending it",
                route.id,
                quoted,
                signer.address()
            )));
        }
        let chain_id = step.action.from_chain_id;
        let reader = self.chains.get(chain_id)?;
        let step_tx = self.aggregator.step_transaction(step).await?;
        let (target, calldata) = step_tx.target()?;

        ensure_network(signer, chain_id).await?;

        let mut tx_hashes = Vec::with_capacity(2);
        let spender = step.estimate.approval_address.unwrap_or(target);
        let approval = AllowanceGuard::new(reader.as_ref())
            .ensure(
                signer.address(),
                spender,
                step.action.from_token.address,
                step.action.from_amount,
            )
            .await?;
        if let Some(approve) = approval {
            tx_hashes.push(send_and_confirm(signer, chain_id, &approve).await?);
        }

        let call = Call::new(target, calldata).with_value(step_tx.value);
        let tx_hash = send_and_confirm(signer, chain_id, &call).await?;
        tx_hashes.push(tx_hash);
        info!(route_id = %route.id, tool = %step.tool, %tx_hash, "route step executed");

        let outcome = self
            .waiter
            .wait(&StatusQuery {
                tx_hash,
                bridge: Some(step.tool.clone()),
                from_chain_id: chain_id,
                to_chain_id: step.action.to_chain_id,
            })
            .await?;
        outcome.ensure_completed()?;

        Ok(ExecutedRoute {
            tx_hashes,
            to_token: outcome.received_token().unwrap_or(route.to_token.address),
            to_amount: outcome.received_amount().ok(),
        })
    }
}
