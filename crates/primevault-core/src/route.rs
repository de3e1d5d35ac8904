use std::sync::Arc;

use alloy_primitives::{Address, U256};
use tracing::{debug, info, warn};

use crate::aggregator::{BridgeAggregator, Route, RouteOrder, RouteRequest};
use crate::error::VaultError;
use crate::types::ChainId;

/// Where value leaves from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteSource {
    pub chain_id: ChainId,
    pub token: Address,
    pub amount: U256,
    pub address: Address,
}

/// Where value should arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteDestination {
    pub chain_id: ChainId,
    pub token: Address,
    pub address: Address,
}

/// Picks an executable route from the aggregator's candidates.
///
/// Only routes with exactly `max_steps` or fewer steps (and at least one) qualify; the
/// first qualifying candidate in the aggregator's order wins. Nothing is cached.
pub struct RouteResolver {
    aggregator: Arc<dyn BridgeAggregator>,
    integrator: String,
    order: RouteOrder,
    max_steps: usize,
}

impl RouteResolver {
    pub fn new(aggregator: Arc<dyn BridgeAggregator>, integrator: impl Into<String>) -> Self {
        Self {
            aggregator,
            integrator: integrator.into(),
            order: RouteOrder::Fastest,
            max_steps: 1,
        }
    }

    pub fn with_order(mut self, order: RouteOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn aggregator(&self) -> &Arc<dyn BridgeAggregator> {
        &self.aggregator
    }

    pub fn integrator(&self) -> &str {
        &self.integrator
    }

    pub async fn resolve(
        &self,
        from: &RouteSource,
        to: &RouteDestination,
    ) -> Result<Option<Route>, VaultError> {
        if from.amount.is_zero() {
            return Err(VaultError::InvalidAmount(
                "cannot route a zero amount".to_string(),
            ));
        }

        let request = RouteRequest {
            from_chain_id: from.chain_id,
            from_token: from.token,
            from_amount: from.amount,
            from_address: from.address,
            to_chain_id: to.chain_id,
            to_token: to.token,
            to_address: to.address,
            integrator: self.integrator.clone(),
            order: self.order,
            allow_switch_chain: true,
        };

        let candidates = self.aggregator.routes(&request).await?;
        let total = candidates.len();
        let chosen = candidates
            .into_iter()
            .find(|route| !route.steps.is_empty() && route.steps.len() <= self.max_steps);

        match &chosen {
            Some(route) => info!(
                route_id = %route.id,
                from_chain = from.chain_id,
                to_chain = to.chain_id,
                tool = route.steps.first().map(|s| s.tool.as_str()).unwrap_or_default(),
                to_amount = %route.to_amount,
                "route resolved"
            ),
            None => warn!(
                from_chain = from.chain_id,
                to_chain = to.chain_id,
                candidates = total,
                "no qualifying route"
            ),
        }
        Ok(chosen)
    }

    /// Like [`resolve`](Self::resolve) but treats absence as `RouteNotFound`.
    pub async fn require(
        &self,
        from: &RouteSource,
        to: &RouteDestination,
    ) -> Result<Route, VaultError> {
        debug!(from_token = %from.token, to_token = %to.token, "requiring route");
        self.resolve(from, to)
            .await?
            .ok_or(VaultError::RouteNotFound {
                from_chain: from.chain_id,
                to_chain: to.chain_id,
            })
    }
}
