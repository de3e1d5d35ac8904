use std::sync::Arc;

use alloy_primitives::{Address, U256};
use tracing::info;

use crate::account::{AccountAbstractionProvider, BoundAccount, SessionState, SmartAccountSession};
use crate::admin::BridgeExecutorAdmin;
use crate::aggregator::{BridgeAggregator, ChainSummary, RouteExecutor, TokenInfo};
use crate::chain::{ChainRegistry, SignerCaller};
use crate::claim::{ClaimOrchestrator, ClaimRequest, ClaimResult};
use crate::config::VaultConfig;
use crate::deposit::{DepositOrchestrator, DepositOutcome};
use crate::error::VaultError;
use crate::ledger::StakeLedger;
use crate::route::RouteResolver;
use crate::settlement::SettlementWaiter;
use crate::types::{ChainId, ReceiptSnapshot, SmartAccount, TransferIntent};

/// External collaborators the engine is assembled from.
pub struct EngineCollaborators {
    pub accounts: Arc<dyn AccountAbstractionProvider>,
    pub aggregator: Arc<dyn BridgeAggregator>,
    pub route_executor: Arc<dyn RouteExecutor>,
    pub chains: ChainRegistry,
}

/// Application context owning the account session and both orchestrators.
pub struct StakingEngine {
    config: VaultConfig,
    chains: Arc<ChainRegistry>,
    session: Arc<SmartAccountSession>,
    ledger: Arc<StakeLedger>,
    resolver: Arc<RouteResolver>,
    deposits: DepositOrchestrator,
    claims: ClaimOrchestrator,
    admin: BridgeExecutorAdmin,
}

impl StakingEngine {
    pub fn bootstrap(
        config: VaultConfig,
        collaborators: EngineCollaborators,
    ) -> Result<Self, VaultError> {
        config.validate()?;
        let main_chain_id = config.main_chain_id();
        if collaborators.accounts.chain_id() != main_chain_id {
            return Err(VaultError::Config(format!(
                "bundler targets chain {} but the main chain is {}",
                collaborators.accounts.chain_id(),
                main_chain_id
            )));
        }
        let main_reader = collaborators.chains.get(main_chain_id).map_err(|_| {
            VaultError::Config(format!("no chain reader for main chain {}", main_chain_id))
        })?;

        let chains = Arc::new(collaborators.chains);
        let ledger = Arc::new(StakeLedger::new(config.staking_address, main_reader));
        let resolver = Arc::new(
            RouteResolver::new(collaborators.aggregator.clone(), config.aggregator.integrator.clone())
                .with_order(config.aggregator.order)
                .with_max_steps(config.aggregator.max_steps),
        );
        let waiter = Arc::new(SettlementWaiter::new(
            collaborators.aggregator,
            config.settlement.policy(),
        ));

        let deposits = DepositOrchestrator::new(
            chains.clone(),
            ledger.clone(),
            config.executors(),
            resolver.clone(),
            collaborators.route_executor,
            waiter.clone(),
        );
        let claims = ClaimOrchestrator::new(ledger.clone(), resolver.clone(), waiter);

        info!(
            environment = config.environment.name(),
            main_chain = main_chain_id,
            ledger = %config.staking_address,
            chains = ?chains.chain_ids(),
            "staking engine ready"
        );

        Ok(Self {
            admin: BridgeExecutorAdmin::new(config.executors()),
            session: Arc::new(SmartAccountSession::new(collaborators.accounts)),
            config,
            chains,
            ledger,
            resolver,
            deposits,
            claims,
        })
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<SmartAccountSession> {
        &self.session
    }

    pub fn admin(&self) -> &BridgeExecutorAdmin {
        &self.admin
    }

    /// Connects `signer` and derives (or reuses) its smart account.
    pub async fn connect(&self, signer: Address) -> Result<SmartAccount, VaultError> {
        self.session.connect(signer);
        self.session.ensure_account_for(signer).await
    }

    pub fn disconnect(&self, signer: Address) {
        self.session.disconnect(signer);
    }

    pub fn session_state(&self, signer: Address) -> SessionState {
        self.session.state(signer)
    }

    /// Deposit intent of `amount` (source-token minor units) into pool `pool_id`.
    pub fn pool_intent(
        &self,
        pool_id: u32,
        from_chain_id: ChainId,
        from_token: Address,
        amount: U256,
    ) -> Result<TransferIntent, VaultError> {
        if !self.config.is_supported_source(from_chain_id) {
            return Err(VaultError::UnsupportedChain(from_chain_id));
        }
        let pool = self
            .config
            .pool(pool_id)
            .ok_or_else(|| VaultError::Config(format!("unknown pool {}", pool_id)))?;
        Ok(TransferIntent::deposit(
            from_chain_id,
            from_token,
            self.config.main_chain_id(),
            pool.address,
            amount,
        ))
    }

    pub async fn deposit(
        &self,
        intent: &TransferIntent,
        signer: &dyn SignerCaller,
    ) -> Result<DepositOutcome, VaultError> {
        let account = self.connected_account(signer.address()).await?;
        self.deposits.deposit(intent, signer, &account).await
    }

    pub async fn claim(
        &self,
        request: &ClaimRequest,
        signer: &dyn SignerCaller,
    ) -> Result<ClaimResult, VaultError> {
        let account = self.connected_account(signer.address()).await?;
        self.claims.claim(request, signer, &account).await
    }

    /// Current receipts of the signer's smart account.
    pub async fn receipts(&self, signer: Address) -> Result<ReceiptSnapshot, VaultError> {
        let account = self.session.ensure_account_for(signer).await?;
        self.ledger.snapshot(account.address).await
    }

    /// Pool asset sitting in the smart account without being staked.
    pub async fn pending_asset(&self, signer: Address, pool_id: u32) -> Result<U256, VaultError> {
        let pool = self
            .config
            .pool(pool_id)
            .ok_or_else(|| VaultError::Config(format!("unknown pool {}", pool_id)))?;
        let account = self.session.ensure_account_for(signer).await?;
        self.ledger.pending_asset(account.address, pool.address).await
    }

    /// Chains the aggregator can route from, narrowed to the ones with a registered reader.
    pub async fn supported_chains(&self) -> Result<Vec<ChainSummary>, VaultError> {
        let chains = self.resolver.aggregator().chains().await?;
        Ok(chains
            .into_iter()
            .filter(|chain| self.chains.has(chain.id))
            .collect())
    }

    pub async fn tokens(&self, chain_id: ChainId) -> Result<Vec<TokenInfo>, VaultError> {
        if !self.chains.has(chain_id) {
            return Err(VaultError::UnsupportedChain(chain_id));
        }
        self.resolver.aggregator().tokens(chain_id).await
    }

    async fn connected_account(&self, signer: Address) -> Result<BoundAccount, VaultError> {
        if self.session.active_signer() != Some(signer) {
            return Err(VaultError::NotConnected(format!(
                "signer {} is not the connected wallet",
                signer
            )));
        }
        self.session.handle_for(signer).await
    }
}
