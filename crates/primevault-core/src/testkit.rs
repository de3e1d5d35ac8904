//! In-memory collaborators used by the crate's unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use async_trait::async_trait;

use crate::account::AccountAbstractionProvider;
use crate::aggregator::{
    BridgeAggregator, ExecutedRoute, Route, RouteExecutor, RouteRequest, RouteStep, StatusQuery,
    StatusReport, StepAction, StepEstimate, StepTransaction, TokenInfo,
};
use crate::chain::{ChainReader, SignerCaller};
use crate::error::VaultError;
use crate::types::{Call, ChainId, OperationHash, OperationReceipt, Receipt, SmartAccount, TxHash};

fn hash_from(seq: usize, tag: u8) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[0] = tag;
    bytes[24..].copy_from_slice(&(seq as u64).to_be_bytes());
    B256::from(bytes)
}

pub struct FakeChain {
    chain_id: ChainId,
    balances: Mutex<HashMap<(Address, Address), U256>>,
    allowances: Mutex<HashMap<(Address, Address, Address), U256>>,
    stakes: Mutex<Vec<Receipt>>,
    failure: Mutex<Option<String>>,
    allowance_reads: AtomicUsize,
}

impl FakeChain {
    pub fn new(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            balances: Mutex::new(HashMap::new()),
            allowances: Mutex::new(HashMap::new()),
            stakes: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            allowance_reads: AtomicUsize::new(0),
        }
    }

    pub fn set_balance(&self, token: Address, owner: Address, amount: U256) {
        self.balances.lock().unwrap().insert((token, owner), amount);
    }

    pub fn credit(&self, token: Address, owner: Address, amount: U256) {
        let mut balances = self.balances.lock().unwrap();
        let entry = balances.entry((token, owner)).or_insert(U256::ZERO);
        *entry += amount;
    }

    pub fn set_allowance(&self, token: Address, owner: Address, spender: Address, amount: U256) {
        self.allowances
            .lock()
            .unwrap()
            .insert((token, owner, spender), amount);
    }

    pub fn set_stakes(&self, stakes: Vec<Receipt>) {
        *self.stakes.lock().unwrap() = stakes;
    }

    pub fn fail_reads(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn allowance_reads(&self) -> usize {
        self.allowance_reads.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), VaultError> {
        match self.failure.lock().unwrap().as_ref() {
            Some(message) => Err(VaultError::chain(self.chain_id, message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChainReader for FakeChain {
    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    async fn native_balance(&self, owner: Address) -> Result<U256, VaultError> {
        self.token_balance(Address::ZERO, owner).await
    }

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, VaultError> {
        self.check()?;
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(&(token, owner))
            .copied()
            .unwrap_or_default())
    }

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, VaultError> {
        self.allowance_reads.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self
            .allowances
            .lock()
            .unwrap()
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or_default())
    }

    async fn stakes(&self, _ledger: Address, _account: Address) -> Result<Vec<Receipt>, VaultError> {
        self.check()?;
        Ok(self.stakes.lock().unwrap().clone())
    }
}

type SendHook = Box<dyn Fn(ChainId, &Call) + Send + Sync>;

pub struct FakeSigner {
    address: Address,
    active_chain: Mutex<ChainId>,
    switches: Mutex<Vec<ChainId>>,
    sent: Mutex<Vec<(ChainId, Call)>>,
    waited: Mutex<Vec<TxHash>>,
    on_send: Mutex<Option<SendHook>>,
}

impl FakeSigner {
    pub fn new(address: Address, chain_id: ChainId) -> Self {
        Self {
            address,
            active_chain: Mutex::new(chain_id),
            switches: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            waited: Mutex::new(Vec::new()),
            on_send: Mutex::new(None),
        }
    }

    /// Runs `hook` for every accepted send, e.g. to credit balances the call would move.
    pub fn on_send(&self, hook: impl Fn(ChainId, &Call) + Send + Sync + 'static) {
        *self.on_send.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn switches(&self) -> Vec<ChainId> {
        self.switches.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<(ChainId, Call)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn waited(&self) -> usize {
        self.waited.lock().unwrap().len()
    }
}

#[async_trait]
impl SignerCaller for FakeSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn active_chain(&self) -> Result<ChainId, VaultError> {
        Ok(*self.active_chain.lock().unwrap())
    }

    async fn switch_chain(&self, chain_id: ChainId) -> Result<(), VaultError> {
        self.switches.lock().unwrap().push(chain_id);
        *self.active_chain.lock().unwrap() = chain_id;
        Ok(())
    }

    async fn send_call(&self, chain_id: ChainId, call: &Call) -> Result<TxHash, VaultError> {
        let active = *self.active_chain.lock().unwrap();
        if active != chain_id {
            return Err(VaultError::chain(
                chain_id,
                format!("wallet is on chain {active}"),
            ));
        }
        if let Some(hook) = self.on_send.lock().unwrap().as_ref() {
            hook(chain_id, call);
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((chain_id, call.clone()));
        Ok(hash_from(sent.len(), 0xee))
    }

    async fn wait_for_transaction(
        &self,
        _chain_id: ChainId,
        tx_hash: TxHash,
    ) -> Result<(), VaultError> {
        self.waited.lock().unwrap().push(tx_hash);
        Ok(())
    }
}

type OperationHook = Box<dyn Fn(&SmartAccount, &[Call]) + Send + Sync>;

pub struct FakeAccountProvider {
    chain_id: ChainId,
    derivations: AtomicUsize,
    derivation_delay: Duration,
    fail_derivation: Mutex<Option<String>>,
    reject_operation: Mutex<Option<String>>,
    revert_operation: Mutex<bool>,
    submitted: Mutex<Vec<Vec<Call>>>,
    on_operation: Mutex<Option<OperationHook>>,
    inclusion_delay: Duration,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FakeAccountProvider {
    pub fn new(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            derivations: AtomicUsize::new(0),
            derivation_delay: Duration::ZERO,
            fail_derivation: Mutex::new(None),
            reject_operation: Mutex::new(None),
            revert_operation: Mutex::new(false),
            submitted: Mutex::new(Vec::new()),
            on_operation: Mutex::new(None),
            inclusion_delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_derivation_delay_ms(mut self, millis: u64) -> Self {
        self.derivation_delay = Duration::from_millis(millis);
        self
    }

    pub fn with_inclusion_delay_ms(mut self, millis: u64) -> Self {
        self.inclusion_delay = Duration::from_millis(millis);
        self
    }

    /// Most operations ever waiting for inclusion at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn fail_next_derivation(&self, message: &str) {
        *self.fail_derivation.lock().unwrap() = Some(message.to_string());
    }

    pub fn reject_next_operation(&self, message: &str) {
        *self.reject_operation.lock().unwrap() = Some(message.to_string());
    }

    pub fn revert_next_operation(&self) {
        *self.revert_operation.lock().unwrap() = true;
    }

    pub fn on_operation(&self, hook: impl Fn(&SmartAccount, &[Call]) + Send + Sync + 'static) {
        *self.on_operation.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn derivations(&self) -> usize {
        self.derivations.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> Vec<Vec<Call>> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn account_for(signer: Address) -> SmartAccount {
        SmartAccount {
            signer,
            address: Address::from_word(keccak256(signer.as_slice())),
        }
    }
}

#[async_trait]
impl AccountAbstractionProvider for FakeAccountProvider {
    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    async fn create_account(&self, signer: Address) -> Result<SmartAccount, VaultError> {
        self.derivations.fetch_add(1, Ordering::SeqCst);
        if !self.derivation_delay.is_zero() {
            tokio::time::sleep(self.derivation_delay).await;
        }
        if let Some(message) = self.fail_derivation.lock().unwrap().take() {
            return Err(VaultError::NotConnected(message));
        }
        Ok(Self::account_for(signer))
    }

    async fn submit_operation(
        &self,
        account: &SmartAccount,
        calls: &[Call],
    ) -> Result<OperationHash, VaultError> {
        if let Some(message) = self.reject_operation.lock().unwrap().take() {
            return Err(VaultError::SubmissionFailed(message));
        }
        if let Some(hook) = self.on_operation.lock().unwrap().as_ref() {
            hook(account, calls);
        }
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(calls.to_vec());
        Ok(hash_from(submitted.len(), 0x0a))
    }

    async fn wait_for_receipt(
        &self,
        operation_hash: OperationHash,
    ) -> Result<OperationReceipt, VaultError> {
        if !self.inclusion_delay.is_zero() {
            tokio::time::sleep(self.inclusion_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let reverted = std::mem::take(&mut *self.revert_operation.lock().unwrap());
        let mut tx = operation_hash;
        tx.0[0] = 0x7c;
        Ok(OperationReceipt {
            operation_hash,
            transaction_hash: tx,
            success: !reverted,
        })
    }
}

pub struct FakeAggregator {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<RouteRequest>>,
    step_tx: Mutex<Option<StepTransaction>>,
    step_calls: AtomicUsize,
    statuses: Mutex<VecDeque<StatusReport>>,
    status_queries: Mutex<Vec<StatusQuery>>,
}

impl FakeAggregator {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            step_tx: Mutex::new(None),
            step_calls: AtomicUsize::new(0),
            statuses: Mutex::new(VecDeque::new()),
            status_queries: Mutex::new(Vec::new()),
        }
    }

    pub fn push_route(&self, route: Route) {
        self.routes.lock().unwrap().push(route);
    }

    pub fn set_step_transaction(&self, step: StepTransaction) {
        *self.step_tx.lock().unwrap() = Some(step);
    }

    pub fn push_status(&self, report: StatusReport) {
        self.statuses.lock().unwrap().push_back(report);
    }

    pub fn route_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<RouteRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn step_calls(&self) -> usize {
        self.step_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_queries.lock().unwrap().len()
    }

    pub fn status_queries(&self) -> Vec<StatusQuery> {
        self.status_queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl BridgeAggregator for FakeAggregator {
    async fn routes(&self, request: &RouteRequest) -> Result<Vec<Route>, VaultError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.routes.lock().unwrap().clone())
    }

    async fn step_transaction(&self, step: &RouteStep) -> Result<StepTransaction, VaultError> {
        self.step_calls.fetch_add(1, Ordering::SeqCst);
        self.step_tx
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| VaultError::Aggregator(format!("no transaction for step {}", step.id)))
    }

    async fn status(&self, query: &StatusQuery) -> Result<StatusReport, VaultError> {
        self.status_queries.lock().unwrap().push(query.clone());
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(StatusReport::pending))
    }
}

pub struct FakeRouteExecutor {
    result: Mutex<Option<ExecutedRoute>>,
    executed: Mutex<Vec<String>>,
    senders: Mutex<Vec<Address>>,
}

impl FakeRouteExecutor {
    pub fn new() -> Self {
        Self {
            result: Mutex::new(None),
            executed: Mutex::new(Vec::new()),
            senders: Mutex::new(Vec::new()),
        }
    }

    pub fn returning(self, result: ExecutedRoute) -> Self {
        *self.result.lock().unwrap() = Some(result);
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn senders(&self) -> Vec<Address> {
        self.senders.lock().unwrap().clone()
    }
}

#[async_trait]
impl RouteExecutor for FakeRouteExecutor {
    async fn execute_route(
        &self,
        route: &Route,
        signer: &dyn SignerCaller,
    ) -> Result<ExecutedRoute, VaultError> {
        self.executed.lock().unwrap().push(route.id.clone());
        self.senders.lock().unwrap().push(signer.address());
        Ok(self.result.lock().unwrap().clone().unwrap_or(ExecutedRoute {
            tx_hashes: vec![hash_from(1, 0x5e)],
            to_token: route.to_token.address,
            to_amount: Some(route.to_amount),
        }))
    }
}

pub fn token(chain_id: ChainId, address: Address) -> TokenInfo {
    TokenInfo {
        chain_id,
        address,
        decimals: 18,
        symbol: "TKN".to_string(),
    }
}

pub fn route_between(
    id: &str,
    from_chain: ChainId,
    from_token: Address,
    from_amount: U256,
    to_chain: ChainId,
    to_token: Address,
    to_amount: U256,
) -> Route {
    let step = RouteStep {
        id: format!("{id}-step"),
        tool: "stargate".to_string(),
        action: StepAction {
            from_chain_id: from_chain,
            to_chain_id: to_chain,
            from_token: token(from_chain, from_token),
            to_token: token(to_chain, to_token),
            from_amount,
            from_address: None,
            to_address: None,
        },
        estimate: StepEstimate {
            to_amount,
            approval_address: None,
            execution_duration_secs: 60,
        },
        raw: serde_json::Value::Null,
    };
    Route {
        id: id.to_string(),
        from_chain_id: from_chain,
        to_chain_id: to_chain,
        from_amount,
        to_amount,
        from_token: token(from_chain, from_token),
        to_token: token(to_chain, to_token),
        steps: vec![step],
    }
}

pub fn route_with_steps(id: &str, from_chain: ChainId, to_chain: ChainId, steps: usize) -> Route {
    let mut route = route_between(
        id,
        from_chain,
        Address::repeat_byte(0xaa),
        U256::from(1_000u64),
        to_chain,
        Address::repeat_byte(0xbb),
        U256::from(990u64),
    );
    let template = route.steps[0].clone();
    route.steps = vec![template; steps];
    route
}

pub fn step_transaction(to: Address, value: U256) -> StepTransaction {
    StepTransaction {
        tool: "stargate".to_string(),
        to: Some(to),
        data: Some(Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef])),
        value,
    }
}
