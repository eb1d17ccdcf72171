//! Test tooling: an in-memory chain that speaks the multisig, proxy, modules
//! registry and governor interfaces, plus helpers to drive async code and
//! environment overrides from synchronous tests.
use crate::domain::types::{LogEntry, LogQuery, Selector, TxReceipt, TxRequest};
use crate::features::abi::{ICustomProxy, IGovernorAlpha, IModulesProxyRegistry, IMultiSigWallet};
use crate::features::chain::ChainClient;
use alloy_primitives::{keccak256, Address, Bytes, U256};
use alloy_sol_types::{SolEvent, SolInterface, SolValue};
use async_trait::async_trait;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::{Mutex, OnceLock};
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

pub const MOCK_GAS_ESTIMATE: u64 = 100_000;
const MOCK_VOTING_DELAY: u64 = 1;
const MOCK_VOTING_PERIOD: u64 = 2_880;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentTransaction {
    pub request: TxRequest,
    pub gas_limit: Option<u64>,
    pub success: bool,
}

#[derive(Clone, Debug)]
struct MockMultisigTx {
    destination: Address,
    value: U256,
    data: Bytes,
    executed: bool,
    confirmations: Vec<Address>,
}

#[derive(Clone, Debug)]
struct MockMultisig {
    owners: Vec<Address>,
    required: u64,
    transactions: Vec<MockMultisigTx>,
}

#[derive(Clone, Debug)]
struct MockProxy {
    owner: Address,
    implementation: Address,
}

#[derive(Clone, Debug)]
struct MockRegistry {
    owner: Address,
    reserved_selectors: Vec<Selector>,
    modules: Vec<Address>,
}

#[derive(Clone, Debug, Default)]
struct MockGovernor {
    proposal_count: u64,
}

#[derive(Clone, Debug, Default)]
struct MockState {
    block_number: u64,
    accounts: BTreeSet<Address>,
    multisigs: BTreeMap<Address, MockMultisig>,
    proxies: BTreeMap<Address, MockProxy>,
    registries: BTreeMap<Address, MockRegistry>,
    governors: BTreeMap<Address, MockGovernor>,
    module_selectors: BTreeMap<Address, Vec<Selector>>,
    logs: Vec<LogEntry>,
    estimate_failure: Option<String>,
    silent_governors: bool,
}

/// In-memory `ChainClient` with Gnosis-style multisig semantics: submitting
/// confirms for the sender, and a transaction executes as soon as it reaches
/// the confirmation threshold.
#[derive(Default)]
pub struct MockChain {
    state: RefCell<MockState>,
    sent: RefCell<Vec<SentTransaction>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// An externally owned account the chain can sign for.
    pub fn with_account(mut self, account: Address) -> Self {
        self.state.get_mut().accounts.insert(account);
        self
    }

    pub fn with_multisig(mut self, wallet: Address, owners: &[Address], required: u64) -> Self {
        self.state.get_mut().multisigs.insert(
            wallet,
            MockMultisig {
                owners: owners.to_vec(),
                required,
                transactions: Vec::new(),
            },
        );
        self
    }

    pub fn with_proxy(mut self, proxy: Address, owner: Address, implementation: Address) -> Self {
        self.state.get_mut().proxies.insert(
            proxy,
            MockProxy {
                owner,
                implementation,
            },
        );
        self
    }

    pub fn with_registry(
        mut self,
        registry: Address,
        owner: Address,
        reserved: &[Selector],
    ) -> Self {
        self.state.get_mut().registries.insert(
            registry,
            MockRegistry {
                owner,
                reserved_selectors: reserved.to_vec(),
                modules: Vec::new(),
            },
        );
        self
    }

    /// Declares the function selectors exposed by a deployed module contract.
    pub fn with_module(mut self, module: Address, selectors: &[Selector]) -> Self {
        self.state
            .get_mut()
            .module_selectors
            .insert(module, selectors.to_vec());
        self
    }

    pub fn with_registered_module(mut self, registry: Address, module: Address) -> Self {
        if let Some(entry) = self.state.get_mut().registries.get_mut(&registry) {
            entry.modules.push(module);
        }
        self
    }

    pub fn with_governor(mut self, governor: Address) -> Self {
        self.state
            .get_mut()
            .governors
            .insert(governor, MockGovernor::default());
        self
    }

    pub fn fail_gas_estimation(&self, reason: &str) {
        self.state.borrow_mut().estimate_failure = Some(reason.to_string());
    }

    /// Governors keep accepting proposals but stop emitting `ProposalCreated`.
    pub fn silence_governor_events(&self) {
        self.state.borrow_mut().silent_governors = true;
    }

    pub fn push_log(&self, log: LogEntry) {
        self.state.borrow_mut().logs.push(log);
    }

    pub fn sent_transactions(&self) -> Vec<SentTransaction> {
        self.sent.borrow().clone()
    }

    pub fn implementation_of(&self, proxy: Address) -> Option<Address> {
        self.state
            .borrow()
            .proxies
            .get(&proxy)
            .map(|entry| entry.implementation)
    }

    pub fn registered_modules(&self, registry: Address) -> Vec<Address> {
        self.state
            .borrow()
            .registries
            .get(&registry)
            .map(|entry| entry.modules.clone())
            .unwrap_or_default()
    }

    pub fn multisig_owners(&self, wallet: Address) -> Vec<Address> {
        self.state
            .borrow()
            .multisigs
            .get(&wallet)
            .map(|entry| entry.owners.clone())
            .unwrap_or_default()
    }

    pub fn multisig_transaction_count(&self, wallet: Address) -> usize {
        self.state
            .borrow()
            .multisigs
            .get(&wallet)
            .map(|entry| entry.transactions.len())
            .unwrap_or_default()
    }

    pub fn proposal_count(&self, governor: Address) -> u64 {
        self.state
            .borrow()
            .governors
            .get(&governor)
            .map(|entry| entry.proposal_count)
            .unwrap_or_default()
    }
}

#[async_trait(?Send)]
impl ChainClient for MockChain {
    fn has_signer(&self, address: Address) -> bool {
        self.state.borrow().accounts.contains(&address)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, String> {
        let state = self.state.borrow();
        read(&state, to, &data).map(Bytes::from)
    }

    async fn estimate_gas(&self, request: &TxRequest) -> Result<u64, String> {
        let state = self.state.borrow();
        if let Some(reason) = state.estimate_failure.clone() {
            return Err(reason);
        }
        let mut dry_run = state.clone();
        execute(&mut dry_run, request.from, request.to, request.value, &request.data)
            .map(|_| MOCK_GAS_ESTIMATE)
            .map_err(|reason| format!("execution reverted: {reason}"))
    }

    async fn send_transaction(
        &self,
        request: &TxRequest,
        gas_limit: Option<u64>,
    ) -> Result<TxReceipt, String> {
        let mut state = self.state.borrow_mut();
        if !state.accounts.contains(&request.from) {
            return Err(format!("no signer available for {}", request.from));
        }

        state.block_number += 1;
        let block_number = state.block_number;
        let mut working = state.clone();
        let (success, mut logs) =
            match execute(&mut working, request.from, request.to, request.value, &request.data) {
                Ok(logs) => {
                    *state = working;
                    (true, logs)
                }
                Err(_) => (false, Vec::new()),
            };
        for (index, log) in logs.iter_mut().enumerate() {
            log.block_number = Some(block_number);
            log.log_index = Some(index as u64);
        }
        state.logs.extend(logs.iter().cloned());

        let mut sent = self.sent.borrow_mut();
        sent.push(SentTransaction {
            request: request.clone(),
            gas_limit,
            success,
        });

        Ok(TxReceipt {
            tx_hash: keccak256(format!("mock-tx-{}", sent.len()).as_bytes()),
            block_number,
            success,
            gas_used: MOCK_GAS_ESTIMATE,
            logs,
        })
    }

    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<LogEntry>, String> {
        let state = self.state.borrow();
        Ok(state
            .logs
            .iter()
            .filter(|log| log.address == query.address)
            .filter(|log| log.topics.first() == Some(&query.topic0))
            .filter(|log| {
                let block = log.block_number.unwrap_or_default();
                block >= query.from_block && query.to_block.map_or(true, |to| block <= to)
            })
            .cloned()
            .collect())
    }
}

/// Wraps a client and fails every `eth_call` whose calldata starts with
/// `selector`; writes, estimates and log queries pass through.
pub struct FailingReads<'a, C: ChainClient + ?Sized> {
    inner: &'a C,
    selector: [u8; 4],
    reason: String,
}

impl<'a, C: ChainClient + ?Sized> FailingReads<'a, C> {
    pub fn new(inner: &'a C, selector: [u8; 4], reason: &str) -> Self {
        Self {
            inner,
            selector,
            reason: reason.to_string(),
        }
    }
}

#[async_trait(?Send)]
impl<C: ChainClient + ?Sized> ChainClient for FailingReads<'_, C> {
    fn has_signer(&self, address: Address) -> bool {
        self.inner.has_signer(address)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, String> {
        if data.starts_with(&self.selector) {
            return Err(self.reason.clone());
        }
        self.inner.call(to, data).await
    }

    async fn estimate_gas(&self, request: &TxRequest) -> Result<u64, String> {
        self.inner.estimate_gas(request).await
    }

    async fn send_transaction(
        &self,
        request: &TxRequest,
        gas_limit: Option<u64>,
    ) -> Result<TxReceipt, String> {
        self.inner.send_transaction(request, gas_limit).await
    }

    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<LogEntry>, String> {
        self.inner.get_logs(query).await
    }
}

fn event_log<E: SolEvent>(emitter: Address, event: &E) -> LogEntry {
    let data = event.encode_log_data();
    LogEntry {
        address: emitter,
        topics: data.topics().to_vec(),
        data: data.data.clone(),
        block_number: None,
        log_index: None,
    }
}

fn read(state: &MockState, to: Address, data: &[u8]) -> Result<Vec<u8>, String> {
    if let Some(wallet) = state.multisigs.get(&to) {
        use IMultiSigWallet::IMultiSigWalletCalls as Calls;
        let call = Calls::abi_decode(data, true)
            .map_err(|error| format!("multisig rejected calldata: {error}"))?;
        let lookup = |tx_id: U256| {
            usize::try_from(tx_id)
                .ok()
                .and_then(|index| wallet.transactions.get(index))
        };
        return match call {
            Calls::transactions(call) => Ok(match lookup(call.transactionId) {
                Some(tx) => {
                    (tx.destination, tx.value, tx.data.clone(), tx.executed).abi_encode_params()
                }
                None => (Address::ZERO, U256::ZERO, Bytes::new(), false).abi_encode_params(),
            }),
            Calls::getConfirmationCount(call) => {
                let count = lookup(call.transactionId).map_or(0, |tx| tx.confirmations.len());
                Ok((U256::from(count),).abi_encode_params())
            }
            Calls::getConfirmations(call) => {
                let confirmations = lookup(call.transactionId)
                    .map(|tx| tx.confirmations.clone())
                    .unwrap_or_default();
                Ok((confirmations,).abi_encode_params())
            }
            Calls::isOwner(call) => Ok((wallet.owners.contains(&call.owner),).abi_encode_params()),
            Calls::required(_) => Ok((U256::from(wallet.required),).abi_encode_params()),
            _ => Err("multisig function is not a view".to_string()),
        };
    }

    if let Some(proxy) = state.proxies.get(&to) {
        use ICustomProxy::ICustomProxyCalls as Calls;
        return match Calls::abi_decode(data, true)
            .map_err(|error| format!("proxy rejected calldata: {error}"))?
        {
            Calls::getImplementation(_) => Ok((proxy.implementation,).abi_encode_params()),
            Calls::setImplementation(_) => Err("setImplementation is not a view".to_string()),
        };
    }

    if state.registries.contains_key(&to) {
        use IModulesProxyRegistry::IModulesProxyRegistryCalls as Calls;
        return match Calls::abi_decode(data, true)
            .map_err(|error| format!("registry rejected calldata: {error}"))?
        {
            Calls::checkClashingFuncSelectors(call) => {
                let (modules, module_selectors, reserved) = clash_report(state, to, call.newModule);
                Ok((modules, module_selectors, reserved).abi_encode_params())
            }
            _ => Err("registry function is not a view".to_string()),
        };
    }

    Err(format!("no contract deployed at {to}"))
}

fn execute(
    state: &mut MockState,
    from: Address,
    to: Address,
    value: U256,
    data: &[u8],
) -> Result<Vec<LogEntry>, String> {
    if state.multisigs.contains_key(&to) {
        return execute_multisig(state, from, to, data);
    }
    if state.proxies.contains_key(&to) {
        return execute_proxy(state, from, to, data);
    }
    if state.registries.contains_key(&to) {
        return execute_registry(state, from, to, data);
    }
    if state.governors.contains_key(&to) {
        return execute_governor(state, from, to, data);
    }
    if data.is_empty() && !value.is_zero() {
        return Ok(Vec::new());
    }
    Err(format!("no contract deployed at {to}"))
}

fn execute_multisig(
    state: &mut MockState,
    from: Address,
    wallet: Address,
    data: &[u8],
) -> Result<Vec<LogEntry>, String> {
    use IMultiSigWallet::IMultiSigWalletCalls as Calls;
    let call = Calls::abi_decode(data, true)
        .map_err(|error| format!("multisig rejected calldata: {error}"))?;
    let entry = state
        .multisigs
        .get_mut(&wallet)
        .ok_or_else(|| format!("no multisig at {wallet}"))?;
    let is_owner = entry.owners.contains(&from);

    match call {
        Calls::submitTransaction(call) => {
            if !is_owner {
                return Err("owner does not exist".to_string());
            }
            let index = entry.transactions.len();
            entry.transactions.push(MockMultisigTx {
                destination: call.destination,
                value: call.value,
                data: call.data,
                executed: false,
                confirmations: Vec::new(),
            });
            let mut logs = vec![event_log(
                wallet,
                &IMultiSigWallet::Submission {
                    transactionId: U256::from(index),
                },
            )];
            logs.extend(confirm(state, wallet, from, index)?);
            Ok(logs)
        }
        Calls::confirmTransaction(call) => {
            if !is_owner {
                return Err("owner does not exist".to_string());
            }
            let index = transaction_index(entry, call.transactionId)?;
            confirm(state, wallet, from, index)
        }
        Calls::revokeConfirmation(call) => {
            if !is_owner {
                return Err("owner does not exist".to_string());
            }
            let index = transaction_index(entry, call.transactionId)?;
            let tx = &mut entry.transactions[index];
            if tx.executed {
                return Err("transaction already executed".to_string());
            }
            if !tx.confirmations.contains(&from) {
                return Err("transaction not confirmed by sender".to_string());
            }
            tx.confirmations.retain(|owner| *owner != from);
            Ok(vec![event_log(
                wallet,
                &IMultiSigWallet::Revocation {
                    sender: from,
                    transactionId: call.transactionId,
                },
            )])
        }
        Calls::executeTransaction(call) => {
            if !is_owner {
                return Err("owner does not exist".to_string());
            }
            let index = transaction_index(entry, call.transactionId)?;
            execute_if_confirmed(state, wallet, from, index)
        }
        Calls::addOwner(call) => {
            if from != wallet {
                return Err("only the wallet may add owners".to_string());
            }
            if entry.owners.contains(&call.owner) {
                return Err("owner exists".to_string());
            }
            entry.owners.push(call.owner);
            Ok(Vec::new())
        }
        Calls::removeOwner(call) => {
            if from != wallet {
                return Err("only the wallet may remove owners".to_string());
            }
            if !entry.owners.contains(&call.owner) {
                return Err("owner does not exist".to_string());
            }
            entry.owners.retain(|owner| *owner != call.owner);
            entry.required = entry.required.min(entry.owners.len() as u64);
            Ok(Vec::new())
        }
        _ => Ok(Vec::new()),
    }
}

fn transaction_index(wallet: &MockMultisig, tx_id: U256) -> Result<usize, String> {
    usize::try_from(tx_id)
        .ok()
        .filter(|index| *index < wallet.transactions.len())
        .ok_or_else(|| format!("transaction {tx_id} does not exist"))
}

fn confirm(
    state: &mut MockState,
    wallet: Address,
    sender: Address,
    index: usize,
) -> Result<Vec<LogEntry>, String> {
    let entry = state
        .multisigs
        .get_mut(&wallet)
        .ok_or_else(|| format!("no multisig at {wallet}"))?;
    let tx = &mut entry.transactions[index];
    if tx.confirmations.contains(&sender) {
        return Err("transaction already confirmed by sender".to_string());
    }
    tx.confirmations.push(sender);
    let mut logs = vec![event_log(
        wallet,
        &IMultiSigWallet::Confirmation {
            sender,
            transactionId: U256::from(index),
        },
    )];
    logs.extend(execute_if_confirmed(state, wallet, sender, index)?);
    Ok(logs)
}

fn execute_if_confirmed(
    state: &mut MockState,
    wallet: Address,
    sender: Address,
    index: usize,
) -> Result<Vec<LogEntry>, String> {
    let entry = state
        .multisigs
        .get(&wallet)
        .ok_or_else(|| format!("no multisig at {wallet}"))?;
    let tx = entry.transactions[index].clone();
    if tx.executed {
        return Err("transaction already executed".to_string());
    }
    if !tx.confirmations.contains(&sender) {
        return Err("transaction not confirmed by sender".to_string());
    }
    if (tx.confirmations.len() as u64) < entry.required {
        return Ok(Vec::new());
    }

    let mut working = state.clone();
    let tx_id = U256::from(index);
    match execute(&mut working, wallet, tx.destination, tx.value, &tx.data) {
        Ok(mut logs) => {
            *state = working;
            if let Some(entry) = state.multisigs.get_mut(&wallet) {
                entry.transactions[index].executed = true;
            }
            logs.push(event_log(
                wallet,
                &IMultiSigWallet::Execution {
                    transactionId: tx_id,
                },
            ));
            Ok(logs)
        }
        Err(_) => Ok(vec![event_log(
            wallet,
            &IMultiSigWallet::ExecutionFailure {
                transactionId: tx_id,
            },
        )]),
    }
}

fn execute_proxy(
    state: &mut MockState,
    from: Address,
    proxy: Address,
    data: &[u8],
) -> Result<Vec<LogEntry>, String> {
    use ICustomProxy::ICustomProxyCalls as Calls;
    let call = Calls::abi_decode(data, true)
        .map_err(|error| format!("proxy rejected calldata: {error}"))?;
    let entry = state
        .proxies
        .get_mut(&proxy)
        .ok_or_else(|| format!("no proxy at {proxy}"))?;
    match call {
        Calls::setImplementation(call) => {
            if from != entry.owner {
                return Err("unauthorized".to_string());
            }
            entry.implementation = call.implementation;
            Ok(Vec::new())
        }
        Calls::getImplementation(_) => Ok(Vec::new()),
    }
}

fn execute_registry(
    state: &mut MockState,
    from: Address,
    registry: Address,
    data: &[u8],
) -> Result<Vec<LogEntry>, String> {
    use IModulesProxyRegistry::IModulesProxyRegistryCalls as Calls;
    let call = Calls::abi_decode(data, true)
        .map_err(|error| format!("registry rejected calldata: {error}"))?;
    let owner = state
        .registries
        .get(&registry)
        .map(|entry| entry.owner)
        .ok_or_else(|| format!("no registry at {registry}"))?;

    match call {
        Calls::addModule(call) => {
            if from != owner {
                return Err("unauthorized".to_string());
            }
            register(state, registry, call.newModule)?;
            Ok(Vec::new())
        }
        Calls::replaceModule(call) => {
            if from != owner {
                return Err("unauthorized".to_string());
            }
            let entry = state
                .registries
                .get_mut(&registry)
                .ok_or_else(|| format!("no registry at {registry}"))?;
            if !entry.modules.contains(&call.oldModule) {
                return Err("module is not registered".to_string());
            }
            entry.modules.retain(|module| *module != call.oldModule);
            register(state, registry, call.newModule)?;
            Ok(Vec::new())
        }
        Calls::checkClashingFuncSelectors(_) => Ok(Vec::new()),
    }
}

fn register(state: &mut MockState, registry: Address, module: Address) -> Result<(), String> {
    let (modules, _, reserved) = clash_report(state, registry, module);
    if !modules.is_empty() || !reserved.is_empty() {
        return Err("func selectors clash".to_string());
    }
    if let Some(entry) = state.registries.get_mut(&registry) {
        entry.modules.push(module);
    }
    Ok(())
}

fn clash_report(
    state: &MockState,
    registry: Address,
    candidate: Address,
) -> (Vec<Address>, Vec<Selector>, Vec<Selector>) {
    let mut modules = Vec::new();
    let mut module_selectors = Vec::new();
    let mut reserved = Vec::new();
    let Some(entry) = state.registries.get(&registry) else {
        return (modules, module_selectors, reserved);
    };
    let candidate_selectors = state
        .module_selectors
        .get(&candidate)
        .cloned()
        .unwrap_or_default();

    for selector in candidate_selectors {
        if entry.reserved_selectors.contains(&selector) {
            reserved.push(selector);
        }
        for module in &entry.modules {
            let exposes = state
                .module_selectors
                .get(module)
                .is_some_and(|selectors| selectors.contains(&selector));
            if exposes {
                modules.push(*module);
                module_selectors.push(selector);
            }
        }
    }
    (modules, module_selectors, reserved)
}

fn execute_governor(
    state: &mut MockState,
    from: Address,
    governor: Address,
    data: &[u8],
) -> Result<Vec<LogEntry>, String> {
    use IGovernorAlpha::IGovernorAlphaCalls as Calls;
    let Calls::propose(call) = Calls::abi_decode(data, true)
        .map_err(|error| format!("governor rejected calldata: {error}"))?;

    let arity = call.targets.len();
    if call.values.len() != arity || call.signatures.len() != arity || call.calldatas.len() != arity
    {
        return Err("proposal function information arity mismatch".to_string());
    }
    if arity == 0 {
        return Err("must provide actions".to_string());
    }

    let start_block = state.block_number + MOCK_VOTING_DELAY;
    let silent = state.silent_governors;
    let entry = state
        .governors
        .get_mut(&governor)
        .ok_or_else(|| format!("no governor at {governor}"))?;
    entry.proposal_count += 1;
    if silent {
        return Ok(Vec::new());
    }

    Ok(vec![event_log(
        governor,
        &IGovernorAlpha::ProposalCreated {
            id: U256::from(entry.proposal_count),
            proposer: from,
            targets: call.targets,
            values: call.values,
            signatures: call.signatures,
            calldatas: call.calldatas,
            startBlock: U256::from(start_block),
            endBlock: U256::from(start_block + MOCK_VOTING_PERIOD),
            description: call.description,
        },
    )])
}

/// Drives a future to completion by polling with a no-op waker. Suitable for
/// futures that never actually park, such as those backed by `MockChain`.
pub fn block_on_with_spin<F: Future>(future: F) -> F::Output {
    unsafe fn clone(_ptr: *const ()) -> RawWaker {
        dummy_raw_waker()
    }
    unsafe fn wake(_ptr: *const ()) {}
    unsafe fn wake_by_ref(_ptr: *const ()) {}
    unsafe fn drop(_ptr: *const ()) {}

    fn dummy_raw_waker() -> RawWaker {
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, wake, wake_by_ref, drop);
        RawWaker::new(std::ptr::null(), &VTABLE)
    }

    let waker = unsafe { Waker::from_raw(dummy_raw_waker()) };
    let mut context = Context::from_waker(&waker);
    let mut future = Box::pin(future);

    for _ in 0..10_000 {
        match future.as_mut().poll(&mut context) {
            Poll::Ready(output) => return output,
            Poll::Pending => std::hint::spin_loop(),
        }
    }

    panic!("future did not complete in test polling loop");
}

/// Runs `f` with temporary environment variable overrides under a global
/// process-wide lock to avoid cross-test races.
pub fn with_locked_host_env<T>(vars: &[(&str, Option<&str>)], f: impl FnOnce() -> T) -> T {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let previous = vars
        .iter()
        .map(|(name, _)| ((*name).to_string(), std::env::var(name).ok()))
        .collect::<Vec<_>>();

    for (name, value) in vars {
        match value {
            Some(v) => {
                #[allow(unused_unsafe)]
                unsafe {
                    std::env::set_var(name, v);
                }
            }
            None => {
                #[allow(unused_unsafe)]
                unsafe {
                    std::env::remove_var(name);
                }
            }
        }
    }

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

    for (name, value) in previous {
        match value {
            Some(v) => {
                #[allow(unused_unsafe)]
                unsafe {
                    std::env::set_var(name, v);
                }
            }
            None => {
                #[allow(unused_unsafe)]
                unsafe {
                    std::env::remove_var(name);
                }
            }
        }
    }

    match result {
        Ok(output) => output,
        Err(payload) => std::panic::resume_unwind(payload),
    }
}
