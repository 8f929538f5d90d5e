//! In-memory chain implementing the read, receipt and wallet effects.
//!
//! Calldata is decoded with the same bindings the client encodes with, so a
//! test exercises the real ABI path end to end. State changes apply when a
//! transaction is accepted; receipts can be held back to observe pending
//! states.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolInterface, SolValue};
use async_trait::async_trait;
use machina_contracts::abi::{IMachineManager, IERC20};
use machina_core::{
    ChainReadEffects, MachinaError, MachinaResult, Machine, MachineEncoding, MachineIndex,
    ProviderError, ReceiptEffects, TokenAmount, TxReceipt, TxRequest, WalletEffects,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::watch;

/// What a submitted transaction does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmissionKind {
    NativeTransfer,
    TokenTransfer,
    Approve,
    UseMachine,
    Other,
}

/// One call to `send_transaction`, accepted or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub from: Address,
    pub kind: SubmissionKind,
    pub request: TxRequest,
    /// `Ok(hash)` when the wallet accepted it.
    pub outcome: Result<B256, ProviderError>,
}

/// Ordered record of what the chain observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    Submitted { kind: SubmissionKind, hash: B256 },
    Confirmed { hash: B256 },
}

#[derive(Debug, Default)]
struct ChainState {
    native: HashMap<Address, U256>,
    tokens: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
    machines: BTreeMap<U256, Machine>,
    next_machine_id: U256,
    used: HashSet<(U256, Address)>,
    receipts: HashMap<B256, TxReceipt>,
    submissions: Vec<Submission>,
    events: Vec<ChainEvent>,
    scripted: HashMap<SubmissionKind, VecDeque<ProviderError>>,
    reverting: HashSet<SubmissionKind>,
    unreadable: HashSet<U256>,
    malformed: HashSet<U256>,
    reads_down: bool,
    nonce: u64,
}

/// Shared handle to one simulated chain.
#[derive(Clone)]
pub struct SimulatedChain {
    state: Arc<Mutex<ChainState>>,
    registry: Address,
    token: Address,
    encoding: MachineEncoding,
    chain_id: u64,
    receipts_open: Arc<watch::Sender<bool>>,
}

impl std::fmt::Debug for SimulatedChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedChain")
            .field("registry", &self.registry)
            .field("token", &self.token)
            .field("chain_id", &self.chain_id)
            .finish_non_exhaustive()
    }
}

impl SimulatedChain {
    pub fn new(registry: Address, token: Address, chain_id: u64) -> Self {
        let (receipts_open, _) = watch::channel(true);
        let state = ChainState {
            next_machine_id: U256::from(1u64),
            ..ChainState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            registry,
            token,
            encoding: MachineEncoding::Struct,
            chain_id,
            receipts_open: Arc::new(receipts_open),
        }
    }

    /// Serve `getMachine` with the given return layout.
    pub fn with_encoding(mut self, encoding: MachineEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// A wallet signing for `account`, starting on this chain.
    pub fn wallet(&self, account: Address) -> SimulatedWallet {
        SimulatedWallet::new(self.clone(), Some(account), self.chain_id)
    }

    /// A wallet with no connected account.
    pub fn disconnected_wallet(&self) -> SimulatedWallet {
        SimulatedWallet::new(self.clone(), None, self.chain_id)
    }

    // === Setup ===

    /// Register a machine and advance `nextMachineId` past it.
    pub fn add_machine(&self, index: u64, name: &str, price: TokenAmount) -> Machine {
        let machine = Machine {
            index: MachineIndex::from(index),
            name: name.to_string(),
            machine_addr: Address::from_word(keccak256(name.as_bytes())),
            price,
            platform_fee_bps: 250,
            exists: true,
        };
        let mut state = self.state.lock();
        let id = U256::from(index);
        state.machines.insert(id, machine.clone());
        if id >= state.next_machine_id {
            state.next_machine_id = id + U256::from(1u64);
        }
        machine
    }

    pub fn set_native_balance(&self, account: Address, amount: TokenAmount) {
        self.state.lock().native.insert(account, amount.base_units());
    }

    pub fn set_token_balance(&self, account: Address, amount: TokenAmount) {
        self.state.lock().tokens.insert(account, amount.base_units());
    }

    pub fn set_allowance(&self, owner: Address, spender: Address, amount: TokenAmount) {
        self.state
            .lock()
            .allowances
            .insert((owner, spender), amount.base_units());
    }

    pub fn mark_used(&self, index: u64, user: Address) {
        self.state.lock().used.insert((U256::from(index), user));
    }

    // === Fault injection ===

    /// Reject the next submission of `kind` with `error`.
    pub fn fail_next(&self, kind: SubmissionKind, error: ProviderError) {
        self.state
            .lock()
            .scripted
            .entry(kind)
            .or_default()
            .push_back(error);
    }

    /// Mine every future transaction of `kind` as reverted.
    pub fn revert_all(&self, kind: SubmissionKind) {
        self.state.lock().reverting.insert(kind);
    }

    /// `getMachine(index)` fails at the transport level.
    pub fn make_unreadable(&self, index: u64) {
        self.state.lock().unreadable.insert(U256::from(index));
    }

    /// `getMachine(index)` returns bytes that match no known layout.
    pub fn make_malformed(&self, index: u64) {
        self.state.lock().malformed.insert(U256::from(index));
    }

    /// Every read fails at the transport level.
    pub fn set_reads_down(&self, down: bool) {
        self.state.lock().reads_down = down;
    }

    /// Hold back receipts until [`SimulatedChain::release_receipts`].
    pub fn hold_receipts(&self) {
        self.receipts_open.send_replace(false);
    }

    pub fn release_receipts(&self) {
        self.receipts_open.send_replace(true);
    }

    // === Inspection ===

    pub fn native_balance_of(&self, account: Address) -> TokenAmount {
        TokenAmount::from_base_units(self.state.lock().native.get(&account).copied().unwrap_or_default())
    }

    pub fn token_balance_of(&self, account: Address) -> TokenAmount {
        TokenAmount::from_base_units(self.state.lock().tokens.get(&account).copied().unwrap_or_default())
    }

    pub fn allowance_of(&self, owner: Address, spender: Address) -> TokenAmount {
        TokenAmount::from_base_units(
            self.state
                .lock()
                .allowances
                .get(&(owner, spender))
                .copied()
                .unwrap_or_default(),
        )
    }

    pub fn has_used(&self, index: u64, user: Address) -> bool {
        self.state.lock().used.contains(&(U256::from(index), user))
    }

    /// Every submission attempt, in order.
    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().submissions.clone()
    }

    /// Submission attempts of one kind.
    pub fn submissions_of(&self, kind: SubmissionKind) -> Vec<Submission> {
        self.state
            .lock()
            .submissions
            .iter()
            .filter(|s| s.kind == kind)
            .cloned()
            .collect()
    }

    pub fn events(&self) -> Vec<ChainEvent> {
        self.state.lock().events.clone()
    }

    // === Execution ===

    fn classify_request(&self, request: &TxRequest) -> SubmissionKind {
        if request.data.is_empty() {
            return SubmissionKind::NativeTransfer;
        }
        if request.to == self.registry {
            if let Ok(IMachineManager::IMachineManagerCalls::useMachine(_)) =
                IMachineManager::IMachineManagerCalls::abi_decode(&request.data, true)
            {
                return SubmissionKind::UseMachine;
            }
        } else if request.to == self.token {
            match IERC20::IERC20Calls::abi_decode(&request.data, true) {
                Ok(IERC20::IERC20Calls::approve(_)) => return SubmissionKind::Approve,
                Ok(IERC20::IERC20Calls::transfer(_)) => return SubmissionKind::TokenTransfer,
                _ => {}
            }
        }
        SubmissionKind::Other
    }

    fn submit(&self, from: Address, request: TxRequest) -> Result<B256, ProviderError> {
        let kind = self.classify_request(&request);
        let mut state = self.state.lock();

        let scripted = state.scripted.get_mut(&kind).and_then(VecDeque::pop_front);
        let outcome = match scripted {
            Some(error) => Err(error),
            None => self.execute(&mut state, from, kind, &request),
        };

        state.submissions.push(Submission {
            from,
            kind,
            request,
            outcome: outcome.clone(),
        });
        match &outcome {
            Ok(hash) => {
                tracing::debug!(from = %from, kind = ?kind, hash = %hash, "simulated submission accepted");
                state.events.push(ChainEvent::Submitted { kind, hash: *hash });
            }
            Err(err) => {
                tracing::debug!(from = %from, kind = ?kind, error = %err, "simulated submission refused");
            }
        }
        outcome
    }

    /// Apply `request` and mine it. Returns an error only where a node would
    /// refuse the transaction outright.
    fn execute(
        &self,
        state: &mut ChainState,
        from: Address,
        kind: SubmissionKind,
        request: &TxRequest,
    ) -> Result<B256, ProviderError> {
        let native = state.native.get(&from).copied().unwrap_or_default();
        if native < request.value {
            return Err(ProviderError::new(
                Some(-32000),
                "insufficient funds for gas * price + value",
            ));
        }

        let success =
            !state.reverting.contains(&kind) && apply(state, self.registry, from, kind, request);
        if success && !request.value.is_zero() {
            *state.native.entry(from).or_default() -= request.value;
            *state.native.entry(request.to).or_default() += request.value;
        }

        state.nonce += 1;
        let hash = keccak256(state.nonce.to_be_bytes());
        let block_number = state.nonce;
        state.receipts.insert(
            hash,
            TxReceipt {
                hash,
                success,
                block_number: Some(block_number),
                gas_used: Some(21_000),
            },
        );
        Ok(hash)
    }

    fn read(&self, to: Address, data: &[u8]) -> Result<Bytes, ProviderError> {
        let state = self.state.lock();
        if state.reads_down {
            return Err(ProviderError::message("connection refused"));
        }

        if to == self.registry {
            let call = IMachineManager::IMachineManagerCalls::abi_decode(data, true)
                .map_err(|e| ProviderError::new(Some(-32000), format!("execution reverted: {e}")))?;
            let encoded = match call {
                IMachineManager::IMachineManagerCalls::getMachine(call) => {
                    let id = call.machineId;
                    if state.unreadable.contains(&id) {
                        return Err(ProviderError::message("upstream request timed out"));
                    }
                    if state.malformed.contains(&id) {
                        return Ok(Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]));
                    }
                    let machine = state
                        .machines
                        .get(&id)
                        .cloned()
                        .unwrap_or_else(|| Machine {
                            name: String::new(),
                            ..Machine::placeholder(MachineIndex::new(id))
                        });
                    self.encode_machine(machine)
                }
                IMachineManager::IMachineManagerCalls::nextMachineId(_) => {
                    (state.next_machine_id,).abi_encode_params()
                }
                IMachineManager::IMachineManagerCalls::hasUsedMachine(call) => {
                    (state.used.contains(&(call.machineId, call.user)),).abi_encode_params()
                }
                IMachineManager::IMachineManagerCalls::useMachine(_) => {
                    return Err(ProviderError::message("useMachine is not a view function"))
                }
            };
            return Ok(encoded.into());
        }

        if to == self.token {
            let call = IERC20::IERC20Calls::abi_decode(data, true)
                .map_err(|e| ProviderError::new(Some(-32000), format!("execution reverted: {e}")))?;
            let encoded = match call {
                IERC20::IERC20Calls::balanceOf(call) => {
                    (state.tokens.get(&call.account).copied().unwrap_or_default(),)
                        .abi_encode_params()
                }
                IERC20::IERC20Calls::allowance(call) => (state
                    .allowances
                    .get(&(call.owner, call.spender))
                    .copied()
                    .unwrap_or_default(),)
                    .abi_encode_params(),
                _ => return Err(ProviderError::message("not a view function")),
            };
            return Ok(encoded.into());
        }

        Err(ProviderError::new(Some(-32000), format!("no contract at {to}")))
    }

    fn encode_machine(&self, machine: Machine) -> Vec<u8> {
        match self.encoding {
            MachineEncoding::Struct => (IMachineManager::MachineInfo {
                name: machine.name,
                machineAddr: machine.machine_addr,
                price: machine.price.base_units(),
                platformFeeBps: machine.platform_fee_bps,
                exists: machine.exists,
            },)
                .abi_encode_params(),
            MachineEncoding::Tuple => (
                machine.name,
                machine.machine_addr,
                machine.price.base_units(),
                machine.platform_fee_bps,
                machine.exists,
            )
                .abi_encode_params(),
        }
    }
}

/// State transition of an accepted transaction; `false` means it reverted.
fn apply(
    state: &mut ChainState,
    registry: Address,
    from: Address,
    kind: SubmissionKind,
    request: &TxRequest,
) -> bool {
    match kind {
        SubmissionKind::NativeTransfer | SubmissionKind::Other => true,
        SubmissionKind::Approve => match IERC20::approveCall::abi_decode(&request.data, true) {
            Ok(call) => {
                state.allowances.insert((from, call.spender), call.value);
                true
            }
            Err(_) => false,
        },
        SubmissionKind::TokenTransfer => match IERC20::transferCall::abi_decode(&request.data, true)
        {
            Ok(call) => move_tokens(state, from, call.to, call.value),
            Err(_) => false,
        },
        SubmissionKind::UseMachine => {
            let Ok(call) = IMachineManager::useMachineCall::abi_decode(&request.data, true) else {
                return false;
            };
            let Some(price) = state
                .machines
                .get(&call.machineId)
                .filter(|m| m.exists)
                .map(|m| m.price.base_units())
            else {
                return false;
            };

            let paid = if request.value >= price {
                true
            } else {
                let allowance = state
                    .allowances
                    .get(&(from, registry))
                    .copied()
                    .unwrap_or_default();
                if allowance >= price && move_tokens(state, from, registry, price) {
                    state.allowances.insert((from, registry), allowance - price);
                    true
                } else {
                    false
                }
            };
            if paid {
                state.used.insert((call.machineId, from));
            }
            paid
        }
    }
}

fn move_tokens(state: &mut ChainState, from: Address, to: Address, amount: U256) -> bool {
    let balance = state.tokens.get(&from).copied().unwrap_or_default();
    if balance < amount {
        return false;
    }
    state.tokens.insert(from, balance - amount);
    *state.tokens.entry(to).or_default() += amount;
    true
}

#[async_trait]
impl ChainReadEffects for SimulatedChain {
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ProviderError> {
        self.read(to, &data)
    }

    async fn native_balance(&self, account: Address) -> Result<U256, ProviderError> {
        let state = self.state.lock();
        if state.reads_down {
            return Err(ProviderError::message("connection refused"));
        }
        Ok(state.native.get(&account).copied().unwrap_or_default())
    }
}

#[async_trait]
impl ReceiptEffects for SimulatedChain {
    async fn wait_for_receipt(&self, hash: B256) -> MachinaResult<TxReceipt> {
        let mut open = self.receipts_open.subscribe();
        open.wait_for(|open| *open)
            .await
            .map_err(|_| MachinaError::internal("receipt gate closed"))?;

        let mut state = self.state.lock();
        let receipt = state
            .receipts
            .get(&hash)
            .cloned()
            .ok_or(MachinaError::ConfirmationTimeout { hash })?;
        state.events.push(ChainEvent::Confirmed { hash });
        Ok(receipt)
    }
}

/// Wallet bound to one account of a [`SimulatedChain`].
#[derive(Clone)]
pub struct SimulatedWallet {
    chain: SimulatedChain,
    account: Option<Address>,
    network: Arc<Mutex<u64>>,
    switch_refused: Arc<Mutex<Option<ProviderError>>>,
    switch_requests: Arc<Mutex<Vec<u64>>>,
}

impl std::fmt::Debug for SimulatedWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedWallet")
            .field("account", &self.account)
            .field("network", &*self.network.lock())
            .finish_non_exhaustive()
    }
}

impl SimulatedWallet {
    fn new(chain: SimulatedChain, account: Option<Address>, network: u64) -> Self {
        Self {
            chain,
            account,
            network: Arc::new(Mutex::new(network)),
            switch_refused: Arc::new(Mutex::new(None)),
            switch_requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Start on a different network than the chain's.
    pub fn on_network(self, chain_id: u64) -> Self {
        *self.network.lock() = chain_id;
        self
    }

    /// Refuse network switch requests with `error`.
    pub fn refuse_switch(&self, error: ProviderError) {
        *self.switch_refused.lock() = Some(error);
    }

    pub fn switch_requests(&self) -> Vec<u64> {
        self.switch_requests.lock().clone()
    }

    pub fn address(&self) -> Option<Address> {
        self.account
    }
}

#[async_trait]
impl WalletEffects for SimulatedWallet {
    async fn connected_account(&self) -> Option<Address> {
        self.account
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        Ok(*self.network.lock())
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), ProviderError> {
        self.switch_requests.lock().push(chain_id);
        if let Some(error) = self.switch_refused.lock().clone() {
            return Err(error);
        }
        *self.network.lock() = chain_id;
        Ok(())
    }

    async fn send_transaction(&self, request: TxRequest) -> Result<B256, ProviderError> {
        let from = self
            .account
            .ok_or_else(|| ProviderError::new(Some(4100), "The requested account has not been authorized"))?;
        if *self.network.lock() != self.chain.chain_id {
            return Err(ProviderError::new(Some(4901), "Wallet is connected to a different chain"));
        }
        self.chain.submit(from, request)
    }
}
