//! Payment flow orchestration.
//!
//! One flow pays for one machine on behalf of one user:
//!
//! 1. the wallet must be connected as `user` and on the configured network
//! 2. the machine is read fresh from the registry
//! 3. a first-time user is airdropped `price + gas_buffer` by the operator and
//!    the airdrop receipt is awaited, unless their balance already covers
//!    `price` (as it does after an earlier airdrop whose flow later failed)
//! 4. a returning user must already hold `price`
//! 5. in token-approval mode the registry is approved for `price` when the
//!    current allowance is short
//! 6. `useMachine` is submitted and its receipt awaited
//!
//! Steps run strictly in order and the first failure ends the flow. Chain
//! state is re-read on every run, so retrying a failed flow from the start
//! never repeats a step that already took effect.

use crate::flow::{FlowFailure, FlowStep, FlowUpdate, PaymentFlowHandle, PaymentReceipt};
use crate::notifications::{NewNotification, NotificationService};
use crate::single_flight::{FlightGuard, SingleFlight};
use alloy_primitives::Address;
use machina_contracts::{ContractReader, ContractWriter};
use machina_core::{
    ErrorClassifier, MachinaConfig, MachinaEffects, MachinaError, MachinaResult, MachineIndex,
    PaymentMode, RetryPolicy, TimeEffects, TokenAmount, TransactionSnapshot, TransactionState,
    TxReceipt, TxSlot, TxStatus, WalletEffects,
};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, warn};

type UpdateSender = mpsc::UnboundedSender<FlowUpdate>;

/// Runs payment flows.
#[derive(Clone)]
pub struct PaymentOrchestrator {
    reader: ContractReader,
    writer: ContractWriter,
    wallet: Arc<dyn WalletEffects>,
    time: Arc<dyn TimeEffects>,
    chain_id: u64,
    mode: PaymentMode,
    gas_buffer: TokenAmount,
    retry: RetryPolicy,
    flights: SingleFlight,
    notifications: Option<Arc<NotificationService>>,
}

impl std::fmt::Debug for PaymentOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentOrchestrator")
            .field("chain_id", &self.chain_id)
            .field("mode", &self.mode)
            .field("gas_buffer", &self.gas_buffer)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl PaymentOrchestrator {
    pub fn new(effects: &MachinaEffects, config: &MachinaConfig) -> MachinaResult<Self> {
        Ok(Self {
            reader: ContractReader::new(effects.chain.clone(), config)?,
            writer: ContractWriter::new(effects, config)?,
            wallet: effects.wallet.clone(),
            time: effects.time.clone(),
            chain_id: config.network.chain_id,
            mode: config.payment.mode,
            gas_buffer: config.payment.gas_buffer,
            retry: config.payment.retry.policy(),
            flights: SingleFlight::new(),
            notifications: None,
        })
    }

    /// Post payment outcomes to `service`.
    pub fn with_notifications(mut self, service: Arc<NotificationService>) -> Self {
        self.notifications = Some(service);
        self
    }

    pub fn reader(&self) -> &ContractReader {
        &self.reader
    }

    pub fn writer(&self) -> &ContractWriter {
        &self.writer
    }

    /// Start a flow in the background.
    ///
    /// The (user, machine) claim is taken before this returns, so a second
    /// call for the same pair fails with `FlowInProgress` while the first
    /// runs. An unparseable id fails here as well; every later failure is
    /// reported through the handle.
    pub fn start(&self, machine_id: &str, user: Address) -> MachinaResult<PaymentFlowHandle> {
        let index = self.reader.convert_machine_id(machine_id)?;
        let guard = self.claim(user, index)?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let this = self.clone();
        let outcome = tokio::spawn(async move {
            let _guard = guard;
            this.execute(index, user, &sender).await
        });
        Ok(PaymentFlowHandle::new(
            UnboundedReceiverStream::new(receiver),
            outcome,
        ))
    }

    /// Run a flow to completion on the current task.
    pub async fn run(&self, machine_id: &str, user: Address) -> MachinaResult<PaymentReceipt> {
        let index = self.reader.convert_machine_id(machine_id)?;
        let _guard = self.claim(user, index)?;
        let (sender, _receiver) = mpsc::unbounded_channel();
        self.execute(index, user, &sender).await
    }

    /// Clear failed slots and start the flow again from the beginning.
    ///
    /// Steps that already took effect on chain are skipped: a landed airdrop
    /// leaves the balance covering the price, and a sufficient allowance
    /// skips the approval.
    pub fn retry(&self, machine_id: &str, user: Address) -> MachinaResult<PaymentFlowHandle> {
        for slot in TxSlot::ALL {
            if self.writer.state(slot).status == TxStatus::Error {
                self.writer.clear(slot)?;
            }
        }
        self.start(machine_id, user)
    }

    pub fn clear_transaction_state(&self, slot: TxSlot) -> MachinaResult<()> {
        self.writer.clear(slot)
    }

    pub fn transaction_state(&self, slot: TxSlot) -> TransactionState {
        self.writer.state(slot)
    }

    pub fn subscribe_transactions(&self) -> watch::Receiver<TransactionSnapshot> {
        self.writer.subscribe()
    }

    fn claim(&self, user: Address, index: MachineIndex) -> MachinaResult<FlightGuard> {
        self.flights.acquire(user, index).map_err(|err| {
            warn!(machine = %index, user = %user, "payment already in progress");
            err
        })
    }

    async fn execute(
        &self,
        index: MachineIndex,
        user: Address,
        updates: &UpdateSender,
    ) -> MachinaResult<PaymentReceipt> {
        match self.steps(index, user, updates).await {
            Ok(receipt) => {
                info!(
                    machine = %index,
                    user = %user,
                    hash = %receipt.use_machine_hash,
                    price = %receipt.price,
                    "payment completed"
                );
                self.notify(NewNotification::payment(
                    true,
                    receipt.price,
                    &receipt.machine.name,
                ))
                .await;
                let _ = updates.send(FlowUpdate::Completed(receipt.clone()));
                Ok(receipt)
            }
            Err(failure) => {
                error!(
                    machine = %index,
                    user = %user,
                    step = %failure.step,
                    error = %failure.error,
                    "payment failed"
                );
                // A failed useMachine already posted its own notification.
                if failure.step != FlowStep::UsingMachine {
                    self.notify(NewNotification::system(
                        "Payment Failed",
                        failure.user_message(),
                    ))
                    .await;
                }
                let error = failure.error.clone();
                let _ = updates.send(FlowUpdate::Failed(failure));
                Err(error)
            }
        }
    }

    async fn steps(
        &self,
        index: MachineIndex,
        user: Address,
        updates: &UpdateSender,
    ) -> Result<PaymentReceipt, FlowFailure> {
        let enter = |step: FlowStep| {
            debug!(machine = %index, user = %user, step = %step, "payment step");
            let _ = updates.send(FlowUpdate::Step(step));
            move |error: MachinaError| FlowFailure::new(step, error)
        };

        let fail = enter(FlowStep::CheckingWallet);
        match self.wallet.connected_account().await {
            None => return Err(fail(MachinaError::NoWallet)),
            Some(connected) if connected != user => {
                return Err(fail(MachinaError::WrongAccount {
                    connected,
                    requested: user,
                }))
            }
            Some(_) => {}
        }

        let current_chain = self
            .wallet
            .chain_id()
            .await
            .map_err(|err| fail(MachinaError::chain_rpc(err.to_string())))?;
        if current_chain != self.chain_id {
            let fail = enter(FlowStep::SwitchingNetwork);
            info!(from = current_chain, to = self.chain_id, "requesting network switch");
            self.wallet
                .switch_chain(self.chain_id)
                .await
                .map_err(|err| fail(ErrorClassifier::classify(&err).into()))?;
        }

        let fail = enter(FlowStep::ReadingMachine);
        let machine = self.reader.get_machine(index).await.map_err(fail)?;
        if !machine.exists {
            return Err(fail(MachinaError::MachineNotFound { index }));
        }
        let price = machine.price;

        let fail = enter(FlowStep::CheckingUsage);
        let used = self
            .reader
            .has_used_machine(index, user)
            .await
            .map_err(fail)?;

        let mut airdrop_amount = None;
        let mut airdrop_hash = None;
        if !used {
            let fail = enter(FlowStep::Airdropping);
            let balance = self.paying_balance(user).await.map_err(fail)?;
            if balance >= price {
                info!(
                    machine = %index,
                    user = %user,
                    balance = %balance,
                    "first-time user already holds the price, skipping airdrop"
                );
            } else {
                let amount = price
                    .checked_add(self.gas_buffer)
                    .ok_or_else(|| fail(MachinaError::internal("airdrop amount overflows")))?;
                info!(machine = %index, user = %user, amount = %amount, "airdropping to first-time user");
                let receipt = self
                    .submit(TxSlot::Airdrop, updates, || {
                        self.writer.airdrop_token(user, amount)
                    })
                    .await
                    .map_err(fail)?;
                airdrop_amount = Some(amount);
                airdrop_hash = Some(receipt.hash);
                self.notify(NewNotification::airdrop(amount)).await;
            }
        } else {
            let fail = enter(FlowStep::CheckingBalance);
            let balance = self.paying_balance(user).await.map_err(fail)?;
            if balance < price {
                return Err(fail(MachinaError::InsufficientBalance {
                    balance,
                    required: price,
                }));
            }
        }

        let mut approve_hash = None;
        if self.mode == PaymentMode::TokenApproval {
            let fail = enter(FlowStep::Approving);
            let registry = self.reader.registry();
            let allowance = self
                .reader
                .get_token_allowance(user, registry)
                .await
                .map_err(fail)?;
            if allowance < price {
                let receipt = self
                    .submit(TxSlot::Approve, updates, || {
                        self.writer.approve(registry, price)
                    })
                    .await
                    .map_err(fail)?;
                approve_hash = Some(receipt.hash);
            } else {
                debug!(machine = %index, allowance = %allowance, "allowance already covers price");
            }
        }

        let fail = enter(FlowStep::UsingMachine);
        let value = match self.mode {
            PaymentMode::Native => price,
            PaymentMode::TokenApproval => TokenAmount::ZERO,
        };
        let receipt = match self
            .submit(TxSlot::UseMachine, updates, || {
                self.writer.use_machine(index, value)
            })
            .await
        {
            Ok(receipt) => receipt,
            Err(err) => {
                self.notify(NewNotification::payment(false, price, &machine.name))
                    .await;
                return Err(fail(err));
            }
        };

        Ok(PaymentReceipt {
            machine,
            user,
            price,
            airdrop_amount,
            airdrop_hash,
            approve_hash,
            use_machine_hash: receipt.hash,
        })
    }

    /// Balance of the asset `useMachine` is paid in.
    async fn paying_balance(&self, user: Address) -> MachinaResult<TokenAmount> {
        match self.mode {
            PaymentMode::Native => self.reader.get_native_balance(user).await,
            PaymentMode::TokenApproval => self.reader.get_token_balance(user).await,
        }
    }

    /// Submit through `op` under the retry policy. Only transient failures
    /// are attempted again.
    async fn submit<F, Fut>(
        &self,
        slot: TxSlot,
        updates: &UpdateSender,
        mut op: F,
    ) -> MachinaResult<TxReceipt>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = MachinaResult<TxReceipt>>,
    {
        let mut next_attempt = 1;
        let receipt = self
            .retry
            .execute(
                self.time.as_ref(),
                |err: &MachinaError| {
                    if !err.is_retryable() {
                        return false;
                    }
                    next_attempt += 1;
                    let _ = updates.send(FlowUpdate::Retrying {
                        slot,
                        next_attempt,
                        reason: err.to_string(),
                    });
                    true
                },
                |_| op(),
            )
            .await?;
        let _ = updates.send(FlowUpdate::Confirmed {
            slot,
            hash: receipt.hash,
        });
        Ok(receipt)
    }

    async fn notify(&self, notification: NewNotification) {
        if let Some(service) = &self.notifications {
            if let Err(err) = service.add(notification).await {
                warn!(error = %err, "failed to post notification");
            }
        }
    }
}
