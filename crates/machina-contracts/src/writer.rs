//! Transaction submission.
//!
//! Each write occupies one [`TxSlot`] of the writer's [`TransactionTracker`]
//! for its whole lifetime: begin, send, record hash, await receipt, settle.
//! Raw wallet errors are classified here and nowhere else.

use crate::abi::{IMachineManager, IERC20};
use alloy_primitives::Address;
use alloy_sol_types::SolCall;
use machina_core::{
    ErrorClassifier, MachinaConfig, MachinaEffects, MachinaError, MachinaResult, MachineIndex,
    PaymentMode, ReceiptEffects, TokenAmount, TransactionSnapshot, TransactionState,
    TransactionTracker, TxReceipt, TxRequest, TxSlot, WalletEffects,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

/// Submits registry and token transactions.
#[derive(Clone)]
pub struct ContractWriter {
    wallet: Arc<dyn WalletEffects>,
    operator: Arc<dyn WalletEffects>,
    receipts: Arc<dyn ReceiptEffects>,
    registry: Address,
    payment_token: Option<Address>,
    mode: PaymentMode,
    tracker: TransactionTracker,
}

impl std::fmt::Debug for ContractWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractWriter")
            .field("registry", &self.registry)
            .field("payment_token", &self.payment_token)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl ContractWriter {
    pub fn new(effects: &MachinaEffects, config: &MachinaConfig) -> MachinaResult<Self> {
        let payment_token = config.contracts.payment_token;
        if config.payment.mode == PaymentMode::TokenApproval && payment_token.is_none() {
            return Err(MachinaError::config(
                "contracts.payment_token is required in token_approval mode",
            ));
        }
        Ok(Self {
            wallet: effects.wallet.clone(),
            operator: effects.operator.clone(),
            receipts: effects.receipts.clone(),
            registry: config.machine_manager()?,
            payment_token,
            mode: config.payment.mode,
            tracker: TransactionTracker::new(),
        })
    }

    pub fn mode(&self) -> PaymentMode {
        self.mode
    }

    pub fn tracker(&self) -> &TransactionTracker {
        &self.tracker
    }

    pub fn state(&self, slot: TxSlot) -> TransactionState {
        self.tracker.state(slot)
    }

    pub fn subscribe(&self) -> watch::Receiver<TransactionSnapshot> {
        self.tracker.subscribe()
    }

    /// Reset a settled slot to idle.
    pub fn clear(&self, slot: TxSlot) -> MachinaResult<()> {
        self.tracker.clear(slot)
    }

    /// Allow `spender` to pull `amount` of the payment token from the user.
    pub async fn approve(&self, spender: Address, amount: TokenAmount) -> MachinaResult<TxReceipt> {
        let token = self.token()?;
        let call = IERC20::approveCall {
            spender,
            value: amount.base_units(),
        };
        let request = TxRequest::call(token, call.abi_encode());
        self.submit(TxSlot::Approve, self.wallet.as_ref(), request)
            .await
    }

    /// Pay for and unlock a machine. `value` is attached as native value and
    /// is zero in token-approval mode.
    pub async fn use_machine(
        &self,
        index: MachineIndex,
        value: TokenAmount,
    ) -> MachinaResult<TxReceipt> {
        let call = IMachineManager::useMachineCall {
            machineId: index.as_u256(),
        };
        let request =
            TxRequest::call(self.registry, call.abi_encode()).with_value(value.base_units());
        self.submit(TxSlot::UseMachine, self.wallet.as_ref(), request)
            .await
    }

    /// Fund `recipient` from the operator account.
    pub async fn airdrop_token(
        &self,
        recipient: Address,
        amount: TokenAmount,
    ) -> MachinaResult<TxReceipt> {
        let request = match self.mode {
            PaymentMode::Native => TxRequest::transfer(recipient, amount.base_units()),
            PaymentMode::TokenApproval => {
                let call = IERC20::transferCall {
                    to: recipient,
                    value: amount.base_units(),
                };
                TxRequest::call(self.token()?, call.abi_encode())
            }
        };
        self.submit(TxSlot::Airdrop, self.operator.as_ref(), request)
            .await
    }

    fn token(&self) -> MachinaResult<Address> {
        self.payment_token
            .ok_or_else(|| MachinaError::config("contracts.payment_token is not set"))
    }

    async fn submit(
        &self,
        slot: TxSlot,
        wallet: &dyn WalletEffects,
        request: TxRequest,
    ) -> MachinaResult<TxReceipt> {
        self.tracker.begin(slot)?;

        let hash = match wallet.send_transaction(request).await {
            Ok(hash) => hash,
            Err(raw) => {
                let err = MachinaError::from(ErrorClassifier::classify(&raw));
                error!(slot = %slot, error = %raw, kind = ?err.tx_kind(), "transaction submission failed");
                return Err(self.settle_error(slot, err));
            }
        };
        self.tracker.submitted(slot, hash)?;
        info!(slot = %slot, hash = %hash, "transaction submitted");

        let receipt = match self.receipts.wait_for_receipt(hash).await {
            Ok(receipt) => receipt,
            Err(err) => {
                error!(slot = %slot, hash = %hash, error = %err, "waiting for receipt failed");
                return Err(self.settle_error(slot, err));
            }
        };
        if !receipt.success {
            error!(slot = %slot, hash = %hash, "transaction reverted");
            return Err(self.settle_error(slot, MachinaError::Reverted { hash }));
        }

        self.tracker.succeed(slot, hash)?;
        info!(slot = %slot, hash = %hash, block = ?receipt.block_number, "transaction confirmed");
        Ok(receipt)
    }

    fn settle_error(&self, slot: TxSlot, err: MachinaError) -> MachinaError {
        match self.tracker.fail(slot, &err) {
            Ok(()) => err,
            Err(tracker_err) => tracker_err,
        }
    }
}
