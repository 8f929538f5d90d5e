//! Observable progress of a payment flow.

use alloy_primitives::{Address, B256};
use machina_core::{MachinaError, MachinaResult, Machine, TokenAmount, TxSlot};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Steps of a payment, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStep {
    CheckingWallet,
    SwitchingNetwork,
    ReadingMachine,
    CheckingUsage,
    Airdropping,
    CheckingBalance,
    Approving,
    UsingMachine,
}

impl fmt::Display for FlowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FlowStep::CheckingWallet => "checking wallet",
            FlowStep::SwitchingNetwork => "switching network",
            FlowStep::ReadingMachine => "reading machine",
            FlowStep::CheckingUsage => "checking usage history",
            FlowStep::Airdropping => "airdropping funds",
            FlowStep::CheckingBalance => "checking balance",
            FlowStep::Approving => "approving payment token",
            FlowStep::UsingMachine => "using machine",
        };
        f.write_str(text)
    }
}

/// A completed payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub machine: Machine,
    pub user: Address,
    pub price: TokenAmount,
    /// Amount sent by the operator to a first-time user.
    pub airdrop_amount: Option<TokenAmount>,
    pub airdrop_hash: Option<B256>,
    pub approve_hash: Option<B256>,
    pub use_machine_hash: B256,
}

/// Why a flow stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowFailure {
    pub step: FlowStep,
    pub error: MachinaError,
}

impl FlowFailure {
    pub fn new(step: FlowStep, error: MachinaError) -> Self {
        Self { step, error }
    }

    /// Display-ready text.
    pub fn user_message(&self) -> String {
        self.error.user_message()
    }
}

impl fmt::Display for FlowFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "payment failed while {}: {}", self.step, self.error)
    }
}

/// Progress event delivered to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowUpdate {
    Step(FlowStep),
    /// A transaction of the flow was mined successfully.
    Confirmed { slot: TxSlot, hash: B256 },
    /// A submission failed transiently and will be attempted again.
    Retrying {
        slot: TxSlot,
        next_attempt: u32,
        reason: String,
    },
    Completed(PaymentReceipt),
    Failed(FlowFailure),
}

/// A running payment flow.
///
/// The update stream ends after the terminal `Completed` or `Failed` update.
#[derive(Debug)]
pub struct PaymentFlowHandle {
    updates: UnboundedReceiverStream<FlowUpdate>,
    outcome: JoinHandle<MachinaResult<PaymentReceipt>>,
}

impl PaymentFlowHandle {
    pub(crate) fn new(
        updates: UnboundedReceiverStream<FlowUpdate>,
        outcome: JoinHandle<MachinaResult<PaymentReceipt>>,
    ) -> Self {
        Self { updates, outcome }
    }

    /// Progress updates in emission order.
    pub fn updates(&mut self) -> &mut UnboundedReceiverStream<FlowUpdate> {
        &mut self.updates
    }

    /// Wait for the flow to finish.
    pub async fn outcome(self) -> MachinaResult<PaymentReceipt> {
        self.outcome
            .await
            .map_err(|err| MachinaError::internal(format!("payment task failed: {err}")))?
    }
}
