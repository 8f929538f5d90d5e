//! Per-slot transaction lifecycle.
//!
//! Each logical operation the client submits (approval, airdrop, machine use)
//! owns one slot. A slot moves `Idle → Pending → Success | Error` and is put
//! back to `Idle` only by an explicit [`TransactionTracker::clear`]. A slot
//! never holds two in-flight transactions: [`TransactionTracker::begin`] on a
//! pending slot fails with [`MachinaError::SlotBusy`].
//!
//! Every transition is published on a `tokio::sync::watch` channel so display
//! layers can bind to the current [`TransactionSnapshot`].

use crate::errors::{MachinaError, MachinaResult};
use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Logical transaction slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxSlot {
    Approve,
    Airdrop,
    UseMachine,
}

impl TxSlot {
    pub const ALL: [TxSlot; 3] = [TxSlot::Approve, TxSlot::Airdrop, TxSlot::UseMachine];
}

impl fmt::Display for TxSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TxSlot::Approve => "approve",
            TxSlot::Airdrop => "airdrop",
            TxSlot::UseMachine => "useMachine",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    #[default]
    Idle,
    Pending,
    Success,
    Error,
}

/// Observable state of one slot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransactionState {
    pub status: TxStatus,
    /// Set once the wallet has accepted the transaction.
    pub hash: Option<B256>,
    /// Raw error text.
    pub error: Option<String>,
    /// Classified, display-ready error text.
    pub user_friendly_error: Option<String>,
}

impl TransactionState {
    pub fn idle() -> Self {
        Self::default()
    }

    fn pending() -> Self {
        Self {
            status: TxStatus::Pending,
            ..Self::default()
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == TxStatus::Pending
    }
}

/// State of every slot at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransactionSnapshot {
    pub approve: TransactionState,
    pub airdrop: TransactionState,
    pub use_machine: TransactionState,
}

impl TransactionSnapshot {
    pub fn get(&self, slot: TxSlot) -> &TransactionState {
        match slot {
            TxSlot::Approve => &self.approve,
            TxSlot::Airdrop => &self.airdrop,
            TxSlot::UseMachine => &self.use_machine,
        }
    }

    fn get_mut(&mut self, slot: TxSlot) -> &mut TransactionState {
        match slot {
            TxSlot::Approve => &mut self.approve,
            TxSlot::Airdrop => &mut self.airdrop,
            TxSlot::UseMachine => &mut self.use_machine,
        }
    }

    pub fn any_pending(&self) -> bool {
        TxSlot::ALL.iter().any(|slot| self.get(*slot).is_pending())
    }
}

/// Shared owner of the slot state machine.
#[derive(Debug, Clone)]
pub struct TransactionTracker {
    sender: Arc<watch::Sender<TransactionSnapshot>>,
}

impl Default for TransactionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionTracker {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(TransactionSnapshot::default());
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<TransactionSnapshot> {
        self.sender.subscribe()
    }

    pub fn snapshot(&self) -> TransactionSnapshot {
        self.sender.borrow().clone()
    }

    pub fn state(&self, slot: TxSlot) -> TransactionState {
        self.sender.borrow().get(slot).clone()
    }

    /// Move `slot` to `Pending`. Fails if it already is.
    pub fn begin(&self, slot: TxSlot) -> MachinaResult<()> {
        let mut busy = false;
        self.sender.send_if_modified(|snapshot| {
            let state = snapshot.get_mut(slot);
            if state.is_pending() {
                busy = true;
                return false;
            }
            *state = TransactionState::pending();
            true
        });
        if busy {
            Err(MachinaError::SlotBusy { slot })
        } else {
            Ok(())
        }
    }

    /// Record the hash of the transaction occupying a pending slot.
    pub fn submitted(&self, slot: TxSlot, hash: B256) -> MachinaResult<()> {
        self.transition(slot, |state| state.hash = Some(hash))
    }

    pub fn succeed(&self, slot: TxSlot, hash: B256) -> MachinaResult<()> {
        self.transition(slot, |state| {
            state.status = TxStatus::Success;
            state.hash = Some(hash);
        })
    }

    pub fn fail(&self, slot: TxSlot, error: &MachinaError) -> MachinaResult<()> {
        let raw = error.to_string();
        let friendly = error.user_message();
        self.transition(slot, |state| {
            state.status = TxStatus::Error;
            state.error = Some(raw);
            state.user_friendly_error = Some(friendly);
        })
    }

    /// Reset a settled slot to `Idle`.
    pub fn clear(&self, slot: TxSlot) -> MachinaResult<()> {
        let mut busy = false;
        self.sender.send_if_modified(|snapshot| {
            let state = snapshot.get_mut(slot);
            if state.is_pending() {
                busy = true;
                return false;
            }
            let changed = *state != TransactionState::idle();
            *state = TransactionState::idle();
            changed
        });
        if busy {
            Err(MachinaError::SlotBusy { slot })
        } else {
            Ok(())
        }
    }

    fn transition(
        &self,
        slot: TxSlot,
        apply: impl FnOnce(&mut TransactionState),
    ) -> MachinaResult<()> {
        let mut applied = false;
        self.sender.send_if_modified(|snapshot| {
            let state = snapshot.get_mut(slot);
            if !state.is_pending() {
                return false;
            }
            apply(state);
            applied = true;
            true
        });
        if applied {
            Ok(())
        } else {
            Err(MachinaError::internal(format!(
                "transaction slot {slot} is not pending"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn slot_moves_through_lifecycle() {
        let tracker = TransactionTracker::new();
        let hash = B256::repeat_byte(0xab);

        tracker.begin(TxSlot::UseMachine).unwrap();
        assert!(tracker.state(TxSlot::UseMachine).is_pending());

        tracker.submitted(TxSlot::UseMachine, hash).unwrap();
        assert_eq!(tracker.state(TxSlot::UseMachine).hash, Some(hash));

        tracker.succeed(TxSlot::UseMachine, hash).unwrap();
        let state = tracker.state(TxSlot::UseMachine);
        assert_eq!(state.status, TxStatus::Success);
        assert_eq!(state.hash, Some(hash));
    }

    #[test]
    fn pending_slot_rejects_second_begin() {
        let tracker = TransactionTracker::new();
        tracker.begin(TxSlot::Approve).unwrap();
        assert_matches!(
            tracker.begin(TxSlot::Approve),
            Err(MachinaError::SlotBusy { slot: TxSlot::Approve })
        );
        // Other slots are independent.
        tracker.begin(TxSlot::Airdrop).unwrap();
    }

    #[test]
    fn error_records_both_texts_and_clears_to_idle() {
        let tracker = TransactionTracker::new();
        tracker.begin(TxSlot::UseMachine).unwrap();
        tracker
            .fail(TxSlot::UseMachine, &MachinaError::NoWallet)
            .unwrap();

        let state = tracker.state(TxSlot::UseMachine);
        assert_eq!(state.status, TxStatus::Error);
        assert_eq!(state.error.as_deref(), Some("No wallet connected"));
        assert_eq!(
            state.user_friendly_error.as_deref(),
            Some("Please connect your wallet.")
        );

        tracker.clear(TxSlot::UseMachine).unwrap();
        assert_eq!(tracker.state(TxSlot::UseMachine), TransactionState::idle());
    }

    #[test]
    fn success_is_sticky_until_cleared() {
        let tracker = TransactionTracker::new();
        let hash = B256::repeat_byte(1);
        tracker.begin(TxSlot::Airdrop).unwrap();
        tracker.succeed(TxSlot::Airdrop, hash).unwrap();

        assert!(tracker.fail(TxSlot::Airdrop, &MachinaError::NoWallet).is_err());
        assert_eq!(tracker.state(TxSlot::Airdrop).status, TxStatus::Success);
    }

    #[test]
    fn pending_slot_cannot_be_cleared() {
        let tracker = TransactionTracker::new();
        tracker.begin(TxSlot::Approve).unwrap();
        assert_matches!(
            tracker.clear(TxSlot::Approve),
            Err(MachinaError::SlotBusy { .. })
        );
    }

    #[tokio::test]
    async fn subscribers_observe_transitions() {
        let tracker = TransactionTracker::new();
        let mut rx = tracker.subscribe();

        tracker.begin(TxSlot::UseMachine).unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().use_machine.is_pending());
        assert!(rx.borrow().any_pending());
    }
}
