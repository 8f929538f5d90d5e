//! Layer 1: Core Effect Trait Definitions
//!
//! Pure trait definitions for every side effect the payment client performs.
//! This module defines **what** effects can be performed; handlers define **how**.
//!
//! # Effect Classification
//!
//! ## Infrastructure Effects (Layer 3: `machina-rpc`)
//! - **Chain reads**: `eth_call`-style queries and native balances
//! - **Wallet**: connected account, network switching, transaction submission
//! - **Receipts**: waiting for a submitted transaction to be mined
//! - **Time**: sleeping between retry attempts
//!
//! ## Testing/Simulation Effects (Layer 8: `machina-testkit`)
//! - An in-memory chain implementing every trait above
//!
//! The wallet SDK and the node are opaque capabilities: nothing above this
//! layer knows whether a transaction was signed locally, by a browser wallet
//! or by a custodial signer.

pub mod chain;
pub mod time;
pub mod wallet;

pub use chain::{ChainReadEffects, ReceiptEffects, TxReceipt};
pub use time::TimeEffects;
pub use wallet::{TxRequest, WalletEffects};

use std::sync::Arc;

/// Handles for every effect the contract layer and the orchestrator need.
///
/// The user wallet and the operator wallet are distinct capabilities: the
/// operator wallet holds the airdrop credential and is shared by all flows.
#[derive(Clone)]
pub struct MachinaEffects {
    pub chain: Arc<dyn ChainReadEffects>,
    pub receipts: Arc<dyn ReceiptEffects>,
    pub wallet: Arc<dyn WalletEffects>,
    pub operator: Arc<dyn WalletEffects>,
    pub time: Arc<dyn TimeEffects>,
}

impl std::fmt::Debug for MachinaEffects {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachinaEffects").finish_non_exhaustive()
    }
}
