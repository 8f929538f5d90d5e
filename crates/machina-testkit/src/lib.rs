//! Machina Testing Infrastructure
//!
//! Simulated handlers for every core effect trait plus fixtures, so crate
//! tests can drive the contract layer and the payment flow without a node.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
//!
//! # Usage
//!
//! Add this to your crate's `Cargo.toml` dev-dependencies:
//! ```toml
//! [dev-dependencies]
//! machina-testkit = { workspace = true }
//! ```
//!
//! Then in your tests:
//! ```rust,no_run
//! use machina_testkit::*;
//!
//! let env = TestEnv::native();
//! env.chain.add_machine(1, "Robo Cafe", amount("0.1"));
//! let effects = env.effects();
//! ```

pub mod chain;
pub mod fixtures;
pub mod time;

pub use chain::{ChainEvent, SimulatedChain, SimulatedWallet, Submission, SubmissionKind};
pub use fixtures::*;
pub use time::InstantTime;
