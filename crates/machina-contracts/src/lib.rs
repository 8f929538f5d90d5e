//! Machina Contracts - registry and payment-token bindings
//!
//! [`ContractReader`] issues read-only calls through
//! [`machina_core::ChainReadEffects`]; [`ContractWriter`] submits transactions
//! through [`machina_core::WalletEffects`] and tracks each one in a
//! [`machina_core::TxSlot`].

#![allow(missing_docs)]
#![forbid(unsafe_code)]

pub mod abi;
pub mod reader;
pub mod writer;

pub use reader::{ContractReader, MAX_LISTED_MACHINES};
pub use writer::ContractWriter;
