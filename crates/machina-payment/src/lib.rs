//! Machina Payment - machine purchase flow
//!
//! [`PaymentOrchestrator`] sequences the contract reads and writes of one
//! purchase, streaming [`FlowUpdate`]s to the caller. [`NotificationService`]
//! keeps the user's notification feed.

#![allow(missing_docs)]
#![forbid(unsafe_code)]

pub mod flow;
pub mod notifications;
pub mod orchestrator;
pub mod single_flight;

pub use flow::{FlowFailure, FlowStep, FlowUpdate, PaymentFlowHandle, PaymentReceipt};
pub use notifications::{
    JsonFileStore, MemoryStore, NewNotification, Notification, NotificationKind,
    NotificationService, NotificationStore, CURRENCY_SYMBOL, MAX_NOTIFICATIONS,
};
pub use orchestrator::PaymentOrchestrator;
pub use single_flight::{FlightGuard, SingleFlight};
