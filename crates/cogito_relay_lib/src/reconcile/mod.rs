//! Materializes deposits, transfers and user activity from the events of both chains.
//!
//! `transitions` holds the pure merge rules, `engine` applies them to the store one
//! event at a time, each in its own sqlite transaction.

mod activity;
mod engine;
mod transitions;

pub use activity::{activity_id, deposit_activity, receive_activity, send_activity};
pub use engine::{DeferredRetryReport, HandleOutcome, ReconcileEngine};
pub use transitions::{
    apply_transfer_event, debit_deposit, debit_due, StepInfo, TransferEvent, TransferUpdate,
};
