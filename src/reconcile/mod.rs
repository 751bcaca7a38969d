//! Keeps the order mirror in step with the chain-event feed.
pub mod classify;
pub mod engine;

pub use classify::{classify, control_delta, Classified, TxKind};
pub use engine::{order_from_parts, BatchReport, Reconciler};
