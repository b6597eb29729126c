//! Aggregates module
pub mod transaction;

pub use transaction::{TransactionRecord, TransactionStatus};
