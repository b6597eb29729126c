//! Lumina Payments
//!
//! Mock KHQR payment component for a self-hosted storefront.
//!
//! ## Features
//! - QR descriptor generation (pseudo-KHQR payload + scannable data URI)
//! - In-memory transaction ledger keyed by a derived identifier
//! - Monotonic status lifecycle: PENDING -> PAID / EXPIRED, both terminal
//! - Pluggable settlement policy (elapsed-time or probabilistic stand-in)
//! - Administrative force-paid override for checkout testing

use thiserror::Error;

pub mod config;
pub mod domain;
pub mod ledger;
pub mod qr;
pub mod service;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("Transaction not found")]
    NotFound,

    #[error("Duplicate transaction identifier")]
    DuplicateIdentifier,
}

pub type Result<T> = std::result::Result<T, PaymentError>;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::AppConfig;
pub use domain::aggregates::{TransactionRecord, TransactionStatus};
pub use domain::events::PaymentEvent;
pub use domain::value_objects::{Currency, Money};
pub use ledger::{
    ElapsedTimePolicy, InMemoryStore, ProbabilisticPolicy, SettlementPolicy, TransactionLedger,
    TransactionStore,
};
pub use qr::{GeneratedQr, MerchantInfo, QrGenerator};
pub use service::{PaymentCreated, PaymentService, StatusReport, StatusView};
