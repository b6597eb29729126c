//! Transaction Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::events::PaymentEvent;
use crate::domain::value_objects::{Currency, Money};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Paid,
    Expired,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool { *self != Self::Pending }
}

/// One requested payment attempt, keyed by its derived identifier.
///
/// Status moves one way only: PENDING -> PAID or PENDING -> EXPIRED.
/// The transition methods return the domain event exactly when the record
/// actually moved, so racing callers observe the flip at most once.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionRecord {
    identifier: String,
    order_reference: String,
    amount: Decimal,
    currency: Currency,
    status: TransactionStatus,
    descriptor: String,
    display_payload: String,
    created_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
}

impl TransactionRecord {
    pub fn new(
        identifier: impl Into<String>,
        order_reference: impl Into<String>,
        amount: Money,
        descriptor: impl Into<String>,
        display_payload: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            order_reference: order_reference.into(),
            amount: amount.amount(),
            currency: amount.currency(),
            status: TransactionStatus::Pending,
            descriptor: descriptor.into(),
            display_payload: display_payload.into(),
            created_at: Utc::now(),
            paid_at: None,
        }
    }

    pub fn identifier(&self) -> &str { &self.identifier }
    pub fn order_reference(&self) -> &str { &self.order_reference }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn currency(&self) -> Currency { self.currency }
    pub fn status(&self) -> &TransactionStatus { &self.status }
    pub fn descriptor(&self) -> &str { &self.descriptor }
    pub fn display_payload(&self) -> &str { &self.display_payload }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn paid_at(&self) -> Option<DateTime<Utc>> { self.paid_at }
    pub fn is_terminal(&self) -> bool { self.status.is_terminal() }

    pub fn created_event(&self) -> PaymentEvent {
        PaymentEvent::Created {
            identifier: self.identifier.clone(),
            order_reference: self.order_reference.clone(),
            amount: self.amount,
            currency: self.currency,
        }
    }

    /// PENDING -> PAID. Sets `paid_at` exactly once.
    pub fn settle(&mut self, at: DateTime<Utc>) -> Option<PaymentEvent> {
        if self.status != TransactionStatus::Pending { return None; }
        self.status = TransactionStatus::Paid;
        self.paid_at = Some(at);
        Some(PaymentEvent::Settled { identifier: self.identifier.clone(), paid_at: at })
    }

    /// PENDING -> EXPIRED. `paid_at` stays unset.
    pub fn expire(&mut self, at: DateTime<Utc>) -> Option<PaymentEvent> {
        if self.status != TransactionStatus::Pending { return None; }
        self.status = TransactionStatus::Expired;
        Some(PaymentEvent::Expired { identifier: self.identifier.clone(), expired_at: at })
    }
}
