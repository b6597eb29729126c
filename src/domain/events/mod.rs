//! Domain events
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::Currency;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentEvent {
    Created { identifier: String, order_reference: String, amount: Decimal, currency: Currency },
    Settled { identifier: String, paid_at: DateTime<Utc> },
    Expired { identifier: String, expired_at: DateTime<Utc> },
}

impl PaymentEvent {
    pub fn identifier(&self) -> &str {
        match self {
            Self::Created { identifier, .. }
            | Self::Settled { identifier, .. }
            | Self::Expired { identifier, .. } => identifier,
        }
    }

    /// Subject the event is published under
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Created { .. } => "payments.transaction.created",
            Self::Settled { .. } => "payments.transaction.settled",
            Self::Expired { .. } => "payments.transaction.expired",
        }
    }
}
