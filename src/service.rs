//! Payment service
//!
//! The single boundary the order subsystem and the HTTP layer talk to:
//! QR generation and the transaction ledger behind one interface.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::aggregates::{TransactionRecord, TransactionStatus};
use crate::domain::events::PaymentEvent;
use crate::domain::value_objects::Currency;
use crate::ledger::TransactionLedger;
use crate::qr::QrGenerator;
use crate::{PaymentError, Result};

/// How many fresh nonces to try when an identifier collides.
const CREATE_ATTEMPTS: usize = 3;

pub struct PaymentService {
    generator: QrGenerator,
    ledger: TransactionLedger,
}

/// Response shape for a newly requested payment.
#[derive(Clone, Debug, Serialize)]
pub struct PaymentCreated {
    pub identifier: String,
    pub descriptor: String,
    pub display_payload: String,
    pub bill_number: String,
    pub order_reference: String,
    pub amount: Decimal,
    pub currency: Currency,
}

/// Status as reported to callers; an unknown identifier is a value here,
/// not a transport error, so pollers get a well-formed body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusView {
    Pending,
    Paid,
    Expired,
    NotFound,
}

impl From<TransactionStatus> for StatusView {
    fn from(status: TransactionStatus) -> Self {
        match status {
            TransactionStatus::Pending => Self::Pending,
            TransactionStatus::Paid => Self::Paid,
            TransactionStatus::Expired => Self::Expired,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct StatusReport {
    pub identifier: String,
    pub status: StatusView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<Currency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
}

impl PaymentService {
    pub fn new(generator: QrGenerator, ledger: TransactionLedger) -> Self {
        Self { generator, ledger }
    }

    /// Request a payment QR for an order. Validates everything before the
    /// ledger is touched; an identifier collision is retried internally
    /// with a fresh nonce and only surfaces after all attempts collide.
    pub async fn create_payment(
        &self,
        order_reference: &str,
        amount: Decimal,
        currency: &str,
    ) -> Result<PaymentCreated> {
        let currency: Currency = currency.parse()?;
        for attempt in 1..=CREATE_ATTEMPTS {
            let qr = self.generator.generate(order_reference, amount, currency, None)?;
            let record = TransactionRecord::new(
                &qr.identifier,
                order_reference,
                qr.amount,
                &qr.descriptor,
                &qr.display_payload,
            );
            match self.ledger.create(record).await {
                Ok(()) => {
                    return Ok(PaymentCreated {
                        identifier: qr.identifier,
                        descriptor: qr.descriptor,
                        display_payload: qr.display_payload,
                        bill_number: qr.bill_number,
                        order_reference: order_reference.to_string(),
                        amount: qr.amount.amount(),
                        currency: qr.amount.currency(),
                    });
                }
                Err(PaymentError::DuplicateIdentifier) => {
                    tracing::warn!(attempt, "identifier collision, regenerating with a fresh nonce");
                }
                Err(e) => return Err(e),
            }
        }
        Err(PaymentError::DuplicateIdentifier)
    }

    /// Poll the status of a payment. Evaluates the settlement policy; an
    /// unknown identifier reports `NOT_FOUND` rather than erroring.
    pub async fn check_status(&self, identifier: &str) -> Result<StatusReport> {
        match self.ledger.check(identifier).await {
            Ok(status) => {
                let record = self.ledger.info(identifier).await?;
                Ok(StatusReport {
                    identifier: identifier.to_string(),
                    status: status.into(),
                    amount: Some(record.amount()),
                    currency: Some(record.currency()),
                    paid_at: record.paid_at(),
                })
            }
            Err(PaymentError::NotFound) => Ok(StatusReport {
                identifier: identifier.to_string(),
                status: StatusView::NotFound,
                amount: None,
                currency: None,
                paid_at: None,
            }),
            Err(e) => Err(e),
        }
    }

    /// Full read-only projection of a payment record.
    pub async fn payment_info(&self, identifier: &str) -> Result<TransactionRecord> {
        self.ledger.info(identifier).await
    }

    /// The stored display payload, for re-serving the QR image.
    pub async fn display_payload(&self, identifier: &str) -> Result<String> {
        Ok(self.ledger.info(identifier).await?.display_payload().to_string())
    }

    /// Test/admin override: settle a payment immediately.
    pub async fn force_paid(&self, identifier: &str) -> Result<bool> {
        self.ledger.mark_paid(identifier).await
    }

    pub async fn sweep_expired(&self) -> Result<usize> {
        self.ledger.sweep_expired().await
    }

    pub async fn drain_events(&self) -> Vec<PaymentEvent> {
        self.ledger.drain_events().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{ElapsedTimePolicy, InMemoryStore};
    use crate::qr::{parse_descriptor, MerchantInfo};
    use chrono::Duration;
    use std::sync::Arc;

    fn service(settle_after: Duration) -> PaymentService {
        let ledger = TransactionLedger::new(
            Arc::new(InMemoryStore::new()),
            Box::new(ElapsedTimePolicy::new(settle_after)),
        );
        PaymentService::new(QrGenerator::new(MerchantInfo::default()), ledger)
    }

    #[tokio::test]
    async fn test_create_payment_starts_pending() {
        let svc = service(Duration::seconds(30));
        let created = svc.create_payment("ORD-1001", Decimal::new(2550, 2), "USD").await.unwrap();
        assert_eq!(created.identifier.len(), 32);
        assert_eq!(created.currency, Currency::Usd);

        let report = svc.check_status(&created.identifier).await.unwrap();
        assert_eq!(report.status, StatusView::Pending);
        assert_eq!(report.amount, Some(Decimal::new(2550, 2)));
    }

    #[tokio::test]
    async fn test_identifiers_are_fresh_per_create() {
        let svc = service(Duration::seconds(30));
        let a = svc.create_payment("ORD-1", Decimal::new(10, 0), "USD").await.unwrap();
        let b = svc.create_payment("ORD-1", Decimal::new(10, 0), "USD").await.unwrap();
        assert_ne!(a.identifier, b.identifier);
    }

    #[tokio::test]
    async fn test_validation_happens_before_any_mutation() {
        let svc = service(Duration::seconds(30));
        assert!(matches!(
            svc.create_payment("ORD-1", Decimal::ZERO, "USD").await,
            Err(PaymentError::InvalidAmount)
        ));
        assert!(matches!(
            svc.create_payment("ORD-1", Decimal::new(-5, 0), "USD").await,
            Err(PaymentError::InvalidAmount)
        ));
        assert!(matches!(
            svc.create_payment("ORD-1", Decimal::new(10, 0), "EUR").await,
            Err(PaymentError::UnsupportedCurrency(_))
        ));
        // nothing was inserted, so nothing was announced either
        assert!(svc.drain_events().await.is_empty());
    }

    #[tokio::test]
    async fn test_check_status_unknown_reports_not_found() {
        let svc = service(Duration::seconds(30));
        let report = svc.check_status("deadbeef").await.unwrap();
        assert_eq!(report.status, StatusView::NotFound);
        assert_eq!(report.amount, None);
    }

    #[tokio::test]
    async fn test_force_paid_flow() {
        let svc = service(Duration::seconds(30));
        let created = svc.create_payment("ORD-1", Decimal::new(10, 0), "KHR").await.unwrap();
        assert!(svc.force_paid(&created.identifier).await.unwrap());
        assert!(svc.force_paid(&created.identifier).await.unwrap()); // idempotent

        let report = svc.check_status(&created.identifier).await.unwrap();
        assert_eq!(report.status, StatusView::Paid);
        assert!(report.paid_at.is_some());
    }

    #[tokio::test]
    async fn test_display_payload_requires_known_identifier() {
        let svc = service(Duration::seconds(30));
        assert!(matches!(svc.display_payload("deadbeef").await, Err(PaymentError::NotFound)));

        let created = svc.create_payment("ORD-1", Decimal::new(10, 0), "USD").await.unwrap();
        let payload = svc.display_payload(&created.identifier).await.unwrap();
        assert!(payload.starts_with("data:application/json;base64,"));
    }

    #[tokio::test]
    async fn test_created_descriptor_round_trips() {
        let svc = service(Duration::seconds(30));
        let created = svc.create_payment("ORD-1", Decimal::new(775, 2), "USD").await.unwrap();
        let fields = parse_descriptor(&created.descriptor).unwrap();
        assert_eq!(fields.amount_minor, 775);
        assert_eq!(fields.currency_code, "840");
        assert_eq!(fields.bill_number, created.bill_number);
    }

    #[tokio::test]
    async fn test_settled_payment_reports_paid_with_info() {
        let svc = service(Duration::zero());
        let created = svc.create_payment("ORD-1", Decimal::new(10, 0), "USD").await.unwrap();
        let report = svc.check_status(&created.identifier).await.unwrap();
        assert_eq!(report.status, StatusView::Paid);

        let info = svc.payment_info(&created.identifier).await.unwrap();
        assert!(info.paid_at().unwrap() >= info.created_at());
    }
}
