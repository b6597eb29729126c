//! Transaction Ledger
//!
//! In-memory store of transaction records keyed by identifier, plus the
//! settlement policies that move PENDING records to a terminal state. The
//! store sits behind a trait so a persistent backend can replace the map
//! without touching call sites.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{Mutex, RwLock};

use crate::domain::aggregates::{TransactionRecord, TransactionStatus};
use crate::domain::events::PaymentEvent;
use crate::{PaymentError, Result};

// =============================================================================
// Store
// =============================================================================

/// Storage abstraction behind the ledger.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Insert a new PENDING record. Fails on identifier collision.
    async fn create(&self, record: TransactionRecord) -> Result<()>;

    /// Fetch a record by identifier.
    async fn get(&self, identifier: &str) -> Result<TransactionRecord>;

    /// Apply a one-directional status transition. Returns the record as
    /// stored afterwards, and the event iff this call performed the move.
    /// This is the atomicity point racing callers serialize on.
    async fn set_status(
        &self,
        identifier: &str,
        status: TransactionStatus,
        at: DateTime<Utc>,
    ) -> Result<(TransactionRecord, Option<PaymentEvent>)>;

    /// Identifiers of PENDING records created before the cutoff.
    async fn pending_older_than(&self, cutoff: DateTime<Utc>) -> Vec<String>;
}

/// Process-lifetime map; initialized empty, discarded at shutdown.
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, TransactionRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl TransactionStore for InMemoryStore {
    async fn create(&self, record: TransactionRecord) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(record.identifier()) {
            return Err(PaymentError::DuplicateIdentifier);
        }
        records.insert(record.identifier().to_string(), record);
        Ok(())
    }

    async fn get(&self, identifier: &str) -> Result<TransactionRecord> {
        self.records.read().await.get(identifier).cloned().ok_or(PaymentError::NotFound)
    }

    async fn set_status(
        &self,
        identifier: &str,
        status: TransactionStatus,
        at: DateTime<Utc>,
    ) -> Result<(TransactionRecord, Option<PaymentEvent>)> {
        let mut records = self.records.write().await;
        let record = records.get_mut(identifier).ok_or(PaymentError::NotFound)?;
        let event = match status {
            TransactionStatus::Paid => record.settle(at),
            TransactionStatus::Expired => record.expire(at),
            TransactionStatus::Pending => None, // no path re-enters PENDING
        };
        Ok((record.clone(), event))
    }

    async fn pending_older_than(&self, cutoff: DateTime<Utc>) -> Vec<String> {
        self.records
            .read()
            .await
            .values()
            .filter(|r| r.status() == &TransactionStatus::Pending && r.created_at() < cutoff)
            .map(|r| r.identifier().to_string())
            .collect()
    }
}

// =============================================================================
// Settlement policies
// =============================================================================

/// Decides whether a PENDING record settles at this observation.
///
/// Both built-in policies are stand-ins for a real payment network; a
/// settlement integration replaces the policy, not the ledger.
pub trait SettlementPolicy: Send + Sync {
    fn should_settle(&self, record: &TransactionRecord, now: DateTime<Utc>) -> bool;
}

/// Settles deterministically once the record is older than the threshold.
pub struct ElapsedTimePolicy {
    settle_after: Duration,
}

impl ElapsedTimePolicy {
    pub fn new(settle_after: Duration) -> Self { Self { settle_after } }
}

impl SettlementPolicy for ElapsedTimePolicy {
    fn should_settle(&self, record: &TransactionRecord, now: DateTime<Utc>) -> bool {
        now - record.created_at() > self.settle_after
    }
}

/// Each check of a PENDING record flips with a fixed independent
/// probability. Seedable so tests are deterministic.
pub struct ProbabilisticPolicy {
    probability: f64,
    rng: StdMutex<StdRng>,
}

impl ProbabilisticPolicy {
    pub fn new(probability: f64) -> Self { Self::seeded(probability, rand::random()) }

    pub fn seeded(probability: f64, seed: u64) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
            rng: StdMutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl SettlementPolicy for ProbabilisticPolicy {
    fn should_settle(&self, _record: &TransactionRecord, _now: DateTime<Utc>) -> bool {
        // a poisoned rng is still a usable rng
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.gen::<f64>() < self.probability
    }
}

// =============================================================================
// Ledger
// =============================================================================

/// Records requested payments and answers status queries, evaluating the
/// settlement policy on each check.
pub struct TransactionLedger {
    store: Arc<dyn TransactionStore>,
    policy: Box<dyn SettlementPolicy>,
    pending_ttl: Option<Duration>,
    events: Mutex<Vec<PaymentEvent>>,
}

impl TransactionLedger {
    pub fn new(store: Arc<dyn TransactionStore>, policy: Box<dyn SettlementPolicy>) -> Self {
        Self { store, policy, pending_ttl: None, events: Mutex::new(Vec::new()) }
    }

    /// Adopt a TTL: PENDING records older than this expire instead of
    /// settling, and become eligible for [`sweep_expired`](Self::sweep_expired).
    pub fn with_pending_ttl(mut self, ttl: Duration) -> Self {
        self.pending_ttl = Some(ttl);
        self
    }

    pub async fn create(&self, record: TransactionRecord) -> Result<()> {
        let created = record.created_event();
        self.store.create(record).await?;
        self.record_event(created).await;
        Ok(())
    }

    /// Status evaluation: mutating, idempotent. An overdue record expires,
    /// otherwise the policy decides whether it settles. Racing checks on
    /// one identifier produce a single transition event.
    pub async fn check(&self, identifier: &str) -> Result<TransactionStatus> {
        let record = self.store.get(identifier).await?;
        if record.is_terminal() {
            return Ok(*record.status());
        }
        let now = Utc::now();
        if let Some(ttl) = self.pending_ttl {
            if now - record.created_at() > ttl {
                return self.transition(identifier, TransactionStatus::Expired, now).await;
            }
        }
        if self.policy.should_settle(&record, now) {
            return self.transition(identifier, TransactionStatus::Paid, now).await;
        }
        Ok(TransactionStatus::Pending)
    }

    /// Read-only projection; never mutates status.
    pub async fn info(&self, identifier: &str) -> Result<TransactionRecord> {
        self.store.get(identifier).await
    }

    /// Administrative override: immediate PENDING -> PAID.
    ///
    /// `Ok(true)` when the record is paid (now or already), `Ok(false)`
    /// when it already expired and cannot be revived.
    pub async fn mark_paid(&self, identifier: &str) -> Result<bool> {
        let status = self.transition(identifier, TransactionStatus::Paid, Utc::now()).await?;
        Ok(status == TransactionStatus::Paid)
    }

    /// Expire overdue PENDING records; returns how many moved. A no-op
    /// unless a TTL was adopted.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let ttl = match self.pending_ttl {
            Some(ttl) => ttl,
            None => return Ok(0),
        };
        let now = Utc::now();
        let overdue = self.store.pending_older_than(now - ttl).await;
        let mut expired = 0;
        for identifier in overdue {
            let (_, event) = self.store.set_status(&identifier, TransactionStatus::Expired, now).await?;
            if let Some(event) = event {
                self.record_event(event).await;
                expired += 1;
            }
        }
        Ok(expired)
    }

    /// Hand accumulated transition events to the host; each appears once.
    pub async fn drain_events(&self) -> Vec<PaymentEvent> {
        std::mem::take(&mut *self.events.lock().await)
    }

    async fn transition(
        &self,
        identifier: &str,
        status: TransactionStatus,
        at: DateTime<Utc>,
    ) -> Result<TransactionStatus> {
        let (stored, event) = self.store.set_status(identifier, status, at).await?;
        if let Some(event) = event {
            self.record_event(event).await;
        }
        Ok(*stored.status())
    }

    async fn record_event(&self, event: PaymentEvent) {
        tracing::info!(identifier = event.identifier(), kind = event.subject(), "payment event");
        self.events.lock().await.push(event);
    }
}
