//! Service configuration

use std::str::FromStr;
use std::sync::Arc;

use chrono::Duration;

use crate::ledger::{
    ElapsedTimePolicy, InMemoryStore, ProbabilisticPolicy, SettlementPolicy, TransactionLedger,
};
use crate::qr::{MerchantInfo, QrGenerator};
use crate::service::PaymentService;

/// Which settlement stand-in moves PENDING records to PAID.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyKind {
    Elapsed,
    Probabilistic,
}

impl FromStr for PolicyKind {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "elapsed" | "time" => Ok(Self::Elapsed),
            "probabilistic" | "random" => Ok(Self::Probabilistic),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub bank_account: String,
    pub merchant_name: String,
    pub merchant_city: String,
    pub policy: PolicyKind,
    pub settle_after_secs: u64,
    pub settle_probability: f64,
    pub pending_ttl_secs: Option<u64>,
    pub sweep_interval_secs: u64,
    pub nats_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8084,
            bank_account: "lumina_store@bkrt".to_string(),
            merchant_name: "Lumina Shirts".to_string(),
            merchant_city: "Phnom Penh".to_string(),
            policy: PolicyKind::Elapsed,
            settle_after_secs: 30,
            settle_probability: 0.3,
            pending_ttl_secs: None,
            sweep_interval_secs: 60,
            nats_url: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: std::env::var("PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(defaults.port),
            bank_account: std::env::var("MERCHANT_BANK_ACCOUNT").unwrap_or(defaults.bank_account),
            merchant_name: std::env::var("MERCHANT_NAME").unwrap_or(defaults.merchant_name),
            merchant_city: std::env::var("MERCHANT_CITY").unwrap_or(defaults.merchant_city),
            policy: std::env::var("SETTLEMENT_POLICY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.policy),
            settle_after_secs: std::env::var("SETTLE_AFTER_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.settle_after_secs),
            settle_probability: std::env::var("SETTLE_PROBABILITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.settle_probability),
            pending_ttl_secs: std::env::var("PENDING_TTL_SECS").ok().and_then(|v| v.parse().ok()),
            sweep_interval_secs: std::env::var("SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.sweep_interval_secs),
            nats_url: std::env::var("NATS_URL").ok(),
        }
    }

    pub fn merchant(&self) -> MerchantInfo {
        MerchantInfo {
            bank_account: self.bank_account.clone(),
            name: self.merchant_name.clone(),
            city: self.merchant_city.clone(),
        }
    }

    pub fn settlement_policy(&self) -> Box<dyn SettlementPolicy> {
        match self.policy {
            PolicyKind::Elapsed => {
                Box::new(ElapsedTimePolicy::new(Duration::seconds(self.settle_after_secs as i64)))
            }
            PolicyKind::Probabilistic => Box::new(ProbabilisticPolicy::new(self.settle_probability)),
        }
    }

    /// Wire the whole component together: generator + in-memory ledger.
    pub fn build_service(&self) -> PaymentService {
        let mut ledger =
            TransactionLedger::new(Arc::new(InMemoryStore::new()), self.settlement_policy());
        if let Some(secs) = self.pending_ttl_secs {
            ledger = ledger.with_pending_ttl(Duration::seconds(secs as i64));
        }
        PaymentService::new(QrGenerator::new(self.merchant()), ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_kind_parse() {
        assert_eq!("elapsed".parse::<PolicyKind>().unwrap(), PolicyKind::Elapsed);
        assert_eq!("RANDOM".parse::<PolicyKind>().unwrap(), PolicyKind::Probabilistic);
        assert!("webhook".parse::<PolicyKind>().is_err());
    }

    #[test]
    fn test_defaults_match_reference_behavior() {
        let config = AppConfig::default();
        assert_eq!(config.policy, PolicyKind::Elapsed);
        assert_eq!(config.settle_after_secs, 30);
        assert_eq!(config.pending_ttl_secs, None);
    }
}
