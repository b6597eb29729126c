//! QR Descriptor Generator
//!
//! Fabricates a KHQR-shaped payload for a requested payment: an opaque
//! lookup identifier, a tag/length/value descriptor string, and a data-URI
//! display payload a client can render as a scannable code. The layout is
//! not bit-exact to any EMV standard, only internally consistent, so
//! [`parse_descriptor`] can round-trip every field.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::value_objects::{Currency, Money};

const TAG_PAYLOAD_FORMAT: &str = "00";
const TAG_ACCOUNT: &str = "29";
const TAG_MERCHANT_CATEGORY: &str = "52";
const TAG_CURRENCY: &str = "53";
const TAG_AMOUNT: &str = "54";
const TAG_MERCHANT_NAME: &str = "59";
const TAG_MERCHANT_CITY: &str = "60";
const TAG_BILL_NUMBER: &str = "62";
const TAG_CHECKSUM: &str = "63";

const PAYLOAD_FORMAT: &str = "01";
const MERCHANT_CATEGORY: &str = "5999";

// KHQR-style display field limits
const MAX_NAME_LEN: usize = 25;
const MAX_CITY_LEN: usize = 15;

/// Merchant identity stamped into every descriptor.
#[derive(Clone, Debug)]
pub struct MerchantInfo {
    pub bank_account: String,
    pub name: String,
    pub city: String,
}

impl Default for MerchantInfo {
    fn default() -> Self {
        Self {
            bank_account: "lumina_store@bkrt".to_string(),
            name: "Lumina Shirts".to_string(),
            city: "Phnom Penh".to_string(),
        }
    }
}

/// Everything `generate` hands back; the caller stores it in the ledger.
#[derive(Clone, Debug)]
pub struct GeneratedQr {
    pub identifier: String,
    pub descriptor: String,
    pub display_payload: String,
    pub bill_number: String,
    pub amount: Money,
}

pub struct QrGenerator {
    merchant: MerchantInfo,
}

impl QrGenerator {
    pub fn new(merchant: MerchantInfo) -> Self { Self { merchant } }

    pub fn merchant(&self) -> &MerchantInfo { &self.merchant }

    /// Fabricate a descriptor for one payment attempt.
    ///
    /// Pure: never touches the ledger. Each call salts the identifier with
    /// a fresh nonce, so retrying after a collision yields a new handle.
    pub fn generate(
        &self,
        order_reference: &str,
        amount: Decimal,
        currency: Currency,
        bill_number: Option<String>,
    ) -> crate::Result<GeneratedQr> {
        let amount = Money::new(amount, currency)?;
        let now = Utc::now();
        let nonce = Uuid::new_v4();
        let identifier = self.derive_identifier(&amount, now, nonce);
        let bill_number = bill_number
            .unwrap_or_else(|| format!("LUM{}{}", order_reference, now.format("%Y%m%d%H%M%S")));
        let descriptor = self.encode_descriptor(&amount, &bill_number, &identifier);
        let display_payload = self.encode_display_payload(&amount, &bill_number, now);
        Ok(GeneratedQr { identifier, descriptor, display_payload, bill_number, amount })
    }

    /// Opaque 32-hex lookup handle: SHA-256 over the transaction inputs
    /// plus a nonce. Not cryptographically meaningful, collisions are
    /// tolerable (the caller retries with a fresh nonce).
    fn derive_identifier(&self, amount: &Money, at: DateTime<Utc>, nonce: Uuid) -> String {
        let raw = format!(
            "{}:{}:{}:{}:{}",
            self.merchant.bank_account,
            amount.amount(),
            amount.currency(),
            at.timestamp(),
            nonce.simple()
        );
        let mut hasher = Sha256::new();
        hasher.update(raw.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        digest[..32].to_string()
    }

    fn encode_descriptor(&self, amount: &Money, bill_number: &str, identifier: &str) -> String {
        let mut out = String::new();
        push_field(&mut out, TAG_PAYLOAD_FORMAT, PAYLOAD_FORMAT);
        push_field(&mut out, TAG_ACCOUNT, &self.merchant.bank_account);
        push_field(&mut out, TAG_MERCHANT_CATEGORY, MERCHANT_CATEGORY);
        push_field(&mut out, TAG_CURRENCY, amount.currency().numeric_code());
        push_field(&mut out, TAG_AMOUNT, &amount.minor_units().to_string());
        push_field(&mut out, TAG_MERCHANT_NAME, clamp(&self.merchant.name, MAX_NAME_LEN));
        push_field(&mut out, TAG_MERCHANT_CITY, clamp(&self.merchant.city, MAX_CITY_LEN));
        push_field(&mut out, TAG_BILL_NUMBER, bill_number);
        push_field(&mut out, TAG_CHECKSUM, &identifier[..4]);
        out
    }

    /// data-URI the client renders as the QR image
    fn encode_display_payload(&self, amount: &Money, bill_number: &str, at: DateTime<Utc>) -> String {
        let body = serde_json::json!({
            "bank_account": self.merchant.bank_account,
            "merchant": self.merchant.name,
            "amount": amount.amount(),
            "currency": amount.currency().code(),
            "bill": bill_number,
            "timestamp": at.timestamp(),
        })
        .to_string();
        format!("data:application/json;base64,{}", STANDARD.encode(body))
    }
}

fn push_field(out: &mut String, tag: &str, value: &str) {
    let value = clamp(value, 99);
    out.push_str(tag);
    out.push_str(&format!("{:02}", value.len()));
    out.push_str(value);
}

fn clamp(value: &str, max: usize) -> &str {
    if value.len() <= max { return value; }
    let mut end = max;
    while !value.is_char_boundary(end) { end -= 1; }
    &value[..end]
}

/// Fields recovered from a descriptor string.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DescriptorFields {
    pub payload_format: String,
    pub bank_account: String,
    pub merchant_category: String,
    pub currency_code: String,
    pub amount_minor: i64,
    pub merchant_name: String,
    pub merchant_city: String,
    pub bill_number: String,
    pub checksum: String,
}

/// Decode a descriptor back into its fields. Returns `None` on any
/// malformed segment.
pub fn parse_descriptor(descriptor: &str) -> Option<DescriptorFields> {
    let mut fields = DescriptorFields::default();
    let mut rest = descriptor;
    while !rest.is_empty() {
        let tag = rest.get(0..2)?;
        let len: usize = rest.get(2..4)?.parse().ok()?;
        let value = rest.get(4..4 + len)?;
        rest = rest.get(4 + len..)?;
        match tag {
            TAG_PAYLOAD_FORMAT => fields.payload_format = value.to_string(),
            TAG_ACCOUNT => fields.bank_account = value.to_string(),
            TAG_MERCHANT_CATEGORY => fields.merchant_category = value.to_string(),
            TAG_CURRENCY => fields.currency_code = value.to_string(),
            TAG_AMOUNT => fields.amount_minor = value.parse().ok()?,
            TAG_MERCHANT_NAME => fields.merchant_name = value.to_string(),
            TAG_MERCHANT_CITY => fields.merchant_city = value.to_string(),
            TAG_BILL_NUMBER => fields.bill_number = value.to_string(),
            TAG_CHECKSUM => fields.checksum = value.to_string(),
            _ => {} // unknown tags are skipped
        }
    }
    Some(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> QrGenerator {
        QrGenerator::new(MerchantInfo::default())
    }

    #[test]
    fn test_generate_rejects_bad_amounts() {
        let g = generator();
        assert!(g.generate("ORD-1", Decimal::ZERO, Currency::Usd, None).is_err());
        assert!(g.generate("ORD-1", Decimal::new(-5, 0), Currency::Usd, None).is_err());
    }

    #[test]
    fn test_identifier_shape_and_uniqueness() {
        let g = generator();
        let a = g.generate("ORD-1", Decimal::new(2550, 2), Currency::Usd, None).unwrap();
        let b = g.generate("ORD-1", Decimal::new(2550, 2), Currency::Usd, None).unwrap();
        assert_eq!(a.identifier.len(), 32);
        assert!(a.identifier.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a.identifier, b.identifier); // fresh nonce per call
    }

    #[test]
    fn test_descriptor_round_trips() {
        let g = generator();
        let qr = g
            .generate("ORD-7", Decimal::new(1250, 2), Currency::Khr, Some("BILL-7".to_string()))
            .unwrap();
        let fields = parse_descriptor(&qr.descriptor).unwrap();
        assert_eq!(fields.payload_format, "01");
        assert_eq!(fields.bank_account, "lumina_store@bkrt");
        assert_eq!(fields.merchant_category, "5999");
        assert_eq!(fields.currency_code, "116");
        assert_eq!(fields.amount_minor, 1250);
        assert_eq!(fields.merchant_name, "Lumina Shirts");
        assert_eq!(fields.merchant_city, "Phnom Penh");
        assert_eq!(fields.bill_number, "BILL-7");
        assert_eq!(fields.checksum, qr.identifier[..4]);
    }

    #[test]
    fn test_bill_number_defaults_from_order_reference() {
        let g = generator();
        let qr = g.generate("ORD-9", Decimal::new(10, 0), Currency::Usd, None).unwrap();
        assert!(qr.bill_number.starts_with("LUMORD-9"));
    }

    #[test]
    fn test_display_payload_is_decodable() {
        let g = generator();
        let qr = g.generate("ORD-3", Decimal::new(500, 2), Currency::Usd, None).unwrap();
        let encoded = qr.display_payload.strip_prefix("data:application/json;base64,").unwrap();
        let decoded = STANDARD.decode(encoded).unwrap();
        let body: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(body["merchant"], "Lumina Shirts");
        assert_eq!(body["currency"], "USD");
        assert_eq!(body["bill"], qr.bill_number);
    }

    #[test]
    fn test_long_merchant_name_is_clamped() {
        let g = QrGenerator::new(MerchantInfo {
            name: "An Extremely Long Merchant Name That Overflows".to_string(),
            ..MerchantInfo::default()
        });
        let qr = g.generate("ORD-1", Decimal::new(10, 0), Currency::Usd, None).unwrap();
        let fields = parse_descriptor(&qr.descriptor).unwrap();
        assert_eq!(fields.merchant_name.len(), 25);
    }
}
