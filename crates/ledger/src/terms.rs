//! Typed value objects validated at the boundary
//!
//! Callers parse raw input into these types once; the controller and the
//! repositories never see an unnormalised address or a malformed amount.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{LedgerError, Result};

/// Seconds in the 30-day month used to derive a default end time
pub const SECONDS_PER_MONTH: i64 = 30 * 24 * 60 * 60;

/// A `0x`-prefixed, 40 hex digit wallet address, always lowercase
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WalletAddress(String);

impl WalletAddress {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let hex = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .ok_or_else(|| LedgerError::invalid_terms(format!("address {:?} must start with 0x", raw)))?;

        if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(LedgerError::invalid_terms(format!(
                "address {:?} must be 0x followed by 40 hex characters",
                raw
            )));
        }

        Ok(Self(format!("0x{}", hex.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for WalletAddress {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for WalletAddress {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<WalletAddress> for String {
    fn from(address: WalletAddress) -> Self {
        address.0
    }
}

/// Non-negative decimal kept as text
///
/// Stored in canonical form (no leading zeros in the integer part, no
/// trailing zeros in the fraction) so equality and ordering are numeric:
/// `"1.50" == "1.5"` and `"10" > "9.99"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount(String);

impl Amount {
    pub fn zero() -> Self {
        Self("0".to_string())
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let invalid = || LedgerError::invalid_terms(format!("{:?} is not a non-negative decimal", raw));

        let (int_part, frac_part) = match raw.split_once('.') {
            Some((i, f)) => (i, f),
            None => (raw, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }

        let int_part = int_part.trim_start_matches('0');
        let frac_part = frac_part.trim_end_matches('0');

        let mut canonical = if int_part.is_empty() {
            "0".to_string()
        } else {
            int_part.to_string()
        };
        if !frac_part.is_empty() {
            canonical.push('.');
            canonical.push_str(frac_part);
        }
        Ok(Self(canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == "0"
    }

    fn parts(&self) -> (&str, &str) {
        self.0.split_once('.').unwrap_or((self.0.as_str(), ""))
    }
}

impl Ord for Amount {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a_int, a_frac) = self.parts();
        let (b_int, b_frac) = other.parts();
        a_int
            .len()
            .cmp(&b_int.len())
            .then_with(|| a_int.cmp(b_int))
            .then_with(|| a_frac.cmp(b_frac))
    }
}

impl PartialOrd for Amount {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Default for Amount {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Amount {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Amount {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Amount> for String {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// Business terms of a new stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamTerms {
    pub monthly_salary: Amount,
    pub rate_per_second: Amount,
    pub duration_months: u32,
    pub tax_percent: u8,
    /// Unix seconds
    pub start_time: i64,
    /// Unix seconds; derived from the duration when absent
    #[serde(default)]
    pub end_time: Option<i64>,
    #[serde(default)]
    pub creation_tx_hash: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl StreamTerms {
    pub fn new(monthly_salary: Amount, rate_per_second: Amount, duration_months: u32, start_time: i64) -> Self {
        Self {
            monthly_salary,
            rate_per_second,
            duration_months,
            tax_percent: 0,
            start_time,
            end_time: None,
            creation_tx_hash: None,
            notes: None,
        }
    }

    pub fn with_tax_percent(mut self, tax_percent: u8) -> Self {
        self.tax_percent = tax_percent;
        self
    }

    pub fn with_end_time(mut self, end_time: i64) -> Self {
        self.end_time = Some(end_time);
        self
    }

    pub fn with_creation_tx(mut self, tx_hash: impl Into<String>) -> Self {
        self.creation_tx_hash = Some(tx_hash.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Reject only structurally impossible values
    pub fn validate(&self) -> Result<()> {
        if self.duration_months < 1 {
            return Err(LedgerError::invalid_terms("durationMonths must be at least 1"));
        }
        if self.tax_percent > 100 {
            return Err(LedgerError::invalid_terms(format!(
                "taxPercent {} is outside 0..=100",
                self.tax_percent
            )));
        }
        if self.start_time < 0 {
            return Err(LedgerError::invalid_terms("startTime must not be negative"));
        }
        if matches!(self.end_time, Some(end) if end < self.start_time) {
            return Err(LedgerError::invalid_terms("endTime precedes startTime"));
        }
        Ok(())
    }

    /// Explicit end time, or `start_time + duration_months * 30 days`
    pub fn resolved_end_time(&self) -> i64 {
        self.end_time.unwrap_or_else(|| {
            self.start_time
                .saturating_add(i64::from(self.duration_months).saturating_mul(SECONDS_PER_MONTH))
        })
    }
}

/// Partial upstream observation of a stream
///
/// Only fields that are present are applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncSnapshot {
    pub withdrawn: Option<Amount>,
    pub paused: Option<bool>,
}

impl SyncSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn withdrawn(mut self, withdrawn: Amount) -> Self {
        self.withdrawn = Some(withdrawn);
        self
    }

    pub fn paused(mut self, paused: bool) -> Self {
        self.paused = Some(paused);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.withdrawn.is_none() && self.paused.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_normalised() {
        let addr = WalletAddress::parse("0xABCDEF0123456789abcdef0123456789ABCDEF01").unwrap();
        assert_eq!(addr.as_str(), "0xabcdef0123456789abcdef0123456789abcdef01");
        assert_eq!(
            addr,
            WalletAddress::parse("0XabcDEF0123456789ABCDEF0123456789abcdef01").unwrap()
        );
    }

    #[test]
    fn test_address_rejects_malformed() {
        assert!(WalletAddress::parse("abcdef0123456789abcdef0123456789abcdef01").is_err());
        assert!(WalletAddress::parse("0x1234").is_err());
        assert!(WalletAddress::parse("0xzzcdef0123456789abcdef0123456789abcdef01").is_err());
    }

    #[test]
    fn test_amount_canonical_form() {
        assert_eq!(Amount::parse("001.500").unwrap().as_str(), "1.5");
        assert_eq!(Amount::parse("0.0").unwrap().as_str(), "0");
        assert_eq!(Amount::parse(".25").unwrap().as_str(), "0.25");
        assert_eq!(Amount::parse("1000").unwrap().as_str(), "1000");
        assert!(Amount::parse("").is_err());
        assert!(Amount::parse(".").is_err());
        assert!(Amount::parse("-1").is_err());
        assert!(Amount::parse("1e3").is_err());
        assert!(Amount::parse("1.2.3").is_err());
    }

    #[test]
    fn test_amount_numeric_ordering() {
        let a = |s: &str| Amount::parse(s).unwrap();
        assert!(a("10") > a("9.99"));
        assert!(a("0.5") > a("0.05"));
        assert!(a("0.51") > a("0.5"));
        assert_eq!(a("1.50"), a("1.5"));
        assert!(a("0") < a("0.0001"));
    }

    #[test]
    fn test_terms_validation_and_end_time() {
        let terms = StreamTerms::new(Amount::parse("1000").unwrap(), Amount::zero(), 12, 1_700_000_000)
            .with_tax_percent(10);
        terms.validate().unwrap();
        assert_eq!(terms.resolved_end_time(), 1_700_000_000 + 12 * SECONDS_PER_MONTH);
        assert_eq!(terms.clone().with_end_time(1_800_000_000).resolved_end_time(), 1_800_000_000);

        let mut bad = terms.clone();
        bad.duration_months = 0;
        assert!(matches!(bad.validate(), Err(LedgerError::InvalidTerms(_))));

        let bad = terms.clone().with_tax_percent(101);
        assert!(bad.validate().is_err());

        let bad = terms.with_end_time(1);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_terms_deserialize_camel_case() {
        let terms: StreamTerms = serde_json::from_str(
            r#"{"monthlySalary":"1000","ratePerSecond":"0.000385","durationMonths":12,"taxPercent":10,"startTime":0}"#,
        )
        .unwrap();
        assert_eq!(terms.duration_months, 12);
        assert!(terms.end_time.is_none());

        let err = serde_json::from_str::<StreamTerms>(
            r#"{"monthlySalary":"-5","ratePerSecond":"0","durationMonths":1,"taxPercent":0,"startTime":0}"#,
        );
        assert!(err.is_err());
    }
}
