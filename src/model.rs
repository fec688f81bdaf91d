use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{LedgerError, LedgerResult};
use crate::store::utils::Timestamp;

/// Traffic category a bucket can absorb. Matching is exact; there is no
/// hierarchy between categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuotaType {
    General,
    Social,
    Video,
}

impl QuotaType {
    pub const ALL: [QuotaType; 3] = [QuotaType::General, QuotaType::Social, QuotaType::Video];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaType::General => "General",
            QuotaType::Social => "Social",
            QuotaType::Video => "Video",
        }
    }
}

impl fmt::Display for QuotaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for QuotaType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "general" => Ok(QuotaType::General),
            "social" => Ok(QuotaType::Social),
            // YouTube toppings are sold as video quota
            "video" | "youtube" => Ok(QuotaType::Video),
            other => Err(LedgerError::invalid_bucket(format!(
                "unrecognized category '{}'",
                other
            ))),
        }
    }
}

/// A named allotment of bytes for one traffic category, usable until `expiry`.
///
/// Buckets have no identity key: two buckets with the same name and category
/// are still distinct, and an account addresses them by position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaBucket {
    pub name: String,
    pub remaining_bytes: u64,
    pub category: QuotaType,
    /// Seconds since the UNIX epoch; the bucket is unusable once `now >= expiry`
    pub expiry: Timestamp,
}

impl QuotaBucket {
    pub fn new(name: &str, remaining_bytes: u64, category: QuotaType, expiry: Timestamp) -> Self {
        Self {
            name: name.to_string(),
            remaining_bytes,
            category,
            expiry,
        }
    }

    /// Builds a bucket from unchecked input, e.g. a CLI or a foreign binding.
    pub fn from_parts(
        name: &str,
        remaining_bytes: i64,
        category: &str,
        expiry: Timestamp,
    ) -> LedgerResult<Self> {
        if remaining_bytes < 0 {
            return Err(LedgerError::invalid_bucket(format!(
                "remaining_bytes must be non-negative, got {}",
                remaining_bytes
            )));
        }
        let category = category.parse::<QuotaType>()?;
        Ok(Self::new(name, remaining_bytes as u64, category, expiry))
    }

    /// Checks the invariants a bucket must hold before it is persisted.
    pub fn validate(&self) -> LedgerResult<()> {
        if self.name.trim().is_empty() {
            return Err(LedgerError::invalid_bucket("bucket name must not be blank"));
        }
        Ok(())
    }

    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        now >= self.expiry
    }

    /// Whether this bucket may absorb `category` usage at time `now`
    pub fn is_eligible(&self, category: QuotaType, now: Timestamp) -> bool {
        self.category == category && self.remaining_bytes > 0 && !self.is_expired_at(now)
    }
}

/// Point-in-time view of one account's buckets, in purchase order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    pub buckets: Vec<QuotaBucket>,
}

impl Account {
    pub fn empty(account_id: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            buckets: Vec::new(),
        }
    }

    /// Bytes left in every bucket of `category`, expired or not
    pub fn total_remaining(&self, category: QuotaType) -> u64 {
        self.buckets
            .iter()
            .filter(|b| b.category == category)
            .fold(0u64, |total, b| total.saturating_add(b.remaining_bytes))
    }

    /// Bytes that `category` usage could still draw on at time `now`
    pub fn available_at(&self, category: QuotaType, now: Timestamp) -> u64 {
        self.buckets
            .iter()
            .filter(|b| b.is_eligible(category, now))
            .fold(0u64, |total, b| total.saturating_add(b.remaining_bytes))
    }

    /// Bytes usable at time `now` across every category
    pub fn usable_at(&self, now: Timestamp) -> u64 {
        QuotaType::ALL
            .iter()
            .fold(0u64, |total, c| total.saturating_add(self.available_at(*c, now)))
    }
}

/// One successful usage deduction, kept in the account's usage history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub timestamp: Timestamp,
    pub amount: u64,
    pub category: QuotaType,
}

/// Below this many days of forecast usage the subscriber should top up
pub const TOP_UP_THRESHOLD_DAYS: u64 = 3;

/// Balance forecast derived from recent usage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageInsight {
    pub remaining_bytes: u64,
    /// Bytes per day over the last seven days
    pub daily_average: u64,
    /// `None` until there is recent usage to forecast from
    pub days_left: Option<u64>,
    pub top_up_soon: bool,
}

impl UsageInsight {
    pub fn new(remaining_bytes: u64, daily_average: u64) -> Self {
        let days_left = remaining_bytes.checked_div(daily_average);
        Self {
            remaining_bytes,
            daily_average,
            days_left,
            top_up_soon: days_left.is_some_and(|days| days < TOP_UP_THRESHOLD_DAYS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_type_parsing() {
        assert_eq!("video".parse::<QuotaType>().unwrap(), QuotaType::Video);
        assert_eq!("YouTube".parse::<QuotaType>().unwrap(), QuotaType::Video);
        assert_eq!(" GENERAL ".parse::<QuotaType>().unwrap(), QuotaType::General);
        assert_eq!("Social".parse::<QuotaType>().unwrap(), QuotaType::Social);

        let err = "voice".parse::<QuotaType>().unwrap_err();
        assert!(matches!(err, LedgerError::InvalidBucket { .. }));
    }

    #[test]
    fn test_from_parts_rejects_malformed_input() {
        let bucket = QuotaBucket::from_parts("Night pack", 1024, "general", 100).unwrap();
        assert_eq!(bucket.remaining_bytes, 1024);
        assert_eq!(bucket.category, QuotaType::General);

        assert!(matches!(
            QuotaBucket::from_parts("Bad", -1, "general", 100),
            Err(LedgerError::InvalidBucket { .. })
        ));
        assert!(matches!(
            QuotaBucket::from_parts("Bad", 10, "sms", 100),
            Err(LedgerError::InvalidBucket { .. })
        ));
    }

    #[test]
    fn test_eligibility() {
        let bucket = QuotaBucket::new("Video 1GB", 10, QuotaType::Video, 1_000);

        assert!(bucket.is_eligible(QuotaType::Video, 999));
        // expiry is exclusive
        assert!(!bucket.is_eligible(QuotaType::Video, 1_000));
        assert!(!bucket.is_eligible(QuotaType::General, 999));

        let exhausted = QuotaBucket::new("Video 1GB", 0, QuotaType::Video, 1_000);
        assert!(!exhausted.is_eligible(QuotaType::Video, 0));
    }

    #[test]
    fn test_account_balances() {
        let mut account = Account::empty("U1");
        account.buckets.push(QuotaBucket::new("a", 100, QuotaType::Video, 50));
        account.buckets.push(QuotaBucket::new("b", 40, QuotaType::Video, 500));
        account.buckets.push(QuotaBucket::new("c", 7, QuotaType::General, 500));

        assert_eq!(account.total_remaining(QuotaType::Video), 140);
        assert_eq!(account.available_at(QuotaType::Video, 100), 40);
        assert_eq!(account.available_at(QuotaType::General, 100), 7);
        assert_eq!(account.available_at(QuotaType::Social, 100), 0);
    }

    #[test]
    fn test_balances_saturate_instead_of_overflowing() {
        let mut account = Account::empty("U1");
        account.buckets.push(QuotaBucket::new("huge", u64::MAX, QuotaType::Video, 500));
        account.buckets.push(QuotaBucket::new("small", 2, QuotaType::Video, 500));
        account.buckets.push(QuotaBucket::new("near", u64::MAX - 1, QuotaType::General, 500));

        assert_eq!(account.total_remaining(QuotaType::Video), u64::MAX);
        assert_eq!(account.available_at(QuotaType::Video, 100), u64::MAX);
        assert_eq!(account.usable_at(100), u64::MAX);
    }

    #[test]
    fn test_insight_forecast() {
        let idle = UsageInsight::new(5_000, 0);
        assert_eq!(idle.days_left, None);
        assert!(!idle.top_up_soon);

        let steady = UsageInsight::new(5_000, 1_000);
        assert_eq!(steady.days_left, Some(5));
        assert!(!steady.top_up_soon);

        let low = UsageInsight::new(2_999, 1_000);
        assert_eq!(low.days_left, Some(2));
        assert!(low.top_up_soon);
    }
}
