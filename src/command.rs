use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{LedgerError, LedgerResult};
use crate::model::{QuotaBucket, QuotaType};
use crate::store::utils::{Timestamp, SECONDS_PER_DAY};

/// How long a topping bought by command stays usable
pub const TOPPING_VALIDITY_SECS: Timestamp = 30 * SECONDS_PER_DAY;

static TOPPING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(youtube|video|social|general)\s+(\d+)\s*(gb|mb)\s*$")
        .expect("topping pattern is valid")
});

/// Parses commands like "YouTube 2GB" or "general 500 mb" into a bucket
/// that expires `TOPPING_VALIDITY_SECS` after `now`.
pub fn parse_topping_command(command: &str, now: Timestamp) -> LedgerResult<QuotaBucket> {
    let caps = TOPPING_RE.captures(command).ok_or_else(|| {
        LedgerError::invalid_bucket(format!(
            "cannot parse topping '{}', try 'YouTube 2GB'",
            command.trim()
        ))
    })?;

    let category: QuotaType = caps[1].parse()?;
    let amount: u64 = caps[2].parse().map_err(|_| {
        LedgerError::invalid_bucket(format!("amount '{}' is out of range", &caps[2]))
    })?;
    let unit = caps[3].to_uppercase();

    let multiplier: u64 = if unit == "GB" { 1024 * 1024 * 1024 } else { 1024 * 1024 };
    let bytes = amount
        .checked_mul(multiplier)
        .ok_or_else(|| LedgerError::invalid_bucket(format!("{} {} is too large", amount, unit)))?;

    Ok(QuotaBucket::new(
        &format!("{} {} Topping", amount, unit),
        bytes,
        category,
        now.saturating_add(TOPPING_VALIDITY_SECS),
    ))
}
