use std::env;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub const DEFAULT_STORAGE_PATH: &str = "./quota-ledger-data";
pub const DEFAULT_ACCOUNT_ID: &str = "default";

/// Runtime settings for opening sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Storage location shared by every session
    pub storage_path: PathBuf,
    /// Account used when none is given explicitly
    pub account_id: String,
    /// fsync records before acknowledging a transaction
    pub sync_writes: bool,
    /// Keep a per-account usage history
    pub history_enabled: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from(DEFAULT_STORAGE_PATH),
            account_id: DEFAULT_ACCOUNT_ID.to_string(),
            sync_writes: true,
            history_enabled: true,
        }
    }
}

impl LedgerConfig {
    /// Reads `QUOTA_LEDGER_PATH`, `QUOTA_LEDGER_ACCOUNT`, `QUOTA_LEDGER_SYNC`
    /// and `QUOTA_LEDGER_HISTORY`, falling back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            storage_path: lookup("QUOTA_LEDGER_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_path),
            account_id: lookup("QUOTA_LEDGER_ACCOUNT").unwrap_or(defaults.account_id),
            sync_writes: lookup("QUOTA_LEDGER_SYNC")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.sync_writes),
            history_enabled: lookup("QUOTA_LEDGER_HISTORY")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.history_enabled),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub static CONFIG: Lazy<LedgerConfig> = Lazy::new(LedgerConfig::from_env);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_when_unset() {
        let config = LedgerConfig::from_lookup(|_| None);
        assert_eq!(config, LedgerConfig::default());
    }

    #[test]
    fn test_values_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("QUOTA_LEDGER_PATH", "/var/lib/quota"),
            ("QUOTA_LEDGER_ACCOUNT", "user_123"),
            ("QUOTA_LEDGER_SYNC", "off"),
            ("QUOTA_LEDGER_HISTORY", "garbage"),
        ]
        .into_iter()
        .collect();

        let config = LedgerConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.storage_path, PathBuf::from("/var/lib/quota"));
        assert_eq!(config.account_id, "user_123");
        assert!(!config.sync_writes);
        // unparseable flags keep the default
        assert!(config.history_enabled);
    }
}
