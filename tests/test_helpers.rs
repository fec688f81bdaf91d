#![allow(dead_code)]

use quota_ledger::store::now;
use quota_ledger::{open, AccountSession, QuotaBucket, QuotaType};
use tempfile::TempDir;

pub const MB: u64 = 1024 * 1024;
pub const GB: u64 = 1024 * MB;

/// Creates a fresh storage location that is removed when dropped
pub fn temp_location() -> TempDir {
    TempDir::new().expect("Failed to create temp storage directory")
}

/// Opens a session on `location`, panicking on storage errors
pub fn open_session(location: &TempDir, account_id: &str) -> AccountSession {
    open(account_id, location.path()).expect("Failed to open session")
}

/// Expiry an hour from now
pub fn in_one_hour() -> u64 {
    now() + 3600
}

pub fn video_bucket(name: &str, bytes: u64) -> QuotaBucket {
    QuotaBucket::new(name, bytes, QuotaType::Video, in_one_hour())
}

pub fn general_bucket(name: &str, bytes: u64) -> QuotaBucket {
    QuotaBucket::new(name, bytes, QuotaType::General, in_one_hour())
}
