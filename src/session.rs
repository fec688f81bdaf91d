use std::path::Path;

use crate::config::LedgerConfig;
use crate::errors::LedgerResult;
use crate::ledger::Ledger;
use crate::model::{Account, QuotaBucket, QuotaType, UsageInsight, UsageRecord};
use crate::store::traits::BucketStore;
use crate::store::utils::Timestamp;
use crate::store::FileStore;

/// Binds one account id to a storage location.
///
/// Sessions keep no copy of the account: every call goes through the store,
/// so sessions opened on the same location and account are interchangeable.
/// A session is `Sync` and can be shared across worker threads.
#[derive(Clone, Debug)]
pub struct AccountSession<S = FileStore> {
    account_id: String,
    ledger: Ledger<S>,
}

/// Opens a session for `account_id` on the store at `storage_location`,
/// creating the location and the account if they don't exist yet.
pub fn open<P: AsRef<Path>>(account_id: &str, storage_location: P) -> LedgerResult<AccountSession> {
    AccountSession::open(account_id, storage_location)
}

/// Like `open`, with storage location and write options taken from `config`
pub fn open_with_config(account_id: &str, config: &LedgerConfig) -> LedgerResult<AccountSession> {
    let store = FileStore::with_options(
        &config.storage_path,
        config.sync_writes,
        config.history_enabled,
    )?;
    AccountSession::with_store(account_id, store)
}

impl AccountSession<FileStore> {
    pub fn open<P: AsRef<Path>>(account_id: &str, storage_location: P) -> LedgerResult<Self> {
        Self::with_store(account_id, FileStore::new(storage_location)?)
    }
}

impl<S: BucketStore> AccountSession<S> {
    /// Wraps an existing store. Touches the account so that an unreachable
    /// store fails here rather than on the first operation.
    pub fn with_store(account_id: &str, store: S) -> LedgerResult<Self> {
        store.load(account_id)?;
        Ok(Self {
            account_id: account_id.to_string(),
            ledger: Ledger::new(store),
        })
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn ledger(&self) -> &Ledger<S> {
        &self.ledger
    }

    pub fn buy_topping(&self, bucket: QuotaBucket) -> LedgerResult<()> {
        self.ledger.buy_topping(&self.account_id, bucket)
    }

    pub fn buy_topping_command(&self, command: &str) -> LedgerResult<QuotaBucket> {
        self.ledger.buy_topping_command(&self.account_id, command)
    }

    pub fn simulate_usage(&self, amount_bytes: u64, category: QuotaType) -> LedgerResult<()> {
        self.ledger.simulate_usage(&self.account_id, amount_bytes, category)
    }

    pub fn simulate_usage_at(
        &self,
        amount_bytes: u64,
        category: QuotaType,
        now: Timestamp,
    ) -> LedgerResult<()> {
        self.ledger.simulate_usage_at(&self.account_id, amount_bytes, category, now)
    }

    pub fn get_account_info(&self) -> LedgerResult<Account> {
        self.ledger.get_account_info(&self.account_id)
    }

    pub fn usage_history(&self, limit: usize) -> LedgerResult<Vec<UsageRecord>> {
        self.ledger.usage_history(&self.account_id, limit)
    }

    pub fn daily_average(&self) -> LedgerResult<u64> {
        self.ledger.daily_average(&self.account_id)
    }

    pub fn insight(&self) -> LedgerResult<UsageInsight> {
        self.ledger.insight(&self.account_id)
    }

    pub fn insight_at(&self, now: Timestamp) -> LedgerResult<UsageInsight> {
        self.ledger.insight_at(&self.account_id, now)
    }
}
