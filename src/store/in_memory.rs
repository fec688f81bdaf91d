use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;

use crate::errors::{LedgerError, LedgerResult};
use crate::model::{Account, UsageRecord};
use crate::store::traits::{apply_mutations, BucketStore, Mutation};

/// An in-memory implementation of the `BucketStore` trait.
/// Suitable for testing and demos. Clones share the same accounts, the way
/// two `FileStore`s on one directory do.
#[derive(Clone, Default, Debug)]
pub struct InMemoryStore {
    // Account ID -> per-account slot; each slot has its own lock
    accounts: Arc<Mutex<HashMap<String, Arc<Mutex<AccountSlot>>>>>,
}

#[derive(Debug)]
struct AccountSlot {
    account: Account,
    history: Vec<UsageRecord>,
}

fn poisoned(operation: &str) -> LedgerError {
    LedgerError::StorageUnavailable {
        operation: operation.to_string(),
        details: "lock poisoned by a panicked writer".to_string(),
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finds or creates the slot for an account. The map lock is held only
    /// for the lookup, so accounts never wait on each other's transactions.
    fn slot(&self, account_id: &str) -> LedgerResult<Arc<Mutex<AccountSlot>>> {
        let mut accounts = self.accounts.lock().map_err(|_| poisoned("lookup account"))?;
        let slot = accounts.entry(account_id.to_string()).or_insert_with(|| {
            debug!("Created in-memory account '{}'", account_id);
            Arc::new(Mutex::new(AccountSlot {
                account: Account::empty(account_id),
                history: Vec::new(),
            }))
        });
        Ok(Arc::clone(slot))
    }

    fn lock<'a>(
        slot: &'a Mutex<AccountSlot>,
        operation: &str,
    ) -> LedgerResult<MutexGuard<'a, AccountSlot>> {
        slot.lock().map_err(|_| poisoned(operation))
    }
}

impl BucketStore for InMemoryStore {
    fn load(&self, account_id: &str) -> LedgerResult<Account> {
        let slot = self.slot(account_id)?;
        let guard = Self::lock(&slot, "load account")?;
        Ok(guard.account.clone())
    }

    fn apply<F>(&self, account_id: &str, plan: F) -> LedgerResult<Account>
    where
        F: FnOnce(&Account) -> LedgerResult<Vec<Mutation>>,
    {
        let slot = self.slot(account_id)?;
        let mut guard = Self::lock(&slot, "apply mutation")?;

        let mutations = plan(&guard.account)?;
        if mutations.is_empty() {
            return Ok(guard.account.clone());
        }

        let mut next = guard.account.clone();
        let usage = apply_mutations(&mut next, mutations)?;

        guard.account = next.clone();
        guard.history.extend(usage);
        Ok(next)
    }

    fn usage_history(&self, account_id: &str, limit: usize) -> LedgerResult<Vec<UsageRecord>> {
        let slot = self.slot(account_id)?;
        let guard = Self::lock(&slot, "read usage history")?;
        Ok(guard.history.iter().rev().take(limit).cloned().collect())
    }
}
