use log::{debug, info};

use crate::command::parse_topping_command;
use crate::errors::{LedgerError, LedgerResult};
use crate::model::{Account, QuotaBucket, QuotaType, UsageInsight, UsageRecord};
use crate::store::traits::{BucketStore, Mutation};
use crate::store::utils::{now, Timestamp, SECONDS_PER_DAY};

/// Number of days the usage average looks back
const AVERAGE_WINDOW_DAYS: u64 = 7;

/// Business rules over a `BucketStore`: purchase, deduction and reporting.
///
/// The ledger holds no account state of its own. Every read goes to the
/// store and every deduction is planned inside the store's transaction, so
/// any number of ledgers over the same storage location stay consistent.
#[derive(Clone, Debug)]
pub struct Ledger<S> {
    store: S,
}

impl<S: BucketStore> Ledger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Appends a bucket to the account. Already-expired buckets are accepted
    /// and simply never become eligible.
    pub fn buy_topping(&self, account_id: &str, bucket: QuotaBucket) -> LedgerResult<()> {
        bucket.validate()?;

        let name = bucket.name.clone();
        let bytes = bucket.remaining_bytes;
        let category = bucket.category;

        let account = self
            .store
            .apply(account_id, move |_| Ok(vec![Mutation::AppendBucket(bucket)]))?;

        info!(
            "Account '{}' bought '{}' ({} bytes of {}), now holds {} buckets",
            account_id,
            name,
            bytes,
            category,
            account.buckets.len()
        );
        Ok(())
    }

    /// Parses a free-text topping such as "YouTube 2GB" and buys it
    pub fn buy_topping_command(
        &self,
        account_id: &str,
        command: &str,
    ) -> LedgerResult<QuotaBucket> {
        let bucket = parse_topping_command(command, now())?;
        self.buy_topping(account_id, bucket.clone())?;
        Ok(bucket)
    }

    pub fn simulate_usage(
        &self,
        account_id: &str,
        amount_bytes: u64,
        category: QuotaType,
    ) -> LedgerResult<()> {
        self.simulate_usage_at(account_id, amount_bytes, category, now())
    }

    /// Deducts `amount_bytes` of `category` usage as of time `now`, all or nothing.
    pub fn simulate_usage_at(
        &self,
        account_id: &str,
        amount_bytes: u64,
        category: QuotaType,
        now: Timestamp,
    ) -> LedgerResult<()> {
        let result = self
            .store
            .apply(account_id, |account| plan_deduction(account, amount_bytes, category, now));

        match result {
            Ok(_) => Ok(()),
            Err(err @ LedgerError::InsufficientBalance { .. }) => {
                debug!("Usage rejected: {}", err);
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Snapshot of the account as last committed by any handle
    pub fn get_account_info(&self, account_id: &str) -> LedgerResult<Account> {
        self.store.load(account_id)
    }

    /// Most recent usage first
    pub fn usage_history(&self, account_id: &str, limit: usize) -> LedgerResult<Vec<UsageRecord>> {
        self.store.usage_history(account_id, limit)
    }

    pub fn daily_average(&self, account_id: &str) -> LedgerResult<u64> {
        self.daily_average_at(account_id, now())
    }

    /// Bytes used per day over the seven days before `now`
    pub fn daily_average_at(&self, account_id: &str, now: Timestamp) -> LedgerResult<u64> {
        let window_start = now.saturating_sub(AVERAGE_WINDOW_DAYS * SECONDS_PER_DAY);

        let total = self
            .store
            .usage_history(account_id, usize::MAX)?
            .iter()
            .filter(|r| r.timestamp > window_start)
            .fold(0u64, |total, r| total.saturating_add(r.amount));

        Ok(total / AVERAGE_WINDOW_DAYS)
    }

    pub fn insight(&self, account_id: &str) -> LedgerResult<UsageInsight> {
        self.insight_at(account_id, now())
    }

    /// Forecasts how long the usable balance lasts at the recent daily rate
    pub fn insight_at(&self, account_id: &str, now: Timestamp) -> LedgerResult<UsageInsight> {
        let remaining = self.store.load(account_id)?.usable_at(now);
        let average = self.daily_average_at(account_id, now)?;
        Ok(UsageInsight::new(remaining, average))
    }
}

/// Plans how `amount` bytes of `category` usage are drawn from `account`.
///
/// Eligible buckets (same category, non-empty, not expired) are drained in
/// purchase order, each absorbing up to its own balance. Usage never spills
/// into another category. If the eligible buckets cannot absorb the whole
/// amount no debit is planned and the call fails.
pub fn plan_deduction(
    account: &Account,
    amount: u64,
    category: QuotaType,
    now: Timestamp,
) -> LedgerResult<Vec<Mutation>> {
    if amount == 0 {
        return Ok(Vec::new());
    }

    let mut remaining = amount;
    let mut mutations = Vec::new();

    for (index, bucket) in account.buckets.iter().enumerate() {
        if remaining == 0 {
            break;
        }
        if !bucket.is_eligible(category, now) {
            continue;
        }

        let bytes = remaining.min(bucket.remaining_bytes);
        mutations.push(Mutation::Debit { index, bytes });
        remaining -= bytes;
    }

    if remaining > 0 {
        return Err(LedgerError::InsufficientBalance {
            account_id: account.account_id.clone(),
            category,
            requested: amount,
            available: amount - remaining,
        });
    }

    mutations.push(Mutation::RecordUsage(UsageRecord {
        timestamp: now,
        amount,
        category,
    }));
    Ok(mutations)
}
