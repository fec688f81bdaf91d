use crate::errors::{LedgerError, LedgerResult};
use crate::model::{Account, QuotaBucket, UsageRecord};

/// A single change to an account, applied as part of one transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    /// Append a newly bought bucket to the end of the collection
    AppendBucket(QuotaBucket),
    /// Take `bytes` from the bucket at position `index`
    Debit { index: usize, bytes: u64 },
    /// Add an entry to the account's usage history once the transaction commits
    RecordUsage(UsageRecord),
}

/// Durable storage of per-account bucket collections.
///
/// Implementations serialize transactions on the same account, including
/// transactions issued by other handles on the same storage location, and
/// never let one account's transaction wait on another account.
pub trait BucketStore: Send + Sync {
    /// Returns the last committed snapshot of the account's buckets, creating
    /// an empty account on first access. Reading an existing account never
    /// waits for an in-flight transaction.
    fn load(&self, account_id: &str) -> LedgerResult<Account>;

    /// Runs `plan` against the current state while holding the account's
    /// exclusive lock, then commits the mutations it returns as one durable
    /// write. If `plan` fails, or any mutation would be invalid, nothing is
    /// written. Returns the post-transaction state.
    fn apply<F>(&self, account_id: &str, plan: F) -> LedgerResult<Account>
    where
        F: FnOnce(&Account) -> LedgerResult<Vec<Mutation>>;

    /// Returns up to `limit` usage records, newest first.
    fn usage_history(&self, account_id: &str, limit: usize) -> LedgerResult<Vec<UsageRecord>>;
}

/// Applies `mutations` to `account` in order and returns the usage records
/// to append to history. On error `account` may be partially modified, so
/// callers work on a copy.
pub fn apply_mutations(
    account: &mut Account,
    mutations: Vec<Mutation>,
) -> LedgerResult<Vec<UsageRecord>> {
    let account_id = account.account_id.clone();
    let mut usage = Vec::new();

    for mutation in mutations {
        match mutation {
            Mutation::AppendBucket(bucket) => account.buckets.push(bucket),
            Mutation::Debit { index, bytes } => {
                let bucket = account.buckets.get_mut(index).ok_or_else(|| {
                    LedgerError::invalid_bucket(format!(
                        "account '{}' has no bucket at position {}",
                        account_id, index
                    ))
                })?;

                if bytes > bucket.remaining_bytes {
                    return Err(LedgerError::InsufficientBalance {
                        account_id,
                        category: bucket.category,
                        requested: bytes,
                        available: bucket.remaining_bytes,
                    });
                }
                bucket.remaining_bytes -= bytes;
            }
            Mutation::RecordUsage(record) => usage.push(record),
        }
    }

    Ok(usage)
}
