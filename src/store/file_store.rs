use std::fs::{self, create_dir_all, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{io_to_storage_error, LedgerError, LedgerResult};
use crate::model::{Account, QuotaBucket, UsageRecord};
use crate::store::traits::{apply_mutations, BucketStore, Mutation};
use crate::store::utils::{now, Timestamp};

/// Directory-backed bucket store shared by every handle opened on the same root.
///
/// Layout under the storage location:
/// - accounts/ - One directory per account
///   - acct-{hex(account_id)}/ (acct-sha256-{digest}/ for long ids)
///     - account.json - Current bucket collection and revision
///     - account.lock - Advisory lock file guarding the record
///     - usage.jsonl - Append-only usage history
///
/// The record is replaced by writing a sibling temp file and renaming it over
/// `account.json`, so readers see either the previous or the next revision
/// and never need the lock.
#[derive(Clone, Debug)]
pub struct FileStore {
    /// Root path for all storage
    root_path: PathBuf,
    /// Flush file and directory contents before a transaction is acknowledged
    sync_writes: bool,
    /// Append usage records to each account's history
    history_enabled: bool,
}

/// On-disk form of an account
#[derive(Clone, Debug, Serialize, Deserialize)]
struct AccountRecord {
    account_id: String,
    /// Number of committed transactions
    revision: u64,
    created_at: Timestamp,
    updated_at: Timestamp,
    buckets: Vec<QuotaBucket>,
}

/// Longest id (in bytes) whose hex form still fits a file name
const MAX_HEX_ID_BYTES: usize = 100;

impl AccountRecord {
    fn new(account_id: &str) -> Self {
        let created = now();
        Self {
            account_id: account_id.to_string(),
            revision: 0,
            created_at: created,
            updated_at: created,
            buckets: Vec::new(),
        }
    }

    fn to_account(&self) -> Account {
        Account {
            account_id: self.account_id.clone(),
            buckets: self.buckets.clone(),
        }
    }
}

impl FileStore {
    /// Opens (or creates) a store rooted at `root_path` with durable writes and history on.
    pub fn new<P: AsRef<Path>>(root_path: P) -> LedgerResult<Self> {
        Self::with_options(root_path, true, true)
    }

    pub fn with_options<P: AsRef<Path>>(
        root_path: P,
        sync_writes: bool,
        history_enabled: bool,
    ) -> LedgerResult<Self> {
        let root = root_path.as_ref().to_path_buf();

        create_dir_all(root.join("accounts"))
            .map_err(|e| io_to_storage_error("create storage root", e))?;

        Ok(FileStore {
            root_path: root,
            sync_writes,
            history_enabled,
        })
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Gets the directory holding one account's files.
    /// The id is hex-encoded so that any string maps to a single safe path
    /// component. Ids too long for a file name are hashed instead; the record
    /// keeps the full id, so `read_record` still detects a collision.
    fn account_dir(&self, account_id: &str) -> PathBuf {
        let name = if account_id.len() <= MAX_HEX_ID_BYTES {
            format!("acct-{}", hex::encode(account_id.as_bytes()))
        } else {
            format!("acct-sha256-{}", hex::encode(Sha256::digest(account_id.as_bytes())))
        };
        self.root_path.join("accounts").join(name)
    }

    fn record_path(&self, account_id: &str) -> PathBuf {
        self.account_dir(account_id).join("account.json")
    }

    fn history_path(&self, account_id: &str) -> PathBuf {
        self.account_dir(account_id).join("usage.jsonl")
    }

    /// Opens the account's lock file, creating the account directory if needed
    fn open_lock_file(&self, account_id: &str) -> LedgerResult<File> {
        let dir = self.account_dir(account_id);
        create_dir_all(&dir).map_err(|e| io_to_storage_error("create account directory", e))?;

        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(dir.join("account.lock"))
            .map_err(|e| io_to_storage_error("open account lock", e))
    }

    /// Acquires a shared lock; released when the returned file is dropped.
    /// Held while reading history so a half-written line is never observed.
    fn lock_shared(&self, account_id: &str) -> LedgerResult<File> {
        let file = self.open_lock_file(account_id)?;
        file.lock_shared()
            .map_err(|e| io_to_storage_error("lock account (shared)", e))?;
        Ok(file)
    }

    /// Acquires an exclusive lock; released when the returned file is dropped
    fn lock_exclusive(&self, account_id: &str) -> LedgerResult<File> {
        let file = self.open_lock_file(account_id)?;
        file.lock_exclusive()
            .map_err(|e| io_to_storage_error("lock account (exclusive)", e))?;
        Ok(file)
    }

    /// Reads the account record from disk, `None` if it was never written
    fn read_record(&self, account_id: &str) -> LedgerResult<Option<AccountRecord>> {
        let bytes = match fs::read(self.record_path(account_id)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_to_storage_error("read account record", e)),
        };

        let record: AccountRecord = serde_json::from_slice(&bytes).map_err(|e| {
            LedgerError::StorageUnavailable {
                operation: "decode account record".to_string(),
                details: e.to_string(),
            }
        })?;

        if record.account_id != account_id {
            return Err(LedgerError::StorageUnavailable {
                operation: "decode account record".to_string(),
                details: format!(
                    "record for '{}' found at the location of '{}'",
                    record.account_id, account_id
                ),
            });
        }

        Ok(Some(record))
    }

    /// Replaces the account record. Must be called with the exclusive lock held.
    fn write_record(&self, record: &AccountRecord) -> LedgerResult<()> {
        let dir = self.account_dir(&record.account_id);
        let tmp_path = dir.join("account.json.tmp");
        let bytes = serde_json::to_vec_pretty(record)?;

        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)
                .map_err(|e| io_to_storage_error("write account record", e))?;
            file.write_all(&bytes)
                .map_err(|e| io_to_storage_error("write account record", e))?;
            if self.sync_writes {
                file.sync_all()
                    .map_err(|e| io_to_storage_error("sync account record", e))?;
            }
        }

        fs::rename(&tmp_path, self.record_path(&record.account_id))
            .map_err(|e| io_to_storage_error("commit account record", e))?;

        if self.sync_writes {
            sync_dir(&dir)?;
        }

        Ok(())
    }

    /// Reads the record, persisting an empty one on first access.
    /// Must be called with the exclusive lock held.
    fn read_or_create(&self, account_id: &str) -> LedgerResult<AccountRecord> {
        if let Some(record) = self.read_record(account_id)? {
            return Ok(record);
        }

        let record = AccountRecord::new(account_id);
        self.write_record(&record)?;
        info!("Created account '{}' in {}", account_id, self.root_path.display());
        Ok(record)
    }

    /// Appends usage records to the account's history file.
    /// Must be called with the exclusive lock held.
    fn append_history(&self, account_id: &str, records: &[UsageRecord]) -> LedgerResult<()> {
        let mut file = OpenOptions::new()
            .read(true)
            .create(true)
            .append(true)
            .open(self.history_path(account_id))
            .map_err(|e| io_to_storage_error("open usage history", e))?;

        // Terminate a line left unfinished by an interrupted append
        if ends_mid_line(&mut file).map_err(|e| io_to_storage_error("read usage history", e))? {
            warn!("Usage history for '{}' ends mid-line; starting a new line", account_id);
            file.write_all(b"\n")
                .map_err(|e| io_to_storage_error("append usage history", e))?;
        }

        for record in records {
            let line = serde_json::to_string(record)?;
            writeln!(file, "{}", line).map_err(|e| io_to_storage_error("append usage history", e))?;
        }

        if self.sync_writes {
            file.sync_data()
                .map_err(|e| io_to_storage_error("sync usage history", e))?;
        }

        Ok(())
    }
}

fn ends_mid_line(file: &mut File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> LedgerResult<()> {
    File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| io_to_storage_error("sync account directory", e))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> LedgerResult<()> {
    Ok(())
}

impl BucketStore for FileStore {
    fn load(&self, account_id: &str) -> LedgerResult<Account> {
        // Commits replace the record by rename, so an unlocked read is a whole revision
        if let Some(record) = self.read_record(account_id)? {
            return Ok(record.to_account());
        }

        // First access: the record has to be created under the exclusive lock
        let _lock = self.lock_exclusive(account_id)?;
        Ok(self.read_or_create(account_id)?.to_account())
    }

    fn apply<F>(&self, account_id: &str, plan: F) -> LedgerResult<Account>
    where
        F: FnOnce(&Account) -> LedgerResult<Vec<Mutation>>,
    {
        let _lock = self.lock_exclusive(account_id)?;

        let mut record = self.read_or_create(account_id)?;
        let current = record.to_account();

        let mutations = plan(&current)?;
        if mutations.is_empty() {
            return Ok(current);
        }

        let mut next = current;
        let usage = apply_mutations(&mut next, mutations)?;

        record.buckets = next.buckets.clone();
        record.revision += 1;
        record.updated_at = now();
        self.write_record(&record)?;

        debug!(
            "Committed revision {} for account '{}' ({} buckets)",
            record.revision,
            account_id,
            record.buckets.len()
        );

        if self.history_enabled && !usage.is_empty() {
            if let Err(e) = self.append_history(account_id, &usage) {
                warn!("Usage history for account '{}' not recorded: {}", account_id, e);
            }
        }

        Ok(next)
    }

    fn usage_history(&self, account_id: &str, limit: usize) -> LedgerResult<Vec<UsageRecord>> {
        let _lock = self.lock_shared(account_id)?;

        let file = match File::open(self.history_path(account_id)) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_to_storage_error("open usage history", e)),
        };

        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| io_to_storage_error("read usage history", e))?;
            match serde_json::from_str::<UsageRecord>(&line) {
                Ok(record) => records.push(record),
                // A crash mid-append can leave a truncated last line
                Err(e) => warn!("Skipping malformed usage record for '{}': {}", account_id, e),
            }
        }

        Ok(records.into_iter().rev().take(limit).collect())
    }
}
