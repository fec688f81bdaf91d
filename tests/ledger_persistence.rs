use quota_ledger::store::now;
use quota_ledger::{FileStore, LedgerError, LedgerResult, QuotaBucket, QuotaType};

mod test_helpers;
use test_helpers::{general_bucket, in_one_hour, open_session, temp_location, video_bucket, GB, MB};

#[test]
fn test_new_session_sees_committed_state() -> LedgerResult<()> {
    let location = temp_location();
    let first = open_session(&location, "user_123");

    first.buy_topping(video_bucket("YouTube 2GB", 2 * GB))?;
    first.buy_topping(general_bucket("General 1GB", GB))?;
    first.simulate_usage(300 * MB, QuotaType::Video)?;
    let final_read = first.get_account_info()?;

    let second = open_session(&location, "user_123");
    let reopened = second.get_account_info()?;

    assert_eq!(reopened, final_read);
    assert_eq!(reopened.buckets.len(), 2);
    assert_eq!(reopened.buckets[0].remaining_bytes, 2 * GB - 300 * MB);
    Ok(())
}

#[test]
fn test_sessions_do_not_cache() -> LedgerResult<()> {
    let location = temp_location();
    let first = open_session(&location, "U1");
    let second = open_session(&location, "U1");

    second.buy_topping(general_bucket("Night pack", 100))?;
    assert_eq!(first.get_account_info()?.buckets.len(), 1);

    first.simulate_usage(60, QuotaType::General)?;
    assert_eq!(second.get_account_info()?.buckets[0].remaining_bytes, 40);

    // the balance second sees must include first's deduction
    let err = second.simulate_usage(41, QuotaType::General).unwrap_err();
    assert!(err.is_insufficient_balance());
    Ok(())
}

#[test]
fn test_state_survives_dropping_every_handle() -> LedgerResult<()> {
    let location = temp_location();
    {
        let session = open_session(&location, "U1");
        session.buy_topping(video_bucket("Video", 10 * MB))?;
        session.buy_topping(video_bucket("Video", 10 * MB))?;
        session.simulate_usage(15 * MB, QuotaType::Video)?;
    }

    let session = open_session(&location, "U1");
    let account = session.get_account_info()?;
    let remaining: Vec<u64> = account.buckets.iter().map(|b| b.remaining_bytes).collect();
    assert_eq!(remaining, vec![0, 5 * MB]);

    let history = session.usage_history(10)?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].amount, 15 * MB);
    assert_eq!(history[0].category, QuotaType::Video);
    Ok(())
}

#[test]
fn test_category_isolation() -> LedgerResult<()> {
    let location = temp_location();
    let session = open_session(&location, "U1");
    session.buy_topping(general_bucket("General", 100 * MB))?;
    session.buy_topping(video_bucket("Video", 10 * MB))?;

    let err = session.simulate_usage(20 * MB, QuotaType::Video).unwrap_err();
    assert_eq!(
        err,
        LedgerError::InsufficientBalance {
            account_id: "U1".to_string(),
            category: QuotaType::Video,
            requested: 20 * MB,
            available: 10 * MB,
        }
    );

    session.simulate_usage(10 * MB, QuotaType::Video)?;
    let account = session.get_account_info()?;
    assert_eq!(account.total_remaining(QuotaType::General), 100 * MB);
    assert_eq!(account.total_remaining(QuotaType::Video), 0);

    // Social has no buckets at all
    assert!(session.simulate_usage(1, QuotaType::Social).unwrap_err().is_insufficient_balance());
    Ok(())
}

#[test]
fn test_expired_bucket_is_kept_but_skipped() -> LedgerResult<()> {
    let location = temp_location();
    let session = open_session(&location, "U1");
    let current = now();

    session.buy_topping(QuotaBucket::new("Expired", 100, QuotaType::General, current - 1))?;
    session.buy_topping(QuotaBucket::new("Short", 100, QuotaType::General, current + 60))?;
    session.buy_topping(QuotaBucket::new("Long", 100, QuotaType::General, current + 3600))?;

    session.simulate_usage_at(150, QuotaType::General, current)?;
    let remaining: Vec<u64> = session
        .get_account_info()?
        .buckets
        .iter()
        .map(|b| b.remaining_bytes)
        .collect();
    assert_eq!(remaining, vec![100, 0, 50]);

    // once "Long" has expired too, nothing is usable
    let err = session
        .simulate_usage_at(1, QuotaType::General, current + 3600)
        .unwrap_err();
    assert!(err.is_insufficient_balance());
    assert_eq!(session.get_account_info()?.buckets.len(), 3);
    Ok(())
}

#[test]
fn test_accounts_share_a_location_independently() -> LedgerResult<()> {
    let location = temp_location();
    let alice = open_session(&location, "alice");
    let bob = open_session(&location, "bob");

    alice.buy_topping(general_bucket("General", 100))?;
    assert!(bob.get_account_info()?.buckets.is_empty());
    assert!(bob.simulate_usage(1, QuotaType::General).unwrap_err().is_insufficient_balance());

    alice.simulate_usage(100, QuotaType::General)?;
    assert_eq!(alice.get_account_info()?.total_remaining(QuotaType::General), 0);
    Ok(())
}

#[test]
fn test_invalid_topping_is_not_persisted() -> LedgerResult<()> {
    let location = temp_location();
    let session = open_session(&location, "U1");

    let err = session.buy_topping(QuotaBucket::new("", 100, QuotaType::General, in_one_hour()));
    assert!(matches!(err, Err(LedgerError::InvalidBucket { .. })));

    let err = session.buy_topping_command("Unlimited everything");
    assert!(matches!(err, Err(LedgerError::InvalidBucket { .. })));

    assert!(open_session(&location, "U1").get_account_info()?.buckets.is_empty());
    Ok(())
}

#[test]
fn test_topping_command_round_trip() -> LedgerResult<()> {
    let location = temp_location();
    let session = open_session(&location, "U1");

    let bought = session.buy_topping_command("YouTube 2GB")?;
    assert_eq!(bought.category, QuotaType::Video);

    let account = open_session(&location, "U1").get_account_info()?;
    assert_eq!(account.buckets, vec![bought]);
    Ok(())
}

#[test]
fn test_unwritable_location_is_storage_error() {
    let location = temp_location();
    let blocker = location.path().join("not-a-directory");
    std::fs::write(&blocker, b"file").unwrap();

    let err = FileStore::new(&blocker).unwrap_err();
    assert!(matches!(err, LedgerError::StorageUnavailable { .. }));
}
