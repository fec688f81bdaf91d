use std::collections::HashMap;
use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use log::{debug, info};
use rand::Rng;
use thiserror::Error;

use quota_ledger::config::CONFIG;
use quota_ledger::store::now;
use quota_ledger::{
    open_with_config, AccountSession, LedgerConfig, LedgerError, QuotaBucket, QuotaType,
};

const MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Error)]
enum AppError {
    #[error("{0}")]
    Ledger(#[from] LedgerError),

    #[error("Verification failed: {0}")]
    Verification(String),

    #[error("Worker thread panicked")]
    WorkerPanicked,
}

#[derive(Parser, Debug)]
#[command(
    name = "quota-ledger",
    version,
    about = "Prepaid data quota ledger for simulated subscribers"
)]
struct Cli {
    /// Storage location shared by all sessions
    #[arg(long, env = "QUOTA_LEDGER_PATH")]
    storage: Option<PathBuf>,

    /// Account to operate on
    #[arg(long, env = "QUOTA_LEDGER_ACCOUNT")]
    account: Option<String>,

    /// Display debug logs
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Buy a quota bucket
    Buy {
        #[arg(long)]
        name: String,
        #[arg(long, allow_hyphen_values = true)]
        bytes: i64,
        #[arg(long, default_value = "general")]
        category: String,
        /// Seconds from now until the bucket expires
        #[arg(long, conflicts_with = "expiry", default_value_t = 30 * 24 * 60 * 60)]
        expires_in: u64,
        /// Absolute expiry in seconds since the epoch
        #[arg(long)]
        expiry: Option<u64>,
    },
    /// Buy a topping described in free text, e.g. "YouTube 2GB"
    Topping { text: String },
    /// Simulate data usage
    Use {
        #[arg(long)]
        bytes: u64,
        #[arg(long, default_value = "general")]
        category: String,
    },
    /// Show the account's buckets
    Info,
    /// Forecast how long the remaining balance lasts
    Status,
    /// Show recent usage
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Drain a video topping from parallel workers and verify persistence
    Stress {
        #[arg(long, default_value_t = 10)]
        workers: usize,
        #[arg(long, default_value_t = 50)]
        calls: usize,
        #[arg(long, default_value_t = 10 * 1024 * 1024)]
        min_bytes: u64,
        #[arg(long, default_value_t = 100 * 1024 * 1024)]
        max_bytes: u64,
        /// Size of the video topping bought before the run
        #[arg(long, default_value_t = 2 * 1024 * 1024 * 1024)]
        topping_bytes: u64,
        /// Pause between calls of one worker, in milliseconds
        #[arg(long, default_value_t = 5)]
        pause_ms: u64,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let mut config: LedgerConfig = CONFIG.clone();
    if let Some(storage) = cli.storage {
        config.storage_path = storage;
    }
    if let Some(account) = cli.account {
        config.account_id = account;
    }

    if let Err(err) = run(cli.command, &config) {
        eprintln!("Error: {}", err);
        process::exit(1);
    }
}

fn run(command: Commands, config: &LedgerConfig) -> Result<(), AppError> {
    debug!("Opening account '{}' at {}", config.account_id, config.storage_path.display());
    let session = open_with_config(&config.account_id, config)?;

    match command {
        Commands::Buy {
            name,
            bytes,
            category,
            expires_in,
            expiry,
        } => {
            let expiry = expiry.unwrap_or_else(|| now().saturating_add(expires_in));
            let bucket = QuotaBucket::from_parts(&name, bytes, &category, expiry)?;
            session.buy_topping(bucket.clone())?;
            println!(
                "Bought '{}' ({:.2} MB of {})",
                bucket.name,
                bucket.remaining_bytes as f64 / MB,
                bucket.category
            );
        }
        Commands::Topping { text } => {
            let bucket = session.buy_topping_command(&text)?;
            println!("Bought '{}' ({} quota)", bucket.name, bucket.category);
        }
        Commands::Use { bytes, category } => {
            let category: QuotaType = category.parse()?;
            session.simulate_usage(bytes, category)?;
            println!("Used {} bytes of {}", bytes, category);
        }
        Commands::Info => print_buckets(&session)?,
        Commands::Status => print_status(&session)?,
        Commands::History { limit } => {
            let records = session.usage_history(limit)?;
            if records.is_empty() {
                println!("No usage recorded");
            }
            for record in records {
                println!(
                    "{} | {:<7} | {:.2} MB",
                    format_timestamp(record.timestamp),
                    record.category,
                    record.amount as f64 / MB
                );
            }
            println!("Daily average (7 days): {:.2} MB", session.daily_average()? as f64 / MB);
        }
        Commands::Stress {
            workers,
            calls,
            min_bytes,
            max_bytes,
            topping_bytes,
            pause_ms,
        } => {
            let plan = StressPlan {
                workers,
                calls,
                min_bytes: min_bytes.min(max_bytes),
                max_bytes: max_bytes.max(min_bytes),
                pause: Duration::from_millis(pause_ms),
            };
            stress(&session, config, &plan, topping_bytes)?;
        }
    }

    Ok(())
}

fn format_timestamp(ts: u64) -> String {
    i64::try_from(ts)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| "never".to_string())
}

fn print_buckets(session: &AccountSession) -> Result<(), AppError> {
    let account = session.get_account_info()?;
    let current = now();

    println!("Account '{}' ({} buckets)", account.account_id, account.buckets.len());
    for bucket in &account.buckets {
        let state = if bucket.is_expired_at(current) {
            "expired".red()
        } else if bucket.remaining_bytes == 0 {
            "exhausted".yellow()
        } else {
            "active".green()
        };
        println!(
            "Bucket: {} | Category: {} | Remaining: {:.2} MB | Expires: {} | {}",
            bucket.name,
            bucket.category,
            bucket.remaining_bytes as f64 / MB,
            format_timestamp(bucket.expiry),
            state
        );
    }
    Ok(())
}

fn print_status(session: &AccountSession) -> Result<(), AppError> {
    let insight = session.insight()?;

    println!("You have {:.2} MB remaining.", insight.remaining_bytes as f64 / MB);
    match insight.days_left {
        Some(days) => {
            println!("Based on the last 7 days you have roughly {} days of usage left.", days);
            if insight.top_up_soon {
                println!("{}", "Top up soon to avoid interruption.".yellow().bold());
            }
        }
        None => println!("Start using data to see a usage forecast."),
    }
    Ok(())
}

struct StressPlan {
    workers: usize,
    calls: usize,
    min_bytes: u64,
    max_bytes: u64,
    pause: Duration,
}

#[derive(Default)]
struct WorkerTally {
    success: u64,
    insufficient_balance: u64,
    used: HashMap<QuotaType, u64>,
}

impl WorkerTally {
    fn merge(&mut self, other: WorkerTally) {
        self.success += other.success;
        self.insufficient_balance += other.insufficient_balance;
        for (category, bytes) in other.used {
            let used = self.used.entry(category).or_insert(0);
            *used = used.saturating_add(bytes);
        }
    }
}

fn run_worker(session: &AccountSession, plan: &StressPlan) -> Result<WorkerTally, LedgerError> {
    let mut rng = rand::thread_rng();
    let mut tally = WorkerTally::default();

    for _ in 0..plan.calls {
        let category = if rng.gen_bool(0.5) { QuotaType::Video } else { QuotaType::General };
        let amount = rng.gen_range(plan.min_bytes..=plan.max_bytes);

        match session.simulate_usage(amount, category) {
            Ok(()) => {
                tally.success += 1;
                let used = tally.used.entry(category).or_insert(0);
                *used = used.saturating_add(amount);
            }
            Err(LedgerError::InsufficientBalance { .. }) => tally.insufficient_balance += 1,
            Err(err) => return Err(err),
        }

        if !plan.pause.is_zero() {
            thread::sleep(plan.pause);
        }
    }

    Ok(tally)
}

fn stress(
    session: &AccountSession,
    config: &LedgerConfig,
    plan: &StressPlan,
    topping_bytes: u64,
) -> Result<(), AppError> {
    let topping_name = format!("YouTube {:.0} MB", topping_bytes as f64 / MB);
    let expiry = now().saturating_add(3600);
    session.buy_topping(QuotaBucket::new(&topping_name, topping_bytes, QuotaType::Video, expiry))?;
    let before = session.get_account_info()?;

    println!(
        "Starting multi-quota persistence test with {} workers x {} calls...",
        plan.workers, plan.calls
    );

    let results: Vec<thread::Result<Result<WorkerTally, LedgerError>>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..plan.workers)
            .map(|_| scope.spawn(|| run_worker(session, plan)))
            .collect();
        handles.into_iter().map(|h| h.join()).collect()
    });

    let mut tally = WorkerTally::default();
    for result in results {
        tally.merge(result.map_err(|_| AppError::WorkerPanicked)??);
    }

    println!(
        "Calls: {} | success: {} | insufficient balance: {}",
        tally.success + tally.insufficient_balance,
        tally.success,
        tally.insufficient_balance
    );

    println!("\n--- Final state ---");
    print_buckets(session)?;
    let after = session.get_account_info()?;

    for category in QuotaType::ALL {
        let drained = before
            .total_remaining(category)
            .saturating_sub(after.total_remaining(category));
        let used = tally.used.get(&category).copied().unwrap_or(0);
        if drained != used {
            return Err(AppError::Verification(format!(
                "{} buckets drained {} bytes but successful calls used {}",
                category, drained, used
            )));
        }
    }
    info!("Conservation holds for all categories");

    println!("\n--- Testing persistence (new session) ---");
    let fresh = open_with_config(&config.account_id, config)?;
    let reopened = fresh.get_account_info()?;
    println!("Buckets found in new session: {}", reopened.buckets.len());

    if reopened != after {
        return Err(AppError::Verification(
            "fresh session sees a different bucket collection".to_string(),
        ));
    }
    println!("{}", "Persistence Verified!".green().bold());

    Ok(())
}
