pub mod command;
pub mod config;
pub mod errors;
pub mod ledger;
pub mod model;
pub mod session;
pub mod store;

pub use crate::config::LedgerConfig;
pub use crate::errors::{LedgerError, LedgerResult};
pub use crate::ledger::{plan_deduction, Ledger};
pub use crate::model::{Account, QuotaBucket, QuotaType, UsageInsight, UsageRecord};
pub use crate::session::{open, open_with_config, AccountSession};
pub use crate::store::{BucketStore, FileStore, InMemoryStore, Mutation};
