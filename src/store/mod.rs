pub mod file_store;
pub mod in_memory;
pub mod traits;
pub mod utils;

pub use file_store::FileStore;
pub use in_memory::InMemoryStore;
pub use traits::{apply_mutations, BucketStore, Mutation};
pub use utils::{now, Timestamp};
