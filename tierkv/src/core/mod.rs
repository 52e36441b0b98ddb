pub mod error;
pub mod memory_cache;
pub mod types;

pub use error::{CodecError, Result, StorageError};
pub use memory_cache::{CacheEntry, Evicted, MemoryCache};
pub use types::{
    DEFAULT_COST, DEFAULT_NAMESPACE, StorageStats, UNLIMITED_CAPACITY, resolve_namespace,
};
