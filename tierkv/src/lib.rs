//! tierkv: namespaced key/value storage with a cost-bounded LRU memory cache over a
//! durable disk store.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tierkv::{FileDiskStore, NamespaceRegistry};
//!
//! let disk = Arc::new(FileDiskStore::open("./data").unwrap());
//! let registry: NamespaceRegistry<String> = NamespaceRegistry::new(disk);
//!
//! let users = registry.controller_for(Some("users"));
//! users.set("alice", "admin".to_string());
//! users.save("alice").unwrap();
//! ```

pub mod codec;
pub mod config;
pub mod core;
pub mod persistence;
pub mod storage;

// Re-export commonly used types
pub use codec::{BincodeCodec, CodecKind, Deserializer, JsonCodec, Serializer};
pub use config::{LoggingConfig, NamespaceConfig, NamespaceSettings, StorageConfig};
pub use crate::core::{
    CacheEntry, CodecError, DEFAULT_COST, DEFAULT_NAMESPACE, Evicted, MemoryCache, Result,
    StorageError, StorageStats, UNLIMITED_CAPACITY,
};
pub use persistence::{DiskStore, FileDiskStore, MemoryDiskStore};
pub use storage::{EvictionDelegate, NamespaceRegistry, StorageController};
