//! Persistence module
//!
//! Byte-level durable storage behind the memory cache:
//! - `DiskStore` trait, partitioned by namespace
//! - `FileDiskStore`: one file per key under a namespace directory
//! - `MemoryDiskStore`: in-process store for tests

pub mod disk_store;
pub mod file_store;
pub mod memory_store;

pub use disk_store::DiskStore;
pub use file_store::FileDiskStore;
pub use memory_store::MemoryDiskStore;
