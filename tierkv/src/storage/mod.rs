//! Storage controllers
//!
//! `StorageController` ties a memory cache to the disk store for one namespace;
//! `NamespaceRegistry` hands out exactly one controller per namespace name.

pub mod controller;
pub mod registry;

pub use controller::{EvictionDelegate, StorageController};
pub use registry::NamespaceRegistry;
