use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

use crate::codec::{Deserializer, Serializer};
use crate::core::{DEFAULT_COST, Evicted, MemoryCache, Result, StorageError, StorageStats};
use crate::persistence::DiskStore;

/// Observer told about entries evicted by capacity pressure
///
/// Called on the thread whose `set` (or capacity change) caused the eviction, after the
/// controller has released its lock, so the delegate may call back into the controller.
/// Explicit removals never reach the delegate.
pub trait EvictionDelegate<V>: Send + Sync {
    fn on_evicted(&self, controller: &StorageController<V>, key: &str, value: &Arc<V>);
}

struct ControllerState<V> {
    cache: MemoryCache<Arc<V>>,
    serializer: Arc<dyn Serializer<V>>,
    deserializer: Arc<dyn Deserializer<V>>,
    stats: StorageStats,
}

/// Memory-over-disk storage for a single namespace
///
/// One lock guards the cache, the codec pair and the disk work they trigger, so all
/// operations on a namespace are serialized. Reads take the write side because a hit
/// refreshes recency and a miss may insert.
pub struct StorageController<V> {
    namespace: String,
    disk: Arc<dyn DiskStore>,
    state: RwLock<ControllerState<V>>,
    delegate: RwLock<Option<Weak<dyn EvictionDelegate<V>>>>,
}

type EvictedValues<V> = Vec<Evicted<Arc<V>>>;

impl<V: Send + Sync + 'static> StorageController<V> {
    pub(crate) fn new(
        namespace: String,
        disk: Arc<dyn DiskStore>,
        serializer: Arc<dyn Serializer<V>>,
        deserializer: Arc<dyn Deserializer<V>>,
        capacity: u64,
    ) -> Self {
        Self {
            namespace,
            disk,
            state: RwLock::new(ControllerState {
                cache: MemoryCache::new(capacity),
                serializer,
                deserializer,
                stats: StorageStats::default(),
            }),
            delegate: RwLock::new(None),
        }
    }

    /// The namespace this controller is bound to
    pub fn storage_namespace(&self) -> &str {
        &self.namespace
    }

    /// Fetch a value, trying memory first, then disk
    ///
    /// A payload the deserializer rejects is reported as absent.
    pub fn get(&self, key: &str) -> Result<Option<Arc<V>>> {
        let (value, evicted) = {
            let mut guard = self.state.write();
            let state = &mut *guard;

            if let Some(value) = state.cache.get(key).map(|entry| Arc::clone(&entry.value)) {
                state.stats.memory_hits += 1;
                debug!("Memory HIT: {}:{}", self.namespace, key);
                return Ok(Some(value));
            }

            self.load_from_disk(state, key)?
        };

        self.notify_evicted(evicted);
        Ok(value)
    }

    /// Store a value in memory with the default cost
    pub fn set(&self, key: &str, value: impl Into<Arc<V>>) {
        self.set_with_cost(key, value, DEFAULT_COST);
    }

    /// Store a value in memory; nothing is written to disk
    pub fn set_with_cost(&self, key: &str, value: impl Into<Arc<V>>, cost: u64) {
        let evicted = {
            let mut guard = self.state.write();
            Self::insert(&mut guard, key, value.into(), cost)
        };

        self.notify_evicted(evicted);
    }

    /// Store a value in memory and, if requested, save it before returning
    ///
    /// If the save fails the value stays resident, just not persisted.
    pub fn set_with_options(
        &self,
        key: &str,
        value: impl Into<Arc<V>>,
        cost: u64,
        persist_immediately: bool,
    ) -> Result<()> {
        let (result, evicted) = {
            let mut guard = self.state.write();
            let state = &mut *guard;

            let evicted = Self::insert(state, key, value.into(), cost);
            let result = if persist_immediately {
                self.save_locked(state, key).map(|_| ())
            } else {
                Ok(())
            };

            (result, evicted)
        };

        self.notify_evicted(evicted);
        result
    }

    /// Write the resident value for `key` to disk, replacing any previous payload
    ///
    /// Does nothing if `key` is not resident, including when it was evicted before being
    /// saved. There is no dirty checking: every call rewrites the whole payload.
    pub fn save(&self, key: &str) -> Result<()> {
        let mut guard = self.state.write();
        self.save_locked(&mut guard, key).map(|_| ())
    }

    /// Save every resident key
    ///
    /// Not atomic: a failure on one key does not stop the others. Returns how many keys
    /// were written, or every per-key failure alongside that count.
    pub fn save_all(&self) -> Result<usize> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let keys: Vec<String> = state.cache.keys().cloned().collect();
        let mut saved = 0;
        let mut failures = Vec::new();

        for key in keys {
            match self.save_locked(state, &key) {
                Ok(true) => saved += 1,
                Ok(false) => {}
                Err(e) => failures.push((key, e)),
            }
        }

        if failures.is_empty() {
            info!("Saved {} keys in namespace {}", saved, self.namespace);
            Ok(saved)
        } else {
            warn!(
                "Saved {} keys in namespace {}, {} failed",
                saved,
                self.namespace,
                failures.len()
            );
            Err(StorageError::SaveAllFailed { saved, failures })
        }
    }

    /// Load `key` from disk into memory unless it is already resident
    pub fn preload_into_memory(&self, key: &str) -> Result<()> {
        let evicted = {
            let mut guard = self.state.write();
            let state = &mut *guard;

            if state.cache.contains_key(key) {
                return Ok(());
            }

            let (_, evicted) = self.load_from_disk(state, key)?;
            evicted
        };

        self.notify_evicted(evicted);
        Ok(())
    }

    /// Whether `key` is resident in memory
    ///
    /// A point-in-time answer: the entry may be evicted or removed as soon as the lock is
    /// released, so a following `get` can still go to disk.
    pub fn is_cached(&self, key: &str) -> bool {
        self.state.read().cache.contains_key(key)
    }

    /// Snapshot of the resident keys, with the same staleness caveat as `is_cached`
    pub fn cached_keys(&self) -> HashSet<String> {
        self.state.read().cache.keys().cloned().collect()
    }

    /// Whether the resident value for `key` matches what was last saved or loaded
    pub fn is_persisted(&self, key: &str) -> bool {
        self.state
            .read()
            .cache
            .peek(key)
            .is_some_and(|entry| entry.persisted)
    }

    /// Drop `key` from memory only
    pub fn remove_from_memory(&self, key: &str) {
        if self.state.write().cache.remove(key).is_some() {
            debug!("Memory REMOVE: {}:{}", self.namespace, key);
        }
    }

    /// Drop every resident entry; disk is untouched
    pub fn remove_all_from_memory(&self) {
        self.state.write().cache.clear();
    }

    /// Delete `key` from disk, then from memory
    ///
    /// If the disk delete fails, memory is left as it was.
    pub fn remove_permanently(&self, key: &str) -> Result<()> {
        let mut state = self.state.write();

        self.disk
            .delete(&self.namespace, key)
            .map_err(|source| self.disk_error(key, source))?;
        state.cache.remove(key);

        debug!("Permanent REMOVE: {}:{}", self.namespace, key);
        Ok(())
    }

    /// Delete this namespace's data from disk, then clear memory
    pub fn remove_all_permanently(&self) -> Result<()> {
        let mut state = self.state.write();

        self.disk
            .delete_all(&self.namespace)
            .map_err(|source| self.disk_error("*", source))?;
        state.cache.clear();

        info!("Removed all data in namespace {}", self.namespace);
        Ok(())
    }

    /// Memory cache capacity in cost units
    pub fn max_in_memory_capacity(&self) -> u64 {
        self.state.read().cache.capacity()
    }

    /// Change the memory cache capacity; shrinking evicts immediately
    pub fn set_max_in_memory_capacity(&self, capacity: u64) {
        let evicted = {
            let mut guard = self.state.write();
            let state = &mut *guard;

            let evicted = state.cache.set_capacity(capacity);
            state.stats.evictions += evicted.len() as u64;
            evicted
        };

        self.notify_evicted(evicted);
    }

    pub fn serializer(&self) -> Arc<dyn Serializer<V>> {
        Arc::clone(&self.state.read().serializer)
    }

    pub fn set_serializer(&self, serializer: Arc<dyn Serializer<V>>) {
        self.state.write().serializer = serializer;
    }

    pub fn deserializer(&self) -> Arc<dyn Deserializer<V>> {
        Arc::clone(&self.state.read().deserializer)
    }

    pub fn set_deserializer(&self, deserializer: Arc<dyn Deserializer<V>>) {
        self.state.write().deserializer = deserializer;
    }

    /// Register an eviction delegate without extending its lifetime
    pub fn set_delegate<D>(&self, delegate: &Arc<D>)
    where
        D: EvictionDelegate<V> + 'static,
    {
        let weak = Arc::downgrade(delegate);
        let weak: Weak<dyn EvictionDelegate<V>> = weak;
        *self.delegate.write() = Some(weak);
    }

    pub fn clear_delegate(&self) {
        *self.delegate.write() = None;
    }

    /// Get statistics
    pub fn stats(&self) -> StorageStats {
        let state = self.state.read();
        let mut stats = state.stats.clone();
        stats.resident_entries = state.cache.len();
        stats.total_cost = state.cache.total_cost();
        stats
    }

    fn insert(
        state: &mut ControllerState<V>,
        key: &str,
        value: Arc<V>,
        cost: u64,
    ) -> EvictedValues<V> {
        let evicted = state.cache.insert(key.to_string(), value, cost);
        state.stats.evictions += evicted.len() as u64;
        evicted
    }

    fn load_from_disk(
        &self,
        state: &mut ControllerState<V>,
        key: &str,
    ) -> Result<(Option<Arc<V>>, EvictedValues<V>)> {
        let bytes = self
            .disk
            .read(&self.namespace, key)
            .map_err(|source| self.disk_error(key, source))?;

        let Some(bytes) = bytes else {
            state.stats.misses += 1;
            debug!("MISS: {}:{}", self.namespace, key);
            return Ok((None, Vec::new()));
        };

        match state.deserializer.deserialize(&bytes) {
            Ok(value) => {
                let value = Arc::new(value);
                let evicted = Self::insert(state, key, Arc::clone(&value), DEFAULT_COST);
                state.cache.mark_persisted(key);
                state.stats.disk_hits += 1;

                debug!(
                    "Disk HIT: {}:{} ({} bytes)",
                    self.namespace,
                    key,
                    bytes.len()
                );
                Ok((Some(value), evicted))
            }
            Err(e) => {
                let error = StorageError::DecodeFailure {
                    key: key.to_string(),
                    reason: e.to_string(),
                };
                state.stats.decode_failures += 1;
                state.stats.misses += 1;

                warn!("{} in namespace {}; treating as a miss", error, self.namespace);
                Ok((None, Vec::new()))
            }
        }
    }

    /// Returns whether a payload was written
    fn save_locked(&self, state: &mut ControllerState<V>, key: &str) -> Result<bool> {
        let Some(entry) = state.cache.peek(key) else {
            debug!("Nothing resident to save: {}:{}", self.namespace, key);
            return Ok(false);
        };

        let bytes = state.serializer.serialize(entry.value.as_ref()).map_err(|e| {
            let error = StorageError::EncodeFailure {
                key: key.to_string(),
                reason: e.to_string(),
            };
            warn!("{} in namespace {}", error, self.namespace);
            error
        })?;

        self.disk
            .write(&self.namespace, key, &bytes)
            .map_err(|source| {
                warn!("Disk write failed for {}:{}: {}", self.namespace, key, source);
                self.disk_error(key, source)
            })?;

        state.cache.mark_persisted(key);
        state.stats.saves += 1;

        debug!("SAVE: {}:{} ({} bytes)", self.namespace, key, bytes.len());
        Ok(true)
    }

    fn disk_error(&self, key: &str, source: std::io::Error) -> StorageError {
        StorageError::DiskIo {
            namespace: self.namespace.clone(),
            key: key.to_string(),
            source,
        }
    }

    fn notify_evicted(&self, evicted: EvictedValues<V>) {
        if evicted.is_empty() {
            return;
        }

        let delegate = self.delegate.read().as_ref().and_then(Weak::upgrade);
        let Some(delegate) = delegate else {
            return;
        };

        for entry in evicted {
            delegate.on_evicted(self, &entry.key, &entry.value);
        }
    }
}
