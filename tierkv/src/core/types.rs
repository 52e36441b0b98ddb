use serde::Serialize;

/// Namespace used when callers pass `None` or an empty name
pub const DEFAULT_NAMESPACE: &str = "default";

/// Capacity sentinel: the memory cache never evicts
pub const UNLIMITED_CAPACITY: u64 = u64::MAX;

/// Cost charged for entries stored without an explicit cost
pub const DEFAULT_COST: u64 = 1;

/// Resolve an optional namespace name to the name a controller is registered under
pub fn resolve_namespace(namespace: Option<&str>) -> &str {
    match namespace {
        Some(name) if !name.is_empty() => name,
        _ => DEFAULT_NAMESPACE,
    }
}

/// Statistics for one storage controller
#[derive(Debug, Default, Clone, Serialize)]
pub struct StorageStats {
    /// Reads served from memory
    pub memory_hits: u64,
    /// Reads that fell through to disk and found a decodable payload
    pub disk_hits: u64,
    /// Reads that found nothing (including undecodable payloads)
    pub misses: u64,
    /// Disk payloads the deserializer rejected
    pub decode_failures: u64,
    /// Payloads written to disk
    pub saves: u64,
    /// Entries removed by capacity pressure
    pub evictions: u64,
    /// Entries currently resident in memory
    pub resident_entries: usize,
    /// Sum of the cost of resident entries
    pub total_cost: u64,
}

impl StorageStats {
    /// Fraction of reads answered from either tier
    pub fn hit_rate(&self) -> f64 {
        let hits = self.memory_hits + self.disk_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}
