use parking_lot::RwLock;
use std::collections::HashMap;
use std::io;

use super::disk_store::DiskStore;

/// Disk store kept entirely in process memory
///
/// Useful for tests and for namespaces that only need the save/load contract within one
/// process lifetime.
#[derive(Debug, Default)]
pub struct MemoryDiskStore {
    namespaces: RwLock<HashMap<String, HashMap<String, Vec<u8>>>>,
}

impl MemoryDiskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of payloads stored in `namespace`
    pub fn len(&self, namespace: &str) -> usize {
        self.namespaces.read().get(namespace).map_or(0, HashMap::len)
    }
}

impl DiskStore for MemoryDiskStore {
    fn write(&self, namespace: &str, key: &str, bytes: &[u8]) -> io::Result<()> {
        self.namespaces
            .write()
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn read(&self, namespace: &str, key: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self
            .namespaces
            .read()
            .get(namespace)
            .and_then(|keys| keys.get(key))
            .cloned())
    }

    fn delete(&self, namespace: &str, key: &str) -> io::Result<()> {
        if let Some(keys) = self.namespaces.write().get_mut(namespace) {
            keys.remove(key);
        }
        Ok(())
    }

    fn delete_all(&self, namespace: &str) -> io::Result<()> {
        self.namespaces.write().remove(namespace);
        Ok(())
    }

    fn keys(&self, namespace: &str) -> io::Result<Vec<String>> {
        Ok(self
            .namespaces
            .read()
            .get(namespace)
            .map(|keys| keys.keys().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaces_are_isolated() {
        let store = MemoryDiskStore::new();

        store.write("a", "key", b"1").unwrap();
        store.write("b", "key", b"2").unwrap();
        store.delete_all("a").unwrap();

        assert_eq!(store.read("a", "key").unwrap(), None);
        assert_eq!(store.read("b", "key").unwrap(), Some(b"2".to_vec()));
        assert_eq!(store.len("a"), 0);
        assert_eq!(store.len("b"), 1);
    }
}
