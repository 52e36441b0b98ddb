//! File-backed disk store
//!
//! Layout: `<root>/n<hex(namespace)>/k<hex(key)>.bin`, one file per key. Names are hex encoded
//! so arbitrary keys map to portable file names and cannot escape the namespace directory.
//! Writes go to a temporary file that is synced and then renamed over the target.
//!
//! Names too long for a hex file name use a SHA-256 digest instead: `m<sha256(namespace)>`
//! for the directory and `h<sha256(key)>.bin` for the file. A digest-named file starts with
//! a header holding the original key (`u32` little-endian length, then the key bytes), so
//! `keys` can still list it and `read` can confirm the file belongs to the requested key.

use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::disk_store::DiskStore;

const PAYLOAD_EXTENSION: &str = "bin";
const TEMP_EXTENSION: &str = "tmp";
const NAMESPACE_PREFIX: &str = "n";
const KEY_PREFIX: &str = "k";
const HASHED_NAMESPACE_PREFIX: &str = "m";
const HASHED_KEY_PREFIX: &str = "h";

/// Longest name, in bytes, stored under its hex encoding (200 hex chars plus affixes)
const MAX_PLAIN_NAME_LEN: usize = 100;

const KEY_HEADER_LEN: usize = 4;

/// Where a key's payload lives
struct PayloadPath {
    path: PathBuf,
    /// Digest-named file carrying a key header
    hashed: bool,
}

/// Disk store rooted at a directory
#[derive(Debug, Clone)]
pub struct FileDiskStore {
    root: PathBuf,
}

impl FileDiskStore {
    /// Create or open a store at `root`
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        info!("Opened file disk store at {:?}", root);

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn namespace_dir(&self, namespace: &str) -> PathBuf {
        let name = if namespace.len() > MAX_PLAIN_NAME_LEN {
            format!("{}{}", HASHED_NAMESPACE_PREFIX, digest(namespace))
        } else {
            format!("{}{}", NAMESPACE_PREFIX, hex::encode(namespace))
        };
        self.root.join(name)
    }

    fn payload_path(&self, namespace: &str, key: &str) -> PayloadPath {
        let hashed = key.len() > MAX_PLAIN_NAME_LEN;
        let stem = if hashed {
            format!("{}{}", HASHED_KEY_PREFIX, digest(key))
        } else {
            format!("{}{}", KEY_PREFIX, hex::encode(key))
        };

        PayloadPath {
            path: self
                .namespace_dir(namespace)
                .join(format!("{}.{}", stem, PAYLOAD_EXTENSION)),
            hashed,
        }
    }
}

fn digest(name: &str) -> String {
    hex::encode(Sha256::digest(name.as_bytes()))
}

fn key_header(key: &str) -> io::Result<Vec<u8>> {
    let len = u32::try_from(key.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "key too long"))?;

    let mut header = Vec::with_capacity(KEY_HEADER_LEN + key.len());
    header.extend_from_slice(&len.to_le_bytes());
    header.extend_from_slice(key.as_bytes());
    Ok(header)
}

fn truncated_header() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, "truncated key header")
}

/// Split a digest-named file into its recorded key and payload
fn split_key_header(mut bytes: Vec<u8>) -> io::Result<(Vec<u8>, Vec<u8>)> {
    let len: [u8; KEY_HEADER_LEN] = bytes
        .get(..KEY_HEADER_LEN)
        .and_then(|raw| raw.try_into().ok())
        .ok_or_else(truncated_header)?;
    let header_len = KEY_HEADER_LEN + u32::from_le_bytes(len) as usize;

    if bytes.len() < header_len {
        return Err(truncated_header());
    }

    let payload = bytes.split_off(header_len);
    bytes.drain(..KEY_HEADER_LEN);
    Ok((bytes, payload))
}

/// Read only the key header of a digest-named file
fn read_recorded_key(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;

    let mut len = [0u8; KEY_HEADER_LEN];
    file.read_exact(&mut len)?;

    let mut key = vec![0u8; u32::from_le_bytes(len) as usize];
    file.read_exact(&mut key)?;

    String::from_utf8(key).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn ignore_not_found(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

impl DiskStore for FileDiskStore {
    fn write(&self, namespace: &str, key: &str, bytes: &[u8]) -> io::Result<()> {
        let PayloadPath { path, hashed } = self.payload_path(namespace, key);
        let temp_path = path.with_extension(TEMP_EXTENSION);

        fs::create_dir_all(self.namespace_dir(namespace))?;

        let mut file = File::create(&temp_path)?;
        if hashed {
            file.write_all(&key_header(key)?)?;
        }
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &path)?;

        debug!("Disk WRITE: {}:{} ({} bytes)", namespace, key, bytes.len());
        Ok(())
    }

    fn read(&self, namespace: &str, key: &str) -> io::Result<Option<Vec<u8>>> {
        let PayloadPath { path, hashed } = self.payload_path(namespace, key);

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let payload = if hashed {
            let (recorded, payload) = split_key_header(bytes)?;
            if recorded != key.as_bytes() {
                warn!("Digest collision in disk store at {:?}; treating {} as absent", path, key);
                return Ok(None);
            }
            payload
        } else {
            bytes
        };

        debug!("Disk READ: {}:{} ({} bytes)", namespace, key, payload.len());
        Ok(Some(payload))
    }

    fn delete(&self, namespace: &str, key: &str) -> io::Result<()> {
        ignore_not_found(fs::remove_file(self.payload_path(namespace, key).path))?;
        debug!("Disk DELETE: {}:{}", namespace, key);
        Ok(())
    }

    fn delete_all(&self, namespace: &str) -> io::Result<()> {
        ignore_not_found(fs::remove_dir_all(self.namespace_dir(namespace)))?;
        info!("Disk DELETE ALL in namespace {}", namespace);
        Ok(())
    }

    fn keys(&self, namespace: &str) -> io::Result<Vec<String>> {
        let entries = match fs::read_dir(self.namespace_dir(namespace)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(PAYLOAD_EXTENSION) {
                continue;
            }

            let stem = path.file_stem().and_then(|stem| stem.to_str());
            let decoded = match stem {
                Some(stem) if stem.starts_with(HASHED_KEY_PREFIX) => read_recorded_key(&path).ok(),
                Some(stem) => stem
                    .strip_prefix(KEY_PREFIX)
                    .and_then(|hex_name| hex::decode(hex_name).ok())
                    .and_then(|raw| String::from_utf8(raw).ok()),
                None => None,
            };

            match decoded {
                Some(key) => keys.push(key),
                None => warn!("Skipping unrecognised file in disk store: {:?}", path),
            }
        }

        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_store_basic() {
        let dir = tempdir().unwrap();
        let store = FileDiskStore::open(dir.path()).unwrap();

        store.write("ns", "key1", b"value1").unwrap();
        store.write("ns", "key2", b"value2").unwrap();

        assert_eq!(store.read("ns", "key1").unwrap(), Some(b"value1".to_vec()));
        assert_eq!(store.read("ns", "key2").unwrap(), Some(b"value2".to_vec()));
        assert_eq!(store.read("ns", "missing").unwrap(), None);
        assert_eq!(store.read("other", "key1").unwrap(), None);
    }

    #[test]
    fn test_overwrite_replaces_whole_payload() {
        let dir = tempdir().unwrap();
        let store = FileDiskStore::open(dir.path()).unwrap();

        store.write("ns", "key", b"a much longer first payload").unwrap();
        store.write("ns", "key", b"short").unwrap();

        assert_eq!(store.read("ns", "key").unwrap(), Some(b"short".to_vec()));
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempdir().unwrap();
        let store = FileDiskStore::open(dir.path()).unwrap();

        store.write("ns", "key", b"payload").unwrap();

        let names: Vec<_> = fs::read_dir(store.namespace_dir("ns"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![format!("k{}.bin", hex::encode("key"))]);
    }

    #[test]
    fn test_keys_with_path_characters() {
        let dir = tempdir().unwrap();
        let store = FileDiskStore::open(dir.path()).unwrap();

        store.write("ns", "../escape", b"1").unwrap();
        store.write("ns", "a/b/c", b"2").unwrap();
        store.write("ns", "", b"3").unwrap();

        let mut keys = store.keys("ns").unwrap();
        keys.sort();
        assert_eq!(keys, vec!["", "../escape", "a/b/c"]);
    }

    #[test]
    fn test_long_keys_use_digest_names() {
        let dir = tempdir().unwrap();
        let store = FileDiskStore::open(dir.path()).unwrap();

        let url = format!("https://example.com/assets/{}", "a".repeat(200));
        let other = format!("https://example.com/assets/{}", "b".repeat(200));

        store.write("ns", &url, b"first").unwrap();
        store.write("ns", &other, b"second").unwrap();
        store.write("ns", &url, b"third").unwrap();
        store.write("ns", "short", b"plain").unwrap();

        assert_eq!(store.read("ns", &url).unwrap(), Some(b"third".to_vec()));
        assert_eq!(store.read("ns", &other).unwrap(), Some(b"second".to_vec()));

        let mut keys = store.keys("ns").unwrap();
        keys.sort();
        assert_eq!(keys, vec![url.clone(), other.clone(), "short".to_string()]);

        let path = store.payload_path("ns", &url);
        assert!(path.hashed);
        assert!(path.path.file_name().unwrap().len() < 80);

        store.delete("ns", &url).unwrap();
        assert_eq!(store.read("ns", &url).unwrap(), None);
        assert_eq!(store.keys("ns").unwrap().len(), 2);
    }

    #[test]
    fn test_long_namespace_is_isolated() {
        let dir = tempdir().unwrap();
        let store = FileDiskStore::open(dir.path()).unwrap();

        let long_a = "a".repeat(300);
        let long_b = "b".repeat(300);

        store.write(&long_a, "key", b"1").unwrap();
        store.write(&long_b, "key", b"2").unwrap();
        store.delete_all(&long_a).unwrap();

        assert_eq!(store.read(&long_a, "key").unwrap(), None);
        assert_eq!(store.read(&long_b, "key").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_truncated_key_header_is_invalid_data() {
        let dir = tempdir().unwrap();
        let store = FileDiskStore::open(dir.path()).unwrap();

        let key = "k".repeat(150);
        store.write("ns", &key, b"payload").unwrap();
        fs::write(store.payload_path("ns", &key).path, [200u8, 0]).unwrap();

        let err = store.read("ns", &key).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_empty_namespace_stays_inside_root() {
        let dir = tempdir().unwrap();
        let store = FileDiskStore::open(dir.path()).unwrap();

        store.write("", "key", b"1").unwrap();
        store.write("ns", "key", b"2").unwrap();
        store.delete_all("").unwrap();

        assert!(dir.path().exists());
        assert_eq!(store.read("ns", "key").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_delete_and_delete_all() {
        let dir = tempdir().unwrap();
        let store = FileDiskStore::open(dir.path()).unwrap();

        store.write("a", "k1", b"1").unwrap();
        store.write("a", "k2", b"2").unwrap();
        store.write("b", "k1", b"3").unwrap();

        store.delete("a", "k1").unwrap();
        store.delete("a", "never-written").unwrap();
        assert_eq!(store.read("a", "k1").unwrap(), None);

        store.delete_all("a").unwrap();
        store.delete_all("never-used").unwrap();
        assert!(store.keys("a").unwrap().is_empty());
        assert_eq!(store.read("b", "k1").unwrap(), Some(b"3".to_vec()));
    }

    #[test]
    fn test_reopen_sees_existing_data() {
        let dir = tempdir().unwrap();

        {
            let store = FileDiskStore::open(dir.path()).unwrap();
            store.write("ns", "key", b"durable").unwrap();
        }

        let store = FileDiskStore::open(dir.path()).unwrap();
        assert_eq!(store.read("ns", "key").unwrap(), Some(b"durable".to_vec()));
    }
}
