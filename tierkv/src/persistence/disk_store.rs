use std::io;

/// Durable byte store partitioned by namespace
///
/// `read` returns exactly the bytes last passed to `write`; any framing an implementation
/// keeps on disk is stripped before the payload is handed back.
/// Operations on one namespace must never observe or affect another namespace's keys.
pub trait DiskStore: Send + Sync {
    /// Write the full payload for `key`, replacing any previous payload
    fn write(&self, namespace: &str, key: &str, bytes: &[u8]) -> io::Result<()>;

    /// Read the payload for `key`, or `None` if nothing was ever written
    fn read(&self, namespace: &str, key: &str) -> io::Result<Option<Vec<u8>>>;

    /// Delete the payload for `key`; deleting a missing key is not an error
    fn delete(&self, namespace: &str, key: &str) -> io::Result<()>;

    /// Delete every payload in `namespace`
    fn delete_all(&self, namespace: &str) -> io::Result<()>;

    /// Keys with a payload in `namespace`, in no particular order
    fn keys(&self, namespace: &str) -> io::Result<Vec<String>>;
}
