use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tracing::debug;

use crate::cache::{CacheStore, Result};

/// Cache store laid out as `<root>/<account>/<key>.cache`
///
/// The file modification time is the age oracle. Writes go to a temporary
/// file in the same directory which is then renamed over the target.
pub struct FileCacheStore {
    root: PathBuf,
}

impl FileCacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn account_dir(&self, account: &str) -> PathBuf {
        self.root.join(encode_component(account))
    }

    fn entry_path(&self, account: &str, key: &str) -> PathBuf {
        self.account_dir(account)
            .join(format!("{}.cache", encode_component(key)))
    }
}

/// Percent-encode a path component so distinct ids never share a file
///
/// Everything outside `[A-Za-z0-9-_.~]` is escaped, so `/` and `@` cannot
/// escape the cache root. A leading dot is escaped as well, which rules out
/// `.` and `..`.
fn encode_component(component: &str) -> String {
    if component.is_empty() {
        // A lone `%` is never produced by the encoder
        return "%".to_string();
    }
    let encoded = urlencoding::encode(component);
    match encoded.strip_prefix('.') {
        Some(rest) => format!("%2E{}", rest),
        None => encoded.into_owned(),
    }
}

impl CacheStore for FileCacheStore {
    fn read(&self, account: &str, key: &str) -> Result<Option<Vec<u8>>> {
        match std::fs::read(self.entry_path(account, key)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, account: &str, key: &str, data: &[u8]) -> Result<()> {
        let dir = self.account_dir(account);
        std::fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;

        let target = self.entry_path(account, key);
        tmp.persist(&target).map_err(|e| e.error)?;
        debug!("Wrote {} bytes to {}", data.len(), target.display());
        Ok(())
    }

    fn age(&self, account: &str, key: &str) -> Result<Option<Duration>> {
        let metadata = match std::fs::metadata(self.entry_path(account, key)) {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let modified = metadata.modified()?;
        // A modification time in the future counts as brand new
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        Ok(Some(age))
    }

    fn remove(&self, account: &str, key: &str) -> Result<()> {
        match std::fs::remove_file(self.entry_path(account, key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_encode_component() {
        assert_eq!(
            encode_component("1000096@review.example.org"),
            "1000096%40review.example.org"
        );
        assert_eq!(encode_component("../../etc"), "%2E.%2F..%2Fetc");
        assert_eq!(encode_component(".."), "%2E.");
        assert_eq!(encode_component("plain-key_1"), "plain-key_1");
        assert_eq!(encode_component(""), "%");
    }

    #[test]
    fn test_similar_accounts_get_separate_entries() {
        let dir = TempDir::new().unwrap();
        let store = FileCacheStore::new(dir.path());

        store.write("a@b", "trending", b"at").unwrap();
        store.write("a/b", "trending", b"slash").unwrap();
        store.write("a_b", "trending", b"underscore").unwrap();

        assert_eq!(store.read("a@b", "trending").unwrap().unwrap(), b"at");
        assert_eq!(store.read("a/b", "trending").unwrap().unwrap(), b"slash");
        assert_eq!(store.read("a_b", "trending").unwrap().unwrap(), b"underscore");
    }

    #[test]
    fn test_missing_entry() {
        let dir = TempDir::new().unwrap();
        let store = FileCacheStore::new(dir.path());

        assert!(store.read("alice", "trending").unwrap().is_none());
        assert!(store.age("alice", "trending").unwrap().is_none());
    }

    #[test]
    fn test_write_read_overwrite() {
        let dir = TempDir::new().unwrap();
        let store = FileCacheStore::new(dir.path());

        store.write("alice", "trending", b"first").unwrap();
        store.write("alice", "trending", b"second").unwrap();

        assert_eq!(store.read("alice", "trending").unwrap().unwrap(), b"second");
        let age = store.age("alice", "trending").unwrap().unwrap();
        assert!(age < Duration::from_secs(60));

        // Only the entry itself is left behind, no stray temp files
        let files: Vec<_> = std::fs::read_dir(dir.path().join("alice"))
            .unwrap()
            .collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_remove() {
        let dir = TempDir::new().unwrap();
        let store = FileCacheStore::new(dir.path());

        store.write("alice", "trending", b"data").unwrap();
        store.remove("alice", "trending").unwrap();
        assert!(store.read("alice", "trending").unwrap().is_none());
        assert!(store.remove("alice", "trending").is_ok());
    }

    #[test]
    fn test_accounts_do_not_share_entries() {
        let dir = TempDir::new().unwrap();
        let store = FileCacheStore::new(dir.path());

        store.write("alice", "trending", b"a").unwrap();
        assert!(store.read("bob", "trending").unwrap().is_none());
    }
}
