use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use super::CacheKey;

const ENTRY_EXTENSION: &str = "json";

/// Storage of completed responses.
pub trait CacheStore: Send + Sync {
    /// Reads the fragments stored under `key`.
    ///
    /// Returns `Ok(None)` if there is no such entry.
    fn get(&self, key: &CacheKey) -> io::Result<Option<Vec<String>>>;

    /// Stores `fragments` under `key`, making room for it if needed.
    fn put(&self, key: &CacheKey, fragments: &[String]) -> io::Result<()>;
}

#[derive(Serialize, Deserialize)]
struct Entry {
    seq: u64,
    fragments: Vec<String>,
}

#[derive(Deserialize)]
struct EntryHeader {
    seq: u64,
}

/// A [`CacheStore`] keeping one JSON file per entry in a directory.
///
/// The store holds at most `max_entries` entries. Every entry records its
/// insertion sequence number, and the oldest ones are removed first when
/// the store is full.
#[derive(Debug)]
pub struct FileCacheStore {
    dir: PathBuf,
    max_entries: usize,
    lock: Mutex<()>,
}

impl FileCacheStore {
    /// Creates a store in `dir`. The directory is created on first write.
    pub fn new<P: Into<PathBuf>>(dir: P, max_entries: usize) -> Self {
        Self {
            dir: dir.into(),
            max_entries,
            lock: Mutex::new(()),
        }
    }

    /// Returns the directory of the store.
    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the number of stored entries.
    pub fn len(&self) -> io::Result<usize> {
        Ok(self.entry_paths()?.len())
    }

    /// Returns whether the store is empty.
    #[inline]
    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Removes every entry.
    pub fn clear(&self) -> io::Result<()> {
        let _guard = self.lock();
        for path in self.entry_paths()? {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{key}.{ENTRY_EXTENSION}"))
    }

    fn entry_paths(&self) -> io::Result<Vec<PathBuf>> {
        let dir = match fs::read_dir(&self.dir) {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(vec![]);
            }
            Err(err) => return Err(err),
        };
        let mut paths = vec![];
        for entry in dir {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION) {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    /// Lists entries with their sequence numbers, oldest first.
    ///
    /// Unreadable entries sort as the oldest.
    fn entries_by_age(&self) -> io::Result<Vec<(u64, PathBuf)>> {
        let mut entries = self
            .entry_paths()?
            .into_iter()
            .map(|path| {
                let seq = fs::read(&path)
                    .ok()
                    .and_then(|bytes| {
                        serde_json::from_slice::<EntryHeader>(&bytes).ok()
                    })
                    .map_or(0, |header| header.seq);
                (seq, path)
            })
            .collect::<Vec<_>>();
        entries.sort();
        Ok(entries)
    }
}

impl CacheStore for FileCacheStore {
    fn get(&self, key: &CacheKey) -> io::Result<Option<Vec<String>>> {
        let bytes = match fs::read(self.entry_path(key)) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        let entry: Entry =
            serde_json::from_slice(&bytes).map_err(io::Error::other)?;
        Ok(Some(entry.fragments))
    }

    fn put(&self, key: &CacheKey, fragments: &[String]) -> io::Result<()> {
        let _guard = self.lock();
        fs::create_dir_all(&self.dir)?;

        let mut entries = self.entries_by_age()?;
        let seq = entries.last().map_or(1, |(seq, _)| seq + 1);
        let entry = Entry {
            seq,
            fragments: fragments.to_vec(),
        };
        let bytes = serde_json::to_vec(&entry).map_err(io::Error::other)?;

        // Readers never see a partially written entry.
        let path = self.entry_path(key);
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, bytes)?;
        fs::rename(&tmp_path, &path)?;

        entries.retain(|(_, p)| *p != path);
        entries.push((seq, path));
        let excess = entries.len().saturating_sub(self.max_entries);
        for (_, path) in entries.drain(..excess) {
            trace!("evicting cache entry {}", path.display());
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::testing::request;

    fn key(prompt: &str) -> CacheKey {
        CacheKey::of(&request(prompt)).unwrap()
    }

    fn fragments(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|part| part.to_string()).collect()
    }

    #[test]
    fn test_put_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path().join("cache"), 10);
        assert_eq!(store.len().unwrap(), 0);
        assert_eq!(store.get(&key("a")).unwrap(), None);

        store.put(&key("a"), &fragments(&["Hel", "lo"])).unwrap();
        assert_eq!(
            store.get(&key("a")).unwrap(),
            Some(fragments(&["Hel", "lo"]))
        );
        assert_eq!(store.len().unwrap(), 1);

        store.clear().unwrap();
        assert!(store.is_empty().unwrap());
        assert_eq!(store.get(&key("a")).unwrap(), None);
    }

    #[test]
    fn test_eviction_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path(), 2);
        for prompt in ["a", "b", "c", "d"] {
            store.put(&key(prompt), &fragments(&[prompt])).unwrap();
        }
        assert_eq!(store.len().unwrap(), 2);
        assert_eq!(store.get(&key("a")).unwrap(), None);
        assert_eq!(store.get(&key("b")).unwrap(), None);
        assert_eq!(store.get(&key("c")).unwrap(), Some(fragments(&["c"])));
        assert_eq!(store.get(&key("d")).unwrap(), Some(fragments(&["d"])));
    }

    #[test]
    fn test_corrupt_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path(), 2);
        store.put(&key("a"), &fragments(&["a"])).unwrap();
        fs::write(store.entry_path(&key("b")), b"{ not json").unwrap();

        assert!(store.get(&key("b")).is_err());

        // The unreadable entry is the first to go.
        store.put(&key("c"), &fragments(&["c"])).unwrap();
        assert_eq!(store.len().unwrap(), 2);
        assert!(!store.entry_path(&key("b")).exists());
        assert_eq!(store.get(&key("a")).unwrap(), Some(fragments(&["a"])));

        // Rewriting a key replaces the entry and makes it the newest.
        store.put(&key("a"), &fragments(&["a2"])).unwrap();
        store.put(&key("d"), &fragments(&["d"])).unwrap();
        assert_eq!(store.get(&key("a")).unwrap(), Some(fragments(&["a2"])));
        assert_eq!(store.get(&key("c")).unwrap(), None);
    }

    #[test]
    fn test_concurrent_puts() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 6;
        const MAX_ENTRIES: usize = 4;

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileCacheStore::new(dir.path(), MAX_ENTRIES));
        let prompt = |t: usize, i: usize| format!("prompt {t}-{i}");

        thread::scope(|scope| {
            for t in 0..THREADS {
                let store = Arc::clone(&store);
                scope.spawn(move || {
                    for i in 0..PER_THREAD {
                        let prompt = prompt(t, i);
                        let parts = fragments(&[prompt.as_str(), " answered"]);
                        store.put(&key(&prompt), &parts).unwrap();
                        // Readers racing with eviction see a whole entry or
                        // none at all.
                        if let Some(read) = store.get(&key(&prompt)).unwrap() {
                            assert_eq!(read, parts);
                        }
                    }
                });
            }
        });

        assert_eq!(store.len().unwrap(), MAX_ENTRIES);
        let mut survivors = 0;
        for t in 0..THREADS {
            for i in 0..PER_THREAD {
                let prompt = prompt(t, i);
                if let Some(read) = store.get(&key(&prompt)).unwrap() {
                    assert_eq!(read, fragments(&[prompt.as_str(), " answered"]));
                    survivors += 1;
                }
            }
        }
        assert_eq!(survivors, MAX_ENTRIES);

        // Every insert got its own sequence number.
        let mut seqs = store
            .entries_by_age()
            .unwrap()
            .into_iter()
            .map(|(seq, _)| seq)
            .collect::<Vec<_>>();
        seqs.dedup();
        assert_eq!(seqs.len(), MAX_ENTRIES);
        assert!(seqs.iter().all(|seq| *seq > 0));
    }
}
