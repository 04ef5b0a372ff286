//! # In-Memory Storage Engine
//!
//! A versioned, in-memory [`KvStore`] used as the default engine and in
//! tests. Every put and delete bumps the key's version; versions survive
//! deletion so watchers observe delete-and-rewrite cycles.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::provider::Result;
use crate::store::{KeyVersion, KvStore, Write};

/// In-memory storage engine.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    values: HashMap<(String, String), Vec<u8>>,
    versions: HashMap<(String, String), u64>,
}

impl Inner {
    fn bump(&mut self, namespace: &str, key: &str) {
        *self.versions.entry((namespace.to_string(), key.to_string())).or_insert(0) += 1;
    }
}

impl MemoryStore {
    /// Creates an empty engine.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let inner = self.inner.lock().expect("lock poisoned");
        Ok(inner.values.get(&(namespace.to_string(), key.to_string())).cloned())
    }

    fn put(&self, namespace: &str, key: &str, value: Vec<u8>) -> Result<()> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.values.insert((namespace.to_string(), key.to_string()), value);
        inner.bump(namespace, key);
        Ok(())
    }

    fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        if inner.values.remove(&(namespace.to_string(), key.to_string())).is_some() {
            inner.bump(namespace, key);
        }
        Ok(())
    }

    fn exists(&self, namespace: &str, key: &str) -> Result<bool> {
        let inner = self.inner.lock().expect("lock poisoned");
        Ok(inner.values.contains_key(&(namespace.to_string(), key.to_string())))
    }

    fn list(&self, namespace: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let inner = self.inner.lock().expect("lock poisoned");
        let mut entries: Vec<(String, Vec<u8>)> = inner
            .values
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|((_, key), value)| (key.clone(), value.clone()))
            .collect();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(entries)
    }

    fn version(&self, namespace: &str, key: &str) -> Result<u64> {
        let inner = self.inner.lock().expect("lock poisoned");
        Ok(inner.versions.get(&(namespace.to_string(), key.to_string())).copied().unwrap_or(0))
    }

    fn apply(&self, watched: &[KeyVersion], writes: Vec<Write>) -> Result<bool> {
        let mut inner = self.inner.lock().expect("lock poisoned");

        for watch in watched {
            let current = inner
                .versions
                .get(&(watch.key.namespace.clone(), watch.key.key.clone()))
                .copied()
                .unwrap_or(0);
            if current != watch.version {
                return Ok(false);
            }
        }

        for write in writes {
            match write.value {
                Some(bytes) => {
                    inner.values.insert((write.namespace.clone(), write.key.clone()), bytes);
                    inner.bump(&write.namespace, &write.key);
                }
                None => {
                    if inner.values.remove(&(write.namespace.clone(), write.key.clone())).is_some() {
                        inner.bump(&write.namespace, &write.key);
                    }
                }
            }
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::WatchKey;

    #[test]
    fn versions_survive_deletion() {
        let engine = MemoryStore::new();
        assert_eq!(engine.version("ns", "a").unwrap(), 0);

        engine.put("ns", "a", b"one".to_vec()).unwrap();
        assert_eq!(engine.version("ns", "a").unwrap(), 1);

        engine.delete("ns", "a").unwrap();
        assert_eq!(engine.version("ns", "a").unwrap(), 2);
        assert!(!engine.exists("ns", "a").unwrap());

        engine.put("ns", "a", b"two".to_vec()).unwrap();
        assert_eq!(engine.version("ns", "a").unwrap(), 3);
    }

    #[test]
    fn apply_detects_stale_watch() {
        let engine = MemoryStore::new();
        engine.put("ns", "a", b"one".to_vec()).unwrap();

        let stale = KeyVersion { key: WatchKey::new("ns", "a"), version: 0 };
        let write =
            Write { namespace: "ns".into(), key: "b".into(), value: Some(b"two".to_vec()) };
        assert!(!engine.apply(&[stale], vec![write.clone()]).unwrap());
        assert!(!engine.exists("ns", "b").unwrap());

        let fresh = KeyVersion { key: WatchKey::new("ns", "a"), version: 1 };
        assert!(engine.apply(&[fresh], vec![write]).unwrap());
        assert!(engine.exists("ns", "b").unwrap());
    }

    #[test]
    fn delete_of_absent_key_is_silent() {
        let engine = MemoryStore::new();
        engine.delete("ns", "missing").unwrap();
        assert_eq!(engine.version("ns", "missing").unwrap(), 0);
    }
}
