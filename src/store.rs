//! # Storage
//!
//! A namespaced key-value storage abstraction with watch-based optimistic
//! concurrency. The engine behind [`KvStore`] is pluggable; the crate
//! ships an in-memory engine in [`memory`].
//!
//! [`Store::execute`] is the only concurrency primitive the credential
//! engine relies on: it snapshots the versions of a set of watch keys,
//! runs a transaction body against a buffered write set, and commits only
//! if no watched key moved in the meantime, retrying the body from
//! scratch otherwise. Two concurrent operations whose watch sets
//! intersect therefore serialize; disjoint operations interleave freely.

pub mod memory;

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Error;
use crate::{provider, Result};

/// Maximum number of times [`Store::execute`] runs its transaction body
/// before giving up with [`Error::Conflict`].
pub const MAX_EXECUTE_ATTEMPTS: usize = 10;

/// A storage key whose version is observed for conflict detection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchKey {
    /// Key namespace.
    pub namespace: String,

    /// Key within the namespace.
    pub key: String,
}

impl WatchKey {
    /// Creates a watch key.
    pub fn new(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), key: key.into() }
    }
}

/// A buffered write. A `None` value deletes the key.
#[derive(Clone, Debug)]
pub struct Write {
    /// Key namespace.
    pub namespace: String,

    /// Key within the namespace.
    pub key: String,

    /// New value, or `None` to delete.
    pub value: Option<Vec<u8>>,
}

/// The version of a watched key at transaction start.
#[derive(Clone, Debug)]
pub struct KeyVersion {
    /// The watched key.
    pub key: WatchKey,

    /// Observed version. Absent keys have version 0.
    pub version: u64,
}

/// Object-safe interface to the underlying storage engine.
///
/// Engines must bump a key's version on every put and delete, and keep
/// version history across deletion so a delete-and-rewrite is visible to
/// watchers.
pub trait KvStore: Send + Sync {
    /// Reads a key. `None` if absent.
    fn get(&self, namespace: &str, key: &str) -> provider::Result<Option<Vec<u8>>>;

    /// Writes a key.
    fn put(&self, namespace: &str, key: &str, value: Vec<u8>) -> provider::Result<()>;

    /// Deletes a key. Deleting an absent key is not an error.
    fn delete(&self, namespace: &str, key: &str) -> provider::Result<()>;

    /// Returns `true` if the key exists.
    fn exists(&self, namespace: &str, key: &str) -> provider::Result<bool>;

    /// All entries in a namespace, ordered by key.
    fn list(&self, namespace: &str) -> provider::Result<Vec<(String, Vec<u8>)>>;

    /// Current version of a key. Absent keys report version 0.
    fn version(&self, namespace: &str, key: &str) -> provider::Result<u64>;

    /// Atomically re-checks the watched versions and applies the writes.
    /// Returns `false` without applying anything when a watched key has
    /// moved since the snapshot.
    fn apply(&self, watched: &[KeyVersion], writes: Vec<Write>) -> provider::Result<bool>;
}

/// Handle to the storage engine used by the credential service.
#[derive(Clone)]
pub struct Store {
    engine: Arc<dyn KvStore>,
}

impl Store {
    /// Creates a store backed by the given engine.
    pub fn new(engine: Arc<dyn KvStore>) -> Self {
        Self { engine }
    }

    /// Reads and deserializes a record.
    pub fn get_json<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> Result<Option<T>> {
        let Some(bytes) =
            self.engine.get(namespace, key).map_err(|e| Error::storage(read_ctx(namespace, key), e))?
        else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| Error::storage(format!("decoding {namespace}/{key}"), e))
    }

    /// Serializes and writes a record.
    pub fn put_json<T: Serialize>(&self, namespace: &str, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| Error::storage(format!("encoding {namespace}/{key}"), e))?;
        self.engine.put(namespace, key, bytes).map_err(|e| Error::storage(write_ctx(namespace, key), e))
    }

    /// Deletes a record. Deleting an absent record is not an error.
    pub fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        self.engine
            .delete(namespace, key)
            .map_err(|e| Error::storage(format!("deleting {namespace}/{key}"), e))
    }

    /// Returns `true` if the record exists.
    pub fn exists(&self, namespace: &str, key: &str) -> Result<bool> {
        self.engine.exists(namespace, key).map_err(|e| Error::storage(read_ctx(namespace, key), e))
    }

    /// Reads and deserializes every record in a namespace.
    pub fn list_json<T: DeserializeOwned>(&self, namespace: &str) -> Result<Vec<(String, T)>> {
        let entries =
            self.engine.list(namespace).map_err(|e| Error::storage(format!("listing {namespace}"), e))?;
        entries
            .into_iter()
            .map(|(key, bytes)| {
                serde_json::from_slice(&bytes)
                    .map(|value| (key, value))
                    .map_err(|e| Error::storage(format!("decoding {namespace}"), e))
            })
            .collect()
    }

    /// Runs `f` under optimistic concurrency.
    ///
    /// The versions of all `watch_keys` are recorded before each attempt;
    /// `f` reads and writes through the supplied [`Tx`], whose writes are
    /// buffered. On commit, if any watched key changed since the
    /// snapshot, the pending writes are discarded and `f` runs again from
    /// scratch, up to [`MAX_EXECUTE_ATTEMPTS`] times. Errors returned by
    /// `f` abort immediately without retry.
    pub async fn execute<T, F, Fut>(&self, watch_keys: &[WatchKey], mut f: F) -> Result<T>
    where
        F: FnMut(Tx) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        for attempt in 1..=MAX_EXECUTE_ATTEMPTS {
            let mut watched = Vec::with_capacity(watch_keys.len());
            for key in watch_keys {
                let version = self
                    .engine
                    .version(&key.namespace, &key.key)
                    .map_err(|e| Error::storage(read_ctx(&key.namespace, &key.key), e))?;
                watched.push(KeyVersion { key: key.clone(), version });
            }

            let tx = Tx::new(self.clone());
            let value = f(tx.clone()).await?;

            let committed = self
                .engine
                .apply(&watched, tx.take_writes())
                .map_err(|e| Error::storage("committing transaction", e))?;
            if committed {
                return Ok(value);
            }
            tracing::debug!("watched key changed, retrying transaction (attempt {attempt})");
        }

        Err(Error::Conflict(format!(
            "transaction aborted after {MAX_EXECUTE_ATTEMPTS} attempts: watched keys kept changing"
        )))
    }
}

fn read_ctx(namespace: &str, key: &str) -> String {
    format!("reading {namespace}/{key}")
}

fn write_ctx(namespace: &str, key: &str) -> String {
    format!("writing {namespace}/{key}")
}

/// A transaction handle: the same read surface as [`Store`], scoped to a
/// pending write set. Reads observe pending writes; nothing reaches the
/// engine until [`Store::execute`] commits.
#[derive(Clone)]
pub struct Tx {
    store: Store,
    writes: Arc<Mutex<BTreeMap<(String, String), Option<Vec<u8>>>>>,
}

impl Tx {
    fn new(store: Store) -> Self {
        Self { store, writes: Arc::new(Mutex::new(BTreeMap::new())) }
    }

    /// Reads and deserializes a record, observing pending writes.
    pub fn get_json<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> Result<Option<T>> {
        let pending =
            self.writes.lock().expect("lock poisoned").get(&entry_key(namespace, key)).cloned();
        match pending {
            Some(Some(bytes)) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| Error::storage(format!("decoding {namespace}/{key}"), e)),
            Some(None) => Ok(None),
            None => self.store.get_json(namespace, key),
        }
    }

    /// Serializes a record into the pending write set.
    pub fn put_json<T: Serialize>(&self, namespace: &str, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| Error::storage(format!("encoding {namespace}/{key}"), e))?;
        self.writes.lock().expect("lock poisoned").insert(entry_key(namespace, key), Some(bytes));
        Ok(())
    }

    /// Marks a record for deletion.
    pub fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        self.writes.lock().expect("lock poisoned").insert(entry_key(namespace, key), None);
        Ok(())
    }

    /// Returns `true` if the record exists, observing pending writes.
    pub fn exists(&self, namespace: &str, key: &str) -> Result<bool> {
        let pending =
            self.writes.lock().expect("lock poisoned").get(&entry_key(namespace, key)).cloned();
        match pending {
            Some(value) => Ok(value.is_some()),
            None => self.store.exists(namespace, key),
        }
    }

    /// Reads and deserializes every record in a namespace, with pending
    /// writes overlaid on the committed entries.
    pub fn list_json<T: DeserializeOwned>(&self, namespace: &str) -> Result<Vec<(String, T)>> {
        let mut merged: BTreeMap<String, Vec<u8>> = self
            .store
            .engine
            .list(namespace)
            .map_err(|e| Error::storage(format!("listing {namespace}"), e))?
            .into_iter()
            .collect();

        for ((ns, key), value) in self.writes.lock().expect("lock poisoned").iter() {
            if ns != namespace {
                continue;
            }
            match value {
                Some(bytes) => {
                    merged.insert(key.clone(), bytes.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }

        merged
            .into_iter()
            .map(|(key, bytes)| {
                serde_json::from_slice(&bytes)
                    .map(|value| (key, value))
                    .map_err(|e| Error::storage(format!("decoding {namespace}"), e))
            })
            .collect()
    }

    fn take_writes(&self) -> Vec<Write> {
        std::mem::take(&mut *self.writes.lock().expect("lock poisoned"))
            .into_iter()
            .map(|((namespace, key), value)| Write { namespace, key, value })
            .collect()
    }
}

fn entry_key(namespace: &str, key: &str) -> (String, String) {
    (namespace.to_string(), key.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::memory::MemoryStore;
    use super::*;

    fn store() -> Store {
        Store::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn execute_commits_buffered_writes() {
        let store = store();
        let watch = [WatchKey::new("ns", "a")];

        store
            .execute(&watch, |tx| async move {
                tx.put_json("ns", "a", &1u64)?;
                // reads observe the pending write
                assert_eq!(tx.get_json::<u64>("ns", "a")?, Some(1));
                Ok(())
            })
            .await
            .expect("should commit");

        assert_eq!(store.get_json::<u64>("ns", "a").expect("should read"), Some(1));
    }

    #[tokio::test]
    async fn execute_retries_on_watch_conflict() {
        let store = store();
        let watch = [WatchKey::new("ns", "counter")];
        store.put_json("ns", "counter", &0u64).expect("should write");

        let interloper = store.clone();
        let mut raced = false;

        let value = store
            .execute(&watch, |tx| {
                // move a fresh copy of the flag into each attempt
                let fire = !raced;
                raced = true;
                let interloper = interloper.clone();
                async move {
                    let current: u64 = tx.get_json("ns", "counter")?.unwrap_or_default();
                    if fire {
                        // interleaved commit moves the watched key
                        interloper.put_json("ns", "counter", &(current + 10))?;
                    }
                    tx.put_json("ns", "counter", &(current + 1))?;
                    Ok(current + 1)
                }
            })
            .await
            .expect("should commit on retry");

        // first attempt read 0 and lost; second read 10 and won
        assert_eq!(value, 11);
        assert_eq!(store.get_json::<u64>("ns", "counter").expect("should read"), Some(11));
    }

    #[tokio::test]
    async fn execute_exhausts_retry_budget() {
        let store = store();
        let watch = [WatchKey::new("ns", "hot")];
        let interloper = store.clone();

        let result: Result<()> = store
            .execute(&watch, |tx| {
                let interloper = interloper.clone();
                async move {
                    // every attempt loses to a concurrent commit
                    interloper.put_json("ns", "hot", &uuid::Uuid::new_v4().to_string())?;
                    tx.put_json("ns", "mine", &true)?;
                    Ok(())
                }
            })
            .await;

        assert!(matches!(result, Err(Error::Conflict(_))));
        // aborted writes never reached the engine
        assert!(!store.exists("ns", "mine").expect("should read"));
    }

    #[tokio::test]
    async fn domain_errors_abort_without_retry() {
        let store = store();
        let result: Result<()> = store
            .execute(&[], |tx| async move {
                tx.put_json("ns", "junk", &1u64)?;
                Err(Error::InvalidRequest("bad".into()))
            })
            .await;

        assert!(matches!(result, Err(Error::InvalidRequest(_))));
        assert!(!store.exists("ns", "junk").expect("should read"));
    }
}
