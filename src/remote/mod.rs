//! Object-store seam and remote configuration.
//!
//! The object-store SDK itself is an external collaborator; the engine
//! talks to it through the small synchronous [`ObjectStore`] trait.
//! [`InMemoryObjectStore`] is the in-process implementation used by
//! tests and embedders that want a local tier.

pub mod locks;
pub mod reader;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use thiserror::Error;

/// Errors surfaced by an object store implementation.
#[derive(Error, Debug)]
pub enum ObjectStoreError {
    /// The key does not exist. Non-retryable.
    #[error("object not found: {0}")]
    NotFound(String),

    /// Anything else: treated as transient and retried by callers.
    #[error("object store error: {0}")]
    Other(String),
}

pub type ObjectStoreResult<T> = Result<T, ObjectStoreError>;

/// Minimal synchronous object-store interface the engine depends on.
pub trait ObjectStore: Send + Sync {
    fn put_object(&self, key: &str, data: &[u8]) -> ObjectStoreResult<()>;
    fn get_object(&self, key: &str) -> ObjectStoreResult<Vec<u8>>;
    fn get_object_range(&self, key: &str, offset: u64, size: u64) -> ObjectStoreResult<Vec<u8>>;
    fn delete_object(&self, key: &str) -> ObjectStoreResult<()>;
    fn list_prefix(&self, prefix: &str) -> ObjectStoreResult<Vec<String>>;
}

/// Remote-tier configuration. The endpoint and credential fields
/// parameterize whichever [`ObjectStore`] the embedder provides; the
/// engine itself only consumes the retry and timeout knobs.
#[derive(Clone, Debug)]
pub struct RemoteConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub virtual_addressing: bool,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub max_connections: usize,

    /// Retries for transient failures before surfacing `RemoteFailure`.
    pub max_retries: usize,

    /// Base backoff between retries; doubled per attempt plus jitter.
    pub retry_backoff: Duration,

    /// How long store_id-requiring calls wait for `init_store_info`.
    pub lock_wait_timeout: Duration,

    /// Key root prepended to every remote key: either empty or a string
    /// ending in `/`. The literal root `/` is normalized to empty.
    pub root: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            bucket: String::new(),
            access_key: None,
            secret_key: None,
            virtual_addressing: false,
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            max_connections: 16,
            max_retries: 3,
            retry_backoff: Duration::from_millis(100),
            lock_wait_timeout: Duration::from_secs(10),
            root: String::new(),
        }
    }
}

/// Joins the configured root with a remote key. The root is canonically
/// either empty or a non-empty string ending in `/`; the literal `/` is
/// treated as empty so keys never start with a duplicate slash.
pub(crate) fn join_key(root: &str, key: &str) -> String {
    if root.is_empty() || root == "/" {
        return key.to_string();
    }
    if root.ends_with('/') {
        format!("{}{}", root, key)
    } else {
        format!("{}/{}", root, key)
    }
}

/// In-memory object store, used by tests and local-tier embedders.
/// Supports injecting transient get failures to exercise retry paths.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
    fail_gets: AtomicUsize,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` get calls fail with a transient error.
    pub fn inject_get_failures(&self, count: usize) {
        self.fail_gets.store(count, Ordering::SeqCst);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    fn check_injected_failure(&self) -> ObjectStoreResult<()> {
        let mut current = self.fail_gets.load(Ordering::SeqCst);
        while current > 0 {
            match self.fail_gets.compare_exchange(
                current,
                current - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Err(ObjectStoreError::Other("injected failure".to_string())),
                Err(actual) => current = actual,
            }
        }
        Ok(())
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn put_object(&self, key: &str, data: &[u8]) -> ObjectStoreResult<()> {
        self.objects.write().insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn get_object(&self, key: &str) -> ObjectStoreResult<Vec<u8>> {
        self.check_injected_failure()?;
        self.objects
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))
    }

    fn get_object_range(&self, key: &str, offset: u64, size: u64) -> ObjectStoreResult<Vec<u8>> {
        self.check_injected_failure()?;
        let objects = self.objects.read();
        let data = objects
            .get(key)
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))?;
        let start = offset as usize;
        let end = start + size as usize;
        data.get(start..end)
            .map(|slice| slice.to_vec())
            .ok_or_else(|| {
                ObjectStoreError::Other(format!(
                    "range {}..{} out of bounds for {} ({} bytes)",
                    start,
                    end,
                    key,
                    data.len()
                ))
            })
    }

    fn delete_object(&self, key: &str) -> ObjectStoreResult<()> {
        self.objects.write().remove(key);
        Ok(())
    }

    fn list_prefix(&self, prefix: &str) -> ObjectStoreResult<Vec<String>> {
        Ok(self
            .objects
            .read()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}
