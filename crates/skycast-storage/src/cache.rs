//! Persistent JSON cache with optional per-entry expiry.
//!
//! Values are kept in memory and mirrored to a [`StorageBackend`]. Backend
//! failures never reach the caller: the in-memory value is authoritative for
//! the lifetime of the handle and the failure is logged.
//!
//! Several handles can share one [`Storage`]. A write through one handle is
//! broadcast to the others, which apply it on their next access (last write
//! wins).

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use skycast_core::StorageError;
use tokio::sync::broadcast;

use crate::backend::{FileBackend, MemoryBackend, StorageBackend};
use crate::clock::{Clock, SystemClock};

const EVENT_CAPACITY: usize = 256;

/// A change made through one cache handle.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageEvent {
    pub key: String,
    /// New raw payload, `None` when the key was removed
    pub value: Option<Value>,
    /// Handle that made the change
    pub origin: u64,
}

/// Stored form of an entry written with a ttl.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    value: Value,
    /// Unix timestamp in milliseconds
    expiry: i64,
}

impl Envelope {
    /// Recognize an envelope. Anything else is a bare value.
    fn from_payload(payload: &Value) -> Option<Envelope> {
        let obj = payload.as_object()?;
        if obj.len() != 2 || !obj.contains_key("value") {
            return None;
        }
        let expiry = obj.get("expiry")?.as_i64()?;
        Some(Envelope {
            value: obj.get("value")?.clone(),
            expiry,
        })
    }
}

/// A backing store plus the change channel shared by every handle on it.
#[derive(Clone)]
pub struct Storage {
    backend: Arc<dyn StorageBackend>,
    events: broadcast::Sender<StorageEvent>,
    next_handle: Arc<AtomicU64>,
}

impl Storage {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            backend,
            events,
            next_handle: Arc::new(AtomicU64::new(1)),
        }
    }

    /// File-backed storage rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>, quota_bytes: Option<usize>) -> Result<Self, StorageError> {
        Ok(Self::new(Arc::new(FileBackend::open(dir, quota_bytes)?)))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// A new cache handle using the system clock.
    pub fn cache(&self) -> PersistentCache {
        self.cache_with_clock(Arc::new(SystemClock))
    }

    pub fn cache_with_clock(&self, clock: Arc<dyn Clock>) -> PersistentCache {
        PersistentCache {
            id: self.next_handle.fetch_add(1, Ordering::Relaxed),
            backend: self.backend.clone(),
            events_tx: self.events.clone(),
            events_rx: Mutex::new(self.events.subscribe()),
            clock,
            memory: Mutex::new(HashMap::new()),
        }
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("receivers", &self.events.receiver_count())
            .finish()
    }
}

/// Key-value cache handle. See the module docs for the consistency model.
pub struct PersistentCache {
    id: u64,
    backend: Arc<dyn StorageBackend>,
    events_tx: broadcast::Sender<StorageEvent>,
    events_rx: Mutex<broadcast::Receiver<StorageEvent>>,
    clock: Arc<dyn Clock>,
    /// Raw payloads as stored (bare values or envelopes)
    memory: Mutex<HashMap<String, Value>>,
}

impl PersistentCache {
    /// Identifier carried by events this handle emits.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Read a value. Expired entries are purged and read as absent; values
    /// that no longer decode as `T` read as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let payload = self.load_payload(key)?;

        let value = match Envelope::from_payload(&payload) {
            Some(envelope) => {
                let now = self.clock.now().timestamp_millis();
                if now > envelope.expiry {
                    tracing::debug!(key, "Cache entry expired");
                    self.remove(key);
                    return None;
                }
                envelope.value
            }
            None => payload,
        };

        match serde_json::from_value(value) {
            Ok(v) => {
                tracing::debug!(key, "Cache hit");
                Some(v)
            }
            Err(e) => {
                tracing::warn!(key, "Cached value has unexpected shape: {}", e);
                None
            }
        }
    }

    /// Store a value, wrapped with an expiry when `ttl` is given.
    ///
    /// Persistence is best effort: the in-memory value is always updated.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(key, "Failed to serialize cache value: {}", e);
                return;
            }
        };

        let payload = match ttl {
            Some(ttl) => {
                let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
                let expiry = self.clock.now().timestamp_millis().saturating_add(ttl_ms);
                serde_json::json!({ "value": value, "expiry": expiry })
            }
            None => value,
        };

        self.apply_external_changes();
        self.memory.lock().insert(key.to_string(), payload.clone());

        match serde_json::to_string(&payload) {
            Ok(raw) => {
                if let Err(e) = self.backend.write(key, &raw) {
                    tracing::warn!(key, "Failed to persist cache entry: {}", e);
                }
            }
            Err(e) => tracing::warn!(key, "Failed to encode cache entry: {}", e),
        }

        self.notify(key, Some(payload));
    }

    /// Convenience for the common "ttl in minutes" case.
    pub fn set_for_minutes<T: Serialize + ?Sized>(&self, key: &str, value: &T, minutes: u64) {
        self.set(key, value, Some(Duration::from_secs(minutes * 60)));
    }

    pub fn remove(&self, key: &str) {
        self.apply_external_changes();
        self.memory.lock().remove(key);

        if let Err(e) = self.backend.delete(key) {
            tracing::warn!(key, "Failed to delete cache entry: {}", e);
        }

        self.notify(key, None);
    }

    /// Remove every key known to this handle or the backend.
    pub fn clear(&self) {
        let mut keys: Vec<String> = self.memory.lock().keys().cloned().collect();
        match self.backend.keys() {
            Ok(stored) => keys.extend(stored),
            Err(e) => tracing::warn!("Failed to list cache keys: {}", e),
        }
        keys.sort();
        keys.dedup();

        for key in keys {
            self.remove(&key);
        }
    }

    /// Watch changes made through any handle on the same storage, this one
    /// included.
    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.events_tx.subscribe()
    }

    fn notify(&self, key: &str, value: Option<Value>) {
        // No receivers is fine
        let _ = self.events_tx.send(StorageEvent {
            key: key.to_string(),
            value,
            origin: self.id,
        });
    }

    fn load_payload(&self, key: &str) -> Option<Value> {
        self.apply_external_changes();

        if let Some(payload) = self.memory.lock().get(key) {
            return Some(payload.clone());
        }

        let raw = match self.backend.read(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!(key, "Cache miss");
                return None;
            }
            Err(e) => {
                tracing::warn!(key, "Failed to read cache entry: {}", e);
                return None;
            }
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(payload) => {
                self.memory.lock().insert(key.to_string(), payload.clone());
                Some(payload)
            }
            Err(e) => {
                tracing::warn!(key, "Stored cache entry is not valid JSON: {}", e);
                None
            }
        }
    }

    /// Fold in changes other handles have broadcast since the last access.
    fn apply_external_changes(&self) {
        let mut rx = self.events_rx.lock();
        loop {
            match rx.try_recv() {
                Ok(event) if event.origin == self.id => {}
                Ok(event) => {
                    let mut memory = self.memory.lock();
                    match event.value {
                        Some(payload) => {
                            memory.insert(event.key, payload);
                        }
                        None => {
                            memory.remove(&event.key);
                        }
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    // Missed events; fall back to the backend for everything
                    tracing::debug!(skipped, "Cache change feed lagged, dropping memory view");
                    self.memory.lock().clear();
                }
                Err(broadcast::error::TryRecvError::Empty)
                | Err(broadcast::error::TryRecvError::Closed) => break,
            }
        }
    }
}

impl std::fmt::Debug for PersistentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentCache")
            .field("id", &self.id)
            .field("entries", &self.memory.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;

    fn cache_with_manual_clock() -> (Storage, PersistentCache, Arc<ManualClock>) {
        let storage = Storage::in_memory();
        let clock = Arc::new(ManualClock::default());
        let cache = storage.cache_with_clock(clock.clone());
        (storage, cache, clock)
    }

    #[test]
    fn test_value_expires_after_ttl() {
        let (_storage, cache, clock) = cache_with_manual_clock();

        cache.set_for_minutes("weather_123", &json!({"temp": 22}), 10);
        assert_eq!(cache.get::<Value>("weather_123"), Some(json!({"temp": 22})));

        clock.advance(chrono::Duration::minutes(11));
        assert_eq!(cache.get::<Value>("weather_123"), None);
    }

    #[test]
    fn test_expired_entry_is_removed_from_backend() {
        let backend = Arc::new(MemoryBackend::new());
        let storage = Storage::new(backend.clone());
        let clock = Arc::new(ManualClock::default());
        let cache = storage.cache_with_clock(clock.clone());

        cache.set("k", &1, Some(Duration::from_secs(60)));
        assert!(backend.read("k").unwrap().is_some());

        clock.advance(chrono::Duration::seconds(61));
        assert_eq!(cache.get::<i32>("k"), None);
        assert!(backend.read("k").unwrap().is_none());
    }

    #[test]
    fn test_entry_at_exact_expiry_is_still_fresh() {
        let (_storage, cache, clock) = cache_with_manual_clock();
        cache.set("k", &"v", Some(Duration::from_secs(60)));
        clock.advance(chrono::Duration::seconds(60));
        assert_eq!(cache.get::<String>("k").as_deref(), Some("v"));
    }

    #[test]
    fn test_value_without_ttl_is_stored_bare() {
        let backend = Arc::new(MemoryBackend::new());
        let storage = Storage::new(backend.clone());
        let cache = storage.cache();

        cache.set("temperatureUnit", "celsius", None);
        assert_eq!(backend.read("temperatureUnit").unwrap().as_deref(), Some("\"celsius\""));
        assert_eq!(cache.get::<String>("temperatureUnit").as_deref(), Some("celsius"));
    }

    #[test]
    fn test_failed_persistence_keeps_memory_value() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_fail_writes(true);
        let storage = Storage::new(backend.clone());
        let cache = storage.cache();

        cache.set("userCities", &vec!["a", "b"], None);
        assert_eq!(cache.get::<Vec<String>>("userCities").unwrap(), vec!["a", "b"]);
        assert!(backend.read("userCities").unwrap().is_none());
    }

    #[test]
    fn test_quota_exceeded_is_swallowed() {
        let storage = Storage::new(Arc::new(MemoryBackend::with_quota(8)));
        let cache = storage.cache();

        cache.set("big", &"a value far larger than eight bytes", None);
        assert!(cache.get::<String>("big").is_some());
    }

    #[test]
    fn test_reads_through_to_existing_backend_data() {
        let backend = Arc::new(MemoryBackend::new());
        backend.write("userCities", r#"["x"]"#).unwrap();
        let storage = Storage::new(backend);
        let cache = storage.cache();

        assert_eq!(cache.get::<Vec<String>>("userCities").unwrap(), vec!["x"]);
    }

    #[test]
    fn test_wrong_shape_reads_as_absent() {
        let (_storage, cache, _clock) = cache_with_manual_clock();
        cache.set("n", &json!({"not": "a number"}), None);
        assert_eq!(cache.get::<u32>("n"), None);
    }

    #[test]
    fn test_changes_propagate_between_handles() {
        let storage = Storage::in_memory();
        let tab_a = storage.cache();
        let tab_b = storage.cache();

        assert_eq!(tab_b.get::<String>("temperatureUnit"), None);
        tab_a.set("temperatureUnit", "fahrenheit", None);
        assert_eq!(tab_b.get::<String>("temperatureUnit").as_deref(), Some("fahrenheit"));

        tab_b.set("temperatureUnit", "celsius", None);
        assert_eq!(tab_a.get::<String>("temperatureUnit").as_deref(), Some("celsius"));

        tab_a.remove("temperatureUnit");
        assert_eq!(tab_b.get::<String>("temperatureUnit"), None);
    }

    #[test]
    fn test_subscribe_sees_own_and_foreign_changes() {
        let storage = Storage::in_memory();
        let a = storage.cache();
        let b = storage.cache();
        let mut rx = a.subscribe();

        b.set("k", &1, None);
        let event = rx.try_recv().unwrap();
        assert_eq!(event.key, "k");
        assert_eq!(event.origin, b.id());
        assert_eq!(event.value, Some(json!(1)));
    }

    #[test]
    fn test_clear_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path(), None).unwrap();
        let cache = storage.cache();
        cache.set("a", &1, None);
        cache.set("b", &2, Some(Duration::from_secs(60)));

        cache.clear();

        let fresh = Storage::open(dir.path(), None).unwrap().cache();
        assert_eq!(fresh.get::<i32>("a"), None);
        assert_eq!(fresh.get::<i32>("b"), None);
    }

    #[test]
    fn test_file_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        Storage::open(dir.path(), None)
            .unwrap()
            .cache()
            .set("weather_1", &json!({"temp": 3}), Some(Duration::from_secs(600)));

        let reopened = Storage::open(dir.path(), None).unwrap().cache();
        assert_eq!(reopened.get::<Value>("weather_1"), Some(json!({"temp": 3})));
    }
}
