//! Cache-backed resource loading with superseding fetches and optional
//! auto-refresh.
//!
//! A [`Resource`] owns one logical piece of remote data (for example the
//! current weather of one city). Reads go to the cache first; misses and
//! forced refreshes go to the network. State is published through a
//! `watch` channel so any number of consumers can follow it.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use skycast_core::ApiError;
use skycast_storage::PersistentCache;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::ServiceError;

/// What consumers see.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceState<T> {
    pub data: Option<T>,
    pub is_loading: bool,
    /// User-facing message of the last failed fetch
    pub error: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl<T> Default for ResourceState<T> {
    fn default() -> Self {
        Self {
            data: None,
            is_loading: false,
            error: None,
            last_updated: None,
        }
    }
}

/// Cached form: the data plus when it was fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Snapshot<T> {
    data: T,
    fetched_at: DateTime<Utc>,
}

type FetchFn<T> = dyn Fn(CancellationToken) -> BoxFuture<'static, Result<T, ApiError>> + Send + Sync;

struct Inner<T> {
    name: String,
    cache: Arc<PersistentCache>,
    cache_key: String,
    ttl: Duration,
    fetch: Box<FetchFn<T>>,
    state: watch::Sender<ResourceState<T>>,
    generation: AtomicU64,
    current: Mutex<Option<CancellationToken>>,
    refresh: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        if let Some(token) = self.current.get_mut().take() {
            token.cancel();
        }
        if let Some((token, _)) = self.refresh.get_mut().take() {
            token.cancel();
        }
    }
}

/// Handle to one remote resource. Clones share state; dropping the last
/// clone stops auto-refresh and cancels any fetch in progress.
pub struct Resource<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Resource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Resource<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new<F, Fut>(
        cache: Arc<PersistentCache>,
        cache_key: impl Into<String>,
        ttl: Duration,
        fetch: F,
    ) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let cache_key = cache_key.into();
        let (state, _) = watch::channel(ResourceState::default());
        Self {
            inner: Arc::new(Inner {
                name: cache_key.clone(),
                cache,
                cache_key,
                ttl,
                fetch: Box::new(move |token| fetch(token).boxed()),
                state,
                generation: AtomicU64::new(0),
                current: Mutex::new(None),
                refresh: Mutex::new(None),
            }),
        }
    }

    pub fn cache_key(&self) -> &str {
        &self.inner.cache_key
    }

    pub fn state(&self) -> ResourceState<T> {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ResourceState<T>> {
        self.inner.state.subscribe()
    }

    /// Serve from cache when fresh, otherwise fetch.
    pub async fn load(&self) -> Result<T, ServiceError> {
        self.run(false).await
    }

    /// Fetch from the network regardless of the cache.
    pub async fn refresh(&self) -> Result<T, ServiceError> {
        self.run(true).await
    }

    /// Re-fetch every `interval` until [`stop`](Self::stop) is called or
    /// the last handle is dropped. Replaces any earlier schedule.
    pub fn start_auto_refresh(&self, interval: Duration) {
        let token = CancellationToken::new();
        let weak = Arc::downgrade(&self.inner);
        let task = tokio::spawn(auto_refresh(weak, interval, token.clone()));

        if let Some((previous, _)) = self.inner.refresh.lock().replace((token, task)) {
            previous.cancel();
        }
        tracing::debug!(resource = %self.inner.name, ?interval, "Auto-refresh started");
    }

    pub fn is_auto_refreshing(&self) -> bool {
        self.inner
            .refresh
            .lock()
            .as_ref()
            .is_some_and(|(_, task)| !task.is_finished())
    }

    /// Stop auto-refresh and cancel the fetch in progress, if any.
    pub fn stop(&self) {
        if let Some((token, _)) = self.inner.refresh.lock().take() {
            token.cancel();
        }
        if let Some(token) = self.inner.current.lock().take() {
            token.cancel();
        }
    }

    async fn run(&self, force: bool) -> Result<T, ServiceError> {
        let inner: &Inner<T> = &self.inner;

        // Supersede whatever is in flight for this resource
        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();
        if let Some(previous) = inner.current.lock().replace(token.clone()) {
            previous.cancel();
        }

        if !force {
            if let Some(snapshot) = inner.cache.get::<Snapshot<T>>(&inner.cache_key) {
                tracing::debug!(resource = %inner.name, "Serving from cache");
                inner.state.send_modify(|s| {
                    s.data = Some(snapshot.data.clone());
                    s.last_updated = Some(snapshot.fetched_at);
                    s.is_loading = false;
                    s.error = None;
                });
                self.finish(generation);
                return Ok(snapshot.data);
            }
        }

        inner.state.send_modify(|s| s.is_loading = true);
        let _loading = LoadingGuard { inner, generation };
        tracing::info!(resource = %inner.name, force, "Fetching");
        let result = (inner.fetch)(token).await;

        if inner.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(resource = %inner.name, "Discarding superseded result");
            return Err(ApiError::Cancelled.into());
        }
        self.finish(generation);

        match result {
            Ok(data) => {
                let snapshot = Snapshot {
                    data,
                    fetched_at: inner.cache.clock().now(),
                };
                inner.cache.set(&inner.cache_key, &snapshot, Some(inner.ttl));
                inner.state.send_modify(|s| {
                    s.data = Some(snapshot.data.clone());
                    s.last_updated = Some(snapshot.fetched_at);
                    s.is_loading = false;
                    s.error = None;
                });
                Ok(snapshot.data)
            }
            Err(e) if e.is_cancelled() => {
                inner.state.send_modify(|s| s.is_loading = false);
                Err(e.into())
            }
            Err(e) => {
                tracing::warn!(resource = %inner.name, "Fetch failed: {}", e);
                inner.state.send_modify(|s| {
                    s.is_loading = false;
                    s.error = Some(e.user_message().to_string());
                });
                Err(e.into())
            }
        }
    }

    /// Drop the fetch token if it still belongs to `generation`.
    fn finish(&self, generation: u64) {
        let mut current = self.inner.current.lock();
        if self.inner.generation.load(Ordering::SeqCst) == generation {
            current.take();
        }
    }
}

/// Clears `is_loading` when a fetch ends without publishing a result, for
/// example when the caller drops the future. A newer generation owns the
/// flag and is left alone.
struct LoadingGuard<'a, T> {
    inner: &'a Inner<T>,
    generation: u64,
}

impl<T> Drop for LoadingGuard<'_, T> {
    fn drop(&mut self) {
        let mut current = self.inner.current.lock();
        if self.inner.generation.load(Ordering::SeqCst) != self.generation {
            return;
        }
        if let Some(token) = current.take() {
            token.cancel();
        }
        drop(current);
        self.inner.state.send_if_modified(|s| std::mem::replace(&mut s.is_loading, false));
    }
}

async fn auto_refresh<T>(inner: Weak<Inner<T>>, interval: Duration, token: CancellationToken)
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(inner) = inner.upgrade() else {
            break;
        };
        let resource = Resource { inner };
        let refresh = resource.refresh();
        let result = tokio::select! {
            biased;
            result = refresh => result,
            _ = token.cancelled() => break,
        };
        match result {
            Ok(_) => {}
            Err(e) if e.is_cancelled() => {}
            // the next tick tries again
            Err(e) => tracing::debug!("Auto-refresh cycle skipped: {}", e),
        }
    }
    tracing::debug!("Auto-refresh stopped");
}

impl<T> std::fmt::Debug for Resource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("name", &self.inner.name)
            .field("ttl", &self.inner.ttl)
            .finish_non_exhaustive()
    }
}
