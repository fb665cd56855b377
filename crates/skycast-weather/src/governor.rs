//! Request governance shared by the provider clients: rate limiting, retry
//! with linear backoff, and coalescing of identical concurrent requests.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use parking_lot::Mutex;
use serde_json::Value;
use skycast_core::ApiError;
use tokio_util::sync::CancellationToken;

use crate::rate_limit::RateLimiter;
use crate::retry::{with_retry, RetryPolicy};

type PendingResponse = BoxFuture<'static, Result<Value, ApiError>>;
type InFlightMap = Mutex<HashMap<String, InFlight>>;

/// Canonical signature of a request: endpoint plus sorted parameters, so
/// `lat=1&lon=2` and `lon=2&lat=1` coalesce.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn new<K, V>(endpoint: &str, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut pairs: Vec<String> = params
            .into_iter()
            .map(|(k, v)| format!("{}={}", k.as_ref(), v.as_ref()))
            .collect();
        pairs.sort();
        Self(format!("{}?{}", endpoint, pairs.join("&")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

struct InFlight {
    id: u64,
    response: WeakShared<PendingResponse>,
}

/// Removes an in-flight entry when the request future finishes or is
/// dropped, whichever path it takes.
struct InFlightGuard {
    map: Weak<InFlightMap>,
    key: String,
    id: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let Some(map) = self.map.upgrade() else {
            return;
        };
        let mut map = map.lock();
        if map.get(&self.key).is_some_and(|entry| entry.id == self.id) {
            map.remove(&self.key);
        }
    }
}

/// Per-client request governor. Owns its limiter and in-flight map; clone
/// the client, not the governor, to share it.
pub struct RequestGovernor {
    name: &'static str,
    limiter: RateLimiter,
    retry: RetryPolicy,
    in_flight: Arc<InFlightMap>,
    next_id: AtomicU64,
}

impl RequestGovernor {
    pub fn new(name: &'static str, limiter: RateLimiter, retry: RetryPolicy) -> Self {
        Self {
            name,
            limiter,
            retry,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Number of distinct requests currently on the wire.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Run `operation` under the governor.
    ///
    /// A caller whose key matches a pending request joins it and receives
    /// the same result. Cancelling `cancel` resolves this caller with
    /// [`ApiError::Cancelled`] immediately; the network request itself is
    /// dropped, without further retries, once no caller is waiting on it.
    pub async fn execute<F, Fut>(
        &self,
        key: RequestKey,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<Value, ApiError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ApiError>> + Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }

        let response = self.join_or_start(key, operation);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(client = self.name, "Request cancelled by caller");
                Err(ApiError::Cancelled)
            }
            result = response => result,
        }
    }

    fn join_or_start<F, Fut>(&self, key: RequestKey, operation: F) -> Shared<PendingResponse>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ApiError>> + Send + 'static,
    {
        let mut map = self.in_flight.lock();

        if let Some(pending) = map.get(key.as_str()).and_then(|e| e.response.upgrade()) {
            tracing::debug!(client = self.name, %key, "Joining in-flight request");
            return pending;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let guard = InFlightGuard {
            map: Arc::downgrade(&self.in_flight),
            key: key.as_str().to_string(),
            id,
        };
        let limiter = self.limiter.clone();
        let retry = self.retry.clone();
        let name = self.name;
        let log_key = key.clone();

        let pending: PendingResponse = async move {
            let _guard = guard;
            limiter.acquire().await;
            tracing::debug!(client = name, key = %log_key, "Issuing request");
            with_retry(&retry, operation).await
        }
        .boxed();
        let pending = pending.shared();

        if let Some(weak) = pending.downgrade() {
            map.insert(
                key.0,
                InFlight {
                    id,
                    response: weak,
                },
            );
        }

        pending
    }
}

impl std::fmt::Debug for RequestGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestGovernor")
            .field("name", &self.name)
            .field("retry", &self.retry)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}
