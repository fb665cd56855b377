//! City search: autocomplete suggestions with a short-lived cache, and
//! resolution of a chosen suggestion into a [`City`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use skycast_storage::PersistentCache;
use skycast_weather::{City, PlacePrediction, PlaceResult, PlacesClient};
use tokio_util::sync::CancellationToken;

use crate::error::ServiceError;

/// Shorter queries return no suggestions without touching the network.
pub const MIN_QUERY_LEN: usize = 2;

pub fn search_key(query: &str) -> String {
    format!("search_{}", query.to_lowercase())
}

pub struct PlaceSearch {
    client: PlacesClient,
    cache: Arc<PersistentCache>,
    ttl: Duration,
    generation: AtomicU64,
    current: Mutex<Option<(u64, CancellationToken)>>,
}

impl PlaceSearch {
    pub fn new(client: PlacesClient, cache: Arc<PersistentCache>, ttl_minutes: u64) -> Self {
        Self {
            client,
            cache,
            ttl: Duration::from_secs(ttl_minutes * 60),
            generation: AtomicU64::new(0),
            current: Mutex::new(None),
        }
    }

    /// Suggestions for what the user has typed so far. A newer call cancels
    /// an older one still waiting on the network.
    pub async fn suggest(&self, query: &str) -> Result<Vec<PlacePrediction>, ServiceError> {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_LEN {
            return Ok(Vec::new());
        }

        let key = search_key(query);
        if let Some(hit) = self.cache.get::<Vec<PlacePrediction>>(&key) {
            return Ok(hit);
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();
        if let Some((_, previous)) = self.current.lock().replace((generation, token.clone())) {
            previous.cancel();
        }

        let result = self.client.autocomplete(query, &token).await;
        {
            let mut current = self.current.lock();
            if current.as_ref().is_some_and(|(g, _)| *g == generation) {
                current.take();
            }
        }

        let predictions = result?;
        self.cache.set(&key, &predictions, Some(self.ttl));
        Ok(predictions)
    }

    /// Full text search, uncached.
    pub async fn search(&self, query: &str) -> Result<Vec<PlaceResult>, ServiceError> {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_LEN {
            return Ok(Vec::new());
        }
        Ok(self.client.text_search(query, &CancellationToken::new()).await?)
    }

    /// Look up a place id, yielding a city ready for the city list.
    pub async fn resolve(&self, place_id: &str) -> Result<City, ServiceError> {
        Ok(self.client.details(place_id, &CancellationToken::new()).await?)
    }

    /// Abandon the suggestion request in flight, if any.
    pub fn cancel(&self) {
        if let Some((_, token)) = self.current.lock().take() {
            token.cancel();
        }
    }
}

impl std::fmt::Debug for PlaceSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaceSearch")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
