//! Places provider client (Google Places-compatible API): city search,
//! autocomplete and details lookup.

use std::sync::Arc;

use reqwest::Client;
use serde_json::Value;
use skycast_core::{ApiError, PlacesConfig};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::governor::{RequestGovernor, RequestKey};
use crate::http;
use crate::rate_limit::RateLimiter;
use crate::retry::RetryPolicy;
use crate::transform;
use crate::types::{City, PlacePrediction, PlaceResult};

#[derive(Clone)]
pub struct PlacesClient {
    inner: Arc<Inner>,
}

struct Inner {
    http: Client,
    base_url: String,
    api_key: String,
    language: String,
    governor: RequestGovernor,
}

impl PlacesClient {
    pub fn new(config: &PlacesConfig) -> Result<Self, ApiError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ApiError::Config("places API key is not set".into()))?;

        Ok(Self {
            inner: Arc::new(Inner {
                http: http::build_client(config.timeout_secs)?,
                base_url: config.base_url.trim_end_matches('/').to_string(),
                api_key,
                language: config.language.clone(),
                governor: RequestGovernor::new(
                    "places",
                    RateLimiter::from(&config.rate_limit),
                    RetryPolicy::from(&config.retry),
                ),
            }),
        })
    }

    pub fn governor(&self) -> &RequestGovernor {
        &self.inner.governor
    }

    /// Free-text search restricted to cities.
    #[instrument(skip(self, cancel), level = "info")]
    pub async fn text_search(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<PlaceResult>, ApiError> {
        let params = vec![("query", query.to_string()), ("type", "locality".to_string())];
        let raw = self.request("textsearch/json", params, cancel).await?;
        transform::place_results(&raw)
    }

    /// Suggestions for a partially typed city name.
    #[instrument(skip(self, cancel), level = "info")]
    pub async fn autocomplete(
        &self,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<PlacePrediction>, ApiError> {
        let params = vec![("input", input.to_string()), ("types", "(cities)".to_string())];
        let raw = self.request("autocomplete/json", params, cancel).await?;
        transform::predictions(&raw)
    }

    /// Resolve a place id into a city ready to be tracked.
    #[instrument(skip(self, cancel), level = "info")]
    pub async fn details(&self, place_id: &str, cancel: &CancellationToken) -> Result<City, ApiError> {
        let params = vec![
            ("place_id", place_id.to_string()),
            (
                "fields",
                "place_id,name,geometry,address_components,utc_offset".to_string(),
            ),
        ];
        let raw = self.request("details/json", params, cancel).await?;
        transform::city_from_details(&raw)
    }

    async fn request(
        &self,
        endpoint: &str,
        mut params: Vec<(&'static str, String)>,
        cancel: &CancellationToken,
    ) -> Result<Value, ApiError> {
        params.push(("language", self.inner.language.clone()));
        let key = RequestKey::new(endpoint, params.iter().map(|(k, v)| (*k, v.as_str())));
        params.push(("key", self.inner.api_key.clone()));

        let http = self.inner.http.clone();
        let url = format!("{}/{}", self.inner.base_url, endpoint);
        let params = Arc::new(params);

        self.inner
            .governor
            .execute(key, cancel, move || {
                let http = http.clone();
                let url = url.clone();
                let params = params.clone();
                async move {
                    let raw = http::get_json(&http, &url, &params).await?;
                    // failures arrive in the body, usually with HTTP 200
                    transform::check_places_status(&raw)?;
                    Ok(raw)
                }
            })
            .await
    }
}

impl std::fmt::Debug for PlacesClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlacesClient")
            .field("base_url", &self.inner.base_url)
            .field("language", &self.inner.language)
            .finish_non_exhaustive()
    }
}
