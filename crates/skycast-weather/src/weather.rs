//! Weather provider client (OpenWeatherMap-compatible API).

use std::sync::Arc;

use reqwest::Client;
use skycast_core::{ApiError, Units, WeatherConfig};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::governor::{RequestGovernor, RequestKey};
use crate::http;
use crate::rate_limit::RateLimiter;
use crate::retry::RetryPolicy;
use crate::transform;
use crate::types::{ForecastData, LocationQuery, WeatherData};

/// Cheap to clone; clones share the governor, so their requests are rate
/// limited and coalesced together.
#[derive(Clone)]
pub struct WeatherClient {
    inner: Arc<Inner>,
}

struct Inner {
    http: Client,
    base_url: String,
    api_key: String,
    units: Units,
    language: String,
    governor: RequestGovernor,
}

impl WeatherClient {
    /// Fails with [`ApiError::Config`] when no API key is configured.
    pub fn new(config: &WeatherConfig) -> Result<Self, ApiError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ApiError::Config("weather API key is not set".into()))?;

        let governor = RequestGovernor::new(
            "weather",
            RateLimiter::from(&config.rate_limit),
            RetryPolicy::from(&config.retry),
        );

        Ok(Self {
            inner: Arc::new(Inner {
                http: http::build_client(config.timeout_secs)?,
                base_url: config.base_url.trim_end_matches('/').to_string(),
                api_key,
                units: config.units,
                language: config.language.clone(),
                governor,
            }),
        })
    }

    pub fn units(&self) -> Units {
        self.inner.units
    }

    pub fn governor(&self) -> &RequestGovernor {
        &self.inner.governor
    }

    /// Current conditions for a location.
    #[instrument(skip(self, cancel), level = "info")]
    pub async fn current_weather(
        &self,
        query: &LocationQuery,
        cancel: &CancellationToken,
    ) -> Result<WeatherData, ApiError> {
        let raw = self.request("weather", query, cancel).await?;
        transform::current_weather(&raw)
    }

    /// 5-day forecast in 3-hour steps.
    #[instrument(skip(self, cancel), level = "info")]
    pub async fn forecast(
        &self,
        query: &LocationQuery,
        cancel: &CancellationToken,
    ) -> Result<ForecastData, ApiError> {
        let raw = self.request("forecast", query, cancel).await?;
        transform::forecast(&raw)
    }

    async fn request(
        &self,
        endpoint: &str,
        query: &LocationQuery,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, ApiError> {
        let mut params = query.params();
        params.push(("units", self.inner.units.as_query().to_string()));
        params.push(("lang", self.inner.language.clone()));

        // the key never takes part in the request signature
        let key = RequestKey::new(endpoint, params.iter().map(|(k, v)| (*k, v.as_str())));
        params.push(("appid", self.inner.api_key.clone()));

        let http = self.inner.http.clone();
        let url = format!("{}/{}", self.inner.base_url, endpoint);
        let params = Arc::new(params);

        self.inner
            .governor
            .execute(key, cancel, move || {
                let http = http.clone();
                let url = url.clone();
                let params = params.clone();
                async move { http::get_json(&http, &url, &params).await }
            })
            .await
    }
}

impl std::fmt::Debug for WeatherClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherClient")
            .field("base_url", &self.inner.base_url)
            .field("units", &self.inner.units)
            .field("language", &self.inner.language)
            .finish_non_exhaustive()
    }
}
