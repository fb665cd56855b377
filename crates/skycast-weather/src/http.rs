//! Plain HTTP plumbing shared by the provider clients.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use skycast_core::ApiError;

const USER_AGENT: &str = concat!("SkyCast/", env!("CARGO_PKG_VERSION"));

pub(crate) fn build_client(timeout_secs: u64) -> Result<Client, ApiError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ApiError::Config(format!("failed to build HTTP client: {}", e)))
}

/// GET `url` with `params` and decode the body as JSON.
///
/// Non-success statuses become [`ApiError::Http`] carrying the provider's
/// `message` field when there is one.
pub(crate) async fn get_json(
    client: &Client,
    url: &str,
    params: &[(&'static str, String)],
) -> Result<Value, ApiError> {
    let response = client.get(url).query(params).send().await?;
    let status = response.status();

    if status.is_success() {
        return response
            .json::<Value>()
            .await
            .map_err(|e| ApiError::parse(format!("JSON parse error: {}", e)));
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|body| {
            body.get("message")
                .or_else(|| body.get("error_message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or(text);

    tracing::debug!("{} returned {}: {}", url, status, message);
    Err(ApiError::http(status.as_u16(), message))
}
