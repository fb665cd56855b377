#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use serde_json::json;
use skycast_core::{ApiError, PlacesConfig, RetrySettings, WeatherConfig};
use skycast_weather::{
    CancellationToken, LocationQuery, PlacesClient, WeatherClient, WeatherCondition,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn weather_config(server: &MockServer) -> WeatherConfig {
    WeatherConfig {
        api_key: Some("test-key".into()),
        base_url: server.uri(),
        retry: RetrySettings {
            attempts: 3,
            delay_ms: 10,
        },
        ..WeatherConfig::default()
    }
}

fn places_config(server: &MockServer) -> PlacesConfig {
    PlacesConfig {
        api_key: Some("places-key".into()),
        base_url: server.uri(),
        retry: RetrySettings {
            attempts: 2,
            delay_ms: 10,
        },
        ..PlacesConfig::default()
    }
}

fn current_body() -> serde_json::Value {
    json!({
        "coord": {"lon": 20.0, "lat": 10.0},
        "weather": [{"id": 800, "main": "Clear", "description": "clear sky", "icon": "01d"}],
        "main": {"temp": 22.0, "pressure": 1013, "humidity": 40},
        "wind": {"speed": 3.5, "deg": 90},
        "dt": 1700000000,
        "name": "Somewhere"
    })
}

#[tokio::test]
async fn test_current_weather_sends_expected_query() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/weather"))
        .and(query_param("lat", "10"))
        .and(query_param("lon", "20"))
        .and(query_param("appid", "test-key"))
        .and(query_param("units", "metric"))
        .and(query_param("lang", "en"))
        .respond_with(ResponseTemplate::new(200).set_body_json(current_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = WeatherClient::new(&weather_config(&server)).unwrap();
    let data = client
        .current_weather(&LocationQuery::coordinates(10.0, 20.0), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(data.temperature, 22.0);
    assert_eq!(data.condition.kind, WeatherCondition::Clear);
    assert_eq!(data.location_name.as_deref(), Some("Somewhere"));
}

#[tokio::test]
async fn test_simultaneous_identical_requests_hit_upstream_once() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/weather"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(current_body())
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = WeatherClient::new(&weather_config(&server)).unwrap();
    let other = client.clone();
    let token = CancellationToken::new();
    let query = LocationQuery::coordinates(10.0, 20.0);

    let (a, b) = tokio::join!(
        client.current_weather(&query, &token),
        other.current_weather(&query, &token),
    );

    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_server_error_is_retried_until_attempts_run_out() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/forecast"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({"message": "busy"})))
        .expect(3)
        .mount(&server)
        .await;

    let client = WeatherClient::new(&weather_config(&server)).unwrap();
    let err = client
        .forecast(&LocationQuery::CityId(42), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err, ApiError::http(503, "busy"));
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/weather"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({"cod": "404", "message": "city not found"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = WeatherClient::new(&weather_config(&server)).unwrap();
    let err = client
        .current_weather(&LocationQuery::Name("Nowhere".into()), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err, ApiError::http(404, "city not found"));
    assert_eq!(err.user_message(), "Location not found. Check and try again.");
}

#[tokio::test]
async fn test_cancelled_request_resolves_as_cancelled_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/weather"))
        .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_millis(300)))
        .mount(&server)
        .await;

    let client = WeatherClient::new(&weather_config(&server)).unwrap();
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let err = client
        .current_weather(&LocationQuery::coordinates(1.0, 2.0), &token)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());

    // a retry would have landed well within this window
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(server.received_requests().await.unwrap().len() <= 1);
    assert_eq!(client.governor().in_flight(), 0);
}

#[tokio::test]
async fn test_malformed_response_is_a_parse_error() {
    let server = MockServer::start().await;

    let mut body = current_body();
    body["weather"] = json!([]);
    Mock::given(method("GET"))
        .and(path("/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(&server)
        .await;

    let client = WeatherClient::new(&weather_config(&server)).unwrap();
    let err = client
        .current_weather(&LocationQuery::CityId(1), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Parse(_)));
}

#[tokio::test]
async fn test_autocomplete_returns_predictions() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/autocomplete/json"))
        .and(query_param("input", "Pari"))
        .and(query_param("key", "places-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "OK",
            "predictions": [{
                "place_id": "paris-id",
                "description": "Paris, France",
                "structured_formatting": {"main_text": "Paris", "secondary_text": "France"}
            }]
        })))
        .mount(&server)
        .await;

    let client = PlacesClient::new(&places_config(&server)).unwrap();
    let predictions = client
        .autocomplete("Pari", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(predictions.len(), 1);
    assert_eq!(predictions[0].place_id, "paris-id");
}

#[tokio::test]
async fn test_places_request_denied_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/textsearch/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "REQUEST_DENIED",
            "error_message": "The provided API key is invalid."
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = PlacesClient::new(&places_config(&server)).unwrap();
    let err = client
        .text_search("Lyon", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_client_error());
}

#[tokio::test]
async fn test_places_unknown_error_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/details/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "UNKNOWN_ERROR"})))
        .expect(2)
        .mount(&server)
        .await;

    let client = PlacesClient::new(&places_config(&server)).unwrap();
    let err = client
        .details("some-id", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_details_resolves_city() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/details/json"))
        .and(query_param("place_id", "lyon-id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "OK",
            "result": {
                "place_id": "lyon-id",
                "name": "Lyon",
                "geometry": {"location": {"lat": 45.76, "lng": 4.83}},
                "address_components": [
                    {"long_name": "Lyon", "short_name": "Lyon", "types": ["locality"]},
                    {"long_name": "France", "short_name": "FR", "types": ["country"]}
                ]
            }
        })))
        .mount(&server)
        .await;

    let client = PlacesClient::new(&places_config(&server)).unwrap();
    let city = client
        .details("lyon-id", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(city.id, "lyon-id");
    assert_eq!(city.name, "Lyon");
    assert_eq!(city.country, "FR");
}
