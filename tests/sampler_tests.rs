//! Samplers against a local stub of the upstream APIs.

use axum::{extract::Query, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use pulsewatch::config::{CryptoConfig, WeatherConfig};
use pulsewatch::sampler::crypto::CryptoSampler;
use pulsewatch::sampler::weather::WeatherSampler;
use pulsewatch::sampler::{FetchError, Sampler};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

/// Serve `app` on an ephemeral local port and return its base URL.
async fn spawn_stub(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn weather(Query(q): Query<HashMap<String, String>>) -> (StatusCode, Json<Value>) {
    if q.get("appid").map(String::as_str) != Some("test-key") {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "cod": 401, "message": "Invalid API key" })));
    }
    match q.get("q").map(String::as_str) {
        Some("Hyderabad,IN") => (
            StatusCode::OK,
            Json(json!({ "name": "Hyderabad", "main": { "temp": 31.7, "humidity": 48 } })),
        ),
        Some("Nowhere,XX") => (StatusCode::OK, Json(json!({ "name": "Nowhere", "weather": [] }))),
        _ => (StatusCode::NOT_FOUND, Json(json!({ "cod": "404", "message": "city not found" }))),
    }
}

fn weather_sampler(base_url: &str, api_key: &str) -> WeatherSampler {
    let config = WeatherConfig {
        base_url: base_url.to_string(),
        api_key: api_key.to_string(),
        ..WeatherConfig::default()
    };
    WeatherSampler::new(&config, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_weather_fetch_reads_main_temp() {
    let base = spawn_stub(Router::new().route("/data/2.5/weather", get(weather))).await;
    let sampler = weather_sampler(&base, "test-key");

    let before = Utc::now();
    let sample = sampler.fetch("Hyderabad,IN").await.unwrap();
    assert_eq!(sample.entity_key, "Hyderabad,IN");
    assert_eq!(sample.value, 31.7);
    // Stamped after the response arrived, not before the request
    assert!(sample.timestamp >= before);
}

#[tokio::test]
async fn test_weather_non_success_status() {
    let base = spawn_stub(Router::new().route("/data/2.5/weather", get(weather))).await;

    let err = weather_sampler(&base, "wrong-key")
        .fetch("Hyderabad,IN")
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Status(401)));

    let err = weather_sampler(&base, "test-key")
        .fetch("Atlantis,XX")
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Status(404)));
}

#[tokio::test]
async fn test_weather_missing_field() {
    let base = spawn_stub(Router::new().route("/data/2.5/weather", get(weather))).await;
    let err = weather_sampler(&base, "test-key")
        .fetch("Nowhere,XX")
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::MissingField(ref p) if p == "/main/temp"));
}

#[tokio::test]
async fn test_non_json_body_is_decode_error() {
    let app = Router::new().route("/data/2.5/weather", get(|| async { "<html>maintenance</html>" }));
    let base = spawn_stub(app).await;
    let err = weather_sampler(&base, "k").fetch("Delhi,IN").await.unwrap_err();
    assert!(matches!(err, FetchError::Decode(_)));
}

#[tokio::test]
async fn test_transport_failure() {
    // Bind then drop to get a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = weather_sampler(&format!("http://{}", addr), "k")
        .fetch("Delhi,IN")
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Transport(_)));
    assert!(!err.to_string().contains("appid"));
}

async fn simple_price(Query(q): Query<HashMap<String, String>>) -> Json<Value> {
    let id = q.get("ids").cloned().unwrap_or_default();
    let currency = q.get("vs_currencies").cloned().unwrap_or_default();
    if id == "bitcoin" {
        Json(json!({ id: { currency: 64250.5 } }))
    } else {
        Json(json!({}))
    }
}

async fn market_chart(Query(q): Query<HashMap<String, String>>) -> (StatusCode, Json<Value>) {
    let from: i64 = q.get("from").and_then(|v| v.parse().ok()).unwrap_or(0);
    let to: i64 = q.get("to").and_then(|v| v.parse().ok()).unwrap_or(0);
    // 30 days is the minimum window the sampler asks for
    if to - from < 30 * 86_400 || q.get("vs_currency").map(String::as_str) != Some("eur") {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "bad window" })));
    }
    (
        StatusCode::OK,
        Json(json!({
            "prices": [[from * 1000, 59000.0], [(from + 86_400) * 1000, 59500.0], [to * 1000, 60100.0]]
        })),
    )
}

fn crypto_sampler(base_url: &str) -> CryptoSampler {
    let config = CryptoConfig {
        base_url: base_url.to_string(),
        ..CryptoConfig::default()
    };
    CryptoSampler::new(&config, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_crypto_spot_price() {
    let app = Router::new().route("/api/v3/simple/price", get(simple_price));
    let base = spawn_stub(app).await;
    let sampler = crypto_sampler(&base);

    let sample = sampler.fetch("bitcoin").await.unwrap();
    assert_eq!(sample.value, 64250.5);

    let err = sampler.fetch("notacoin").await.unwrap_err();
    assert!(matches!(err, FetchError::MissingField(ref p) if p == "/notacoin/usd"));
}

#[tokio::test]
async fn test_crypto_history_clamps_window() {
    let app = Router::new().route("/api/v3/coins/{id}/market_chart/range", get(market_chart));
    let base = spawn_stub(app).await;
    let sampler = crypto_sampler(&base).with_currency("EUR");

    // 5 days is below the minimum and gets widened to 30
    let series = sampler.fetch_range("ethereum", 5).await.unwrap();
    assert_eq!(series.len(), 3);
    assert!(series.iter().all(|s| s.entity_key == "ethereum"));
    assert!(series.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert_eq!(series[2].value, 60100.0);
}
