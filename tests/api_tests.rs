//! Dashboard API routes served from an in-memory store.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, TimeZone, Utc};
use pulsewatch::api::{self, state::AppState};
use pulsewatch::insight;
use pulsewatch::present::{DashboardPresenter, DashboardView, Presenter};
use pulsewatch::sampler::Sample;
use pulsewatch::storage::{MemoryStore, SeriesStore};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tower::ServiceExt;

struct Fixture {
    state: AppState,
    selection: watch::Receiver<String>,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let start = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    for (i, v) in [30.0, 31.0, 32.0].iter().enumerate() {
        store
            .append(&Sample::new("Mumbai,IN", start + Duration::seconds(10 * i as i64), *v))
            .unwrap();
    }

    let (tx, rx) = watch::channel("Mumbai,IN".to_string());
    Fixture {
        state: AppState {
            store,
            view: DashboardView::new(),
            selection: Arc::new(tx),
            entities: Arc::new(vec!["Mumbai,IN".to_string(), "Delhi,IN".to_string()]),
        },
        selection: rx,
    }
}

async fn call(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
    let response = api::router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let f = fixture();
    let (status, body) = call(&f.state, get("/api/v1/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
    assert!(body["meta"]["timestamp"].is_string());
}

#[tokio::test]
async fn test_series_includes_insight() {
    let f = fixture();
    let (status, body) = call(&f.state, get("/api/v1/series/Mumbai,IN")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total"], 3);
    assert_eq!(body["data"]["series"].as_array().unwrap().len(), 3);
    assert_eq!(body["data"]["insight"]["mean"], 31.0);
    assert_eq!(body["data"]["insight"]["anomaly_count"], 0);
    assert_eq!(body["data"]["insight"]["rolling_avg"][1], 30.5);
    assert_eq!(body["data"]["insight"]["classification"][0], "Normal");
}

#[tokio::test]
async fn test_unknown_series_is_empty() {
    let f = fixture();
    let (status, body) = call(&f.state, get("/api/v1/series/Delhi,IN")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total"], 0);
    assert!(body["data"]["insight"]["mean"].is_null());
}

#[tokio::test]
async fn test_dashboard_before_and_after_first_cycle() {
    let f = fixture();
    let (_, body) = call(&f.state, get("/api/v1/dashboard")).await;
    assert!(body["data"].is_null());
    assert!(body["meta"]["timestamp"].is_string());
    assert_eq!(body["meta"]["message"], "no cycle has completed yet");

    let series = f.state.store.read_all("Mumbai,IN").unwrap();
    DashboardPresenter::new(f.state.view.clone())
        .present("Mumbai,IN", &series, &insight::compute(&series))
        .unwrap();

    let (status, body) = call(&f.state, get("/api/v1/dashboard")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["entity_key"], "Mumbai,IN");
    assert_eq!(body["data"]["series"].as_array().unwrap().len(), 3);
    assert!(body["data"]["last_error"].is_null());
}

#[tokio::test]
async fn test_entities() {
    let f = fixture();
    let (status, body) = call(&f.state, get("/api/v1/entities")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["recorded"][0], "Mumbai,IN");
    assert_eq!(body["data"]["selectable"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_select_active_entity() {
    let mut f = fixture();
    let put = |entity: &str| {
        Request::builder()
            .method("PUT")
            .uri("/api/v1/active")
            .header("content-type", "application/json")
            .body(Body::from(format!(r#"{{"entity_key":"{}"}}"#, entity)))
            .unwrap()
    };

    let (status, _) = call(&f.state, put("Delhi,IN")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(f.selection.has_changed().unwrap());
    assert_eq!(*f.selection.borrow_and_update(), "Delhi,IN");

    let (status, body) = call(&f.state, put("Gotham,US")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["meta"]["error"].as_str().unwrap().contains("Gotham,US"));

    let (_, body) = call(&f.state, get("/api/v1/active")).await;
    assert_eq!(body["data"]["entity_key"], "Delhi,IN");
}

#[tokio::test]
async fn test_unknown_route() {
    let f = fixture();
    let (status, _) = call(&f.state, get("/api/v2/nothing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
