//! HTTP API tests against the in-memory storage backend.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::util::ServiceExt;

use resound::service::Service;
use resound::store::MemoryStore;
use resound::Fingerprint;

use resound_server::auth::{Authenticator, NoAuth, PasswordAuth};
use resound_server::{build_router, AppState};

fn app() -> (Router, AppState) {
    app_with_auth(Arc::new(NoAuth))
}

fn app_with_auth(auth: Arc<dyn Authenticator>) -> (Router, AppState) {
    let service = Service::new(Arc::new(MemoryStore::new()));
    let state = AppState::new(service, auth);
    (build_router(state.clone()), state)
}

fn fingerprint(seed: u32, frames: usize) -> String {
    // Simple deterministic hash sequence; collision-free across seeds for
    // the query mask with overwhelming likelihood.
    let hashes = (0..frames as u32)
        .map(|i| (i + seed * 100_000).wrapping_mul(2654435761))
        .collect();
    Fingerprint { version: 1, hashes }.to_base64()
}

async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    basic_auth: Option<(&str, &str)>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((username, password)) = basic_auth {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;
        let token = STANDARD.encode(format!("{username}:{password}"));
        builder = builder.header(header::AUTHORIZATION, format!("Basic {token}"));
    }
    let request = match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn test_health_follows_drain_state() {
    let (router, state) = app();

    let (status, _) = send(&router, Method::GET, "/_health", None, None).await;
    assert_eq!(status, StatusCode::OK);

    state.set_healthy(false);
    let (status, body) = send(&router, Method::GET, "/_health", None, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["type"], "unavailable");
}

#[tokio::test]
async fn test_unknown_route_is_json_not_found() {
    let (router, _) = app();
    let (status, body) = send(&router, Method::GET, "/nope", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "not_found");
}

#[tokio::test]
async fn test_catalog_lifecycle_over_http() {
    let (router, _) = app();

    let (status, body) = send(&router, Method::PUT, "/v1/priv/cat1", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["catalog"], "cat1");

    let (status, body) = send(&router, Method::GET, "/v1/priv", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["catalogs"][0]["catalog"], "cat1");

    let (status, body) = send(&router, Method::GET, "/v1/priv/cat1", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["catalog"], "cat1");

    let (status, _) = send(&router, Method::DELETE, "/v1/priv/cat1", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&router, Method::GET, "/v1/priv/cat1", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "not_found");
}

#[tokio::test]
async fn test_invalid_identifiers_are_rejected() {
    let (router, _) = app();

    let (status, body) = send(&router, Method::PUT, "/v1/priv/_bad", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "invalid_request");

    let (status, body) = send(
        &router,
        Method::PUT,
        "/v1/priv/cat1/_track",
        Some(json!({"fingerprint": fingerprint(1, 100)})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["reason"], "Invalid track ID");
}

#[tokio::test]
async fn test_track_roundtrip_and_duplicates() {
    let (router, _) = app();
    let fp = fingerprint(1, 400);

    let (status, body) = send(
        &router,
        Method::PUT,
        "/v1/priv/cat1/t1",
        Some(json!({
            "fingerprint": fp,
            "metadata": {"title": "Sunrise"},
        })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "t1");

    let (status, body) = send(&router, Method::GET, "/v1/priv/cat1/t1", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["title"], "Sunrise");

    // Same fingerprint under a new id without allow_duplicate conflicts.
    let (status, body) = send(
        &router,
        Method::PUT,
        "/v1/priv/cat1/t2",
        Some(json!({"fingerprint": fp})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["type"], "duplicate");

    let (status, _) = send(
        &router,
        Method::PUT,
        "/v1/priv/cat1/t2",
        Some(json!({"fingerprint": fp, "allow_duplicate": true})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&router, Method::DELETE, "/v1/priv/cat1/t1", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&router, Method::GET, "/v1/priv/cat1/t1", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_bodies_are_bad_requests() {
    let (router, _) = app();

    let request = Request::builder()
        .method(Method::PUT)
        .uri("/v1/priv/cat1/t1")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &router,
        Method::PUT,
        "/v1/priv/cat1/t1",
        Some(json!({"fingerprint": "@@not-base64@@"})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "invalid_request");
}

#[tokio::test]
async fn test_anonymous_track_gets_server_id() {
    let (router, _) = app();

    let (status, body) = send(
        &router,
        Method::POST,
        "/v1/priv/cat1",
        Some(json!({"fingerprint": fingerprint(3, 350)})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = body["id"].as_str().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());

    let (status, _) = send(
        &router,
        Method::GET,
        &format!("/v1/priv/cat1/{id}"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_stream_search_finds_track() {
    let (router, _) = app();

    let master = Fingerprint {
        version: 1,
        hashes: (0..600u32).map(|i| i.wrapping_mul(2654435761)).collect(),
    };
    send(
        &router,
        Method::PUT,
        "/v1/priv/cat1/t1",
        Some(json!({
            "fingerprint": master.to_base64(),
            "metadata": {"title": "Sunrise"},
        })),
        None,
    )
    .await;

    // A 250-frame excerpt starting at frame 200.
    let query = Fingerprint {
        version: 1,
        hashes: master.hashes[200..450].to_vec(),
    };
    let (status, body) = send(
        &router,
        Method::POST,
        "/v1/priv/cat1/_search",
        Some(json!({"fingerprint": query.to_base64(), "stream": true})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["catalog"], "cat1");
    assert_eq!(body["results"].as_array().unwrap().len(), 1);
    let result = &body["results"][0];
    assert_eq!(result["id"], "t1");
    assert_eq!(result["metadata"]["title"], "Sunrise");
    assert!(result["match"]["duration"].as_f64().unwrap() > 0.0);
    let position = result["match"]["position"].as_f64().unwrap();
    assert!((position - 200.0 * (1365.0 / 11025.0)).abs() < 1e-6);

    // An unrelated fingerprint finds nothing.
    let (status, body) = send(
        &router,
        Method::POST,
        "/v1/priv/cat1/_search",
        Some(json!({"fingerprint": fingerprint(9, 250), "stream": false})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_stream_search_length_limit() {
    let (router, _) = app();
    send(&router, Method::PUT, "/v1/priv/cat1", None, None).await;

    let (status, body) = send(
        &router,
        Method::POST,
        "/v1/priv/cat1/_search",
        Some(json!({"fingerprint": fingerprint(1, 301), "stream": true})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["reason"], "Fingerprint too long for stream search");

    // The same length is fine without stream mode.
    let (status, _) = send(
        &router,
        Method::POST,
        "/v1/priv/cat1/_search",
        Some(json!({"fingerprint": fingerprint(1, 301), "stream": false})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_password_auth_guards_api() {
    let (router, _) = app_with_auth(Arc::new(PasswordAuth {
        username: "user".to_string(),
        password: "secret".to_string(),
    }));

    let (status, body) = send(&router, Method::GET, "/v1/priv", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["type"], "unauthorized");

    let (status, _) = send(
        &router,
        Method::GET,
        "/v1/priv",
        None,
        Some(("user", "secret")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Health stays open without credentials.
    let (status, _) = send(&router, Method::GET, "/_health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_track_listing_pagination_over_http() {
    let (router, _) = app();

    for i in 0..3 {
        send(
            &router,
            Method::PUT,
            &format!("/v1/priv/cat1/track-{i}"),
            Some(json!({"fingerprint": fingerprint(10 + i, 300)})),
            None,
        )
        .await;
    }

    let (status, body) = send(&router, Method::GET, "/v1/priv/cat1?tracks", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let tracks = body["tracks"].as_array().unwrap();
    assert_eq!(tracks.len(), 3);
    assert_eq!(body["has_more"], false);
    assert_eq!(tracks[0]["id"], "track-0");
}

#[tokio::test]
async fn test_metrics_exposition() {
    let (router, _) = app();
    send(&router, Method::PUT, "/v1/priv/cat1", None, None).await;

    let request = Request::builder()
        .method(Method::GET)
        .uri("/_metrics")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("acoustid_priv_catalog_action_total"));
}
