//! Cache-path and input-validation behavior of `POST /`.

mod common;

use common::TestDispatcher;
use dispatcher::key::cache_key;
use std::time::Duration;

#[tokio::test]
async fn cache_hit_streams_the_body_without_a_pending_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = TestDispatcher::start(dir.path(), &dir.path().join("cooldowns.db")).await;
    let client = reqwest::Client::new();

    let key = cache_key("example.com", "/x", Some("q=1"));
    tokio::fs::create_dir_all(dir.path().join("example.com"))
        .await
        .unwrap();
    tokio::fs::write(dir.path().join(&key), b"cached body")
        .await
        .unwrap();

    let resp = client
        .post(format!("{}/", app.base_url))
        .json(&serde_json::json!({ "url": "https://example.com/x?q=1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(
        resp.headers().get("x-from-cache").unwrap().to_str().unwrap(),
        key
    );
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"cached body");

    let status: serde_json::Value = client
        .get(format!("{}/status", app.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["requests"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn stale_cache_entry_falls_through_to_a_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let app = TestDispatcher::start(dir.path(), &dir.path().join("cooldowns.db")).await;
    let client = reqwest::Client::new();

    let key = cache_key("example.com", "/stale", None);
    tokio::fs::create_dir_all(dir.path().join("example.com"))
        .await
        .unwrap();
    tokio::fs::write(dir.path().join(&key), b"old body")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let resp = client
        .post(format!("{}/", app.base_url))
        .json(&serde_json::json!({
            "url": "https://example.com/stale",
            "expire": 10,
            "reply": "http://127.0.0.1:9/hook",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 202);
    assert_eq!(
        resp.headers().get("x-request-key").unwrap().to_str().unwrap(),
        key
    );
}

#[tokio::test]
async fn malformed_json_is_a_400_envelope() {
    let dir = tempfile::tempdir().unwrap();
    let app = TestDispatcher::start(dir.path(), &dir.path().join("cooldowns.db")).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/", app.base_url))
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let envelope: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(envelope["status"], 400);
    assert!(envelope["message"].as_str().unwrap().contains("invalid"));
}

#[tokio::test]
async fn url_without_a_host_is_a_400() {
    let dir = tempfile::tempdir().unwrap();
    let app = TestDispatcher::start(dir.path(), &dir.path().join("cooldowns.db")).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/", app.base_url))
        .json(&serde_json::json!({ "url": "not a url" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    let resp = client
        .post(format!("{}/", app.base_url))
        .json(&serde_json::json!({ "url": "mailto:someone@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn unknown_routes_get_the_json_404() {
    let dir = tempfile::tempdir().unwrap();
    let app = TestDispatcher::start(dir.path(), &dir.path().join("cooldowns.db")).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/nope/deeper/still", app.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Not Found: Error 404");
}
