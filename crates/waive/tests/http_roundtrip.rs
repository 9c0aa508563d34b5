//! End-to-end tests: real listener, real worker, HTTP via reqwest.
//!
//! Verifies:
//! - Session registration and drum sample lookup through `/api`
//! - The returned sample paths can be fetched back through `/sample`
//! - Many concurrent callers each receive their own reply
//! - Shutdown drains and stops cleanly

use std::path::Path;
use std::sync::Arc;

use futures::future::join_all;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;
use waive::serve::Server;
use waiveconf::WaiveConfig;

fn seed_library(root: &Path) {
    for (rel, bytes) in [
        ("drums/kick/808/boom.mp3", b"kick-808".as_slice()),
        ("drums/kick/909/thud.mp3", b"kick-909".as_slice()),
        ("drums/hat/closed/tick.mp3", b"hat".as_slice()),
        ("synth/synth/lead/patch01.wav", b"lead".as_slice()),
    ] {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }
}

async fn start() -> (Server, String, TempDir) {
    let assets = TempDir::new().unwrap();
    seed_library(assets.path());

    let mut config = WaiveConfig::default();
    config.paths.assets_root = assets.path().to_path_buf();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = Server::start_on(listener, Arc::new(config)).unwrap();
    let base = format!("http://{}", server.local_addr());
    (server, base, assets)
}

#[tokio::test]
async fn test_session_then_drum_sample_then_fetch() {
    let (server, base, _assets) = start().await;
    let client = reqwest::Client::new();

    let session: Value = client
        .get(format!("{}/api/registerSession/abc", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(session, json!({"ok": true, "session": "abc"}));

    let samples: Value = client
        .post(format!("{}/apipost", base))
        .json(&json!({"type": "requestDrumSample", "id": "abc", "data": {"instrument": "kick", "count": 2}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        samples,
        json!({"ok": true, "drum_samples": ["kick/808/boom.mp3", "kick/909/thud.mp3"]})
    );

    // Any requested extension maps onto the stored mp3
    let response = client
        .get(format!("{}/sample/drums/kick/808/boom.wav", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "audio/mpeg");
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"kick-808");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_callers_get_their_own_session() {
    let (server, base, _assets) = start().await;
    let client = reqwest::Client::new();

    let calls = (0..32).map(|i| {
        let client = client.clone();
        let base = base.clone();
        async move {
            let id = format!("session-{}", i);
            let reply: Value = client
                .get(format!("{}/api/registerSession/{}", base, id))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            assert_eq!(reply["session"], id.as_str());
        }
    });
    join_all(calls).await;

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_missing_sample_and_unknown_operation() {
    let (server, base, _assets) = start().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/sample/synth/lead/x/nope.wav", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    let response = client
        .get(format!("{}/api/requestDrumPattern/abc?bpm=120", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let reply: Value = response.json().await.unwrap();
    assert_eq!(
        reply,
        json!({"ok": false, "error": "unknown operation: requestDrumPattern"})
    );

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_health_reports_running_worker() {
    let (server, base, _assets) = start().await;

    let health: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["worker"], "running");
    assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));

    server.stop().await.unwrap();
}
