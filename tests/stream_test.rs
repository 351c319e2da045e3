//! Streaming multiplexer integration tests.

mod common;

use common::{custom_channel, sleep_channel, TestHarness};
use std::time::Duration;

async fn active_transcoders(addr: &std::net::SocketAddr) -> i64 {
    let resp = reqwest::get(format!("http://{addr}/metrics")).await.unwrap();
    let json: serde_json::Value = resp.json().await.unwrap();
    json["active_transcoders"].as_i64().unwrap()
}

/// Poll until the active transcoder count reaches `expected`, or fail.
async fn wait_for_transcoders(addr: &std::net::SocketAddr, expected: i64) {
    for _ in 0..50 {
        if active_transcoders(addr).await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("transcoder count never reached {expected}");
}

#[tokio::test]
async fn unknown_channel_is_404() {
    let (_harness, addr) = TestHarness::with_server().await;
    let resp = reqwest::get(format!("http://{addr}/stream/99")).await.unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn unknown_variant_is_404() {
    let (harness, addr) = TestHarness::with_server().await;
    harness.ctx.registry.insert(sleep_channel(1, "One"));

    let resp = reqwest::get(format!("http://{addr}/stream/1?variant=hd"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    assert_eq!(active_transcoders(&addr).await, 0);
}

#[tokio::test]
async fn region_blocked_channel_is_403() {
    let (harness, addr) = TestHarness::with_server().await;
    let mut channel = sleep_channel(1, "Locked");
    channel.regions_blocked = vec!["US".to_string()];
    harness.ctx.registry.insert(channel);

    let resp = reqwest::get(format!("http://{addr}/stream/1?region=US"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = reqwest::get(format!("http://{addr}/stream/1?region=DE"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    drop(resp);
    harness.ctx.supervisor.stop(1, None).await;
}

#[tokio::test]
async fn relays_process_output_to_the_viewer() {
    let (harness, addr) = TestHarness::with_server().await;
    harness.ctx.registry.insert(custom_channel(
        1,
        "Emitter",
        &["sh", "-c", "printf streamdata"],
    ));

    let resp = reqwest::get(format!("http://{addr}/stream/1")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "video/mp2t");

    let body = resp.bytes().await.unwrap();
    assert_eq!(&body[..], &b"streamdata"[..]);
}

#[tokio::test]
async fn failed_start_is_500() {
    let (harness, addr) = TestHarness::with_server().await;
    harness.ctx.registry.insert(custom_channel(
        1,
        "Broken",
        &["/nonexistent-transcoder-binary"],
    ));

    let resp = reqwest::get(format!("http://{addr}/stream/1")).await.unwrap();
    assert_eq!(resp.status(), 500);
    assert_eq!(active_transcoders(&addr).await, 0);
}

#[tokio::test]
async fn missing_profile_is_500() {
    let (harness, addr) = TestHarness::with_server().await;
    let mut channel = sleep_channel(1, "NoProfile");
    channel.custom_command = None;
    channel.profile = None;
    harness.ctx.registry.insert(channel);

    let resp = reqwest::get(format!("http://{addr}/stream/1")).await.unwrap();
    assert_eq!(resp.status(), 500);
}

#[tokio::test]
async fn variant_selects_its_own_process_key() {
    let (harness, addr) = TestHarness::with_server().await;
    let mut channel = custom_channel(1, "Multi", &["sleep", "30"]);
    channel.variants.push(chancast::config::VariantDefinition {
        name: "low".to_string(),
        source: None,
        profile: None,
        custom_command: None,
        handler: None,
        input_options: None,
        input_args: None,
    });
    harness.ctx.registry.insert(channel);

    let shared = reqwest::get(format!("http://{addr}/stream/1")).await.unwrap();
    assert_eq!(shared.status(), 200);
    let low = reqwest::get(format!("http://{addr}/stream/1?variant=low"))
        .await
        .unwrap();
    assert_eq!(low.status(), 200);

    // Distinct variant tags mean distinct processes.
    wait_for_transcoders(&addr, 2).await;

    drop(shared);
    drop(low);
    harness.ctx.supervisor.stop(1, None).await;
}

#[tokio::test]
async fn shared_viewer_disconnect_leaves_process_running() {
    let (harness, addr) = TestHarness::with_server().await;
    harness.ctx.registry.insert(sleep_channel(1, "Shared"));

    let resp = reqwest::get(format!("http://{addr}/stream/1")).await.unwrap();
    assert_eq!(resp.status(), 200);
    wait_for_transcoders(&addr, 1).await;

    // Disconnect without reading the body to its end.
    drop(resp);
    tokio::time::sleep(Duration::from_millis(500)).await;

    // The shared process keeps serving; a dead one would only be
    // replaced by the next incoming request.
    assert_eq!(active_transcoders(&addr).await, 1);

    harness.ctx.supervisor.stop(1, None).await;
}

#[tokio::test]
async fn private_viewer_disconnect_stops_its_process() {
    let (harness, addr) = TestHarness::with_server().await;
    harness.ctx.registry.insert(sleep_channel(1, "Private"));

    let resp = reqwest::get(format!("http://{addr}/stream/1?overlap=false"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    wait_for_transcoders(&addr, 1).await;

    // A private instance is torn down as soon as its viewer leaves.
    drop(resp);
    wait_for_transcoders(&addr, 0).await;
}

#[tokio::test]
async fn two_private_viewers_get_independent_processes() {
    let (harness, addr) = TestHarness::with_server().await;
    harness.ctx.registry.insert(sleep_channel(1, "Private"));

    let first = reqwest::get(format!("http://{addr}/stream/1?overlap=false"))
        .await
        .unwrap();
    let second = reqwest::get(format!("http://{addr}/stream/1?overlap=false"))
        .await
        .unwrap();
    assert_eq!(first.status(), 200);
    assert_eq!(second.status(), 200);
    wait_for_transcoders(&addr, 2).await;

    // The two sessions carry distinct derived variant tags.
    let sessions = harness.ctx.sessions.snapshot();
    assert_eq!(sessions.len(), 2);
    assert!(sessions.iter().all(|s| s.private));
    assert!(sessions.iter().all(|s| s.variant.starts_with("default-")));
    assert_ne!(sessions[0].variant, sessions[1].variant);

    // Dropping one viewer stops only its own process.
    drop(first);
    wait_for_transcoders(&addr, 1).await;

    drop(second);
    wait_for_transcoders(&addr, 0).await;
}

#[tokio::test]
async fn viewer_sessions_are_listed_while_attached() {
    let (harness, addr) = TestHarness::with_server().await;
    harness.ctx.registry.insert(sleep_channel(1, "Watched"));

    let resp = reqwest::get(format!("http://{addr}/stream/1")).await.unwrap();
    assert_eq!(resp.status(), 200);
    wait_for_transcoders(&addr, 1).await;

    let listed: serde_json::Value = reqwest::get(format!("http://{addr}/api/sessions"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let sessions = listed.as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["channel_id"], 1);
    assert_eq!(sessions[0]["variant"], "default");
    assert_eq!(sessions[0]["private"], false);

    drop(resp);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(harness.ctx.sessions.is_empty());

    harness.ctx.supervisor.stop(1, None).await;
}
