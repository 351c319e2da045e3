//! Management API integration tests against a server on a random port.

mod common;

use common::{custom_channel, sleep_channel, test_config, TestHarness};

fn channel_payload() -> serde_json::Value {
    serde_json::json!({
        "name": "Created",
        "source": "http://example.com/created",
        "profile": "standard",
    })
}

#[tokio::test]
async fn health_check_returns_200() {
    let (_harness, addr) = TestHarness::with_server().await;
    let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn create_and_fetch_channel() {
    let (_harness, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/api/channels"))
        .json(&channel_payload())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let created: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(created["id"], 1);
    assert_eq!(created["name"], "Created");

    let resp = reqwest::get(format!("http://{addr}/api/channels/1"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let fetched: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(fetched["source"], "http://example.com/created");

    let resp = reqwest::get(format!("http://{addr}/api/channels"))
        .await
        .unwrap();
    let listed: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_channel_is_404() {
    let (_harness, addr) = TestHarness::with_server().await;
    let resp = reqwest::get(format!("http://{addr}/api/channels/99"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn create_rejects_unknown_profile() {
    let (_harness, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    let mut payload = channel_payload();
    payload["profile"] = serde_json::json!("missing");

    let resp = client
        .post(format!("http://{addr}/api/channels"))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn create_requires_profile_or_custom_command() {
    let (_harness, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    let payload = serde_json::json!({
        "name": "Bare",
        "source": "http://example.com/bare",
    });
    let resp = client
        .post(format!("http://{addr}/api/channels"))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn update_replaces_definition() {
    let (harness, addr) = TestHarness::with_server().await;
    harness.ctx.registry.insert(sleep_channel(1, "Before"));
    let client = reqwest::Client::new();

    let mut updated = serde_json::to_value(custom_channel(1, "After", &["sleep", "30"])).unwrap();
    updated["group"] = serde_json::json!("Late Night");

    let resp = client
        .put(format!("http://{addr}/api/channels/1"))
        .json(&updated)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let fetched = harness.ctx.registry.get(1).unwrap();
    assert_eq!(fetched.name, "After");
    assert_eq!(fetched.group.as_deref(), Some("Late Night"));
}

#[tokio::test]
async fn update_stops_processes_when_source_changes() {
    let (harness, addr) = TestHarness::with_server().await;
    let channel = sleep_channel(1, "Running");
    harness.ctx.registry.insert(channel.clone());

    harness
        .ctx
        .supervisor
        .get_or_start(&channel, &Default::default(), None)
        .await
        .unwrap();
    assert_eq!(harness.ctx.supervisor.active_count().await, 1);

    let mut replacement = channel.clone();
    replacement.source = "test://elsewhere".to_string();

    let client = reqwest::Client::new();
    let resp = client
        .put(format!("http://{addr}/api/channels/1"))
        .json(&serde_json::to_value(replacement).unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(harness.ctx.supervisor.active_count().await, 0);
}

#[tokio::test]
async fn delete_removes_and_stops() {
    let (harness, addr) = TestHarness::with_server().await;
    let channel = sleep_channel(2, "Doomed");
    harness.ctx.registry.insert(channel.clone());
    harness
        .ctx
        .supervisor
        .get_or_start(&channel, &Default::default(), None)
        .await
        .unwrap();

    let client = reqwest::Client::new();
    let resp = client
        .delete(format!("http://{addr}/api/channels/2"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    assert!(harness.ctx.registry.get(2).is_none());
    assert_eq!(harness.ctx.supervisor.active_count().await, 0);

    let resp = client
        .delete(format!("http://{addr}/api/channels/2"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn programs_roundtrip() {
    let (harness, addr) = TestHarness::with_server().await;
    harness.ctx.registry.insert(sleep_channel(3, "Shows"));
    let client = reqwest::Client::new();

    let programs = serde_json::json!([
        {"title": "Morning Show", "start": "2030-03-01T08:00:00Z"},
        {"title": "Evening Recap"},
    ]);
    let resp = client
        .put(format!("http://{addr}/api/channels/3/programs"))
        .json(&programs)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = reqwest::get(format!("http://{addr}/api/channels/3/programs"))
        .await
        .unwrap();
    let fetched: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(fetched.as_array().unwrap().len(), 2);
    assert_eq!(fetched[0]["title"], "Morning Show");
}

#[tokio::test]
async fn auth_token_is_enforced() {
    let mut config = test_config();
    config.auth.enabled = true;
    config.auth.token = "sekrit".to_string();
    let (_harness, addr) = TestHarness::with_server_config(config).await;
    let client = reqwest::Client::new();

    // No token.
    let resp = reqwest::get(format!("http://{addr}/playlist.m3u")).await.unwrap();
    assert_eq!(resp.status(), 401);

    // Wrong token.
    let resp = reqwest::get(format!("http://{addr}/playlist.m3u?token=wrong"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    // Query token.
    let resp = reqwest::get(format!("http://{addr}/playlist.m3u?token=sekrit"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Header token.
    let resp = client
        .get(format!("http://{addr}/api/channels"))
        .header("X-Chancast-Token", "sekrit")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Health and metrics stay open.
    let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let resp = reqwest::get(format!("http://{addr}/metrics")).await.unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn playlist_renders_channels() {
    let (harness, addr) = TestHarness::with_server().await;
    let mut channel = sleep_channel(1, "News");
    channel.group = Some("Info".to_string());
    harness.ctx.registry.insert(channel);

    let resp = reqwest::get(format!("http://{addr}/playlist.m3u")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()["content-type"],
        "application/vnd.apple.mpegurl"
    );

    let body = resp.text().await.unwrap();
    assert!(body.starts_with("#EXTM3U"));
    assert!(body.contains("group-title=\"Info\""));
    assert!(body.contains(&format!("http://{addr}/stream/1")));
}

#[tokio::test]
async fn playlist_filters_by_region() {
    let (harness, addr) = TestHarness::with_server().await;
    let mut open = sleep_channel(1, "Open");
    open.regions_blocked = vec!["US".to_string()];
    harness.ctx.registry.insert(open);
    harness.ctx.registry.insert(sleep_channel(2, "Everywhere"));

    let resp = reqwest::get(format!("http://{addr}/playlist.m3u?region=US"))
        .await
        .unwrap();
    let body = resp.text().await.unwrap();
    assert!(!body.contains("Open"));
    assert!(body.contains("Everywhere"));
}

#[tokio::test]
async fn epg_endpoints_render() {
    let (harness, addr) = TestHarness::with_server().await;
    let mut channel = sleep_channel(4, "Movies");
    channel.next_programs.push(chancast::config::ProgramHint {
        title: "Feature".to_string(),
        start: Some("2030-02-01T22:00:00Z".to_string()),
        end: None,
        description: None,
    });
    harness.ctx.registry.insert(channel);

    let resp = reqwest::get(format!("http://{addr}/epg.xml")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body = resp.text().await.unwrap();
    assert!(body.contains("<programme"));
    assert!(body.contains("<title>Feature</title>"));

    let resp = reqwest::get(format!("http://{addr}/epg.json")).await.unwrap();
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json[0]["name"], "Movies");
}

#[tokio::test]
async fn metrics_reports_counts() {
    let (harness, addr) = TestHarness::with_server().await;
    harness.ctx.registry.insert(sleep_channel(1, "One"));

    let resp = reqwest::get(format!("http://{addr}/metrics")).await.unwrap();
    let json: serde_json::Value = resp.json().await.unwrap();

    assert_eq!(json["channel_count"], 1);
    assert_eq!(json["active_transcoders"], 0);
    assert_eq!(json["active_viewers"], 0);
    assert!(json["uptime_seconds"].as_i64().unwrap() >= 0);
}
