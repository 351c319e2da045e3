//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which builds a full [`AppContext`] with a
//! fresh channel registry, process supervisor and scratch directory. The
//! [`with_server`] constructor starts Axum on a random port for
//! HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;

use chancast::config::{
    ChannelDefinition, CommandTemplate, Config, CustomCommandConfig, CustomCommandSpec,
    EncodingProfile,
};
use chancast::server::{create_router, AppContext};

/// Test harness wrapping a fully-constructed [`AppContext`] backed by a
/// throwaway scratch directory.
pub struct TestHarness {
    pub ctx: AppContext,
    _scratch: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new harness with auth disabled and a short grace period.
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(mut config: Config) -> Self {
        let scratch = tempfile::tempdir().expect("failed to create scratch dir");
        config.output.scratch_dir = scratch.path().to_path_buf();

        Self {
            ctx: AppContext::from_config(config),
            _scratch: scratch,
        }
    }

    /// Start an Axum server on a random port and return the harness
    /// together with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        Self::with_server_config(test_config()).await
    }

    /// Start an Axum server with custom config on a random port.
    pub async fn with_server_config(config: Config) -> (Self, SocketAddr) {
        let harness = Self::with_config(config);
        let app = create_router(harness.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (harness, addr)
    }
}

/// Default test configuration: auth disabled, one standard profile, a
/// 1-second grace period so stop tests stay fast.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.auth.enabled = false;
    config.output.grace_secs = 1;
    config
        .profiles
        .insert("standard".to_string(), EncodingProfile::default());
    config
}

/// A channel running an arbitrary command instead of a real transcoder.
pub fn custom_channel(id: u64, name: &str, argv: &[&str]) -> ChannelDefinition {
    ChannelDefinition {
        id,
        name: name.to_string(),
        source: format!("test://{id}"),
        custom_command: Some(CustomCommandConfig::Spec(CustomCommandSpec {
            command: Some(CommandTemplate::Argv(
                argv.iter().map(|s| s.to_string()).collect(),
            )),
            ..Default::default()
        })),
        ..Default::default()
    }
}

/// A long-running channel that exits promptly on SIGTERM.
pub fn sleep_channel(id: u64, name: &str) -> ChannelDefinition {
    custom_channel(id, name, &["sleep", "30"])
}
