//! Viewer-facing streaming routes: the playlist, the EPG, and the
//! chunked relay that multiplexes transcoder output to HTTP clients.

use crate::channels::{region, DEFAULT_VARIANT};
use crate::config::EncodingProfile;
use crate::epg::{build_epg_json, build_xmltv};
use crate::playlist::render_m3u;
use crate::server::AppContext;
use crate::sessions::ViewerSessions;
use crate::supervisor::{private_variant_tag, ProcessKey, ProcessSupervisor};
use axum::{
    body::Body,
    extract::{Host, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
    Json,
};
use bytes::Bytes;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::process::ChildStdout;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Relay chunk size in bytes.
const RELAY_CHUNK: usize = 4096;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub variant: Option<String>,
    /// `overlap=false` requests a private transcoder instance instead of
    /// sharing the channel's process with other viewers.
    pub overlap: Option<bool>,
    pub region: Option<String>,
}

type StreamRejection = (StatusCode, String);

/// Look up a channel, start (or reuse) its transcoder, and relay the
/// process output to the viewer.
pub async fn stream_channel(
    State(ctx): State<AppContext>,
    Path(channel_id): Path<u64>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<Response, StreamRejection> {
    let Some(channel) = ctx.registry.get(channel_id) else {
        return Err((
            StatusCode::NOT_FOUND,
            format!("Channel {channel_id} not found"),
        ));
    };

    let client_region = region::extract_region(query.region.as_deref(), &headers);
    if !region::is_allowed_for_region(&channel, client_region.as_deref()) {
        return Err((
            StatusCode::FORBIDDEN,
            format!("Channel {channel_id} is not available in your region"),
        ));
    }

    // A requested variant replaces whole fields of the definition for
    // this request only; an unknown name is a distinct not-found.
    let (effective, base_tag) = match &query.variant {
        Some(name) => match channel.variant(name).cloned() {
            Some(variant) => (channel.with_variant(&variant), name.clone()),
            None => {
                return Err((
                    StatusCode::NOT_FOUND,
                    format!("Variant '{name}' not found for channel {channel_id}"),
                ))
            }
        },
        None => (channel.clone(), DEFAULT_VARIANT.to_string()),
    };

    let profile = lookup_profile(&ctx, &effective, channel_id)?;

    let private = query.overlap == Some(false);
    let tag = if private {
        private_variant_tag(&base_tag)
    } else {
        base_tag
    };

    let (handle, resolved_tag) = ctx
        .supervisor
        .get_or_start(&effective, &profile, Some(&tag))
        .await
        .map_err(|e| {
            error!("Failed to start stream {channel_id}: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to start stream {channel_id}: {e}"),
            )
        })?;

    let client = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .unwrap_or("-")
        .trim()
        .to_string();
    let session_id = ctx
        .sessions
        .register(client, channel_id, resolved_tag.clone(), private);

    let guard = RelayGuard {
        supervisor: Arc::clone(&ctx.supervisor),
        sessions: ctx.sessions.clone(),
        session_id,
        channel_id,
        // Only a private instance is torn down when this viewer leaves.
        private_key: private.then(|| ProcessKey {
            channel: channel_id,
            variant: resolved_tag,
        }),
    };

    let state = RelayState {
        stdout: handle.stdout(),
        channel_id,
        _guard: guard,
    };

    let stream = futures::stream::unfold(state, |state| async move {
        let mut buf = vec![0u8; RELAY_CHUNK];
        let read = {
            let mut stdout = state.stdout.lock().await;
            stdout.read(&mut buf).await
        };
        match read {
            Ok(0) => {
                warn!("Stream {} ended or transcoder died", state.channel_id);
                None
            }
            Ok(n) => {
                buf.truncate(n);
                Some((Ok::<Bytes, std::io::Error>(Bytes::from(buf)), state))
            }
            Err(e) => {
                error!("Error while relaying stream {}: {e}", state.channel_id);
                None
            }
        }
    });

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp2t")
        .body(Body::from_stream(stream))
        .unwrap())
}

fn lookup_profile(
    ctx: &AppContext,
    effective: &crate::config::ChannelDefinition,
    channel_id: u64,
) -> Result<EncodingProfile, StreamRejection> {
    let profiles = &ctx.config.profiles;

    if effective.custom_command.is_some() {
        // A custom command carries its own output plan; a named profile
        // is optional extra context.
        return Ok(effective
            .profile
            .as_ref()
            .and_then(|name| profiles.get(name))
            .cloned()
            .unwrap_or_default());
    }

    let name = effective.profile.as_ref().ok_or_else(|| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Channel {channel_id} is missing a profile configuration"),
        )
    })?;

    profiles.get(name).cloned().ok_or_else(|| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Profile '{name}' not found for channel {channel_id}"),
        )
    })
}

struct RelayState {
    stdout: Arc<Mutex<ChildStdout>>,
    channel_id: u64,
    _guard: RelayGuard,
}

/// Runs when the viewer disconnects or the stream ends. A private
/// instance is stopped immediately; a shared one is left running for the
/// other viewers and only respawned lazily by the next request.
struct RelayGuard {
    supervisor: Arc<ProcessSupervisor>,
    sessions: ViewerSessions,
    session_id: String,
    channel_id: u64,
    private_key: Option<ProcessKey>,
}

impl Drop for RelayGuard {
    fn drop(&mut self) {
        self.sessions.end(&self.session_id);

        match self.private_key.take() {
            Some(key) => {
                if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                    let supervisor = Arc::clone(&self.supervisor);
                    runtime.spawn(async move {
                        supervisor.stop(key.channel, Some(&key.variant)).await;
                    });
                }
            }
            None => info!("Viewer disconnected from channel {}", self.channel_id),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PlaylistQuery {
    pub region: Option<String>,
    pub group: Option<String>,
    pub ids: Option<String>,
}

/// Dynamic M3U playlist of all channels visible to the caller.
pub async fn playlist(
    State(ctx): State<AppContext>,
    Host(host): Host,
    Query(query): Query<PlaylistQuery>,
    headers: HeaderMap,
) -> Response {
    let client_region = region::extract_region(query.region.as_deref(), &headers);
    let groups = region::parse_group_filter(query.group.as_deref());
    let ids = region::parse_id_filter(query.ids.as_deref());

    let channels = region::filter_channels(
        ctx.registry.snapshot(),
        client_region.as_deref(),
        groups.as_ref(),
        ids.as_ref(),
    );

    let token = ctx
        .config
        .auth
        .enabled
        .then(|| ctx.config.auth.token.as_str());
    let m3u = render_m3u(&channels, &format!("http://{host}"), token);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/vnd.apple.mpegurl")
        .body(Body::from(m3u))
        .unwrap()
}

pub async fn epg_xml(State(ctx): State<AppContext>) -> Response {
    let xml = build_xmltv(&ctx.registry.snapshot());
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/xml")
        .body(Body::from(xml))
        .unwrap()
}

pub async fn epg_json(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    Json(build_epg_json(&ctx.registry.snapshot()))
}

/// Simple server metrics.
pub async fn metrics(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "uptime_seconds": (Utc::now() - ctx.started_at).num_seconds(),
        "channel_count": ctx.registry.len(),
        "active_transcoders": ctx.supervisor.active_count().await,
        "active_viewers": ctx.sessions.len(),
    }))
}
