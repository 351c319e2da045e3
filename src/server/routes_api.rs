//! Channel management API.

use crate::config::{ChannelDefinition, ProgramHint};
use crate::server::AppContext;
use crate::sessions::ViewerSession;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

pub fn api_routes() -> Router<AppContext> {
    Router::new()
        .route("/channels", get(list_channels).post(create_channel))
        .route(
            "/channels/:channel_id",
            get(get_channel).put(update_channel).delete(delete_channel),
        )
        .route(
            "/channels/:channel_id/programs",
            get(get_programs).put(set_programs),
        )
        .route("/sessions", get(list_sessions))
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn bad_request(message: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": message.to_string()})),
    )
}

fn not_found(channel_id: u64) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": format!("Channel {channel_id} not found")})),
    )
}

async fn list_channels(State(ctx): State<AppContext>) -> Json<Vec<ChannelDefinition>> {
    Json(ctx.registry.snapshot())
}

async fn get_channel(
    State(ctx): State<AppContext>,
    Path(channel_id): Path<u64>,
) -> Result<Json<ChannelDefinition>, ApiError> {
    ctx.registry
        .get(channel_id)
        .map(Json)
        .ok_or_else(|| not_found(channel_id))
}

async fn create_channel(
    State(ctx): State<AppContext>,
    Json(mut channel): Json<ChannelDefinition>,
) -> Result<(StatusCode, Json<ChannelDefinition>), ApiError> {
    // Ids are assigned server-side; one supplied by the client is ignored.
    channel.id = ctx.registry.next_id();

    crate::config::validate_channel(&channel, &ctx.config.profiles).map_err(bad_request)?;

    ctx.registry.insert(channel.clone());
    tracing::info!("Created channel {} ('{}')", channel.id, channel.name);
    Ok((StatusCode::CREATED, Json(channel)))
}

async fn update_channel(
    State(ctx): State<AppContext>,
    Path(channel_id): Path<u64>,
    Json(mut channel): Json<ChannelDefinition>,
) -> Result<Json<ChannelDefinition>, ApiError> {
    let previous = ctx.registry.get(channel_id).ok_or_else(|| not_found(channel_id))?;

    channel.id = channel_id;
    crate::config::validate_channel(&channel, &ctx.config.profiles).map_err(bad_request)?;

    // A new source, profile or command invalidates running processes;
    // viewers reconnect onto a fresh one.
    if previous.source != channel.source
        || previous.profile != channel.profile
        || previous.custom_command != channel.custom_command
    {
        ctx.supervisor.stop(channel_id, None).await;
    }

    ctx.registry.update(channel_id, channel.clone());
    tracing::info!("Updated channel {}", channel_id);
    Ok(Json(channel))
}

async fn delete_channel(
    State(ctx): State<AppContext>,
    Path(channel_id): Path<u64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let removed = ctx.registry.remove(channel_id).ok_or_else(|| not_found(channel_id))?;
    ctx.supervisor.stop(channel_id, None).await;

    tracing::info!("Deleted channel {} ('{}')", channel_id, removed.name);
    Ok(Json(serde_json::json!({
        "message": "Channel deleted successfully",
        "channel": removed,
    })))
}

async fn get_programs(
    State(ctx): State<AppContext>,
    Path(channel_id): Path<u64>,
) -> Result<Json<Vec<ProgramHint>>, ApiError> {
    ctx.registry
        .get(channel_id)
        .map(|channel| Json(channel.next_programs))
        .ok_or_else(|| not_found(channel_id))
}

async fn set_programs(
    State(ctx): State<AppContext>,
    Path(channel_id): Path<u64>,
    Json(programs): Json<Vec<ProgramHint>>,
) -> Result<Json<Vec<ProgramHint>>, ApiError> {
    let mut channel = ctx.registry.get(channel_id).ok_or_else(|| not_found(channel_id))?;
    channel.next_programs = programs.clone();
    ctx.registry.update(channel_id, channel);
    Ok(Json(programs))
}

async fn list_sessions(State(ctx): State<AppContext>) -> Json<Vec<ViewerSession>> {
    Json(ctx.sessions.snapshot())
}
