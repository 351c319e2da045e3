use crate::channels::ChannelRegistry;
use crate::config::Config;
use crate::resolve::handler::YtDlpResolver;
use crate::schedule::ScheduleController;
use crate::sessions::ViewerSessions;
use crate::supervisor::ProcessSupervisor;
use anyhow::{Context, Result};
use axum::{
    http::{header, Method, StatusCode},
    middleware,
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod auth;
pub mod routes_api;
pub mod routes_stream;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub registry: Arc<ChannelRegistry>,
    pub supervisor: Arc<ProcessSupervisor>,
    pub sessions: ViewerSessions,
    pub started_at: DateTime<Utc>,
}

impl AppContext {
    /// Build the full context from a loaded configuration.
    pub fn from_config(config: Config) -> Self {
        let registry = Arc::new(ChannelRegistry::from_channels(config.channels.clone()));
        let supervisor = Arc::new(ProcessSupervisor::new(
            Arc::new(YtDlpResolver::new()),
            config.output.scratch_dir.clone(),
            Duration::from_secs(config.output.grace_secs),
        ));

        Self {
            config: Arc::new(config),
            registry,
            supervisor,
            sessions: ViewerSessions::new(),
            started_at: Utc::now(),
        }
    }
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    // /health and /metrics stay reachable without a token.
    let open_routes = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(routes_stream::metrics));

    let protected_routes = Router::new()
        .route("/playlist.m3u", get(routes_stream::playlist))
        .route("/epg.xml", get(routes_stream::epg_xml))
        .route("/epg.json", get(routes_stream::epg_json))
        .route("/stream/:channel_id", get(routes_stream::stream_channel))
        .nest("/api", routes_api::api_routes())
        .layer(middleware::from_fn_with_state(
            ctx.clone(),
            auth::token_auth_middleware,
        ));

    open_routes
        .merge(protected_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Start the HTTP server and block until shutdown.
pub async fn start_server(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let scheduled = config.scheduled_channels.clone();
    let static_ids = config.channels.iter().map(|c| c.id).collect();

    let ctx = AppContext::from_config(config);

    let scheduler = ScheduleController::new(
        Arc::clone(&ctx.registry),
        Arc::clone(&ctx.supervisor),
        static_ids,
    );
    scheduler.load(&scheduled);

    let supervisor = Arc::clone(&ctx.supervisor);
    let app = create_router(ctx);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Registry-wide cleanup runs exactly once, however many shutdown
    // signals arrived.
    scheduler.shutdown();
    supervisor.cleanup_all().await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
