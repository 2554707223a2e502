use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use valet_graph::{ContextGraph, GraphConfig, LinkerConfig};
use valet_insights::{ActionExtractor, BriefConfig};
use valet_store::{Database, EventStore};

use crate::handlers;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    pub graph: GraphConfig,
    pub linker: LinkerConfig,
    pub brief: BriefConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".into(),
            port: 9270,
            graph: GraphConfig::default(),
            linker: LinkerConfig::default(),
            brief: BriefConfig::default(),
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<EventStore>,
    pub graph: Arc<ContextGraph>,
    pub extractor: Arc<ActionExtractor>,
    pub linker_config: LinkerConfig,
    pub brief_config: BriefConfig,
}

impl AppState {
    pub fn new(db: Database, config: &ServerConfig) -> Self {
        Self {
            store: Arc::new(EventStore::new(db.clone())),
            graph: Arc::new(ContextGraph::new(db, config.graph.clone())),
            extractor: Arc::new(ActionExtractor::new()),
            linker_config: config.linker.clone(),
            brief_config: config.brief.clone(),
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/events", post(handlers::submit_event))
        .route("/events/batch", post(handlers::submit_batch))
        .route("/activity", get(handlers::activity))
        .route("/today", get(handlers::today))
        .route("/stats", get(handlers::stats))
        .route("/cooccurrences", get(handlers::cooccurrences))
        .route("/people/{person_id}/timeline", get(handlers::timeline))
        .route("/people/{person_id}/interactions", get(handlers::interactions))
        .route("/meetings/{meeting_id}/brief", get(handlers::meeting_brief))
        .route("/meetings/{meeting_id}/insights", get(handlers::meeting_insights))
        .route(
            "/transcripts/{transcript_id}/insights",
            get(handlers::transcript_insights),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Create and start the server. Returns a handle that keeps it alive.
pub async fn start(config: ServerConfig, db: Database) -> Result<ServerHandle, std::io::Error> {
    let state = AppState::new(db, &config);
    let router = build_router(state);

    let addr = format!("{}:{}", config.bind_addr, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "valet server started");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server_handle,
    })
}

/// Handle returned by `start()`.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
}
