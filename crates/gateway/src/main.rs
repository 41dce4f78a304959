//! PaperGraph API Gateway
//!
//! The entry point for all external API requests.
//! Handles:
//! - Graph search orchestration (fusion, reduce/cluster, analytics, cache)
//! - Paper detail and citation expansion
//! - Stateless analysis endpoints
//! - Observability (logging, metrics, tracing)

mod handlers;
mod orchestrator;

use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use orchestrator::SearchOrchestrator;
use papergraph_common::{
    cache::SideCache, config::AppConfig, metrics, store::GraphCacheStore,
};
use papergraph_graph::cluster::RemoteClusterer;
use papergraph_graph::reduce::RemoteReducer;
use papergraph_providers::fusion::FusionEngine;
use papergraph_providers::openalex::OpenAlexClient;
use papergraph_providers::semantic_scholar::SemanticScholarClient;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub orchestrator: Arc<SearchOrchestrator>,
    pub semantic_scholar: Arc<SemanticScholarClient>,
    pub side_cache: Arc<SideCache>,
    pub store: GraphCacheStore,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .json()
        .init();

    info!("Starting PaperGraph API Gateway v{}", papergraph_common::VERSION);

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        e
    })?;
    let config = Arc::new(config);

    // Initialize metrics
    metrics::register_metrics();
    if config.observability.metrics_port > 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        info!("Prometheus exporter listening on {}", addr);
    }

    // Optional stores: both degrade to no-ops when unconfigured
    let store = GraphCacheStore::connect(&config.database).await;
    let side_cache = Arc::new(SideCache::connect(&config.redis).await);

    // Provider clients
    let openalex = Arc::new(OpenAlexClient::new(&config.openalex)?);
    let semantic_scholar = Arc::new(SemanticScholarClient::new(&config.semantic_scholar)?);

    // External compute seams
    let reducer = Arc::new(RemoteReducer::new(&config.compute)?);
    let clusterer = Arc::new(RemoteClusterer::new(&config.compute)?);

    let fusion = FusionEngine::new(openalex, semantic_scholar.clone());
    let orchestrator = Arc::new(SearchOrchestrator::new(
        config.graph.clone(),
        store.clone(),
        fusion,
        semantic_scholar.clone(),
        reducer,
        clusterer,
    ));

    // Create app state
    let state = AppState {
        config: config.clone(),
        orchestrator,
        semantic_scholar,
        side_cache,
        store,
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes
    let api_routes = Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        // Graph search
        .route("/search", post(handlers::search::search))
        // Paper endpoints
        .route("/papers/{id}", get(handlers::papers::get_paper))
        .route("/papers/{id}/references", get(handlers::papers::get_references))
        .route("/papers/{id}/citations", get(handlers::papers::get_citations))
        .route("/papers/{id}/expand", post(handlers::papers::expand_paper))
        // Analysis endpoints
        .route("/analysis/trends", post(handlers::analysis::analyze_trends))
        .route("/analysis/gaps", post(handlers::analysis::detect_gaps))
        // Incremental placement
        .route("/graph/place", post(handlers::layout::place_paper));

    // Compose the app
    Router::new()
        .nest("/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
