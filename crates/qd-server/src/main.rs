//! QD3176 claims server - Main entry point

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use qd_common::logging::{init_logging, LogConfig};
use serde_json::json;
use std::{net::SocketAddr, time::Duration};
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tracing::info;

use qd_server::{
    config::Config,
    db,
    events::{ProgressHub, ProgressPublisher},
    features,
    ingest::{spawn_workers, IngestProducer, PersistHandler, WorkerContext},
    middleware,
    queue::{JobQueue, RetryPolicy},
};

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    db: sqlx::PgPool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with configuration from environment
    let log_config = LogConfig::builder()
        .log_file_prefix("qd-server".to_string())
        .filter_directives("qd_server=debug,tower_http=debug,axum=trace,sqlx=info".to_string())
        .build();

    // Merge with environment variables (they take precedence)
    let log_config = LogConfig::from_env().unwrap_or(log_config);

    init_logging(&log_config)?;

    info!("Starting QD3176 claims server");

    // Load configuration
    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    // Initialize database connection pool
    let db_pool = db::create_pool(&config.database).await?;
    info!("Database connection pool established");

    // Run migrations
    sqlx::migrate!("../../migrations")
        .run(&db_pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;

    info!("Database migrations completed");

    // Progress plumbing: publisher writes to pg_notify, hub fans
    // notifications out to SSE subscribers.
    let publisher = ProgressPublisher::new(db_pool.clone());
    let hub = ProgressHub::start(&db_pool).await?;

    // Ingest queue and its worker pool
    let queue = JobQueue::new(
        db_pool.clone(),
        RetryPolicy {
            max_attempts: config.ingest.max_attempts,
            backoff_base: Duration::from_secs(config.ingest.retry_base_secs),
            lock_timeout: Duration::from_secs(config.ingest.lock_timeout_secs),
        },
    );
    let persist = PersistHandler::new(db_pool.clone(), publisher.clone());
    spawn_workers(
        WorkerContext {
            queue: queue.clone(),
            persist,
            publisher: publisher.clone(),
            poll_interval: Duration::from_millis(config.ingest.poll_interval_ms),
        },
        config.ingest.worker_concurrency,
    );
    info!(
        concurrency = config.ingest.worker_concurrency,
        "Ingest workers started"
    );

    let producer = IngestProducer::new(
        queue,
        config.ingest.staging_dir.clone(),
        Duration::from_secs(config.ingest.finalize_delay_secs),
    );

    // Create application state
    let state = AppState { db: db_pool };

    // Build the application router
    let app = create_router(state, producer, hub, &config);

    // Create socket address
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    // Create TCP listener
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Start server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
        .await?;

    info!("Server shut down gracefully");

    Ok(())
}

/// Create the application router with all routes and middleware
fn create_router(
    state: AppState,
    producer: IngestProducer,
    hub: ProgressHub,
    config: &Config,
) -> Router {
    let feature_state = features::FeatureState { producer, hub };
    let feature_routes = features::router(feature_state);

    // Build the main router with middleware stack
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .with_state(state)
        .nest("/api/v1", feature_routes)
        // Apply layers from innermost to outermost
        .layer(CompressionLayer::new())
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(&config.cors))
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "QD3176 Claims Server",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

/// Health check handler
async fn health_check(State(state): State<AppState>) -> Result<Response, StatusCode> {
    // Check database connectivity
    match db::health_check(&state.db).await {
        Ok(()) => Ok((
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "database": "connected"
            })),
        )
            .into_response()),
        Err(e) => {
            tracing::error!("Database health check failed: {:?}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        },
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    // Give ongoing requests time to complete
    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
