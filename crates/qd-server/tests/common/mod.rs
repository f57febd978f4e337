//! Shared utilities for integration tests that need a live PostgreSQL.
//!
//! Spins up a throwaway Postgres container per test via testcontainers,
//! runs the crate's migrations, and hands back a connected pool. Tests
//! using this module carry `#[ignore = "requires Docker"]` and run with
//! `cargo test -- --ignored` on a machine with Docker available.

#![allow(dead_code)]

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::{debug, info};

/// PostgreSQL test container with migrations pre-applied.
///
/// The container lives as long as this struct; dropping it tears the
/// database down.
pub struct TestPostgres {
    container: ContainerAsync<Postgres>,
    pool: PgPool,
    connection_string: String,
}

impl TestPostgres {
    /// Start a container with default options and run migrations.
    pub async fn start() -> Result<Self> {
        Self::start_with_options(PostgresOptions::default()).await
    }

    pub async fn start_with_options(options: PostgresOptions) -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .with_tag(&options.version)
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let connection_string =
            format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

        debug!("PostgreSQL connection: {}", connection_string);

        let pool = PgPoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(Duration::from_secs(options.acquire_timeout_secs))
            .connect(&connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        if options.run_migrations {
            info!("Running database migrations...");
            sqlx::migrate!("../../migrations")
                .run(&pool)
                .await
                .context("Failed to run migrations")?;
        }

        Ok(Self {
            container,
            pool,
            connection_string,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn pool_clone(&self) -> PgPool {
        self.pool.clone()
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }
}

/// Configuration options for the PostgreSQL test container.
pub struct PostgresOptions {
    /// PostgreSQL version/tag (default: "16-alpine")
    pub version: String,
    /// Maximum number of connections in the pool (default: 5)
    pub max_connections: u32,
    /// Connection acquire timeout in seconds (default: 30)
    pub acquire_timeout_secs: u64,
    /// Whether to run migrations on startup (default: true)
    pub run_migrations: bool,
}

impl Default for PostgresOptions {
    fn default() -> Self {
        Self {
            version: "16-alpine".to_string(),
            max_connections: 5,
            acquire_timeout_secs: 30,
            run_migrations: true,
        }
    }
}

/// Initialize tracing for tests.
///
/// Call this at the start of a test to enable logging.
pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,qd_server=debug,sqlx=warn,testcontainers=info")
        }))
        .with_test_writer()
        .try_init();
}
