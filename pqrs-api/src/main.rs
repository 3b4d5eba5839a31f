//! pqrs-api: schema maintenance service of the PQRS backend
//!
//! Startup:
//! 1. Tracing and build identification
//! 2. Configuration (file, then `PQRS_*` environment)
//! 3. Database connection; the dialect comes from the URL scheme
//! 4. Migration catalog, when `migrations.run_on_startup` is set
//! 5. HTTP server

use anyhow::{Context, Result};
use clap::Parser;
use pqrs_common::config::AppConfig;
use pqrs_common::db::{catalog, DbPool, MigrationRunner, RunOptions, RunStatus};
use pqrs_common::Error;
use pqrs_api::{build_router, AppState};
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[clap(name = "pqrs-api")]
#[clap(about = "PQRS schema maintenance service")]
struct Args {
    /// Configuration file (TOML)
    #[clap(long, env = "PQRS_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Listen address; overrides server.bind
    #[clap(long, value_name = "ADDR")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!(
        "Starting PQRS API (pqrs-api) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();
    let mut config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    let db = match DbPool::connect(&config.database).await {
        Ok(db) => {
            info!("✓ Connected to {} database", db.dialect());
            db
        }
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            return Err(e).context("Database connection failed");
        }
    };

    if config.migrations.run_on_startup {
        run_startup_migrations(&db, &config).await?;
    } else {
        info!("Startup migrations disabled (migrations.run_on_startup = false)");
    }

    let bind = config.server.bind.clone();
    let app = build_router(AppState::new(db, config));

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("pqrs-api listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Run the catalog once before serving
///
/// Step failures and a busy lock are logged and startup continues; only a
/// connection failure stops the service.
async fn run_startup_migrations(db: &DbPool, config: &AppConfig) -> Result<()> {
    let options = RunOptions::from_config(&config.migrations, false);
    match MigrationRunner::new(db, options).run(&catalog::active_steps()).await {
        Ok(report) => {
            match report.status() {
                RunStatus::Success => info!("✓ Startup migrations complete"),
                status => {
                    for step in report.failed() {
                        warn!("  ⚠ {}", step);
                    }
                    warn!("⚠ Startup migrations finished with status {:?}", status);
                }
            }
            Ok(())
        }
        Err(Error::LockUnavailable(msg)) => {
            info!("Skipping startup migrations: {}", msg);
            Ok(())
        }
        Err(e) if e.is_transient() => Err(e).context("Startup migrations lost the database connection"),
        Err(e) => {
            error!("Startup migrations failed: {}", e);
            Ok(())
        }
    }
}
