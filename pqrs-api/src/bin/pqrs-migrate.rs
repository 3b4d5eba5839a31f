//! Schema maintenance from the command line
//!
//! **Usage:**
//! ```bash
//! pqrs-migrate [--config FILE] [--database-url URL] run [--allow-destructive]
//! pqrs-migrate status
//! pqrs-migrate plan
//! pqrs-migrate reset --confirm PHRASE [--token TOKEN]
//! ```
//!
//! Exit status is non-zero when any step fails or the run cannot start.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pqrs_common::config::AppConfig;
use pqrs_common::db::{
    canonical, catalog, DbPool, MigrationRunner, ResetController, RunOptions, RunStatus, SchemaInspector,
};
use std::path::PathBuf;
use tracing::info;

/// PQRS schema reconciliation tool
#[derive(Parser, Debug)]
#[clap(name = "pqrs-migrate")]
#[clap(about = "Inspect, migrate or reset the PQRS database schema")]
struct Args {
    /// Configuration file (TOML)
    #[clap(long, env = "PQRS_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Database URL; overrides database.url
    #[clap(long, value_name = "URL")]
    database_url: Option<String>,

    /// Print results as JSON
    #[clap(long)]
    json: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply the migration catalog
    Run {
        /// Run destructive steps (also needs migrations.allow_destructive)
        #[clap(long)]
        allow_destructive: bool,
    },
    /// Show which canonical tables, columns and enum types exist
    Status,
    /// Show the statements a run would execute, without executing them
    Plan {
        #[clap(long)]
        allow_destructive: bool,
    },
    /// Drop the schema, rebuild it and seed the superadmin account
    Reset {
        /// Must equal maintenance.confirm_phrase exactly
        #[clap(long)]
        confirm: String,

        /// Maintenance token, when one is configured
        #[clap(long, env = "PQRS_MAINTENANCE_TOKEN")]
        token: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(url) = args.database_url {
        config.database.url = url;
        config.validate().context("Invalid configuration")?;
    }

    let mut db = DbPool::connect(&config.database)
        .await
        .context("Database connection failed")?;
    info!("Connected to {} database", db.dialect());

    let result = match args.command {
        Command::Run { allow_destructive } => run(&db, &config, allow_destructive, args.json).await,
        Command::Status => status(&db, args.json).await,
        Command::Plan { allow_destructive } => plan(&db, &config, allow_destructive, args.json).await,
        Command::Reset { confirm, token } => reset(&mut db, &config, &confirm, token.as_deref()).await,
    };

    db.close().await;
    result
}

async fn run(db: &DbPool, config: &AppConfig, allow_destructive: bool, json: bool) -> Result<()> {
    let options = RunOptions::from_config(&config.migrations, allow_destructive);
    if allow_destructive && !options.allow_destructive {
        eprintln!("note: migrations.allow_destructive is off; destructive steps stay skipped");
    }

    let report = MigrationRunner::new(db, options)
        .run(&catalog::active_steps())
        .await
        .context("Migration run failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for step in &report.steps {
            println!("{}", step);
        }
        println!(
            "\n{} applied, {} skipped, {} failed",
            report.applied().count(),
            report.skipped().count(),
            report.failed().count()
        );
    }

    if report.status() != RunStatus::Success {
        bail!("{} step(s) failed", report.failed().count());
    }
    Ok(())
}

async fn status(db: &DbPool, json: bool) -> Result<()> {
    let snapshot = SchemaInspector::new(db).snapshot().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!("dialect: {}", db.dialect());
    for table in canonical::TABLES {
        if !snapshot.table_exists(table.name) {
            println!("✗ {} (missing)", table.name);
            continue;
        }
        let missing: Vec<_> = table
            .columns
            .iter()
            .filter(|c| !snapshot.has_column(table.name, c.name))
            .map(|c| c.name)
            .collect();
        if missing.is_empty() {
            println!("✓ {}", table.name);
        } else {
            println!("⚠ {} (missing columns: {})", table.name, missing.join(", "));
        }
    }
    if db.adapter().supports_enum_types() {
        for descriptor in canonical::ENUMS {
            let labels = snapshot.enum_labels(descriptor.name);
            if !snapshot.enum_exists(descriptor.name) {
                println!("✗ enum {} (missing)", descriptor.name);
            } else if descriptor.is_miscased(labels) {
                println!("⚠ enum {} (labels {:?})", descriptor.name, labels);
            } else {
                println!("✓ enum {}", descriptor.name);
            }
        }
    }
    Ok(())
}

async fn plan(db: &DbPool, config: &AppConfig, allow_destructive: bool, json: bool) -> Result<()> {
    let options = RunOptions::from_config(&config.migrations, allow_destructive);
    let planned = MigrationRunner::new(db, options).plan(&catalog::active_steps()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&planned)?);
        return Ok(());
    }

    let mut pending = 0;
    for step in &planned {
        match step.skip {
            None => {
                pending += 1;
                println!("-- {}", step.id);
                for statement in &step.statements {
                    println!("{}", statement);
                }
            }
            Some(reason) if !step.statements.is_empty() => {
                println!("-- {} ({}; not executed)", step.id, reason);
                for statement in &step.statements {
                    println!("-- {}", statement);
                }
            }
            Some(_) => {}
        }
    }
    println!("-- {} step(s) pending", pending);
    Ok(())
}

async fn reset(db: &mut DbPool, config: &AppConfig, confirm: &str, token: Option<&str>) -> Result<()> {
    let summary = ResetController::new(db, config).run(confirm, token).await?;
    println!(
        "Database reset; {} migration steps applied, superadmin '{}' seeded",
        summary.migrations.applied().count(),
        summary.superadmin
    );
    Ok(())
}
