//! Migration runner behaviour against real SQLite files
//!
//! - Re-running the catalog changes nothing
//! - Legacy schemas are brought up to the canonical shape
//! - A failing step is isolated from its neighbours
//! - Concurrent runs are excluded by the migration lock

use pqrs_common::config::DatabaseConfig;
use pqrs_common::db::catalog;
use pqrs_common::db::descriptor::{ColumnDescriptor as Col, ColumnType as T, DefaultValue as D, IndexDescriptor};
use pqrs_common::db::ledger::Ledger;
use pqrs_common::db::lock::MigrationLock;
use pqrs_common::db::{
    canonical, DbPool, MigrationRunner, MigrationStep, RunOptions, RunStatus, SchemaInspector, SkipReason,
    StepOutcome,
};
use pqrs_common::Error;
use std::time::Duration;
use tempfile::TempDir;

async fn file_db(dir: &TempDir) -> DbPool {
    DbPool::connect(&DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("pqrs.db").display()),
        ..DatabaseConfig::default()
    })
    .await
    .unwrap()
}

fn sqlite_pool(db: &DbPool) -> &sqlx::SqlitePool {
    match db {
        DbPool::Sqlite(handle) => &handle.pool,
        DbPool::Postgres(_) => panic!("expected sqlite"),
    }
}

#[tokio::test]
async fn test_fresh_database_reaches_canonical_schema() {
    let dir = TempDir::new().unwrap();
    let db = file_db(&dir).await;

    let report = MigrationRunner::new(&db, RunOptions::default())
        .run(&catalog::active_steps())
        .await
        .unwrap();
    assert_eq!(report.failed().count(), 0, "failures: {:?}", report.steps);
    assert_eq!(report.status(), RunStatus::Success);

    let snapshot = SchemaInspector::new(&db).snapshot().await.unwrap();
    for table in canonical::TABLES {
        assert!(snapshot.table_exists(table.name), "missing table {}", table.name);
        for column in table.columns {
            assert!(
                snapshot.has_column(table.name, column.name),
                "missing column {}.{}",
                table.name,
                column.name
            );
        }
        for index in table.indexes {
            assert!(snapshot.has_index(table.name, index.name), "missing index {}", index.name);
        }
    }
}

#[tokio::test]
async fn test_second_run_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let db = file_db(&dir).await;
    let runner = MigrationRunner::new(&db, RunOptions::default());
    let steps = catalog::active_steps();

    runner.run(&steps).await.unwrap();
    let before = SchemaInspector::new(&db).snapshot().await.unwrap();
    let ledger_before = Ledger::load(&db).await.unwrap();

    let second = runner.run(&steps).await.unwrap();
    assert_eq!(second.applied().count(), 0);
    assert_eq!(second.failed().count(), 0);
    assert_eq!(second.status(), RunStatus::Success);

    let after = SchemaInspector::new(&db).snapshot().await.unwrap();
    assert_eq!(before.tables.keys().collect::<Vec<_>>(), after.tables.keys().collect::<Vec<_>>());
    for (name, table) in &before.tables {
        let columns_before: Vec<_> = table.columns.iter().map(|c| &c.name).collect();
        let columns_after: Vec<_> = after.tables[name].columns.iter().map(|c| &c.name).collect();
        assert_eq!(columns_before, columns_after, "columns of {} changed", name);
    }
    assert_eq!(ledger_before, Ledger::load(&db).await.unwrap());
}

#[tokio::test]
async fn test_legacy_schema_is_upgraded() {
    let dir = TempDir::new().unwrap();
    let db = file_db(&dir).await;
    let pool = sqlite_pool(&db);

    sqlx::query(
        r#"
        CREATE TABLE entities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name VARCHAR(200) NOT NULL UNIQUE,
            code VARCHAR(50) NOT NULL UNIQUE,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .unwrap();
    sqlx::query(
        r#"
        CREATE TABLE users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username VARCHAR(100) NOT NULL UNIQUE,
            email VARCHAR(150) NOT NULL UNIQUE,
            full_name VARCHAR(200) NOT NULL,
            hashed_password TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'SECRETARIO',
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .unwrap();
    sqlx::query("INSERT INTO entities (name, code) VALUES ('Alcaldia de Prueba', 'ALC-PRUEBA')")
        .execute(pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO users (username, email, full_name, hashed_password, role) \
         VALUES ('jperez', 'jperez@example.org', 'Juan Perez', 'x', 'ADMIN')",
    )
    .execute(pool)
    .await
    .unwrap();

    let report = MigrationRunner::new(&db, RunOptions::default())
        .run(&catalog::active_steps())
        .await
        .unwrap();
    assert_eq!(report.failed().count(), 0, "failures: {:?}", report.steps);
    assert_eq!(report.outcome_of("add_nit_column"), Some(&StepOutcome::Applied));
    assert_eq!(report.outcome_of("add_users_entity_id_column"), Some(&StepOutcome::Applied));
    // Constraints cannot be added to an existing SQLite table
    assert_eq!(
        report.outcome_of("add_users_entity_fk"),
        Some(&StepOutcome::Skipped(SkipReason::UnsupportedByDialect))
    );

    let (slug, flag): (String, bool) = sqlx::query_as("SELECT slug, enable_pdm FROM entities")
        .fetch_one(pool)
        .await
        .unwrap();
    assert_eq!(slug, "alc-prueba");
    assert!(flag);

    let (role, active): (String, bool) = sqlx::query_as("SELECT role, is_active FROM users")
        .fetch_one(pool)
        .await
        .unwrap();
    assert_eq!(role, "admin");
    assert!(active);

    let snapshot = SchemaInspector::new(&db).snapshot().await.unwrap();
    assert!(snapshot.has_index("entities", "ux_entities_slug"));
    assert!(snapshot.table_exists("pqrs"));
}

#[tokio::test]
async fn test_tenant_less_rows_get_a_default_entity() {
    let dir = TempDir::new().unwrap();
    let db = file_db(&dir).await;
    let pool = sqlite_pool(&db);

    sqlx::query(
        r#"
        CREATE TABLE pqrs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            numero_radicado VARCHAR(50) NOT NULL UNIQUE,
            asunto VARCHAR(300) NOT NULL,
            descripcion TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO pqrs (numero_radicado, asunto, descripcion) \
         VALUES ('PQRS-2023-0001', 'Alumbrado', 'Poste apagado'), ('PQRS-2023-0002', 'Vias', 'Hueco en la calle')",
    )
    .execute(pool)
    .await
    .unwrap();

    let runner = MigrationRunner::new(&db, RunOptions::default());
    let report = runner.run(&catalog::active_steps()).await.unwrap();
    assert_eq!(report.failed().count(), 0, "failures: {:?}", report.steps);
    assert_eq!(report.outcome_of("seed_default_entity"), Some(&StepOutcome::Applied));
    assert_eq!(report.outcome_of("backfill_pqrs_entity_id"), Some(&StepOutcome::Applied));

    let (entity_id, code): (i64, String) = sqlx::query_as("SELECT id, code FROM entities")
        .fetch_one(pool)
        .await
        .unwrap();
    assert_eq!(code, "DEFAULT");

    let (orphans,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pqrs WHERE entity_id IS NULL")
        .fetch_one(pool)
        .await
        .unwrap();
    assert_eq!(orphans, 0);
    let (owned,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pqrs WHERE entity_id = ?")
        .bind(entity_id)
        .fetch_one(pool)
        .await
        .unwrap();
    assert_eq!(owned, 2);

    // The default entity is created once
    let again = runner.run(&catalog::active_steps()).await.unwrap();
    assert_eq!(again.applied().count(), 0);
    let (entities,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entities")
        .fetch_one(pool)
        .await
        .unwrap();
    assert_eq!(entities, 1);
}

#[tokio::test]
async fn test_fresh_database_gets_no_default_entity() {
    let dir = TempDir::new().unwrap();
    let db = file_db(&dir).await;

    MigrationRunner::new(&db, RunOptions::default())
        .run(&catalog::active_steps())
        .await
        .unwrap();

    let (entities,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entities")
        .fetch_one(sqlite_pool(&db))
        .await
        .unwrap();
    assert_eq!(entities, 0);
}

#[tokio::test]
async fn test_failing_step_is_isolated() {
    let dir = TempDir::new().unwrap();
    let db = file_db(&dir).await;

    let steps = vec![
        MigrationStep::create_table("create_entities_table", &canonical::ENTITIES),
        MigrationStep::add_column("add_extra_a", "entities", Col::new("extra_a", T::Text)),
        MigrationStep::create_index(
            "index_missing_column",
            "entities",
            IndexDescriptor { name: "ix_entities_missing", columns: &["no_such_column"], unique: false },
        ),
        MigrationStep::add_column("add_extra_b", "entities", Col::new("extra_b", T::Text)),
        MigrationStep::backfill("backfill_extra_b", "entities", "extra_b", D::Text("x")),
    ];

    let runner = MigrationRunner::new(&db, RunOptions::default());
    let report = runner.run(&steps).await.unwrap();

    assert_eq!(report.status(), RunStatus::Partial);
    assert_eq!(report.applied().count(), 4);
    assert!(matches!(report.outcome_of("index_missing_column"), Some(StepOutcome::Failed(_))));

    let snapshot = SchemaInspector::new(&db).snapshot().await.unwrap();
    assert!(snapshot.has_column("entities", "extra_a"));
    assert!(snapshot.has_column("entities", "extra_b"));
    assert!(!snapshot.has_index("entities", "ix_entities_missing"));

    let ledger = Ledger::load(&db).await.unwrap();
    assert!(ledger.contains("add_extra_b"));
    assert!(!ledger.contains("index_missing_column"));

    let response = report.to_response();
    assert_eq!(response.status, RunStatus::Partial);
    assert_eq!(response.errors.len(), 1);

    // Only the broken step is attempted again
    let again = runner.run(&steps).await.unwrap();
    assert_eq!(again.applied().count(), 0);
    assert_eq!(again.failed().count(), 1);
}

#[tokio::test]
async fn test_destructive_step_requires_opt_in() {
    let dir = TempDir::new().unwrap();
    let db = file_db(&dir).await;

    let steps = vec![
        MigrationStep::create_table("create_entities_table", &canonical::ENTITIES),
        MigrationStep::add_column("add_scratch", "entities", Col::new("scratch", T::Text)).destructive(),
    ];

    let report = MigrationRunner::new(&db, RunOptions::default()).run(&steps).await.unwrap();
    assert_eq!(
        report.outcome_of("add_scratch"),
        Some(&StepOutcome::Skipped(SkipReason::RequiresOptIn))
    );

    let options = RunOptions {
        allow_destructive: true,
        ..RunOptions::default()
    };
    let report = MigrationRunner::new(&db, options).run(&steps).await.unwrap();
    assert_eq!(report.outcome_of("add_scratch"), Some(&StepOutcome::Applied));
}

#[tokio::test]
async fn test_plan_does_not_modify_database() {
    let dir = TempDir::new().unwrap();
    let db = file_db(&dir).await;

    let planned = MigrationRunner::new(&db, RunOptions::default())
        .plan(&catalog::active_steps())
        .await
        .unwrap();
    let pending: Vec<_> = planned.iter().filter(|p| p.is_pending()).map(|p| p.id.as_str()).collect();
    assert!(pending.contains(&"create_entities_table"));
    assert!(pending.contains(&"backfill_entities_slug"));
    assert!(planned.iter().filter(|p| p.is_pending()).all(|p| !p.statements.is_empty()));

    let snapshot = SchemaInspector::new(&db).snapshot().await.unwrap();
    assert!(snapshot.tables.is_empty(), "plan created {:?}", snapshot.tables.keys());
}

#[tokio::test]
async fn test_plan_against_held_snapshot_matches_plan() {
    let dir = TempDir::new().unwrap();
    let db = file_db(&dir).await;
    let steps = catalog::active_steps();
    let runner = MigrationRunner::new(&db, RunOptions::default());

    let snapshot = SchemaInspector::new(&db).snapshot().await.unwrap();
    let planned = runner.plan_against(&steps, &snapshot).await.unwrap();
    assert_eq!(planned, runner.plan(&steps).await.unwrap());
    // Effects are folded into a private copy
    assert!(snapshot.tables.is_empty());

    runner.run(&steps).await.unwrap();
    let snapshot = SchemaInspector::new(&db).snapshot().await.unwrap();
    let planned = runner.plan_against(&steps, &snapshot).await.unwrap();
    assert!(planned.iter().all(|p| !p.is_pending()));
    assert_eq!(planned, runner.plan(&steps).await.unwrap());
}

#[tokio::test]
async fn test_run_fails_while_lock_is_held() {
    let dir = TempDir::new().unwrap();
    let db = file_db(&dir).await;

    let held = MigrationLock::acquire(&db, Duration::from_secs(1)).await.unwrap();
    let options = RunOptions {
        lock_timeout: Duration::from_millis(300),
        ..RunOptions::default()
    };
    let result = MigrationRunner::new(&db, options.clone()).run(&catalog::active_steps()).await;
    assert!(matches!(result, Err(Error::LockUnavailable(_))));

    held.release().await.unwrap();
    let report = MigrationRunner::new(&db, options).run(&catalog::active_steps()).await.unwrap();
    assert_eq!(report.failed().count(), 0);
}
