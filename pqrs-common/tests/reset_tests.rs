//! Destructive reset and reseed against SQLite files

use pqrs_common::auth::verify_password;
use pqrs_common::config::{AppConfig, DatabaseConfig};
use pqrs_common::db::{catalog, DbPool, MigrationRunner, ResetController, ResetRefusal, ResetState, RunOptions};
use pqrs_common::Error;
use tempfile::TempDir;

const PHRASE: &str = "CONFIRMO_BORRAR_BASE_DE_DATOS";

fn config(dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.database = DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("pqrs.db").display()),
        ..DatabaseConfig::default()
    };
    config.maintenance.confirm_phrase = Some(PHRASE.to_string());
    config.seed.username = "admin-root".to_string();
    config.seed.email = "root@alcaldia.example".to_string();
    config.seed.password = Some("Contraseña-Segura-1".to_string());
    config
}

/// Migrated database with one tenant and two users
async fn populated_db(config: &AppConfig) -> DbPool {
    let db = DbPool::connect(&config.database).await.unwrap();
    MigrationRunner::new(&db, RunOptions::default())
        .run(&catalog::active_steps())
        .await
        .unwrap();

    let pool = sqlite(&db);
    sqlx::query("INSERT INTO entities (name, code, slug) VALUES ('Alcaldia Norte', 'NORTE', 'norte')")
        .execute(pool)
        .await
        .unwrap();
    for (username, role) in [("ana", "admin"), ("luis", "secretario")] {
        sqlx::query(
            "INSERT INTO users (username, email, full_name, hashed_password, role) VALUES (?, ?, ?, 'x', ?)",
        )
        .bind(username)
        .bind(format!("{}@example.org", username))
        .bind(username)
        .bind(role)
        .execute(pool)
        .await
        .unwrap();
    }
    db
}

fn sqlite(db: &DbPool) -> &sqlx::SqlitePool {
    match db {
        DbPool::Sqlite(handle) => &handle.pool,
        DbPool::Postgres(_) => panic!("expected sqlite"),
    }
}

async fn count(db: &DbPool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(sqlite(db))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_wrong_confirmation_leaves_data_intact() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let mut db = populated_db(&config).await;

    for attempt in ["", "confirmo_borrar_base_de_datos", "CONFIRMO_BORRAR_BASE_DE_DATOS\n"] {
        let mut controller = ResetController::new(&mut db, &config);
        let err = controller.run(attempt, None).await.err().unwrap();
        assert!(matches!(err, Error::DestructiveActionRefused(_)));
        assert_eq!(controller.state(), ResetState::Pristine);
    }

    assert_eq!(count(&db, "users").await, 2);
    assert_eq!(count(&db, "entities").await, 1);
}

#[tokio::test]
async fn test_wrong_token_leaves_data_intact() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir);
    config.maintenance.token = Some("token-mantenimiento".to_string());
    let mut db = populated_db(&config).await;

    let mut controller = ResetController::new(&mut db, &config);
    assert_eq!(controller.authorize(PHRASE, Some("otro")), Err(ResetRefusal::BadToken));
    assert!(controller.drop_and_recreate().await.is_err());

    assert_eq!(count(&db, "users").await, 2);
}

#[tokio::test]
async fn test_reseed_leaves_single_superadmin() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let mut db = populated_db(&config).await;

    let summary = ResetController::new(&mut db, &config).run(PHRASE, None).await.unwrap();
    assert_eq!(summary.superadmin, "admin-root");
    assert_eq!(summary.migrations.failed().count(), 0);

    assert_eq!(count(&db, "entities").await, 0);
    let users: Vec<(String, String, String, bool)> =
        sqlx::query_as("SELECT username, role, hashed_password, is_active FROM users")
            .fetch_all(sqlite(&db))
            .await
            .unwrap();
    assert_eq!(users.len(), 1);
    let (username, role, hash, active) = &users[0];
    assert_eq!(username, "admin-root");
    assert_eq!(role, "superadmin");
    assert!(active);
    assert!(verify_password("Contraseña-Segura-1", hash).unwrap());
    assert!(!verify_password("otra", hash).unwrap());
}

#[tokio::test]
async fn test_reset_is_repeatable() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let mut db = populated_db(&config).await;

    ResetController::new(&mut db, &config).run(PHRASE, None).await.unwrap();
    ResetController::new(&mut db, &config).run(PHRASE, None).await.unwrap();

    assert_eq!(count(&db, "users").await, 1);
    assert!(dir.path().join("pqrs.db").exists());
}

#[tokio::test]
async fn test_in_memory_database_reset() {
    let mut config = config(&TempDir::new().unwrap());
    config.database.url = "sqlite::memory:".to_string();
    let mut db = populated_db(&config).await;

    ResetController::new(&mut db, &config).run(PHRASE, None).await.unwrap();

    assert_eq!(count(&db, "users").await, 1);
    assert_eq!(count(&db, "entities").await, 0);
}
