//! Configuration loading
//!
//! Resolution order for every setting (highest priority first):
//! 1. Command-line argument (applied by the binaries after `load`)
//! 2. Environment variable (`PQRS_*`)
//! 3. TOML config file
//! 4. Compiled default

use crate::db::dialect::DialectKind;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "PQRS_CONFIG";

/// Full application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub migrations: MigrationsConfig,
    pub maintenance: MaintenanceConfig,
    pub seed: SeedConfig,
    pub auth: AuthConfig,
}

/// `[database]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection string; its scheme selects the dialect
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Connect / pool acquire timeout
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    /// Connections are recycled after this long
    pub max_lifetime_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://pqrs_alcaldia.db".to_string(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_secs: 10,
            idle_timeout_secs: 600,
            max_lifetime_secs: 3600,
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }
}

/// `[server]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

/// `[migrations]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationsConfig {
    /// Shared secret expected in `X-Migration-Key`; the run endpoint is
    /// closed when unset
    pub key: Option<String>,
    /// Run the catalog once before the server starts accepting requests
    pub run_on_startup: bool,
    /// Permit destructive steps when a run also opts in explicitly
    pub allow_destructive: bool,
    /// How long a run waits for the database-wide migration lock
    pub lock_timeout_secs: u64,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            key: None,
            run_on_startup: true,
            allow_destructive: false,
            lock_timeout_secs: 30,
        }
    }
}

impl MigrationsConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }
}

/// `[maintenance]` section (destructive reset)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Exact phrase a reset request must carry; reset is refused when unset
    pub confirm_phrase: Option<String>,
    /// Optional secondary token expected in `X-Maintenance-Token`
    pub token: Option<String>,
    /// Include internal error detail in reset failure responses
    pub debug: bool,
}

/// `[seed]` section (privileged account created by reseed)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password: Option<String>,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            username: "superadmin".to_string(),
            email: "superadmin@localhost".to_string(),
            full_name: "Super Administrador".to_string(),
            password: None,
        }
    }
}

/// `[auth]` section (bearer token verification)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 secret shared with the token issuer
    pub jwt_secret: Option<String>,
}

impl AppConfig {
    /// Load configuration: TOML file (if any) then environment overrides
    ///
    /// File lookup: `explicit` path, then `PQRS_CONFIG`, then the platform
    /// config directory. An explicitly named file that does not exist is an
    /// error; a missing default file is not.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match resolve_config_path(explicit)? {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Parse TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Apply `PQRS_*` environment variables on top of file values
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_value("PQRS_DATABASE_URL") {
            self.database.url = v;
        }
        if let Some(v) = env_value("PQRS_BIND") {
            self.server.bind = v;
        }
        if let Some(v) = env_value("PQRS_MIGRATION_KEY") {
            self.migrations.key = Some(v);
        }
        if let Some(v) = env_value("PQRS_RUN_MIGRATIONS_ON_STARTUP") {
            self.migrations.run_on_startup = parse_flag(&v);
        }
        if let Some(v) = env_value("PQRS_ALLOW_DESTRUCTIVE_MIGRATIONS") {
            self.migrations.allow_destructive = parse_flag(&v);
        }
        if let Some(v) = env_value("PQRS_MAINTENANCE_CONFIRM_PHRASE") {
            self.maintenance.confirm_phrase = Some(v);
        }
        if let Some(v) = env_value("PQRS_MAINTENANCE_TOKEN") {
            self.maintenance.token = Some(v);
        }
        if let Some(v) = env_value("PQRS_SUPERADMIN_USERNAME") {
            self.seed.username = v;
        }
        if let Some(v) = env_value("PQRS_SUPERADMIN_EMAIL") {
            self.seed.email = v;
        }
        if let Some(v) = env_value("PQRS_SUPERADMIN_PASSWORD") {
            self.seed.password = Some(v);
        }
        if let Some(v) = env_value("PQRS_JWT_SECRET") {
            self.auth.jwt_secret = Some(v);
        }
    }

    /// Reject configurations that cannot work at all
    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            return Err(Error::Config("database.url must not be empty".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(Error::Config("database.max_connections must be at least 1".to_string()));
        }
        // The PostgreSQL migration lock keeps one pooled connection for the whole run
        if self.database.max_connections < 2 && DialectKind::from_url(&self.database.url)? == DialectKind::Postgres {
            return Err(Error::Config(
                "database.max_connections must be at least 2 for PostgreSQL".to_string(),
            ));
        }
        if self.seed.username.trim().is_empty() {
            return Err(Error::Config("seed.username must not be empty".to_string()));
        }
        Ok(())
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "y" | "on")
}

fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(Error::Config(format!("Config file not found: {}", path.display())));
        }
        return Ok(Some(path.to_path_buf()));
    }

    if let Some(path) = env_value(CONFIG_ENV_VAR) {
        let path = PathBuf::from(path);
        if !path.exists() {
            return Err(Error::Config(format!("Config file not found: {}", path.display())));
        }
        return Ok(Some(path));
    }

    Ok(default_config_file().filter(|p| p.exists()))
}

/// Platform config file: `~/.config/pqrs/config.toml` on Linux
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("pqrs").join("config.toml"))
}
