//! Common error types for the PQRS backend

use thiserror::Error;

/// Common result type for PQRS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the PQRS crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection string names a database engine with no dialect adapter
    #[error("Unsupported database dialect: {0}")]
    UnsupportedDialect(String),

    /// Destructive maintenance refused before touching the database
    #[error("Destructive action refused: {0}")]
    DestructiveActionRefused(String),

    /// Another process holds the migration lock
    #[error("Migration lock unavailable: {0}")]
    LockUnavailable(String),

    /// Password hashing or verification failure
    #[error("Password hash error: {0}")]
    PasswordHash(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for connection-class failures where retrying the whole run is safe.
    ///
    /// Statement-level failures (permission denied, conflicting DDL, bad SQL)
    /// are not transient; they are reported per step instead.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Database(err) => matches!(
                err,
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            Error::Io(_) => true,
            _ => false,
        }
    }
}
