//! Account lookups needed by the maintenance endpoints

use pqrs_common::db::DbPool;
use pqrs_common::Result;
use sqlx::Row;

/// Role and active flag of an account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRole {
    pub role: String,
    pub is_active: bool,
}

/// Look up `username`; `None` when no such account exists
///
/// Roles are returned as stored. Databases that predate label
/// normalisation may still hold upper-case values.
pub async fn find_account_role(db: &DbPool, username: &str) -> Result<Option<AccountRole>> {
    let row = match db {
        DbPool::Postgres(pool) => {
            sqlx::query("SELECT role::text AS role, is_active FROM users WHERE username = $1")
                .bind(username)
                .fetch_optional(pool)
                .await?
                .map(|row| -> Result<AccountRole> {
                    Ok(AccountRole {
                        role: row.try_get("role")?,
                        is_active: row.try_get::<Option<bool>, _>("is_active")?.unwrap_or(true),
                    })
                })
        }
        DbPool::Sqlite(handle) => {
            sqlx::query("SELECT role, is_active FROM users WHERE username = ?")
                .bind(username)
                .fetch_optional(&handle.pool)
                .await?
                .map(|row| -> Result<AccountRole> {
                    Ok(AccountRole {
                        role: row.try_get("role")?,
                        is_active: row.try_get::<Option<bool>, _>("is_active")?.unwrap_or(true),
                    })
                })
        }
    };
    row.transpose()
}
