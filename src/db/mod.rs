mod models;

pub use models::*;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

use crate::crypto::hash_password;

pub type DbPool = SqlitePool;

/// Current time as a sortable RFC 3339 string (UTC, microsecond precision)
pub fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Format a future instant the same way as [`now`]
pub fn timestamp_after(delta: chrono::Duration) -> String {
    (Utc::now() + delta).to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Execute a SQL migration file, properly handling comments
async fn execute_sql(pool: &SqlitePool, sql: &str) -> Result<()> {
    for statement in sql.split(';') {
        // Strip SQL comment lines (lines starting with --)
        let cleaned: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        let trimmed = cleaned.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(pool).await?;
        }
    }
    Ok(())
}

pub async fn init(data_dir: &Path, max_connections: u32) -> Result<DbPool> {
    let db_path = data_dir.join("wildcats.db");
    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    info!("Initializing database at {}", db_path.display());

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(&db_url)
        .await
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    // Enable WAL mode for better concurrency
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    info!("Database initialized successfully");
    Ok(pool)
}

/// Open a private in-memory database with the full schema.
///
/// Limited to one connection: every SQLite `:memory:` connection is its own database.
pub async fn init_in_memory() -> Result<DbPool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations...");

    // Migration 001: users, sessions, menu and order collections
    execute_sql(pool, include_str!("../../migrations/001_initial.sql"))
        .await
        .context("Migration 001 failed")?;

    info!("Migrations completed");
    Ok(())
}

/// Create the configured admin account if no user with that email exists.
///
/// An existing account is left untouched, including its role and password.
pub async fn ensure_admin_user(pool: &SqlitePool, email: &str, password: &str) -> Result<()> {
    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?;

    if existing.is_some() {
        return Ok(());
    }

    let password_hash = hash_password(password)
        .map_err(|e| anyhow::anyhow!("Failed to hash admin password: {}", e))?;
    let id = uuid::Uuid::new_v4().to_string();
    let now = now();

    sqlx::query(
        "INSERT INTO users (id, email, password_hash, first_name, last_name, role, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(email)
    .bind(&password_hash)
    .bind("Admin")
    .bind("")
    .bind(Role::Admin.as_str())
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    info!(email = %email, "Created admin user");
    Ok(())
}

/// Drop refresh sessions past their expiry. Returns how many were removed.
pub async fn purge_expired_sessions(pool: &SqlitePool) -> Result<u64> {
    let removed = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(now())
        .execute(pool)
        .await?
        .rows_affected();
    if removed > 0 {
        info!(removed, "Purged expired sessions");
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = init_in_memory().await.unwrap();
        run_migrations(&pool).await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        let names: Vec<_> = tables.into_iter().map(|(n,)| n).collect();
        assert_eq!(
            names,
            vec!["client_orders", "menu_items", "orders", "sessions", "users"]
        );
    }

    #[tokio::test]
    async fn test_ensure_admin_user_once() {
        let pool = init_in_memory().await.unwrap();
        ensure_admin_user(&pool, "admin@example.com", "first-password")
            .await
            .unwrap();
        ensure_admin_user(&pool, "admin@example.com", "second-password")
            .await
            .unwrap();

        let users: Vec<User> = sqlx::query_as("SELECT * FROM users")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(users.len(), 1);
        assert!(users[0].is_admin());
        assert!(crate::crypto::verify_password(
            "first-password",
            &users[0].password_hash
        ));
    }

    #[test]
    fn test_timestamps_sort_lexicographically() {
        let earlier = now();
        let later = timestamp_after(chrono::Duration::seconds(1));
        assert!(later > earlier);
    }

    #[tokio::test]
    async fn test_purge_expired_sessions() {
        let pool = init_in_memory().await.unwrap();
        ensure_admin_user(&pool, "admin@example.com", "admin-password")
            .await
            .unwrap();
        let (user_id,): (String,) = sqlx::query_as("SELECT id FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();

        for (id, expires_at) in [
            ("expired", timestamp_after(chrono::Duration::minutes(-1))),
            ("live", timestamp_after(chrono::Duration::days(2))),
        ] {
            sqlx::query(
                "INSERT INTO sessions (id, user_id, token_hash, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(id)
            .bind(&user_id)
            .bind(format!("hash-{}", id))
            .bind(expires_at)
            .bind(now())
            .execute(&pool)
            .await
            .unwrap();
        }

        assert_eq!(purge_expired_sessions(&pool).await.unwrap(), 1);

        let remaining: Vec<Session> = sqlx::query_as("SELECT * FROM sessions")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "live");
        assert_eq!(remaining[0].user_id, user_id);
    }
}
