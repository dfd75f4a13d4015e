// SQLite-backed run state store
// One row per identity scope; the state itself is stored as JSON.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::domain::{RunIdentity, RunState};
use crate::infrastructure::run_state_store::RunStateStore;

pub struct SqliteRunStateStore {
    pool: SqlitePool,
}

impl SqliteRunStateStore {
    /// Opens (creating if needed) the database at `database_url` and
    /// ensures the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let db_path = database_url
            .strip_prefix("sqlite://")
            .or_else(|| database_url.strip_prefix("sqlite:"))
            .unwrap_or(database_url);

        if !db_path.starts_with(':') {
            if let Some(parent) = Path::new(db_path).parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {database_url}"))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open run state database {database_url}"))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_run_states_sql = r#"
            CREATE TABLE IF NOT EXISTS run_states (
                scope TEXT PRIMARY KEY,
                identity_key TEXT NOT NULL,
                state TEXT NOT NULL,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
        "#;

        sqlx::query(create_run_states_sql)
            .execute(&self.pool)
            .await
            .context("Failed to create run_states table")?;
        Ok(())
    }
}

#[async_trait]
impl RunStateStore for SqliteRunStateStore {
    async fn load(&self, identity: &RunIdentity) -> Result<Option<RunState>> {
        let row = sqlx::query("SELECT state FROM run_states WHERE scope = ?")
            .bind(&identity.scope)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to load run state for {}", identity.scope))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let json: String = row.try_get("state")?;
        let state = serde_json::from_str(&json)
            .with_context(|| format!("Corrupt run state stored for {}", identity.scope))?;
        Ok(Some(state))
    }

    async fn save(&self, identity: &RunIdentity, state: &RunState) -> Result<()> {
        let json = serde_json::to_string(state).context("Failed to serialize run state")?;

        sqlx::query(
            r#"
            INSERT INTO run_states (scope, identity_key, state, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(scope) DO UPDATE SET
                identity_key = excluded.identity_key,
                state = excluded.state,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&identity.scope)
        .bind(identity.key())
        .bind(json)
        .bind(state.updated_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save run state for {}", identity.scope))?;

        debug!(scope = %identity.scope, cursor = state.cursor, "Run state saved");
        Ok(())
    }

    async fn clear(&self, identity: &RunIdentity) -> Result<()> {
        sqlx::query("DELETE FROM run_states WHERE scope = ?")
            .bind(&identity.scope)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to clear run state for {}", identity.scope))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RecordId;
    use tempfile::tempdir;

    #[tokio::test]
    async fn migration_creates_table() -> Result<()> {
        let temp_dir = tempdir()?;
        let database_url = format!("sqlite:{}", temp_dir.path().join("runs.db").display());

        let store = SqliteRunStateStore::connect(&database_url).await?;

        let result = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name='run_states'")
            .fetch_optional(store.pool())
            .await?;
        assert!(result.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn creates_missing_parent_directories() -> Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("nested").join("dir").join("runs.db");
        let database_url = format!("sqlite:{}", db_path.display());

        let store = SqliteRunStateStore::connect(&database_url).await?;
        let identity = RunIdentity::new("s");
        store
            .save(&identity, &RunState::fresh(identity.clone(), &[RecordId::new("a")]))
            .await?;

        assert!(db_path.exists());
        Ok(())
    }
}
