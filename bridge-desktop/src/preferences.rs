//! Preferences Storage using SQLite

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    log::strip_path,
    storage::{PreferenceValue, PreferencesStore},
    time::{Clock, SystemClock},
};
use sqlx::{
    sqlite::{SqlitePool, SqlitePoolOptions},
    Row,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error};

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS preferences (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        value_type TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )
"#;

/// SQLite-backed preferences store
///
/// Each row keeps the value's type next to its text encoding, so values come
/// back with the type they were stored with. String lists are stored as a
/// JSON array.
pub struct SqlitePreferencesStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqlitePreferencesStore {
    /// Open (or create) the store at the given database path
    pub async fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(BridgeError::Io)?;
        }

        // SQLite URLs want forward slashes
        let path_str = db_path.to_string_lossy().replace('\\', "/");
        let db_url = format!("sqlite://{}?mode=rwc", path_str);

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(|e| BridgeError::Storage(format!("Failed to open preferences: {}", e)))?;

        let store = Self::with_pool(pool).await?;
        debug!(file = %strip_path(&path_str), "Initialized preferences store");
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub async fn in_memory() -> Result<Self> {
        // Every connection to `:memory:` is a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| BridgeError::Storage(format!("Failed to open preferences: {}", e)))?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(CREATE_TABLE)
            .execute(&pool)
            .await
            .map_err(|e| BridgeError::Storage(format!("Failed to create table: {}", e)))?;

        Ok(Self {
            pool,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the clock used for `updated_at`
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn encode(value: &PreferenceValue) -> Result<String> {
        Ok(match value {
            PreferenceValue::Bool(b) => b.to_string(),
            PreferenceValue::Int(n) => n.to_string(),
            PreferenceValue::Double(d) => d.to_string(),
            PreferenceValue::String(s) => s.clone(),
            PreferenceValue::StringList(items) => serde_json::to_string(items)
                .map_err(|e| BridgeError::Storage(format!("Failed to encode list: {}", e)))?,
        })
    }

    fn decode(key: &str, value: String, value_type: &str) -> Result<PreferenceValue> {
        let parse_error =
            |e: &dyn std::fmt::Display| BridgeError::Storage(format!("Corrupt value for {}: {}", key, e));

        match value_type {
            "bool" => value.parse().map(PreferenceValue::Bool).map_err(|e| parse_error(&e)),
            "int" => value.parse().map(PreferenceValue::Int).map_err(|e| parse_error(&e)),
            "double" => value
                .parse()
                .map(PreferenceValue::Double)
                .map_err(|e| parse_error(&e)),
            "string" => Ok(PreferenceValue::String(value)),
            "string_list" => serde_json::from_str(&value)
                .map(PreferenceValue::StringList)
                .map_err(|e| parse_error(&e)),
            other => {
                error!(key = key, value_type = other, "Unknown preference type");
                Err(BridgeError::Storage(format!(
                    "Unknown preference type {} for {}",
                    other, key
                )))
            }
        }
    }
}

#[async_trait]
impl PreferencesStore for SqlitePreferencesStore {
    async fn set(&self, key: &str, value: PreferenceValue) -> Result<()> {
        let encoded = Self::encode(&value)?;

        sqlx::query(
            r#"
            INSERT INTO preferences (key, value, value_type, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                value_type = excluded.value_type,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(encoded)
        .bind(value.type_name())
        .bind(self.clock.unix_timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::Storage(format!("Failed to store preference: {}", e)))?;

        debug!(key = key, value_type = value.type_name(), "Stored preference");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<PreferenceValue>> {
        let row = sqlx::query("SELECT value, value_type FROM preferences WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BridgeError::Storage(format!("Failed to read preference: {}", e)))?;

        row.map(|row| {
            let value: String = row.get(0);
            let value_type: String = row.get(1);
            Self::decode(key, value, &value_type)
        })
        .transpose()
    }

    async fn get_all(&self) -> Result<BTreeMap<String, PreferenceValue>> {
        let rows = sqlx::query("SELECT key, value, value_type FROM preferences ORDER BY key")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| BridgeError::Storage(format!("Failed to list preferences: {}", e)))?;

        rows.into_iter()
            .map(|row| {
                let key: String = row.get(0);
                let value: String = row.get(1);
                let value_type: String = row.get(2);
                let decoded = Self::decode(&key, value, &value_type)?;
                Ok((key, decoded))
            })
            .collect()
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM preferences WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| BridgeError::Storage(format!("Failed to remove preference: {}", e)))?;

        debug!(key = key, "Removed preference");
        Ok(result.rows_affected() > 0)
    }

    async fn clear(&self, prefix: &str) -> Result<u64> {
        // substr instead of LIKE: prefixes may contain wildcard characters
        let result = sqlx::query("DELETE FROM preferences WHERE substr(key, 1, ?) = ?")
            .bind(prefix.chars().count() as i64)
            .bind(prefix)
            .execute(&self.pool)
            .await
            .map_err(|e| BridgeError::Storage(format!("Failed to clear preferences: {}", e)))?;

        debug!(prefix = prefix, removed = result.rows_affected(), "Cleared preferences");
        Ok(result.rows_affected())
    }
}
