use async_trait::async_trait;
use std::time::Duration;

use super::schema::Database;
use super::types::StorageError;
use crate::pull::SettingsStore;

/// Settings key holding the operator-tunable refresh interval, in seconds.
pub const REFRESH_INTERVAL_KEY: &str = "pull.refresh_interval_secs";

impl Database {
    /// Get a single setting value by key, or `None` if unset.
    pub async fn get_setting(&self, key: &str) -> Result<Option<String>, StorageError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(value,)| value))
    }

    /// Set a setting value (UPSERT).
    pub async fn set_setting(&self, key: &str, value: &str) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// The configured refresh interval, or `None` when unset or unparseable.
    /// The puller substitutes its own default in either case; a malformed
    /// value is an operator mistake, not a reason to stop pulling.
    pub async fn refresh_interval(&self) -> Result<Option<Duration>, StorageError> {
        let Some(value) = self.get_setting(REFRESH_INTERVAL_KEY).await? else {
            return Ok(None);
        };

        match value.parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(Some(Duration::from_secs(secs))),
            _ => {
                tracing::debug!(value = %value, "ignoring unparseable refresh interval setting");
                Ok(None)
            }
        }
    }

    /// Change the refresh interval; takes effect at the next scheduler tick.
    pub async fn set_refresh_interval(&self, interval: Duration) -> Result<(), StorageError> {
        self.set_setting(REFRESH_INTERVAL_KEY, &interval.as_secs().to_string())
            .await
    }
}

#[async_trait]
impl SettingsStore for Database {
    async fn refresh_interval(&self) -> Result<Option<Duration>, StorageError> {
        Database::refresh_interval(self).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::storage::Database;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_get_setting_missing() {
        let db = test_db().await;
        assert_eq!(db.get_setting("nonexistent.key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_setting_upsert() {
        let db = test_db().await;
        db.set_setting("pull.foo", "1").await.unwrap();
        db.set_setting("pull.foo", "2").await.unwrap();
        assert_eq!(
            db.get_setting("pull.foo").await.unwrap(),
            Some("2".to_string())
        );
    }

    #[tokio::test]
    async fn test_refresh_interval_unset() {
        let db = test_db().await;
        assert_eq!(db.refresh_interval().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_refresh_interval_round_trip() {
        let db = test_db().await;
        db.set_refresh_interval(Duration::from_secs(900))
            .await
            .unwrap();
        assert_eq!(
            db.refresh_interval().await.unwrap(),
            Some(Duration::from_secs(900))
        );
    }

    #[tokio::test]
    async fn test_refresh_interval_garbage_is_none() {
        let db = test_db().await;
        db.set_setting(super::REFRESH_INTERVAL_KEY, "soon")
            .await
            .unwrap();
        assert_eq!(db.refresh_interval().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_refresh_interval_zero_is_none() {
        let db = test_db().await;
        db.set_setting(super::REFRESH_INTERVAL_KEY, "0").await.unwrap();
        assert_eq!(db.refresh_interval().await.unwrap(), None);
    }
}
