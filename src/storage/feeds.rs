use async_trait::async_trait;
use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{into_feed, FeedRow, StorageError};
use crate::model::{Feed, FeedPatch};
use crate::pull::FeedStore;

impl Database {
    /// Register a feed by its source URL. Re-registering an existing URL
    /// updates the title and returns the same row id.
    pub async fn insert_feed(&self, link: &str, title: &str) -> Result<i64, StorageError> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO feeds (title, link)
            VALUES (?, ?)
            ON CONFLICT(link) DO UPDATE SET title = excluded.title
            RETURNING id
        "#,
        )
        .bind(title)
        .bind(link)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// All feeds in registration order.
    pub async fn list_feeds(&self) -> Result<Vec<Feed>, StorageError> {
        let rows: Vec<FeedRow> = sqlx::query_as(
            r#"
            SELECT id, title, link, updated_at, consecutive_failures,
                   suspended, favicon_path, last_error
            FROM feeds
            ORDER BY id
        "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(into_feed).collect())
    }

    pub async fn get_feed(&self, id: i64) -> Result<Feed, StorageError> {
        let row: Option<FeedRow> = sqlx::query_as(
            r#"
            SELECT id, title, link, updated_at, consecutive_failures,
                   suspended, favicon_path, last_error
            FROM feeds
            WHERE id = ?
        "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(into_feed).ok_or(StorageError::NotFound)
    }

    /// Apply a partial update to a feed row. Absent patch fields are left
    /// untouched; an empty patch is a no-op.
    pub async fn update_feed(&self, id: i64, patch: FeedPatch) -> Result<(), StorageError> {
        let FeedPatch {
            title,
            updated_at,
            consecutive_failures,
            suspended,
            favicon_path,
            last_error,
        } = patch;

        if title.is_none()
            && updated_at.is_none()
            && consecutive_failures.is_none()
            && suspended.is_none()
            && favicon_path.is_none()
            && last_error.is_none()
        {
            return Ok(());
        }

        let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new("UPDATE feeds SET ");
        {
            let mut set = builder.separated(", ");
            if let Some(title) = title {
                set.push("title = ");
                set.push_bind_unseparated(title);
            }
            if let Some(updated_at) = updated_at {
                set.push("updated_at = ");
                set.push_bind_unseparated(updated_at.timestamp());
            }
            if let Some(failures) = consecutive_failures {
                set.push("consecutive_failures = ");
                set.push_bind_unseparated(failures);
            }
            if let Some(suspended) = suspended {
                set.push("suspended = ");
                set.push_bind_unseparated(i64::from(suspended));
            }
            if let Some(path) = favicon_path {
                set.push("favicon_path = ");
                set.push_bind_unseparated(path);
            }
            if let Some(error) = last_error {
                set.push("last_error = ");
                set.push_bind_unseparated(error);
            }
        }
        builder.push(" WHERE id = ");
        builder.push_bind(id);

        let result = builder.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl FeedStore for Database {
    async fn list_feeds(&self) -> Result<Vec<Feed>, StorageError> {
        Database::list_feeds(self).await
    }

    async fn get_feed(&self, id: i64) -> Result<Feed, StorageError> {
        Database::get_feed(self, id).await
    }

    async fn update_feed(&self, id: i64, patch: FeedPatch) -> Result<(), StorageError> {
        Database::update_feed(self, id, patch).await
    }
}
