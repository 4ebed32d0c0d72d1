use async_trait::async_trait;
use chrono::Utc;

use super::schema::Database;
use super::types::StorageError;
use crate::model::NewItem;
use crate::pull::ItemStore;

impl Database {
    /// Insert items for a feed, skipping any (feed_id, guid) pair that is
    /// already present. Items are immutable once stored, so duplicates are
    /// dropped rather than updated. Returns the number of new rows.
    pub async fn insert_items(
        &self,
        feed_id: i64,
        items: &[NewItem],
    ) -> Result<usize, StorageError> {
        if items.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().timestamp();
        let mut inserted = 0;

        for item in items {
            let result = sqlx::query(
                r#"
                INSERT INTO items (feed_id, guid, title, link, content, published, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(feed_id, guid) DO NOTHING
            "#,
            )
            .bind(feed_id)
            .bind(&item.guid)
            .bind(&item.title)
            .bind(&item.link)
            .bind(&item.content)
            .bind(item.published.map(|dt| dt.timestamp()))
            .bind(now)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() > 0 {
                inserted += 1;
            }
        }

        Ok(inserted)
    }

    /// Number of stored items for a feed.
    pub async fn count_items(&self, feed_id: i64) -> Result<i64, StorageError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM items WHERE feed_id = ?")
            .bind(feed_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl ItemStore for Database {
    async fn insert_items(&self, feed_id: i64, items: &[NewItem]) -> Result<usize, StorageError> {
        Database::insert_items(self, feed_id, items).await
    }
}
