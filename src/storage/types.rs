use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::Feed;

/// Storage-layer errors.
///
/// `NotFound` is a distinct variant because callers treat it differently:
/// the batch puller normalizes it to an empty result, while a forced
/// single-feed refresh surfaces it to the user.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Row type for feed queries. Timestamps are unix seconds, booleans are
/// SQLite integers; `into_feed` lifts them into the domain type.
pub(crate) type FeedRow = (
    i64,            // id
    String,         // title
    Option<String>, // link
    Option<i64>,    // updated_at
    i64,            // consecutive_failures
    i64,            // suspended
    Option<String>, // favicon_path
    Option<String>, // last_error
);

pub(crate) fn into_feed(row: FeedRow) -> Feed {
    let (id, title, link, updated_at, consecutive_failures, suspended, favicon_path, last_error) =
        row;
    Feed {
        id,
        title,
        link,
        updated_at: updated_at.and_then(epoch_to_datetime),
        consecutive_failures,
        suspended: suspended != 0,
        favicon_path,
        last_error,
    }
}

pub(crate) fn epoch_to_datetime(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0)
}
