//! Domain types shared by the storage, fetch, and pull layers.

use chrono::{DateTime, Utc};

/// A subscribed feed as stored in the database.
///
/// `link`, `updated_at`, `favicon_path`, and `last_error` are genuinely
/// optional states, not empty-string sentinels: a feed without a link is
/// never fetched, and `updated_at = None` means the feed has never been
/// pulled (or even attempted).
#[derive(Debug, Clone)]
pub struct Feed {
    pub id: i64,
    pub title: String,
    /// Source URL of the feed. Feeds without a link are skipped by the puller.
    pub link: Option<String>,
    /// Timestamp of the last successful or attempted refresh.
    pub updated_at: Option<DateTime<Utc>>,
    /// Count of sequential failed pulls since the last success.
    pub consecutive_failures: i64,
    /// User-requested pause; suspended feeds are never auto-fetched.
    pub suspended: bool,
    /// Cached icon file, maintained by the favicon repair pass.
    pub favicon_path: Option<String>,
    /// Most recent pull error, cleared on success.
    pub last_error: Option<String>,
}

/// Partial update applied to a feed row. `None` fields are left untouched.
///
/// `last_error` is doubly optional: `Some(None)` clears the stored error,
/// `None` leaves it alone.
#[derive(Debug, Clone, Default)]
pub struct FeedPatch {
    pub title: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub consecutive_failures: Option<i64>,
    pub suspended: Option<bool>,
    pub favicon_path: Option<String>,
    pub last_error: Option<Option<String>>,
}

/// One entry parsed out of a fetched feed, ready for insertion.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub guid: String,
    pub title: String,
    pub link: Option<String>,
    pub content: Option<String>,
    pub published: Option<DateTime<Utc>>,
}

/// Feed-level metadata extracted from a fetched document.
#[derive(Debug, Clone, Default)]
pub struct FeedMeta {
    pub title: Option<String>,
    pub site_link: Option<String>,
}

/// The result of fetching and parsing one feed.
#[derive(Debug, Clone)]
pub struct FetchedFeed {
    pub meta: FeedMeta,
    pub items: Vec<NewItem>,
}
