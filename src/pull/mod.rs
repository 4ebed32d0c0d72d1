//! The feed-pull scheduler: decides which feeds are due, fans the pulls out
//! under a fixed concurrency bound, and keeps a process-lifetime refresh
//! loop running.
//!
//! The [`Puller`] talks to its collaborators through object-safe traits so
//! the scheduling behavior is testable without a database or network. The
//! storage layer implements the store traits; [`crate::fetch::FeedClient`]
//! implements [`FetchFeed`]; [`crate::favicon::FaviconService`] implements
//! [`FaviconProvider`].

mod decide;
mod single;

pub use decide::{backoff_time, decide_update_action, SkipReason, UpdateAction};

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::fetch::FetchError;
use crate::model::{Feed, FeedPatch, FetchedFeed, NewItem};
use crate::storage::StorageError;

/// Feed repository operations the puller depends on.
#[async_trait]
pub trait FeedStore: Send + Sync {
    async fn list_feeds(&self) -> Result<Vec<Feed>, StorageError>;
    async fn get_feed(&self, id: i64) -> Result<Feed, StorageError>;
    async fn update_feed(&self, id: i64, patch: FeedPatch) -> Result<(), StorageError>;
}

/// Item repository operations the puller depends on. Deduplication is the
/// repository's concern; the returned count reflects rows actually inserted.
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn insert_items(&self, feed_id: i64, items: &[NewItem]) -> Result<usize, StorageError>;
}

/// Source of the operator-tunable refresh interval. `Ok(None)` means unset;
/// the puller falls back to its configured default either way.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn refresh_interval(&self) -> Result<Option<Duration>, StorageError>;
}

/// The network side of a pull: fetch one feed and parse its current items.
#[async_trait]
pub trait FetchFeed: Send + Sync {
    async fn fetch_items(&self, feed: &Feed) -> Result<FetchedFeed, FetchError>;
}

/// Best-effort favicon resolution for the maintenance pass.
#[async_trait]
pub trait FaviconProvider: Send + Sync {
    async fn favicon_path(&self, feed_url: &str) -> anyhow::Result<PathBuf>;
}

/// Errors surfaced by pull operations.
///
/// The batch path only ever returns `List`; per-feed errors are logged and
/// swallowed by the fan-out. `pull_one` surfaces everything, including a
/// `Storage(NotFound)` for an unknown feed id.
#[derive(Debug, Error)]
pub enum PullError {
    #[error("failed to list feeds: {0}")]
    List(#[source] StorageError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("feed pull timed out")]
    Timeout,
}

/// Tunables for the puller. All fallback behavior is explicit here rather
/// than in module globals.
#[derive(Debug, Clone)]
pub struct PullerConfig {
    /// Interval used when no settings store is wired in, the interval is
    /// unset, or reading it fails.
    pub default_interval: Duration,
    /// Hard cap on simultaneously in-flight per-feed pulls.
    pub max_concurrent_pulls: usize,
    /// Deadline for a single feed's fetch-and-store.
    pub feed_timeout: Duration,
    /// Whether a forced refresh may fetch a user-suspended feed. Off by
    /// default: suspension wins over force.
    pub force_overrides_suspension: bool,
}

impl Default for PullerConfig {
    fn default() -> Self {
        Self {
            default_interval: Duration::from_secs(30 * 60),
            max_concurrent_pulls: 10,
            feed_timeout: Duration::from_secs(30),
            force_overrides_suspension: false,
        }
    }
}

/// Drives periodic refreshes over the full feed set.
///
/// Cloning is cheap; all collaborators are behind `Arc`.
#[derive(Clone)]
pub struct Puller {
    feeds: Arc<dyn FeedStore>,
    items: Arc<dyn ItemStore>,
    client: Arc<dyn FetchFeed>,
    settings: Option<Arc<dyn SettingsStore>>,
    favicons: Option<Arc<dyn FaviconProvider>>,
    pub(crate) config: PullerConfig,
}

impl Puller {
    pub fn new(
        feeds: Arc<dyn FeedStore>,
        items: Arc<dyn ItemStore>,
        client: Arc<dyn FetchFeed>,
        config: PullerConfig,
    ) -> Self {
        Self {
            feeds,
            items,
            client,
            settings: None,
            favicons: None,
            config,
        }
    }

    /// Wire in a runtime-tunable interval source. Without one the puller
    /// always uses `config.default_interval`.
    pub fn with_settings(mut self, settings: Arc<dyn SettingsStore>) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Wire in a favicon resolver. Without one the maintenance pass is a
    /// no-op.
    pub fn with_favicons(mut self, favicons: Arc<dyn FaviconProvider>) -> Self {
        self.favicons = Some(favicons);
        self
    }

    /// Run the refresh loop forever: pull cycle, favicon repair, wait for
    /// the next tick. The interval is re-read after every cycle and the
    /// timer rebuilt only when it changed, so operator changes take effect
    /// at tick granularity without interrupting an in-flight cycle.
    pub async fn run(&self) {
        let mut current_interval = self.current_interval().await;
        let mut ticker = time::interval(current_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if let Err(err) = self.pull_all(false).await {
                tracing::error!(error = %err, "pull cycle failed");
            }
            self.repair_favicons().await;

            let new_interval = self.current_interval().await;
            if new_interval != current_interval {
                tracing::info!(
                    old_secs = current_interval.as_secs(),
                    new_secs = new_interval.as_secs(),
                    "refresh interval changed, rebuilding timer"
                );
                current_interval = new_interval;
                ticker = time::interval_at(Instant::now() + current_interval, current_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            }
        }
    }

    /// Pull every feed once, at most `max_concurrent_pulls` at a time.
    ///
    /// Per-feed failures are logged and swallowed so one broken feed never
    /// fails the batch; the returned error reflects listing failures only.
    /// The whole batch runs under a deadline of half the refresh interval
    /// so a slow cycle cannot overlap the next one.
    pub async fn pull_all(&self, force: bool) -> Result<(), PullError> {
        let interval = self.current_interval().await;
        let batch_deadline = Instant::now() + interval / 2;

        let feeds = match self.feeds.list_feeds().await {
            Ok(feeds) => feeds,
            Err(StorageError::NotFound) => Vec::new(),
            Err(err) => return Err(PullError::List(err)),
        };
        if feeds.is_empty() {
            return Ok(());
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_pulls));
        let mut workers = JoinSet::new();
        for feed in feeds {
            // Admission control: block launching until a slot frees up
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break; // the semaphore is never closed
            };
            let puller = self.clone();
            workers.spawn(async move {
                // Held for the task's whole lifetime; dropped on every exit
                // path, including panics, so pool capacity cannot leak
                let _permit = permit;
                let feed_id = feed.id;
                let feed_link = feed.link.clone().unwrap_or_default();
                if let Err(err) = puller.pull_feed(batch_deadline, feed, force).await {
                    tracing::error!(feed_id, feed_link = %feed_link, error = %err, "failed to pull feed");
                }
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                tracing::error!(error = %err, "pull worker panicked");
            }
        }
        Ok(())
    }

    /// Pull a single feed on demand, bypassing the timing and backoff
    /// checks. Lookup failures surface to the caller.
    pub async fn pull_one(&self, id: i64) -> Result<(), PullError> {
        let feed = self.feeds.get_feed(id).await?;
        let deadline = Instant::now() + self.config.feed_timeout;
        self.pull_feed(deadline, feed, true).await
    }

    /// Best-effort favicon repair: resolve an icon for every feed that has
    /// a link but no cached icon yet. Never returns an error and never
    /// blocks the next cycle; every failure is logged and skipped.
    pub async fn repair_favicons(&self) {
        let Some(favicons) = &self.favicons else {
            return;
        };

        let feeds = match self.feeds.list_feeds().await {
            Ok(feeds) => feeds,
            Err(StorageError::NotFound) => return,
            Err(err) => {
                tracing::warn!(error = %err, "favicon repair: failed to list feeds");
                return;
            }
        };

        for feed in feeds {
            let Some(link) = &feed.link else { continue };
            if feed.favicon_path.is_some() {
                continue;
            }

            match favicons.favicon_path(link).await {
                Ok(path) => {
                    let patch = FeedPatch {
                        favicon_path: Some(path.to_string_lossy().into_owned()),
                        ..Default::default()
                    };
                    if let Err(err) = self.feeds.update_feed(feed.id, patch).await {
                        tracing::warn!(feed_id = feed.id, error = %err, "favicon repair: failed to store icon path");
                    }
                }
                Err(err) => {
                    tracing::debug!(feed_id = feed.id, feed_link = %link, error = %err, "favicon repair: lookup failed");
                }
            }
        }
    }

    /// The interval currently in force, falling back to the configured
    /// default when no settings store is wired in, the value is unset, or
    /// the read fails. A degraded config source must not stop the puller.
    pub(crate) async fn current_interval(&self) -> Duration {
        let Some(settings) = &self.settings else {
            return self.config.default_interval;
        };

        match settings.refresh_interval().await {
            Ok(Some(interval)) => interval,
            Ok(None) => self.config.default_interval,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read refresh interval, using default");
                self.config.default_interval
            }
        }
    }
}
