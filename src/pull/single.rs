//! The single-feed pull pipeline: decide, fetch, persist.

use chrono::Utc;
use tokio::time::{self, Instant};

use super::decide::{decide_update_action, SkipReason, UpdateAction};
use super::{PullError, Puller};
use crate::model::{Feed, FeedMeta, FeedPatch};

impl Puller {
    /// Pull one feed: consult the decision engine, fetch under a deadline,
    /// and record the outcome on the feed row.
    ///
    /// `force` bypasses the timing and backoff checks. Suspension is only
    /// bypassed when the operator enabled `force_overrides_suspension`.
    ///
    /// Postconditions: success resets `consecutive_failures` and clears
    /// `last_error`; failure increments the counter and records the error.
    /// Both stamp `updated_at`, which is what the backoff window is measured
    /// against on the next cycle.
    pub(crate) async fn pull_feed(
        &self,
        batch_deadline: Instant,
        feed: Feed,
        force: bool,
    ) -> Result<(), PullError> {
        let Some(link) = feed.link.clone() else {
            tracing::debug!(feed_id = feed.id, "skipping feed without a link");
            return Ok(());
        };

        let interval = self.current_interval().await;
        if let UpdateAction::Skip(reason) = decide_update_action(&feed, Utc::now(), interval) {
            let fetch_anyway = match reason {
                SkipReason::Suspended => force && self.config.force_overrides_suspension,
                SkipReason::CoolingOff | SkipReason::TooSoon => force,
            };
            if !fetch_anyway {
                tracing::info!(feed_id = feed.id, feed_link = %link, %reason, "skipping feed");
                return Ok(());
            }
        }

        // The batch deadline keeps a slow cycle from overlapping the next
        // one; the per-feed timeout keeps one stuck fetch from eating the
        // whole batch budget.
        let deadline = batch_deadline.min(Instant::now() + self.config.feed_timeout);
        let outcome = match time::timeout_at(deadline, self.fetch_and_store(&feed)).await {
            Ok(result) => result,
            Err(_) => Err(PullError::Timeout),
        };

        match outcome {
            Ok((inserted, meta)) => {
                tracing::info!(feed_id = feed.id, feed_link = %link, items = inserted, "pulled feed");
                // A feed registered by bare URL picks up its title on the
                // first successful pull
                let title = match meta.title {
                    Some(title) if feed.title.is_empty() => Some(title),
                    _ => None,
                };
                self.feeds
                    .update_feed(
                        feed.id,
                        FeedPatch {
                            title,
                            updated_at: Some(Utc::now()),
                            consecutive_failures: Some(0),
                            last_error: Some(None),
                            ..Default::default()
                        },
                    )
                    .await?;
                Ok(())
            }
            Err(err) => {
                let patch = FeedPatch {
                    updated_at: Some(Utc::now()),
                    consecutive_failures: Some(feed.consecutive_failures + 1),
                    last_error: Some(Some(err.to_string())),
                    ..Default::default()
                };
                if let Err(db_err) = self.feeds.update_feed(feed.id, patch).await {
                    tracing::warn!(feed_id = feed.id, error = %db_err, "failed to record pull failure");
                }
                Err(err)
            }
        }
    }

    async fn fetch_and_store(&self, feed: &Feed) -> Result<(usize, FeedMeta), PullError> {
        let fetched = self.client.fetch_items(feed).await?;
        let inserted = self.items.insert_items(feed.id, &fetched.items).await?;
        Ok((inserted, fetched.meta))
    }
}
