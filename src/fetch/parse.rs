use sha2::{Digest, Sha256};

use super::client::FetchError;
use crate::model::{FeedMeta, FetchedFeed, NewItem};

/// Parse a feed document into items plus feed-level metadata.
///
/// `feed_url` is the URL the document was fetched from; it is used to tell
/// the feed's self link apart from its site link.
pub fn parse_feed(bytes: &[u8], feed_url: &str) -> Result<FetchedFeed, FetchError> {
    let feed = feed_rs::parser::parse(bytes).map_err(|e| FetchError::Parse(e.to_string()))?;

    let title = feed.title.map(|t| t.content);
    // The site link is whichever link isn't the feed document itself
    let site_link = feed
        .links
        .iter()
        .find(|link| link.href != feed_url)
        .or_else(|| feed.links.first())
        .map(|link| link.href.clone())
        .filter(|href| href != feed_url);

    let items = feed
        .entries
        .into_iter()
        .map(|entry| {
            let link = entry.links.first().map(|l| l.href.clone());
            let published = entry.published.or(entry.updated);
            let content = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body));
            let title = entry
                .title
                .map(|t| t.content)
                .unwrap_or_else(|| "Untitled".to_string());

            let existing_id = (!entry.id.is_empty()).then_some(entry.id.as_str());
            let guid = synthesize_guid(existing_id, link.as_deref(), &title, published);

            NewItem {
                guid,
                title,
                link,
                content,
                published,
            }
        })
        .collect();

    Ok(FetchedFeed {
        meta: FeedMeta { title, site_link },
        items,
    })
}

/// A stable identity for an entry: its own id when the feed provides one,
/// otherwise a hash over link, title, and publication time. Duplicate
/// detection in storage keys on this value, so it must not change between
/// fetches of an unchanged entry.
fn synthesize_guid(
    existing: Option<&str>,
    link: Option<&str>,
    title: &str,
    published: Option<chrono::DateTime<chrono::Utc>>,
) -> String {
    if let Some(guid) = existing {
        let trimmed = guid.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let input = format!(
        "{}|{}|{}",
        link.unwrap_or(""),
        title,
        published.map(|p| p.timestamp().to_string()).unwrap_or_default()
    );
    format!("{:x}", Sha256::digest(input.as_bytes()))
}
