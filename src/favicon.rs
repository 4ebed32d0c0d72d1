//! Best-effort favicon resolution for the maintenance pass.
//!
//! Icons are cached on disk keyed by hostname, so many feeds on the same
//! site share one cached file. Every failure here is reported to the caller
//! as a plain error; the maintenance pass logs and moves on.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pull::FaviconProvider;

const FAVICON_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ICON_SIZE: usize = 1024 * 1024; // 1MB
// Only the head of the front page is scanned for <link rel="icon"> tags
const MAX_HTML_SCAN_SIZE: usize = 50 * 1024;

/// Resolves and caches favicons for feed sites.
#[derive(Clone)]
pub struct FaviconService {
    cache_dir: PathBuf,
    client: reqwest::Client,
}

impl FaviconService {
    pub fn new(cache_dir: PathBuf, client: reqwest::Client) -> Self {
        Self { cache_dir, client }
    }

    /// Resolve an icon for the site hosting `feed_url`, downloading and
    /// caching it if needed. Returns the cached file path.
    ///
    /// Candidates are tried in order: icon links scanned from the site's
    /// front page, then the conventional `/favicon.ico` and `/favicon.png`
    /// locations, then Google's s2 favicon endpoint as a last resort.
    pub async fn resolve(&self, feed_url: &str) -> Result<PathBuf> {
        let hostname = extract_hostname(feed_url)?;
        let cached = self.cache_dir.join(format!("{}.png", cache_key(&hostname)));

        if tokio::fs::metadata(&cached).await.is_ok() {
            return Ok(cached);
        }
        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .context("failed to create favicon cache directory")?;

        let mut candidates = self.scan_site_icons(&hostname).await;
        candidates.push(format!("https://{hostname}/favicon.ico"));
        candidates.push(format!("https://{hostname}/favicon.png"));
        candidates.push(format!(
            "https://www.google.com/s2/favicons?sz=32&domain={hostname}"
        ));

        for candidate in &candidates {
            match self.download(candidate, &cached).await {
                Ok(()) => return Ok(cached),
                Err(err) => {
                    tracing::debug!(url = %candidate, error = %err, "favicon candidate failed");
                }
            }
        }

        bail!("no reachable favicon for {hostname}");
    }

    /// Icon URLs advertised by the site's front page, best first.
    async fn scan_site_icons(&self, hostname: &str) -> Vec<String> {
        let site_url = format!("https://{hostname}");
        let response = match self
            .client
            .get(&site_url)
            .timeout(FAVICON_TIMEOUT)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            _ => return Vec::new(),
        };

        match read_head(response, MAX_HTML_SCAN_SIZE).await {
            Some(html) => find_icon_links_in_html(&html, &site_url),
            None => Vec::new(),
        }
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let response = self
            .client
            .get(url)
            .timeout(FAVICON_TIMEOUT)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("HTTP {}", response.status().as_u16());
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if bytes.len().saturating_add(chunk.len()) > MAX_ICON_SIZE {
                bail!("icon larger than {MAX_ICON_SIZE} bytes");
            }
            bytes.extend_from_slice(&chunk);
        }
        if bytes.is_empty() {
            bail!("empty icon response");
        }

        tokio::fs::write(dest, &bytes)
            .await
            .context("failed to write cached icon")?;
        Ok(())
    }
}

#[async_trait]
impl FaviconProvider for FaviconService {
    async fn favicon_path(&self, feed_url: &str) -> Result<PathBuf> {
        self.resolve(feed_url).await
    }
}

/// Hostname of a feed URL, with any `www.` prefix dropped so the www and
/// bare variants share a cache entry.
fn extract_hostname(feed_url: &str) -> Result<String> {
    let parsed = url::Url::parse(feed_url).context("invalid feed URL")?;
    let hostname = parsed
        .host_str()
        .context("feed URL has no hostname")?
        .trim_start_matches("www.");
    Ok(hostname.to_string())
}

fn cache_key(hostname: &str) -> String {
    let hash = Sha256::digest(hostname.as_bytes());
    format!("{:x}", hash)[..16].to_string()
}

/// Read up to `limit` bytes of a response body; truncation is fine, icon
/// links live in the document head.
async fn read_head(response: reqwest::Response, limit: usize) -> Option<String> {
    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.ok()?;
        let remaining = limit.saturating_sub(bytes.len());
        if remaining == 0 {
            break;
        }
        bytes.extend_from_slice(&chunk[..chunk.len().min(remaining)]);
    }
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Scan HTML for `<link>` tags with an icon rel, resolving relative hrefs
/// against the site URL. Plain string scanning, no HTML parser.
fn find_icon_links_in_html(html: &str, base_url: &str) -> Vec<String> {
    let html_lower = html.to_lowercase();
    let mut icons = Vec::new();
    let mut search_from = 0;

    while let Some(link_start) = html_lower[search_from..].find("<link") {
        let abs_start = search_from + link_start;
        let Some(tag_end) = html_lower[abs_start..].find('>') else {
            break;
        };

        let tag = &html_lower[abs_start..=abs_start + tag_end];
        if contains_attr(tag, "rel", "icon") || contains_attr(tag, "rel", "shortcut icon") {
            // Take the href from the original casing to keep URLs intact
            let original_tag = &html[abs_start..=abs_start + tag_end];
            if let Some(href) = extract_attr_value(original_tag, "href") {
                icons.push(resolve_url(href, base_url));
            }
        }

        search_from = abs_start + tag_end + 1;
    }

    icons
}

fn contains_attr(tag: &str, attr_name: &str, attr_value: &str) -> bool {
    tag.contains(&format!("{attr_name}=\"{attr_value}\""))
        || tag.contains(&format!("{attr_name}='{attr_value}'"))
}

fn extract_attr_value<'a>(tag: &'a str, attr_name: &str) -> Option<&'a str> {
    let tag_lower = tag.to_lowercase();
    let attr_prefix = format!("{attr_name}=");

    let attr_start = tag_lower.find(&attr_prefix)?;
    let value_start = attr_start + attr_prefix.len();
    let rest = tag.get(value_start..)?;

    let quote = *rest.as_bytes().first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }

    let inner = &rest[1..];
    let end = inner.find(quote as char)?;
    Some(&inner[..end])
}

fn resolve_url(href: &str, base_url: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_owned();
    }
    if let Ok(base) = url::Url::parse(base_url) {
        if let Ok(resolved) = base.join(href) {
            return resolved.to_string();
        }
    }
    href.to_owned()
}
