use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

use super::parse::parse_feed;
use crate::model::{Feed, FetchedFeed};
use crate::pull::FetchFeed;

const MAX_RETRIES: u32 = 3;
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors from fetching and parsing one feed.
///
/// No timeout variant: the pull pipeline wraps the whole fetch in its own
/// deadline and reports expiry itself.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS)
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Non-2xx HTTP response
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Server returned 429 Too Many Requests after max retries
    #[error("rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the size limit
    #[error("response too large")]
    ResponseTooLarge,
    /// Feed document could not be parsed as RSS or Atom
    #[error("parse error: {0}")]
    Parse(String),
    /// The feed has no source URL
    #[error("feed has no link")]
    NoLink,
}

/// HTTP feed client. Wraps a shared [`reqwest::Client`] so connection pools
/// are reused across concurrent pulls.
#[derive(Clone)]
pub struct FeedClient {
    client: reqwest::Client,
}

impl FeedClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Fetch a feed document and parse its current item set.
    ///
    /// 429 and 5xx responses are retried up to [`MAX_RETRIES`] times with an
    /// exponentially growing delay (2s, 4s, 8s); other non-2xx statuses fail
    /// immediately. Bodies are read through a size-limited stream so a
    /// misbehaving server cannot exhaust memory.
    pub async fn fetch(&self, url: &str) -> Result<FetchedFeed, FetchError> {
        let mut retry_count = 0;

        let bytes = loop {
            let response = self.client.get(url).send().await?;
            let status = response.status();

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                if retry_count >= MAX_RETRIES {
                    return Err(if status.is_server_error() {
                        FetchError::HttpStatus(status.as_u16())
                    } else {
                        FetchError::RateLimited(MAX_RETRIES)
                    });
                }
                let delay_secs = 2u64.pow(retry_count); // 2s, 4s, 8s
                tracing::warn!(
                    feed_link = %url,
                    status = %status,
                    retry = retry_count,
                    delay_secs,
                    "transient server error, retrying after delay"
                );
                tokio::time::sleep(Duration::from_secs(delay_secs)).await;
                retry_count += 1;
                continue;
            }

            if !status.is_success() {
                return Err(FetchError::HttpStatus(status.as_u16()));
            }

            break read_limited_bytes(response, MAX_FEED_SIZE).await?;
        };

        parse_feed(&bytes, url)
    }
}

#[async_trait]
impl FetchFeed for FeedClient {
    async fn fetch_items(&self, feed: &Feed) -> Result<FetchedFeed, FetchError> {
        let link = feed.link.as_deref().ok_or(FetchError::NoLink)?;
        self.fetch(link).await
    }
}

/// Stream a response body into memory, rejecting anything over `limit`.
async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: trust an honest Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{any, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Test Feed</title>
    <item><guid>1</guid><title>Test</title></item>
</channel></rss>"#;

    fn client() -> FeedClient {
        FeedClient::new(reqwest::Client::new())
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("Content-Type", "application/xml"),
            )
            .mount(&server)
            .await;

        let fetched = client().fetch(&format!("{}/feed", server.uri())).await.unwrap();
        assert_eq!(fetched.items.len(), 1);
        assert_eq!(fetched.meta.title.as_deref(), Some("Test Feed"));
    }

    #[tokio::test]
    async fn test_fetch_404_fails_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = client().fetch(&format!("{}/feed", server.uri())).await.unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus(404)));
    }

    #[tokio::test]
    async fn test_fetch_500_retries_then_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(4) // initial request + 3 retries
            .mount(&server)
            .await;

        let err = client().fetch(&format!("{}/feed", server.uri())).await.unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus(500)));
    }

    #[tokio::test]
    async fn test_fetch_503_retry_then_success() {
        let server = MockServer::start().await;
        // First two requests return 503, third succeeds
        Mock::given(any())
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .mount(&server)
            .await;

        let fetched = client().fetch(&format!("{}/feed", server.uri())).await.unwrap();
        assert_eq!(fetched.items.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_malformed_body_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<not valid xml"))
            .mount(&server)
            .await;

        let err = client().fetch(&format!("{}/feed", server.uri())).await.unwrap_err();
        assert!(matches!(err, FetchError::Parse(_)));
    }

    #[tokio::test]
    async fn test_fetch_oversized_body_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_bytes(vec![b'a'; MAX_FEED_SIZE + 1]),
            )
            .mount(&server)
            .await;

        let err = client().fetch(&format!("{}/feed", server.uri())).await.unwrap_err();
        assert!(matches!(err, FetchError::ResponseTooLarge));
    }

    #[tokio::test]
    async fn test_fetch_items_requires_link() {
        let feed = crate::model::Feed {
            id: 1,
            title: "No link".into(),
            link: None,
            updated_at: None,
            consecutive_failures: 0,
            suspended: false,
            favicon_path: None,
            last_error: None,
        };
        let err = client().fetch_items(&feed).await.unwrap_err();
        assert!(matches!(err, FetchError::NoLink));
    }
}
