//! Network retrieval and parsing of remote feeds.
//!
//! [`client`] owns the HTTP side: bounded body reads, retry with backoff on
//! transient server errors. [`parse`] turns the raw XML into domain items
//! with stable GUIDs. The pull scheduler consumes both through the
//! [`FetchFeed`](crate::pull::FetchFeed) trait; deadlines are owned by the
//! caller, not this layer.

mod client;
mod parse;

pub use client::{FeedClient, FetchError};
pub use parse::parse_feed;
