//! eddy, a headless RSS/Atom aggregation daemon.
//!
//! The core is the feed-pull scheduler in [`pull`]: a process-lifetime loop
//! that decides per feed whether a refresh is due, bounds concurrent network
//! work, and isolates per-feed failures. [`storage`] persists feeds and
//! items in SQLite, [`fetch`] retrieves and parses feed documents, and
//! [`favicon`] resolves site icons for the per-cycle maintenance pass.

pub mod config;
pub mod favicon;
pub mod fetch;
pub mod model;
pub mod pull;
pub mod storage;
