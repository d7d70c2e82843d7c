//! The seam between the collection pipeline and the remote it reads from.
//!
//! The built-in implementation is [`RestSource`](crate::connector_rest::RestSource),
//! which talks to a PostgREST-style endpoint. Tests and embedders can plug in
//! their own [`PostSource`] to drive [`Collector`](crate::collect::Collector)
//! without a network.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::models::Account;

/// One page of a remote listing.
#[derive(Debug, Clone, PartialEq)]
pub enum Page<T> {
    /// The remote answered 200 with these items (possibly none).
    Items(Vec<T>),
    /// The remote answered with a non-200 status. Treated as end of data for
    /// that resource; never retried automatically.
    Rejected(u16),
}

/// A remote holding accounts and their posts.
///
/// Listings come back as raw JSON rows so callers can compare the row count
/// against the page size before any row is discarded as malformed.
/// Transport failures (timeouts, connection errors, undecodable bodies) come
/// back as `Err`; HTTP-level refusals come back as [`Page::Rejected`].
#[async_trait]
pub trait PostSource: Send + Sync {
    /// Account rows, `limit` at a time starting at `offset`.
    async fn accounts_page(&self, offset: u64, limit: u64) -> Result<Page<Value>>;

    /// Account rows whose handle equals `handle`.
    async fn lookup_account(&self, handle: &str) -> Result<Page<Value>>;

    /// Post rows of `account`, `limit` at a time starting at `offset`.
    async fn posts_page(&self, account: &Account, offset: u64, limit: u64) -> Result<Page<Value>>;
}
