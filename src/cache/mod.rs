//! Named cache stores keyed by request identity.
//!
//! The worker never reaches for a global cache: it is handed a
//! [`CacheStorage`] and talks to it only through this trait, so tests can run
//! against [`MemoryCacheStorage`] while the binary uses [`DiskCacheStorage`].

mod disk;
mod memory;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::http::{RequestKey, Response};

pub use disk::DiskCacheStorage;
pub use memory::MemoryCacheStorage;

/// A set of named cache stores, each mapping request keys to responses.
///
/// Writes are last-write-wins: two concurrent `put`s for the same key leave
/// exactly one of the two responses behind, never a mix of both.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Opens the named store, creating it empty if it does not exist.
    async fn open(&self, name: &str) -> Result<()>;

    /// Returns the names of all existing stores in creation order.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Deletes the named store. Returns `false` if it did not exist.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Looks up `key` in the named store. A missing store is a miss, and so
    /// is any key whose method is not `GET`.
    async fn match_request(&self, name: &str, key: &RequestKey) -> Result<Option<Response>>;

    /// Stores `response` under `key`, creating the store if needed and
    /// replacing any previous entry.
    ///
    /// Keys whose method is not `GET` are rejected with [`Error::Cache`].
    async fn put(&self, name: &str, key: &RequestKey, response: &Response) -> Result<()>;

    /// Lists the request keys held by the named store, sorted.
    async fn entries(&self, name: &str) -> Result<Vec<RequestKey>>;
}

/// Rejects keys a cache store must never hold.
fn check_put_key(key: &RequestKey) -> Result<()> {
    if key.is_cacheable() {
        Ok(())
    } else {
        Err(Error::Cache(format!("cannot store {key}: only GET requests are cached")))
    }
}
