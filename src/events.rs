//! Observer hook for worker activity.

use url::Url;

use crate::http::RequestKey;
use crate::origin::Route;

/// Where a fetch event's response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Served from the cache store without touching the network.
    Cache,
    /// Served by a live network fetch.
    Network,
    /// Served from the cache store after the network failed.
    CacheFallback,
}

/// Trait for receiving worker lifecycle and fetch notifications.
///
/// Implement this trait to observe what the worker does. All methods have
/// default no-op implementations for convenience.
pub trait WorkerEvents: Send + Sync {
    /// Called when an asset was fetched and stored during install.
    fn on_asset_cached(&self, _url: &Url) {}

    /// Called when an asset could not be cached during install.
    fn on_asset_failed(&self, _url: &Url, _error: &str) {}

    /// Called for each stale cache store removed during activation.
    fn on_cache_deleted(&self, _name: &str) {}

    /// Called after activation claimed the open pages.
    fn on_clients_claimed(&self, _count: usize) {}

    /// Called when a fetch event has been answered.
    fn on_fetch_served(&self, _key: &RequestKey, _route: Route, _source: ResponseSource) {}

    /// Called when a background write-back into the cache failed.
    fn on_write_back_failed(&self, _key: &RequestKey, _error: &str) {}
}

/// A null observer that ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEvents;

impl WorkerEvents for NoEvents {}
