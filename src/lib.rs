//! smcp-sw - Offline asset caching worker for a small static training site.
//!
//! The worker pre-caches a fixed asset list at install time, drops stale
//! cache generations at activation, and answers requests cache-first for its
//! own origin and network-first for third-party origins. Cache storage and
//! network access are injected, so the same handlers run against an
//! in-memory store in tests and an on-disk store in the binary.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use smcp_sw::{HttpConfig, HttpFetcher, MemoryCacheStorage, Request, ServiceWorker, WorkerConfig};
//!
//! # async fn example() -> smcp_sw::Result<()> {
//! let config = WorkerConfig::default();
//! let fetcher = HttpFetcher::new(&HttpConfig::default(), config.origin())?;
//! let worker = ServiceWorker::new(
//!     config,
//!     Arc::new(MemoryCacheStorage::new()),
//!     Arc::new(fetcher),
//! )?;
//!
//! let report = worker.install().await?;
//! println!("Cached {} assets", report.cached.len());
//! worker.activate().await?;
//!
//! let url = worker.config().scope.join("./module3.html")?;
//! let served = worker.handle_fetch(Request::get(url)).await?;
//! println!("{} from {:?}", served.response.status, served.source);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod cache;
pub mod clients;
pub mod config;
pub mod error;
pub mod events;
pub mod fetch;
pub mod http;
pub mod origin;
pub mod stats;
pub mod worker;

// Re-export main types for convenience
pub use cache::{CacheStorage, DiskCacheStorage, MemoryCacheStorage};
pub use clients::{ClientId, ClientInfo, Clients};
pub use config::{AppConfig, HttpConfig, PathConfig, WorkerConfig};
pub use error::{Error, Result};
pub use events::{NoEvents, ResponseSource, WorkerEvents};
pub use fetch::{Fetcher, HttpFetcher};
pub use http::{Request, RequestKey, RequestMode, Response, ResponseType};
pub use origin::Route;
pub use stats::{StatsSnapshot, WorkerStats};
pub use worker::{ActivateReport, InstallReport, Served, ServiceWorker, WorkerState};
