//! The worker: install, activate and fetch handlers over an injected cache
//! storage and network.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future;
use reqwest::Method;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::task::TaskTracker;
use url::{Origin, Url};

use crate::cache::CacheStorage;
use crate::clients::Clients;
use crate::config::WorkerConfig;
use crate::error::{Error, Result};
use crate::events::{NoEvents, ResponseSource, WorkerEvents};
use crate::fetch::Fetcher;
use crate::http::{Request, RequestKey, Response};
use crate::origin::Route;
use crate::stats::{StatsSnapshot, WorkerStats};

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Created, install not yet run.
    Parsed,
    /// Install handler running.
    Installing,
    /// Installed and waiting to activate.
    Installed,
    /// Activate handler running.
    Activating,
    /// Active and intercepting fetches.
    Activated,
    /// Install failed; the worker will never activate.
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Parsed => "parsed",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Activated => "activated",
            Self::Redundant => "redundant",
        };
        f.write_str(s)
    }
}

/// Outcome of the install handler.
#[derive(Debug, Clone, Default)]
pub struct InstallReport {
    /// Assets stored in the cache, in asset-list order.
    pub cached: Vec<Url>,
    /// Assets that could not be cached, with the reason.
    pub failed: Vec<(Url, String)>,
}

impl InstallReport {
    /// Returns true if every asset was cached.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Outcome of the activate handler.
#[derive(Debug, Clone, Default)]
pub struct ActivateReport {
    /// Stale cache stores that were deleted.
    pub deleted: Vec<String>,
    /// Pages that switched to this worker.
    pub clients_claimed: usize,
}

/// A response produced by the fetch handler.
#[derive(Debug, Clone)]
pub struct Served {
    /// Response handed to the page.
    pub response: Response,
    /// How the request was routed.
    pub route: Route,
    /// Where the response came from.
    pub source: ResponseSource,
}

/// Offline caching worker for one cache generation.
///
/// The cache storage, network and client registry are injected and shared
/// through `Arc`s, so several workers (an outgoing and an incoming version)
/// can operate on the same storage.
pub struct ServiceWorker<S: CacheStorage, F: Fetcher> {
    config: WorkerConfig,
    origin: Origin,
    storage: Arc<S>,
    fetcher: Arc<F>,
    clients: Arc<Clients>,
    events: Arc<dyn WorkerEvents>,
    stats: Arc<WorkerStats>,
    state: Mutex<WorkerState>,
    skip_waiting: AtomicBool,
    write_backs: TaskTracker,
    settling: AsyncMutex<()>,
}

impl<S, F> ServiceWorker<S, F>
where
    S: CacheStorage + 'static,
    F: Fetcher,
{
    /// Creates a worker in the [`WorkerState::Parsed`] state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn new(config: WorkerConfig, storage: Arc<S>, fetcher: Arc<F>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            origin: config.origin(),
            config,
            storage,
            fetcher,
            clients: Arc::new(Clients::new()),
            events: Arc::new(NoEvents),
            stats: Arc::new(WorkerStats::new()),
            state: Mutex::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
            write_backs: TaskTracker::new(),
            settling: AsyncMutex::new(()),
        })
    }

    /// Uses `clients` as the registry of open pages.
    #[must_use]
    pub fn with_clients(mut self, clients: Arc<Clients>) -> Self {
        self.clients = clients;
        self
    }

    /// Reports worker activity to `events`.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn WorkerEvents>) -> Self {
        self.events = events;
        self
    }

    /// Returns the worker configuration.
    #[must_use]
    pub const fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Returns the cache version tag this worker owns.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.config.version
    }

    /// Returns the shared cache storage.
    #[must_use]
    pub const fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Returns the shared client registry.
    #[must_use]
    pub const fn clients(&self) -> &Arc<Clients> {
        &self.clients
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether install asked to activate without waiting for old pages.
    #[must_use]
    pub fn skip_waiting(&self) -> bool {
        self.skip_waiting.load(Ordering::Acquire)
    }

    /// Returns a copy of the request counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn set_state(&self, next: WorkerState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Moves from `expected` to `next`, failing if the worker is elsewhere.
    fn transition(&self, expected: WorkerState, next: WorkerState) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != expected {
            return Err(Error::InvalidState {
                expected,
                actual: *state,
            });
        }
        *state = next;
        Ok(())
    }

    /// Install handler: pre-caches every asset, then asks to skip waiting.
    ///
    /// Each asset is fetched and stored independently; a failure is logged,
    /// reported and recorded in the returned report without affecting the
    /// other assets. The handler returns only once every attempt settled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the worker is freshly parsed,
    /// or the storage error if the cache store cannot be opened at all, in
    /// which case the worker becomes [`WorkerState::Redundant`].
    pub async fn install(&self) -> Result<InstallReport> {
        self.transition(WorkerState::Parsed, WorkerState::Installing)?;
        log::info!("Installing worker {}", self.version());

        let urls = match self.config.asset_urls() {
            Ok(urls) => urls,
            Err(e) => {
                self.set_state(WorkerState::Redundant);
                return Err(e);
            }
        };
        if let Err(e) = self.storage.open(self.version()).await {
            log::error!("Could not open cache {}: {e}", self.version());
            self.set_state(WorkerState::Redundant);
            return Err(e);
        }

        let attempts = urls.into_iter().map(|url| async move {
            let result = self.add(&url).await;
            (url, result)
        });

        let mut report = InstallReport::default();
        for (url, result) in future::join_all(attempts).await {
            match result {
                Ok(()) => {
                    self.events.on_asset_cached(&url);
                    report.cached.push(url);
                }
                Err(e) => {
                    log::warn!("Could not cache {url}: {e}");
                    self.events.on_asset_failed(&url, &e.to_string());
                    report.failed.push((url, e.to_string()));
                }
            }
        }

        self.skip_waiting.store(true, Ordering::Release);
        self.set_state(WorkerState::Installed);
        log::info!(
            "Installed worker {}: {} cached, {} failed",
            self.version(),
            report.cached.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Resumes a worker whose generation was installed by an earlier
    /// process: if this version's store already exists, stale stores left by
    /// an interrupted install or activation are swept, open pages are
    /// claimed and the worker goes straight to [`WorkerState::Activated`].
    ///
    /// Returns `false`, leaving the worker parsed, when there is nothing to
    /// resume and a full install is needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the worker is freshly parsed,
    /// or the storage error if the stores cannot be listed or swept; the
    /// worker then stays parsed.
    pub async fn restore(&self) -> Result<bool> {
        let state = self.state();
        if state != WorkerState::Parsed {
            return Err(Error::InvalidState {
                expected: WorkerState::Parsed,
                actual: state,
            });
        }
        let names = self.storage.keys().await?;
        if !names.iter().any(|name| name == self.version()) {
            return Ok(false);
        }
        self.transition(WorkerState::Parsed, WorkerState::Activating)?;
        let deleted = match self.sweep_stale_caches().await {
            Ok(deleted) => deleted,
            Err(e) => {
                self.set_state(WorkerState::Parsed);
                return Err(e);
            }
        };
        let clients_claimed = self.clients.claim(self.version());
        self.events.on_clients_claimed(clients_claimed);
        self.set_state(WorkerState::Activated);
        log::info!(
            "Restored active worker {} ({} stale cache(s) removed)",
            self.version(),
            deleted.len()
        );
        Ok(true)
    }

    /// Fetches `url` and stores it, rejecting anything but a readable 2xx.
    async fn add(&self, url: &Url) -> Result<()> {
        let request = Request::get(url.clone());
        let response = self.fetcher.fetch(&request).await?;
        if response.is_opaque() {
            return Err(Error::OpaqueResponse {
                url: url.to_string(),
            });
        }
        if !response.ok() {
            return Err(Error::BadStatus {
                url: url.to_string(),
                status: response.status,
            });
        }
        self.storage
            .put(self.version(), &request.key(), &response)
            .await
    }

    /// Activate handler: deletes every cache store but this worker's own,
    /// then claims all open pages.
    ///
    /// Pages are claimed only after the deletion sweep finished.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the worker is installed, or the
    /// storage error if the sweep fails; the worker then stays installed so
    /// activation can be retried.
    pub async fn activate(&self) -> Result<ActivateReport> {
        self.transition(WorkerState::Installed, WorkerState::Activating)?;
        log::info!("Activating worker {}", self.version());

        let deleted = match self.sweep_stale_caches().await {
            Ok(deleted) => deleted,
            Err(e) => {
                self.set_state(WorkerState::Installed);
                return Err(e);
            }
        };

        let clients_claimed = self.clients.claim(self.version());
        self.events.on_clients_claimed(clients_claimed);
        self.set_state(WorkerState::Activated);
        log::info!(
            "Worker {} active, claimed {clients_claimed} client(s)",
            self.version()
        );

        Ok(ActivateReport {
            deleted,
            clients_claimed,
        })
    }

    async fn sweep_stale_caches(&self) -> Result<Vec<String>> {
        let stale: Vec<String> = self
            .storage
            .keys()
            .await?
            .into_iter()
            .filter(|name| name != self.version())
            .collect();

        let deletions = stale.iter().map(|name| async move {
            log::info!("Deleting old cache: {name}");
            self.storage.delete(name).await
        });
        future::try_join_all(deletions).await?;

        for name in &stale {
            self.events.on_cache_deleted(name);
        }
        // Leave exactly one store behind, even if install wrote nothing.
        self.storage.open(self.version()).await?;
        Ok(stale)
    }

    /// Fetch handler: routes `request` by origin and answers it.
    ///
    /// Same-origin requests are served cache-first with background
    /// write-back; other origins are served network-first with the cache as
    /// an offline fallback. Requests other than `GET` never touch the cache
    /// and always go to the network.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the worker is active, otherwise
    /// the failure the page would see as a failed load.
    pub async fn handle_fetch(&self, request: Request) -> Result<Served> {
        let state = self.state();
        if state != WorkerState::Activated {
            return Err(Error::InvalidState {
                expected: WorkerState::Activated,
                actual: state,
            });
        }

        let route = Route::classify(&self.origin, &request.url);
        log::debug!("{:?} request for {}", route, request.url);

        let result = if request.method == Method::GET {
            match route {
                Route::External => self.network_first(&request).await,
                Route::Internal => self.cache_first(&request).await,
            }
        } else {
            self.network_only(&request, route).await
        };

        match &result {
            Ok(served) => self
                .events
                .on_fetch_served(&request.key(), served.route, served.source),
            Err(e) => {
                log::debug!("No response for {}: {e}", request.url);
                self.stats.record_failure();
            }
        }
        result
    }

    async fn network_only(&self, request: &Request, route: Route) -> Result<Served> {
        let response = self.fetcher.fetch(request).await?;
        self.stats.record_network();
        Ok(Served {
            response,
            route,
            source: ResponseSource::Network,
        })
    }

    async fn network_first(&self, request: &Request) -> Result<Served> {
        let network_err = match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.stats.record_network();
                return Ok(Served {
                    response,
                    route: Route::External,
                    source: ResponseSource::Network,
                });
            }
            Err(e) => e,
        };

        log::debug!("Network failed for {}: {network_err}", request.url);
        match self
            .storage
            .match_request(self.version(), &request.key())
            .await
        {
            Ok(Some(response)) => {
                self.stats.record_fallback();
                Ok(Served {
                    response,
                    route: Route::External,
                    source: ResponseSource::CacheFallback,
                })
            }
            Ok(None) => Err(Error::NoResponse {
                url: request.url.to_string(),
            }),
            Err(cache_err) => {
                log::warn!("Cache lookup failed for {}: {cache_err}", request.url);
                Err(network_err)
            }
        }
    }

    async fn cache_first(&self, request: &Request) -> Result<Served> {
        let key = request.key();
        if let Some(response) = self.storage.match_request(self.version(), &key).await? {
            self.stats.record_hit();
            return Ok(Served {
                response,
                route: Route::Internal,
                source: ResponseSource::Cache,
            });
        }
        self.stats.record_miss();

        let response = self.fetcher.fetch(request).await?;
        self.stats.record_network();
        if response.is_cacheable() {
            self.spawn_write_back(key, response.clone());
        }
        Ok(Served {
            response,
            route: Route::Internal,
            source: ResponseSource::Network,
        })
    }

    /// Stores `response` in a detached task; the page never waits for it.
    ///
    /// Concurrent write-backs for one key are not coordinated: the last one
    /// to land wins, which is harmless because they carry the same resource.
    fn spawn_write_back(&self, key: RequestKey, response: Response) {
        let storage = Arc::clone(&self.storage);
        let events = Arc::clone(&self.events);
        let stats = Arc::clone(&self.stats);
        let version = self.config.version.clone();

        self.write_backs.spawn(async move {
            match storage.put(&version, &key, &response).await {
                Ok(()) => stats.record_write_back(true),
                Err(e) => {
                    log::warn!("Could not store {key} in {version}: {e}");
                    stats.record_write_back(false);
                    events.on_write_back_failed(&key, &e.to_string());
                }
            }
        });
    }

    /// Waits until every write-back spawned so far has finished.
    ///
    /// Concurrent callers take turns, so none of them reopens the tracker
    /// while another is still waiting on it.
    pub async fn settle(&self) {
        let _turn = self.settling.lock().await;
        self.write_backs.close();
        self.write_backs.wait().await;
        self.write_backs.reopen();
    }
}
