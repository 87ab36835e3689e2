//! End-to-end behaviour of the worker across install, upgrade and fetch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use smcp_sw::{
    CacheStorage, DiskCacheStorage, Error, Fetcher, MemoryCacheStorage, Request, Response,
    ResponseSource, ResponseType, Result, Route, ServiceWorker, WorkerConfig, WorkerState,
};
use tempfile::TempDir;
use url::Url;

const SCOPE: &str = "https://smcp.test/course/";
const CDN_SCRIPT: &str = "https://cdn.example.com/react@18/umd/react.production.min.js";

/// Scripted network that records each request it sees.
#[derive(Default)]
struct FakeNetwork {
    routes: Mutex<HashMap<String, Response>>,
    calls: Mutex<Vec<String>>,
}

impl FakeNetwork {
    fn serve(&self, url: &str, response: Response) {
        self.routes.lock().unwrap().insert(url.to_string(), response);
    }

    fn go_offline(&self) {
        self.routes.lock().unwrap().clear();
    }

    fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == url).count()
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Fetcher for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let url = request.url.to_string();
        self.calls.lock().unwrap().push(url.clone());
        self.routes
            .lock()
            .unwrap()
            .get(&url)
            .cloned()
            .ok_or_else(|| Error::Network(format!("offline: {url}")))
    }
}

fn asset_url(path: &str) -> String {
    Url::parse(SCOPE).unwrap().join(path).unwrap().to_string()
}

fn page_body(path: &str) -> String {
    format!("<html><body>{path}</body></html>")
}

/// A network that serves every default asset.
fn full_site() -> Arc<FakeNetwork> {
    let network = Arc::new(FakeNetwork::default());
    for path in WorkerConfig::default().assets {
        network.serve(&asset_url(&path), Response::new(200, page_body(&path)));
    }
    network
}

fn config(version: &str) -> WorkerConfig {
    WorkerConfig::new()
        .with_version(version)
        .with_scope(Url::parse(SCOPE).unwrap())
}

fn get(url: &str) -> Request {
    Request::get(Url::parse(url).unwrap())
}

async fn activated<S: CacheStorage + 'static>(
    version: &str,
    storage: Arc<S>,
    network: Arc<FakeNetwork>,
) -> ServiceWorker<S, FakeNetwork> {
    let worker = ServiceWorker::new(config(version), storage, network).unwrap();
    worker.install().await.unwrap();
    worker.activate().await.unwrap();
    worker
}

#[tokio::test]
async fn install_caches_every_asset_byte_for_byte() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let network = full_site();
    let worker = ServiceWorker::new(config("smcp-v1"), Arc::clone(&storage), network).unwrap();

    let report = worker.install().await.unwrap();

    assert!(report.is_complete());
    assert_eq!(report.cached.len(), 17);
    for path in WorkerConfig::default().assets {
        let cached = storage
            .match_request("smcp-v1", &get(&asset_url(&path)).key())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.body.as_ref(), page_body(&path).as_bytes());
    }
}

#[tokio::test]
async fn install_survives_individual_asset_failures() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let network = full_site();
    let missing = asset_url("./module7.html");
    network.routes.lock().unwrap().remove(&missing);

    let worker = ServiceWorker::new(config("smcp-v1"), Arc::clone(&storage), network).unwrap();
    let report = worker.install().await.unwrap();

    assert_eq!(worker.state(), WorkerState::Installed);
    assert!(worker.skip_waiting());
    assert_eq!(report.cached.len(), 16);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0.as_str(), missing);
    assert!(storage.match_request("smcp-v1", &get(&missing).key()).await.unwrap().is_none());
    assert_eq!(storage.entries("smcp-v1").await.unwrap().len(), 16);
}

#[tokio::test]
async fn activation_leaves_only_the_current_store() {
    let storage = Arc::new(MemoryCacheStorage::new());
    for stale in ["smcp-v0", "legacy", "smcp-v1-beta"] {
        storage.open(stale).await.unwrap();
    }

    let worker = activated("smcp-v1", Arc::clone(&storage), full_site()).await;

    assert_eq!(storage.keys().await.unwrap(), vec!["smcp-v1"]);
    assert_eq!(worker.state(), WorkerState::Activated);
}

#[tokio::test]
async fn version_bump_replaces_the_old_store() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let v1 = activated("smcp-v1", Arc::clone(&storage), full_site()).await;
    assert_eq!(v1.storage().keys().await.unwrap(), vec!["smcp-v1"]);

    // The v2 deployment is unreachable during install, so its store stays empty.
    let offline = Arc::new(FakeNetwork::default());
    let v2 = ServiceWorker::new(config("smcp-v2"), Arc::clone(&storage), offline).unwrap();
    let report = v2.install().await.unwrap();
    assert_eq!(report.failed.len(), 17);

    let activation = v2.activate().await.unwrap();

    assert_eq!(activation.deleted, vec!["smcp-v1"]);
    assert_eq!(storage.keys().await.unwrap(), vec!["smcp-v2"]);
    assert!(storage.entries("smcp-v2").await.unwrap().is_empty());
}

#[tokio::test]
async fn cached_internal_request_skips_the_network() {
    let network = full_site();
    let worker = activated(
        "smcp-v1",
        Arc::new(MemoryCacheStorage::new()),
        Arc::clone(&network),
    )
    .await;
    let module3 = asset_url("./module3.html");
    let installs = network.calls_to(&module3);

    let served = worker.handle_fetch(get(&module3)).await.unwrap();

    assert_eq!(served.route, Route::Internal);
    assert_eq!(served.source, ResponseSource::Cache);
    assert_eq!(served.response.body.as_ref(), page_body("./module3.html").as_bytes());
    assert_eq!(network.calls_to(&module3), installs);
}

#[tokio::test]
async fn internal_miss_is_written_back() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let network = full_site();
    let worker = activated("smcp-v1", Arc::clone(&storage), Arc::clone(&network)).await;
    let extra = asset_url("./styles/print.css");
    network.serve(
        &extra,
        Response::new(200, "@media print {}").with_header("content-type", "text/css"),
    );

    let served = worker.handle_fetch(get(&extra)).await.unwrap();
    assert_eq!(served.source, ResponseSource::Network);
    worker.settle().await;

    let cached = storage
        .match_request("smcp-v1", &get(&extra).key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cached, served.response);

    // Second request is a hit, with no further network traffic.
    let before = network.total_calls();
    let again = worker.handle_fetch(get(&extra)).await.unwrap();
    assert_eq!(again.source, ResponseSource::Cache);
    assert_eq!(network.total_calls(), before);
    assert_eq!(worker.stats().write_backs, 1);
}

#[tokio::test]
async fn failed_internal_response_is_not_cached() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let network = full_site();
    let worker = activated("smcp-v1", Arc::clone(&storage), Arc::clone(&network)).await;
    let gone = asset_url("./module15.html");
    network.serve(&gone, Response::new(404, "not here"));

    let served = worker.handle_fetch(get(&gone)).await.unwrap();
    worker.settle().await;

    assert_eq!(served.response.status, 404);
    assert!(storage.match_request("smcp-v1", &get(&gone).key()).await.unwrap().is_none());
    assert_eq!(worker.stats().write_backs, 0);
}

#[tokio::test]
async fn external_request_prefers_the_network_and_leaves_cache_alone() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let network = full_site();
    let worker = activated("smcp-v1", Arc::clone(&storage), Arc::clone(&network)).await;
    let live = Response::new(200, "/* react 18.3 */").with_type(ResponseType::Cors);
    network.serve(CDN_SCRIPT, live.clone());
    let stale = Response::new(200, "/* react 18.0 */").with_type(ResponseType::Cors);
    storage
        .put("smcp-v1", &get(CDN_SCRIPT).key(), &stale)
        .await
        .unwrap();

    let served = worker.handle_fetch(get(CDN_SCRIPT)).await.unwrap();
    worker.settle().await;

    assert_eq!(served.route, Route::External);
    assert_eq!(served.source, ResponseSource::Network);
    assert_eq!(served.response, live);
    let cached = storage
        .match_request("smcp-v1", &get(CDN_SCRIPT).key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cached, stale);
}

#[tokio::test]
async fn external_request_is_not_written_back() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let network = full_site();
    let worker = activated("smcp-v1", Arc::clone(&storage), Arc::clone(&network)).await;
    network.serve(CDN_SCRIPT, Response::new(200, "/* react */"));

    worker.handle_fetch(get(CDN_SCRIPT)).await.unwrap();
    worker.settle().await;

    assert!(storage.match_request("smcp-v1", &get(CDN_SCRIPT).key()).await.unwrap().is_none());
}

#[tokio::test]
async fn offline_external_request_falls_back_to_cache() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let network = full_site();
    let worker = activated("smcp-v1", Arc::clone(&storage), Arc::clone(&network)).await;
    let copy = Response::new(200, "/* cached react */").with_type(ResponseType::Cors);
    storage
        .put("smcp-v1", &get(CDN_SCRIPT).key(), &copy)
        .await
        .unwrap();
    network.go_offline();

    let served = worker.handle_fetch(get(CDN_SCRIPT)).await.unwrap();

    assert_eq!(served.source, ResponseSource::CacheFallback);
    assert_eq!(served.response, copy);
    assert_eq!(network.calls_to(CDN_SCRIPT), 1);
    assert_eq!(worker.stats().cache_fallbacks, 1);
}

#[tokio::test]
async fn site_keeps_working_offline_after_install() {
    let network = full_site();
    let worker = activated(
        "smcp-v1",
        Arc::new(MemoryCacheStorage::new()),
        Arc::clone(&network),
    )
    .await;
    network.go_offline();

    for path in WorkerConfig::default().assets {
        let served = worker.handle_fetch(get(&asset_url(&path))).await.unwrap();
        assert_eq!(served.source, ResponseSource::Cache);
    }
    assert!(matches!(
        worker.handle_fetch(get(&asset_url("./module99.html"))).await,
        Err(Error::Network(_))
    ));
    assert!(matches!(
        worker.handle_fetch(get(CDN_SCRIPT)).await,
        Err(Error::NoResponse { .. })
    ));
}

#[tokio::test]
async fn concurrent_misses_for_one_resource_all_succeed() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let network = full_site();
    let worker = activated("smcp-v1", Arc::clone(&storage), Arc::clone(&network)).await;
    let shared = asset_url("./shared.js");
    network.serve(&shared, Response::new(200, "export {}"));

    let requests = (0..6).map(|_| worker.handle_fetch(get(&shared)));
    let results = futures::future::join_all(requests).await;
    worker.settle().await;

    assert!(results.iter().all(|r| r.is_ok()));
    let cached = storage
        .match_request("smcp-v1", &get(&shared).key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cached.body.as_ref(), b"export {}");
}

#[tokio::test]
async fn disk_cache_survives_a_restart() {
    let dir = TempDir::new().unwrap();
    let network = full_site();
    {
        let storage = Arc::new(DiskCacheStorage::new(dir.path()));
        activated("smcp-v1", storage, Arc::clone(&network)).await;
    }
    network.go_offline();

    let storage = Arc::new(DiskCacheStorage::new(dir.path()));
    let worker = ServiceWorker::new(config("smcp-v1"), storage, Arc::clone(&network)).unwrap();
    assert!(worker.restore().await.unwrap());

    let served = worker
        .handle_fetch(get(&asset_url("./manifest.json")))
        .await
        .unwrap();
    assert_eq!(served.source, ResponseSource::Cache);
    assert_eq!(served.response.body.as_ref(), page_body("./manifest.json").as_bytes());
}
