//! smcp-sw CLI - drives the caching worker against a live site and an
//! on-disk cache.

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use smcp_sw::{
    AppConfig, CacheStorage, DiskCacheStorage, HttpFetcher, Request, ServiceWorker, WorkerEvents,
};
use url::Url;

type Worker = ServiceWorker<DiskCacheStorage, HttpFetcher>;

fn print_usage() {
    eprintln!("Usage: smcp-sw [OPTIONS] <COMMAND>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  install             Pre-cache all assets and activate this cache version");
    eprintln!("  fetch <url>...      Serve URLs through the worker (relative URLs use the scope)");
    eprintln!("  caches              List cache stores and their entry counts");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <PATH> Config file (created with defaults if missing)");
    eprintln!("  -h, --help          Show this help");
    eprintln!();
    eprintln!("Set RUST_LOG=debug for routing details.");
}

/// Prints per-asset install failures as they happen.
struct ConsoleEvents;

impl WorkerEvents for ConsoleEvents {
    fn on_asset_failed(&self, url: &Url, error: &str) {
        eprintln!("  ✗ {url}: {error}");
    }

    fn on_cache_deleted(&self, name: &str) {
        println!("  removed stale cache {name}");
    }
}

enum Command {
    Install,
    Fetch(Vec<String>),
    Caches,
}

struct CliArgs {
    config_path: PathBuf,
    command: Command,
}

fn parse_args(args: &[String]) -> Result<Option<CliArgs>, String> {
    let mut config_path = AppConfig::default_path();
    let mut positional = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => return Ok(None),
            "-c" | "--config" => {
                i += 1;
                let path = args.get(i).ok_or("--config requires a value")?;
                config_path = PathBuf::from(path);
            }
            flag if flag.starts_with('-') => return Err(format!("unknown option {flag}")),
            _ => positional.push(args[i].clone()),
        }
        i += 1;
    }

    let Some((name, rest)) = positional.split_first() else {
        return Ok(None);
    };
    let command = match name.as_str() {
        "install" => Command::Install,
        "caches" => Command::Caches,
        "fetch" if rest.is_empty() => return Err("fetch requires at least one URL".to_string()),
        "fetch" => Command::Fetch(rest.to_vec()),
        other => return Err(format!("unknown command {other}")),
    };
    Ok(Some(CliArgs {
        config_path,
        command,
    }))
}

fn build_worker(config: &AppConfig) -> smcp_sw::Result<Worker> {
    let storage = Arc::new(DiskCacheStorage::new(&config.paths.cache_dir));
    let fetcher = Arc::new(HttpFetcher::new(&config.http, config.worker.origin())?);
    Ok(ServiceWorker::new(config.worker.clone(), storage, fetcher)?
        .with_events(Arc::new(ConsoleEvents)))
}

async fn install(worker: &Worker) -> smcp_sw::Result<()> {
    println!(
        "Installing {} ({} assets)...",
        worker.version(),
        worker.config().assets.len()
    );
    let report = worker.install().await?;
    let activated = worker.activate().await?;
    println!(
        "Cached {}/{} assets, removed {} stale cache(s).",
        report.cached.len(),
        report.cached.len() + report.failed.len(),
        activated.deleted.len()
    );
    Ok(())
}

async fn fetch(worker: &Worker, urls: &[String]) -> smcp_sw::Result<()> {
    if !worker.restore().await? {
        install(worker).await?;
    }
    for raw in urls {
        let url = worker.config().scope.join(raw)?;
        match worker.handle_fetch(Request::get(url.clone())).await {
            Ok(served) => println!(
                "{} {url} ({:?}, {} bytes)",
                served.response.status,
                served.source,
                served.response.body.len()
            ),
            Err(e) => eprintln!("ERR {url}: {e}"),
        }
    }
    worker.settle().await;

    let stats = worker.stats();
    println!(
        "{} request(s): {} cache hit(s), {} from network, {} fallback(s), {} failed",
        stats.total_requests(),
        stats.cache_hits,
        stats.network_responses,
        stats.cache_fallbacks,
        stats.failed_fetches
    );
    Ok(())
}

async fn list_caches(storage: &DiskCacheStorage) -> smcp_sw::Result<()> {
    let names = storage.keys().await?;
    if names.is_empty() {
        println!("No caches in {}", storage.root().display());
    }
    for name in names {
        let entries = storage.entries(&name).await?;
        println!("{name}: {} entr{}", entries.len(), if entries.len() == 1 { "y" } else { "ies" });
        for key in entries {
            println!("  {key}");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> smcp_sw::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    let cli = match parse_args(&args) {
        Ok(Some(cli)) => cli,
        Ok(None) => {
            print_usage();
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            print_usage();
            std::process::exit(1);
        }
    };

    let config = AppConfig::load_or_create(&cli.config_path)?;
    log::info!("Loaded config from {}", cli.config_path.display());

    match cli.command {
        Command::Install => install(&build_worker(&config)?).await,
        Command::Fetch(urls) => fetch(&build_worker(&config)?, &urls).await,
        Command::Caches => list_caches(&DiskCacheStorage::new(&config.paths.cache_dir)).await,
    }
}
