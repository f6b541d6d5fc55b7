// src/server/state.rs

//! Builds and holds the shared per-process state every request handler sees.

use crate::config::{CacheDriver, Config};
use crate::core::allow_ip::AllowedNetworks;
use crate::core::cache::CacheService;
use crate::core::ratelimit::{
    MemoryRateLimitStore, RateLimiter, RedisRateLimitStore,
};
use crate::core::storage::file::FileSweeper;
use crate::core::storage::memory::MemorySweeper;
use crate::core::storage::{CacheStore, FileStore, MemoryStore, RedisStore};
use crate::core::waf::{Keywords, WafService};
use aho_corasick::{AhoCorasick, MatchKind};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;
use url::Url;

/// Upstream dial timeout.
const UPSTREAM_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Upstream total round-trip timeout.
const UPSTREAM_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Everything a request handler needs, constructed once at startup.
pub struct AppState {
    pub config: Config,
    /// The origin base URL, parsed once per process.
    pub origin: Url,
    pub cache: Option<CacheService>,
    pub http_client: reqwest::Client,
    pub allow_ip: AllowedNetworks,
    pub waf: Option<WafService>,
    pub limiter: Option<RateLimiter>,
    /// Matches the origin's absolute and scheme-relative spellings inside
    /// response bodies; the replacements vary per request.
    pub rewriter: AhoCorasick,
}

pub type SharedState = Arc<AppState>;

/// Assembles the application state: parses the origin, connects the chosen
/// cache backend, spawns its sweeper, and prepares the middleware services.
pub async fn build(config: Config, shutdown_tx: &broadcast::Sender<()>) -> Result<SharedState> {
    let origin = config.origin_url()?;
    let allow_ip = AllowedNetworks::parse(&config.cache_remove_allow_ip)?;
    let http_client = build_http_client(&config)?;
    let rewriter = build_rewriter(&config, &origin)?;

    let cache = if config.use_cache {
        let store = build_store(&config, shutdown_tx).await?;
        Some(CacheService::new(store))
    } else {
        None
    };

    let waf = if config.use_waf {
        let keywords = Keywords::load(&config.waf_config)?;
        Some(WafService::new(keywords)?)
    } else {
        None
    };

    let limiter = if config.use_ratelimit {
        Some(build_limiter(&config).await?)
    } else {
        None
    };

    Ok(Arc::new(AppState {
        config,
        origin,
        cache,
        http_client,
        allow_ip,
        waf,
        limiter,
        rewriter,
    }))
}

/// The reusable upstream transport.
fn build_http_client(config: &Config) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(config.ignore_ssl_verify)
        .min_tls_version(reqwest::tls::Version::TLS_1_0)
        .connect_timeout(UPSTREAM_CONNECT_TIMEOUT)
        .timeout(UPSTREAM_REQUEST_TIMEOUT)
        // Redirects pass through to the client untouched.
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .context("failed to build the upstream HTTP client")
}

/// Constructs the configured cache backend and, for the local backends,
/// spawns its background expiry sweeper.
async fn build_store(
    config: &Config,
    shutdown_tx: &broadcast::Sender<()>,
) -> Result<Arc<dyn CacheStore>> {
    match config.cache_driver {
        CacheDriver::Memory => {
            let store = Arc::new(MemoryStore::new());
            tokio::spawn(MemorySweeper::new(store.clone()).run(shutdown_tx.subscribe()));
            Ok(store)
        }
        CacheDriver::File => {
            let store = Arc::new(
                FileStore::new(&config.cache_path)
                    .await
                    .context("failed to open the file cache directory")?,
            );
            tokio::spawn(FileSweeper::new(store.clone()).run(shutdown_tx.subscribe()));
            info!("File cache store ready at '{}'.", config.cache_path);
            Ok(store)
        }
        CacheDriver::Redis => {
            let store = RedisStore::connect(&config.redis_url())
                .await
                .context("failed to connect the remote cache store")?;
            Ok(Arc::new(store))
        }
    }
}

/// Constructs the rate limiter, sharing buckets through the remote store
/// when the cache itself is remote.
async fn build_limiter(config: &Config) -> Result<RateLimiter> {
    let window = Duration::from_secs(config.ratelimit_second.max(1));
    let limiter = if config.cache_driver == CacheDriver::Redis {
        let client = redis::Client::open(config.redis_url())
            .context("failed to open the rate limit backend")?;
        let conn = client
            .get_connection_manager()
            .await
            .context("failed to connect the rate limit backend")?;
        RateLimiter::new(
            Arc::new(RedisRateLimitStore::new(conn, window)),
            config.ratelimit_max,
        )
    } else {
        RateLimiter::new(
            Arc::new(MemoryRateLimitStore::new(window)),
            config.ratelimit_max,
        )
    };
    Ok(limiter)
}

/// Compiles the body-rewrite automaton. Pattern order matters: the longest,
/// most specific spelling of the origin wins.
fn build_rewriter(config: &Config, origin: &Url) -> Result<AhoCorasick> {
    let origin_authority = origin.authority();
    let patterns = [
        config.host_destination.clone(),
        format!("\"//{origin_authority}"),
        format!("'//{origin_authority}"),
    ];
    AhoCorasick::builder()
        .match_kind(MatchKind::LeftmostFirst)
        .build(patterns)
        .context("failed to build the body rewrite automaton")
}
