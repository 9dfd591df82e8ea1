//! Mini Cache - demo driver
//!
//! Exercises the cache end to end: a stampede of concurrent readers sharing
//! one upstream fetch, then a stale-while-revalidate read, then a stats dump.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::future::join_all;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mini_cache::{CacheConfig, CacheKey, CacheManager, FetchOptions, NamespaceConfig, TracingSink};

/// Number of concurrent readers in the stampede demo.
const STAMPEDE_CALLERS: usize = 50;

/// Main entry point for the demo.
///
/// # Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from `CACHE_CONFIG_FILE` or environment variables
/// 3. Build the cache manager and start background sweeps
/// 4. Run the stampede and stale-while-revalidate scenarios
/// 5. Log statistics and shut down
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mini_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Mini Cache demo");

    let config = load_config()?.with_namespace(
        "flags",
        NamespaceConfig::new(100, Duration::from_millis(200))
            .with_stale_grace(Duration::from_secs(5)),
    );
    info!(
        capacity = config.defaults.capacity,
        ttl = %humantime::format_duration(config.defaults.ttl),
        namespaces = config.namespaces.len(),
        "configuration loaded"
    );

    let cache: Arc<CacheManager<String, String>> = Arc::new(
        CacheManager::builder(config)
            .metrics_sink(Arc::new(TracingSink))
            .build()?,
    );
    cache.start_maintenance();

    stampede(&cache).await?;
    stale_while_revalidate(&cache).await?;

    let stats = serde_json::to_string_pretty(&cache.stats())?;
    info!("final statistics:\n{stats}");

    cache.shutdown();
    info!("Mini Cache demo complete");
    Ok(())
}

/// Reads the JSON file named by `CACHE_CONFIG_FILE`, or falls back to env vars.
fn load_config() -> anyhow::Result<CacheConfig> {
    match std::env::var("CACHE_CONFIG_FILE") {
        Ok(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("reading cache config {path}"))?;
            Ok(CacheConfig::from_json_str(&json)?)
        }
        Err(_) => Ok(CacheConfig::from_env()?),
    }
}

// == Stampede ==
/// Many readers miss the same key at once; the upstream is called once.
async fn stampede(cache: &Arc<CacheManager<String, String>>) -> anyhow::Result<()> {
    let upstream_calls = Arc::new(AtomicUsize::new(0));
    let key = CacheKey::new("users", "profile", 42).into_string();

    let readers = (0..STAMPEDE_CALLERS).map(|_| {
        let cache = Arc::clone(cache);
        let key = key.clone();
        let calls = Arc::clone(&upstream_calls);
        tokio::spawn(async move {
            cache
                .get_or_fetch(
                    "users",
                    key,
                    move |key| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok(format!("profile for {key}"))
                    },
                    FetchOptions::default().with_timeout(Duration::from_secs(2)),
                )
                .await
        })
    });

    let mut served = 0;
    for result in join_all(readers).await {
        result?.map_err(|err| anyhow::anyhow!("stampede read failed: {err}"))?;
        served += 1;
    }

    info!(
        callers = served,
        upstream_calls = upstream_calls.load(Ordering::SeqCst),
        "stampede served"
    );
    Ok(())
}

// == Stale While Revalidate ==
/// A read after the TTL returns the old value at once and refreshes it behind.
async fn stale_while_revalidate(cache: &Arc<CacheManager<String, String>>) -> anyhow::Result<()> {
    let key = CacheKey::new("flags", "feature", "checkout").into_string();
    cache.set("flags", key.clone(), "v1".to_string());

    tokio::time::sleep(Duration::from_millis(300)).await;

    let served = cache
        .get_or_fetch(
            "flags",
            key.clone(),
            |_key| async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok("v2".to_string())
            },
            FetchOptions::default(),
        )
        .await
        .map_err(|err| anyhow::anyhow!("flag read failed: {err}"))?;
    info!(value = %served, "stale value served");

    while cache.in_flight() > 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let refreshed = cache.get("flags", &key).unwrap_or_default();
    info!(value = %refreshed, "value after revalidation");
    Ok(())
}
