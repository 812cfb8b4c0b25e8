mod api;
mod config;
mod dedupe;
mod error;
mod fetcher;
mod metrics;
mod normalizer;
mod pipeline;
mod reconciler;
mod state;
mod temporal;
mod types;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::latency::PageLatency;
use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::error::Result;
use crate::fetcher::Fetcher;
use crate::pipeline::Pipeline;
use crate::types::Selection;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&cfg);

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

fn init_logging(cfg: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));
    match cfg.log_format.as_str() {
        "json" => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        _ => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

async fn run(cfg: Config) -> Result<()> {
    let latency = Arc::new(PageLatency::new());
    let fetcher = Fetcher::new(&cfg, Arc::clone(&latency))?;
    let pipeline = Arc::new(Pipeline::new(fetcher, Duration::from_secs(cfg.cache_ttl_secs)));
    let health = Arc::new(HealthState::new());

    info!(
        "Data store: {} (page_size={}, order={}, cache_ttl={}s)",
        cfg.supabase_url,
        cfg.page_size,
        cfg.order_by.as_deref().unwrap_or("store default"),
        cfg.cache_ttl_secs,
    );
    if cfg.order_by.is_none() {
        warn!("ORDER_BY is empty, page order follows the store and duplicate tie-breaks may vary between loads");
    }

    // --- Warm load: fills the cache and surfaces credential problems early ---
    match pipeline.load(Selection::All).await {
        Ok(dataset) => {
            health.record_success();
            for t in &dataset.tables {
                info!(
                    "[LOAD] {}: raw={} clean={} dup_id={} dup_key={} bad_dates={}",
                    t.table,
                    t.raw_count,
                    t.clean_count,
                    t.dedupe.removed_by_id,
                    t.dedupe.removed_by_business_key,
                    t.normalize.unparseable(),
                );
            }
            info!("Warm load complete: {} combined records", dataset.frame.len());
        }
        Err(e) => {
            health.record_failure(e.to_string());
            warn!("Warm load failed, serving anyway: {e}");
        }
    }

    // --- HTTP API ---
    let api_state = ApiState {
        pipeline,
        health,
        latency,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
