use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, info};

use crate::api::latency::PageLatency;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::types::{Record, Scalar};

#[derive(Debug, Default, Clone, Serialize)]
pub struct FetchStats {
    /// Requests made, including the terminating empty page if one was seen.
    pub pages: usize,
    pub rows: usize,
    pub elapsed_ms: f64,
}

/// Reads whole tables from the PostgREST endpoint, one page at a time.
pub struct Fetcher {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    page_size: usize,
    order_by: Option<String>,
    latency: Arc<PageLatency>,
}

impl Fetcher {
    pub fn new(cfg: &Config, latency: Arc<PageLatency>) -> Result<Self> {
        if cfg.page_size == 0 {
            return Err(AppError::Config("page size must be greater than zero".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.http_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: cfg.supabase_url.trim_end_matches('/').to_string(),
            api_key: cfg.supabase_key.clone(),
            page_size: cfg.page_size,
            order_by: cfg.order_by.clone(),
            latency,
        })
    }

    /// Fetch every row of `table`, in page order.
    pub async fn fetch_table(&self, table: &str) -> Result<(Vec<Record>, FetchStats)> {
        let started = Instant::now();
        let (rows, mut stats) =
            paginate(self.page_size, |offset| self.fetch_page(table, offset)).await?;
        stats.elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        info!(
            table,
            rows = stats.rows,
            pages = stats.pages,
            "Fetched {} rows from {table} in {} pages ({:.0}ms)",
            stats.rows,
            stats.pages,
            stats.elapsed_ms,
        );
        Ok((rows, stats))
    }

    async fn fetch_page(&self, table: &str, offset: usize) -> Result<Vec<Record>> {
        let url = format!("{}/{}", self.base_url, table);
        let mut query = vec![
            ("select", "*".to_string()),
            ("limit", self.page_size.to_string()),
            ("offset", offset.to_string()),
        ];
        if let Some(order) = &self.order_by {
            query.push(("order", order.clone()));
        }

        let started = Instant::now();
        let resp = self
            .client
            .get(&url)
            .query(&query)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(AppError::FetchFailed {
                table: table.to_string(),
                status: status.as_u16(),
            });
        }

        let body: serde_json::Value = resp.json().await?;
        self.latency.record(started.elapsed());

        let rows = parse_page(table, body)?;
        debug!(table, offset, rows = rows.len(), "page received");
        Ok(rows)
    }
}

/// Drive `fetch_page(offset)` until the data runs out.
///
/// An empty page, or a page shorter than `page_size`, is the last one; a
/// short page's rows are kept and no confirming request follows. Any error
/// aborts and the rows gathered so far are dropped.
pub async fn paginate<F, Fut>(page_size: usize, mut fetch_page: F) -> Result<(Vec<Record>, FetchStats)>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<Vec<Record>>>,
{
    if page_size == 0 {
        return Err(AppError::Config("page size must be greater than zero".to_string()));
    }

    let mut rows = Vec::new();
    let mut stats = FetchStats::default();
    let mut page = 0usize;

    loop {
        let items = fetch_page(page * page_size).await?;
        stats.pages += 1;

        if items.is_empty() {
            break;
        }

        let count = items.len();
        rows.extend(items);
        page += 1;

        if count < page_size {
            break;
        }
    }

    stats.rows = rows.len();
    Ok((rows, stats))
}

/// Turn one response body into records. The body must be a JSON array of
/// objects.
pub fn parse_page(table: &str, body: serde_json::Value) -> Result<Vec<Record>> {
    let serde_json::Value::Array(items) = body else {
        return Err(AppError::UnexpectedResponse {
            table: table.to_string(),
            detail: "response was not an array".to_string(),
        });
    };

    items
        .into_iter()
        .map(|item| match item {
            serde_json::Value::Object(map) => Ok(map
                .into_iter()
                .map(|(k, v)| (k, Scalar::from_json(v)))
                .collect::<Record>()),
            other => Err(AppError::UnexpectedResponse {
                table: table.to_string(),
                detail: format!("row was not an object: {other}"),
            }),
        })
        .collect()
}
