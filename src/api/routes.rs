use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::health::HealthState;
use crate::api::latency::{LatencySnapshot, PageLatency};
use crate::config::DATE_COLUMNS;
use crate::error::Result;
use crate::metrics::{charts, kpis, Charts, Kpis};
use crate::pipeline::{Dataset, Pipeline, TableSummary};
use crate::temporal::{future_records, FutureRecords};
use crate::types::{Record, Selection, TableName};

#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<Pipeline>,
    pub health: Arc<HealthState>,
    pub latency: Arc<PageLatency>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/dashboard", get(get_dashboard))
        .route("/tables/:name/rows", get(get_table_rows))
        .route("/health", get(get_health))
        .route("/stats/latency", get(get_stats_latency))
        .route("/cache/clear", post(clear_cache))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct DashboardQuery {
    /// Table name or `all` (default).
    pub table: Option<String>,
}

#[derive(Deserialize)]
pub struct RowsQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct Diagnostics {
    pub available_date_columns: Vec<String>,
    pub future_records: Option<FutureRecords>,
}

#[derive(Serialize)]
pub struct DashboardResponse {
    pub selection: Selection,
    pub generated_at: String,
    pub total_records: usize,
    pub tables: Vec<TableSummary>,
    pub kpis: Kpis,
    pub charts: Charts,
    pub diagnostics: Diagnostics,
}

#[derive(Serialize)]
pub struct RowsResponse {
    pub table: TableName,
    pub columns: Vec<String>,
    pub total: usize,
    pub offset: usize,
    pub rows: Vec<Record>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub cached_tables: Vec<TableName>,
    pub loads_ok: u64,
    pub loads_failed: u64,
    pub last_load_at: Option<String>,
    pub last_error: Option<String>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Assemble the dashboard payload from a loaded dataset.
pub fn build_dashboard(dataset: &Dataset, now: DateTime<Utc>) -> Result<DashboardResponse> {
    let frame = &dataset.frame;

    let future = future_records(frame, now)?;
    if let Some(f) = future.as_ref().filter(|f| f.count > 0) {
        warn!(
            "Found {} future {} dates (earliest {})",
            f.count,
            f.column,
            f.earliest.as_deref().unwrap_or("-"),
        );
    }

    Ok(DashboardResponse {
        selection: dataset.selection,
        generated_at: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        total_records: frame.len(),
        tables: dataset.tables.clone(),
        kpis: kpis(frame),
        charts: charts(frame, dataset.selection, now)?,
        diagnostics: Diagnostics {
            available_date_columns: DATE_COLUMNS
                .iter()
                .filter(|c| frame.has_column(c))
                .map(|c| c.to_string())
                .collect(),
            future_records: future,
        },
    })
}

async fn get_dashboard(
    State(state): State<ApiState>,
    Query(params): Query<DashboardQuery>,
) -> Result<Json<DashboardResponse>> {
    let selection: Selection = params.table.as_deref().unwrap_or("all").parse()?;

    let dataset = match state.pipeline.load(selection).await {
        Ok(d) => {
            state.health.record_success();
            d
        }
        Err(e) => {
            state.health.record_failure(e.to_string());
            return Err(e);
        }
    };

    Ok(Json(build_dashboard(&dataset, Utc::now())?))
}

async fn get_table_rows(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Query(params): Query<RowsQuery>,
) -> Result<Json<RowsResponse>> {
    let table: TableName = name.parse()?;
    let clean = state.pipeline.load_table(table).await?;

    let offset = params.offset.unwrap_or(0);
    let limit = params.limit.unwrap_or(500);
    let total = clean.frame.len();
    let columns = clean.frame.columns().to_vec();
    let rows = clean.frame.into_rows().into_iter().skip(offset).take(limit).collect();

    Ok(Json(RowsResponse { table, columns, total, offset, rows }))
}

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let last_load_at = state
        .health
        .last_load_at_ms()
        .and_then(|ms| Utc.timestamp_millis_opt(ms as i64).single())
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true));

    Json(HealthResponse {
        cached_tables: state.pipeline.cache().cached_tables(),
        loads_ok: state.health.loads_ok(),
        loads_failed: state.health.loads_failed(),
        last_load_at,
        last_error: state.health.last_error(),
    })
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencySnapshot> {
    Json(state.latency.snapshot())
}

async fn clear_cache(State(state): State<ApiState>) -> Json<serde_json::Value> {
    state.pipeline.cache().clear();
    Json(serde_json::json!({ "cleared": true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedupe::{DedupePolicy, DedupeReport};
    use crate::fetcher::FetchStats;
    use crate::normalizer::NormalizeReport;
    use crate::reconciler::reconcile;
    use crate::types::{Frame, Scalar, Timestamp};

    fn bet(profit: f64, stake: f64, day: u32) -> Record {
        let when = Utc.with_ymd_and_hms(2024, 4, day, 9, 0, 0).unwrap();
        Record::from([
            ("profit".to_string(), Scalar::Number(profit)),
            ("stake".to_string(), Scalar::Number(stake)),
            ("start_time".to_string(), Scalar::Timestamp(Timestamp::Aware(when))),
        ])
    }

    fn summary(table: TableName, n: usize) -> TableSummary {
        TableSummary {
            table,
            raw_count: n,
            clean_count: n,
            policy: DedupePolicy::ById,
            fetch: FetchStats::default(),
            normalize: NormalizeReport::default(),
            dedupe: DedupeReport::default(),
        }
    }

    #[test]
    fn dashboard_for_combined_tables() {
        let frame = reconcile(
            [
                Some(Frame::from_records(vec![bet(10.0, 100.0, 1)])),
                Some(Frame::from_records(vec![bet(-5.0, 50.0, 2), bet(20.0, 50.0, 30)])),
                Some(Frame::from_records(vec![bet(1.0, 10.0, 3)])),
            ],
            "",
        )
        .unwrap();
        let dataset = Dataset {
            selection: Selection::All,
            frame,
            tables: TableName::ALL.iter().map(|t| summary(*t, 1)).collect(),
        };
        let now = Utc.with_ymd_and_hms(2024, 4, 15, 0, 0, 0).unwrap();
        let dash = build_dashboard(&dataset, now).unwrap();

        assert_eq!(dash.total_records, 4);
        assert_eq!(dash.kpis.total_profit, 26.0);
        assert_eq!(dash.diagnostics.available_date_columns, vec!["start_time"]);
        let future = dash.diagnostics.future_records.unwrap();
        assert_eq!(future.count, 1);
        assert_eq!(future.earliest.as_deref(), Some("2024-04-30"));

        let by_source = dash.charts.by_source.unwrap();
        assert_eq!(by_source.len(), 3);
        let cumulative = dash.charts.cumulative_profit.unwrap();
        assert_eq!(cumulative.filtered_future, 1);
        assert_eq!(cumulative.final_profit, 6.0);
        assert!(dash.charts.monthly_profit.is_some());

        let json = serde_json::to_value(&dash.selection).unwrap();
        assert_eq!(json, serde_json::json!("all"));
    }

    #[tokio::test]
    async fn router_rejects_unknown_tables_and_reports_health() {
        let latency = Arc::new(PageLatency::new());
        // Nothing listens here; none of these requests reach the store.
        let cfg = crate::config::Config::new("http://127.0.0.1:9", "key");
        let fetcher = crate::fetcher::Fetcher::new(&cfg, Arc::clone(&latency)).unwrap();
        let state = ApiState {
            pipeline: Arc::new(Pipeline::new(fetcher, std::time::Duration::from_secs(60))),
            health: Arc::new(HealthState::new()),
            latency,
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        let client = reqwest::Client::new();
        let base = format!("http://{addr}");

        let resp = client.get(format!("{base}/dashboard?table=bets")).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        assert_eq!(resp.text().await.unwrap(), "Unknown table: bets");

        let resp = client.get(format!("{base}/tables/bets/rows")).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

        let health: serde_json::Value = client.get(format!("{base}/health")).send().await.unwrap().json().await.unwrap();
        assert_eq!(health["loads_ok"], 0);
        assert_eq!(health["cached_tables"], serde_json::json!([]));
        assert!(health["last_load_at"].is_null());

        let latency: serde_json::Value =
            client.get(format!("{base}/stats/latency")).send().await.unwrap().json().await.unwrap();
        assert_eq!(latency["sample_count"], 0);

        let resp = client.post(format!("{base}/cache/clear")).send().await.unwrap();
        assert!(resp.status().is_success());
    }
}
