//! One dashboard load: fetch → normalize → dedupe → (reconcile).
//!
//! Table fetches run one after another; a load over all tables is
//! all-or-nothing.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::dedupe::{dedupe, DedupePolicy, DedupeReport};
use crate::error::Result;
use crate::fetcher::{FetchStats, Fetcher};
use crate::normalizer::{normalize, NormalizeReport};
use crate::reconciler::reconcile;
use crate::state::{FrameCache, NormalizedTable};
use crate::types::{Frame, Record, Selection, TableName};

/// One table after cleaning.
#[derive(Debug, Clone)]
pub struct CleanTable {
    pub frame: Frame,
    pub summary: TableSummary,
}

/// Per-table counts and cleaning diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub table: TableName,
    pub raw_count: usize,
    pub clean_count: usize,
    pub policy: DedupePolicy,
    pub fetch: FetchStats,
    pub normalize: NormalizeReport,
    pub dedupe: DedupeReport,
}

/// The analysis-ready frame for a selection plus what it took to build it.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub selection: Selection,
    pub frame: Frame,
    pub tables: Vec<TableSummary>,
}

/// Fetched rows → normalized table. Pure apart from logging.
pub fn prepare(table: TableName, rows: Vec<Record>, fetch: FetchStats) -> NormalizedTable {
    let mut frame = Frame::from_records(rows);
    if frame.is_empty() {
        warn!(table = %table, "No data found in {table}");
    }
    let normalize = normalize(&mut frame, table.as_str());
    NormalizedTable { table, frame, fetch, normalize }
}

/// Normalized table → cleaned table under `policy`.
pub fn clean(normalized: &NormalizedTable, policy: DedupePolicy) -> CleanTable {
    let mut frame = normalized.frame.clone();
    let raw_count = frame.len();
    let report = dedupe(&mut frame, policy, normalized.table.as_str());

    info!(
        table = %normalized.table,
        rows = frame.len(),
        "Cleaned data: {} records from {}",
        frame.len(),
        normalized.table,
    );

    CleanTable {
        summary: TableSummary {
            table: normalized.table,
            raw_count,
            clean_count: frame.len(),
            policy,
            fetch: normalized.fetch.clone(),
            normalize: normalized.normalize.clone(),
            dedupe: report,
        },
        frame,
    }
}

pub struct Pipeline {
    fetcher: Fetcher,
    cache: FrameCache,
}

impl Pipeline {
    pub fn new(fetcher: Fetcher, cache_ttl: Duration) -> Self {
        Self {
            fetcher,
            cache: FrameCache::new(cache_ttl),
        }
    }

    pub fn cache(&self) -> &FrameCache {
        &self.cache
    }

    async fn normalized(&self, table: TableName) -> Result<Arc<NormalizedTable>> {
        if let Some(hit) = self.cache.get(table) {
            info!(table = %table, "serving {table} from cache");
            return Ok(hit);
        }
        let (rows, stats) = self.fetcher.fetch_table(table.as_str()).await?;
        let prepared = Arc::new(prepare(table, rows, stats));
        self.cache.insert(Arc::clone(&prepared));
        Ok(prepared)
    }

    pub async fn load_table(&self, table: TableName) -> Result<CleanTable> {
        let normalized = self.normalized(table).await?;
        Ok(clean(&normalized, DedupePolicy::for_table(table)))
    }

    /// Load `selection`. For `All`, tables are fetched in reconciliation
    /// order and the first failure stops the load.
    pub async fn load(&self, selection: Selection) -> Result<Dataset> {
        match selection {
            Selection::Table(table) => {
                let clean = self.load_table(table).await?;
                Ok(Dataset {
                    selection,
                    frame: clean.frame,
                    tables: vec![clean.summary],
                })
            }
            Selection::All => {
                let mut frames: [Option<Frame>; 3] = [None, None, None];
                let mut tables = Vec::with_capacity(3);
                let mut reason = String::new();

                for (slot, table) in frames.iter_mut().zip(TableName::ALL) {
                    match self.load_table(table).await {
                        Ok(clean) => {
                            *slot = Some(clean.frame);
                            tables.push(clean.summary);
                        }
                        Err(e) => {
                            error!(table = %table, "{e}");
                            reason = e.to_string();
                            break;
                        }
                    }
                }

                let frame = reconcile(frames, &reason)?;
                Ok(Dataset { selection, frame, tables })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::extract::{Path, Query, State};
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use crate::api::latency::PageLatency;
    use crate::config::{Config, DATA_SOURCE_COLUMN};
    use crate::error::AppError;
    use crate::types::Scalar;

    struct Tables {
        rows: HashMap<String, Vec<Value>>,
        failing: Option<String>,
        hits: HashMap<String, AtomicUsize>,
    }

    async fn serve(
        State(tables): State<Arc<Tables>>,
        Path(table): Path<String>,
        Query(params): Query<HashMap<String, String>>,
    ) -> Response {
        if let Some(hits) = tables.hits.get(&table) {
            hits.fetch_add(1, Ordering::SeqCst);
        }
        if tables.failing.as_deref() == Some(table.as_str()) {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        let offset: usize = params["offset"].parse().unwrap();
        let limit: usize = params["limit"].parse().unwrap();
        let rows = tables.rows.get(&table).cloned().unwrap_or_default();
        let page: Vec<Value> = rows.into_iter().skip(offset).take(limit).collect();
        Json(page).into_response()
    }

    fn fixture() -> HashMap<String, Vec<Value>> {
        HashMap::from([
            (
                "betting_analytics".to_string(),
                vec![
                    json!({"id": 1, "profit": 10.0, "stake": 100, "created_at": "2024-01-01T10:00:00Z"}),
                    json!({"id": 1, "profit": 10.0, "stake": 100, "created_at": "2024-01-01T10:00:00Z"}),
                    json!({"id": 2, "profit": -5.0, "stake": 50, "created_at": "garbage"}),
                ],
            ),
            (
                "ev_daily_bets".to_string(),
                vec![
                    json!({"id": 10, "event": "A vs B", "start_time": "2024-02-01 18:00:00+00", "outcome": "A", "stake": 100, "odds": 2.0, "bookmaker": "X", "profit": 100}),
                    json!({"id": 11, "event": "A vs B", "start_time": "2024-02-01T18:00:00Z", "outcome": "A", "stake": 100.0, "odds": 2.0, "bookmaker": "Y", "profit": 100}),
                    json!({"id": 12, "event": "C vs D", "start_time": "2024-02-02T18:00:00Z", "outcome": "D", "stake": 20, "odds": 3.5, "bookmaker": "X", "profit": -20}),
                ],
            ),
            (
                "matched_betting_bets".to_string(),
                vec![json!({"id": 1, "profit": 3.0, "start_time": "2024-03-01T12:00:00Z"})],
            ),
        ])
    }

    async fn spawn(failing: Option<&str>, cache_ttl: Duration, page_size: usize) -> (Pipeline, Arc<Tables>) {
        let tables = Arc::new(Tables {
            rows: fixture(),
            failing: failing.map(str::to_string),
            hits: TableName::ALL
                .iter()
                .map(|t| (t.as_str().to_string(), AtomicUsize::new(0)))
                .collect(),
        });
        let app = Router::new()
            .route("/:table", get(serve))
            .with_state(Arc::clone(&tables));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mut cfg = Config::new(format!("http://{addr}"), "key");
        cfg.page_size = page_size;
        let fetcher = Fetcher::new(&cfg, Arc::new(PageLatency::new())).unwrap();
        (Pipeline::new(fetcher, cache_ttl), tables)
    }

    fn hits(tables: &Tables, table: &str) -> usize {
        tables.hits[table].load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn all_tables_are_cleaned_and_combined() {
        let (pipeline, _) = spawn(None, Duration::ZERO, 2).await;
        let data = pipeline.load(Selection::All).await.unwrap();

        // 2 + 2 + 1 after per-table cleaning
        assert_eq!(data.frame.len(), 5);
        assert_eq!(data.tables.iter().map(|t| t.clean_count).sum::<usize>(), 5);

        let ba = &data.tables[0];
        assert_eq!(ba.raw_count, 3);
        assert_eq!(ba.dedupe.removed_by_id, 1);
        assert_eq!(ba.normalize.unparseable(), 1);

        let ev = &data.tables[1];
        assert_eq!(ev.policy, DedupePolicy::ByIdThenBusinessKey);
        assert_eq!(ev.dedupe.removed_by_business_key, 1);

        let sources: Vec<String> = data.frame.column(DATA_SOURCE_COLUMN).filter_map(Scalar::label).collect();
        assert_eq!(
            sources,
            vec!["betting_analytics", "betting_analytics", "ev_daily_bets", "ev_daily_bets", "matched_betting_bets"]
        );
    }

    #[tokio::test]
    async fn ev_daily_bets_collapses_bookmakers_on_every_selection() {
        let (pipeline, _) = spawn(None, Duration::ZERO, 1000).await;
        let single = pipeline.load(Selection::Table(TableName::EvDailyBets)).await.unwrap();
        let all = pipeline.load(Selection::All).await.unwrap();

        for data in [&single, &all] {
            let ev = data.tables.iter().find(|t| t.table == TableName::EvDailyBets).unwrap();
            assert_eq!(ev.policy, DedupePolicy::ByIdThenBusinessKey);
            assert_eq!(ev.clean_count, 2);
        }
        let books: Vec<String> = single.frame.column("bookmaker").filter_map(Scalar::label).collect();
        assert_eq!(books, vec!["X", "X"]);
    }

    #[test]
    fn empty_table_cleans_to_empty_frame() {
        let prepared = prepare(TableName::EvDailyBets, Vec::new(), FetchStats::default());
        assert!(prepared.frame.is_empty());
        let cleaned = clean(&prepared, DedupePolicy::for_table(TableName::EvDailyBets));
        assert!(cleaned.frame.is_empty());
        assert_eq!(cleaned.summary.raw_count, 0);
    }

    #[tokio::test]
    async fn failed_table_aborts_the_combined_load() {
        let (pipeline, tables) = spawn(Some("ev_daily_bets"), Duration::ZERO, 1000).await;
        let err = pipeline.load(Selection::All).await.unwrap_err();

        match err {
            AppError::ReconciliationAborted { missing, reason } => {
                assert_eq!(missing, vec![TableName::EvDailyBets, TableName::MatchedBettingBets]);
                assert!(reason.contains("500"), "{reason}");
            }
            other => panic!("expected ReconciliationAborted, got {other:?}"),
        }
        assert_eq!(hits(&tables, "matched_betting_bets"), 0, "load stops at the first failure");
    }

    #[tokio::test]
    async fn single_table_failure_is_fetch_failed() {
        let (pipeline, _) = spawn(Some("matched_betting_bets"), Duration::ZERO, 1000).await;
        let err = pipeline
            .load(Selection::Table(TableName::MatchedBettingBets))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::FetchFailed { status: 500, .. }));
    }

    #[tokio::test]
    async fn cache_serves_repeat_loads() {
        let (pipeline, tables) = spawn(None, Duration::from_secs(60), 1000).await;
        pipeline.load(Selection::Table(TableName::BettingAnalytics)).await.unwrap();
        pipeline.load(Selection::Table(TableName::BettingAnalytics)).await.unwrap();
        assert_eq!(hits(&tables, "betting_analytics"), 1);

        pipeline.cache().clear();
        pipeline.load(Selection::Table(TableName::BettingAnalytics)).await.unwrap();
        assert_eq!(hits(&tables, "betting_analytics"), 2);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let (pipeline, tables) = spawn(Some("betting_analytics"), Duration::from_secs(60), 1000).await;
        assert!(pipeline.load(Selection::Table(TableName::BettingAnalytics)).await.is_err());
        assert!(pipeline.load(Selection::Table(TableName::BettingAnalytics)).await.is_err());
        assert_eq!(hits(&tables, "betting_analytics"), 2);
        assert!(pipeline.cache().cached_tables().is_empty());
    }
}
