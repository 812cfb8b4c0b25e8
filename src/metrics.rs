//! KPIs and chart series over a cleaned frame.
//!
//! Every series states the columns it needs; when they are absent the
//! series is left out and the gap is reported, never treated as an error.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::config::{odds_bins, DATA_SOURCE_COLUMN, TOP_N};
use crate::error::Result;
use crate::temporal::{filter_not_future, timeline_column};
use crate::types::{cell, Frame, MissingColumns, Record, Scalar, Selection, TableName};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Kpis {
    pub total_bets: usize,
    pub total_profit: f64,
    /// Mean of `ev`, else `logged_ev`, else 0.
    pub avg_ev: f64,
    /// Share of rows with profit > 0.
    pub win_rate: f64,
    /// Total profit / total stake, in percent.
    pub combined_yield: Option<f64>,
    pub avg_stake: Option<f64>,
    pub total_stake: Option<f64>,
}

/// Profit and stake summed over one group.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupStat {
    pub label: String,
    pub bets: usize,
    pub profit: f64,
    pub stake: f64,
    pub yield_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CumulativePoint {
    pub at: String,
    pub data_source: Option<String>,
    pub profit: f64,
    pub cumulative_profit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CumulativeProfit {
    pub column: String,
    pub label: String,
    pub points: Vec<CumulativePoint>,
    pub filtered_future: usize,
    pub undated: usize,
    pub final_profit: f64,
    pub date_range: Option<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyProfit {
    pub month: String,
    pub data_source: String,
    pub profit: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Charts {
    pub yield_by_bookmaker: Option<Vec<GroupStat>>,
    pub profit_by_odds: Option<Vec<GroupStat>>,
    pub by_source: Option<Vec<GroupStat>>,
    pub top_sports: Option<Vec<GroupStat>>,
    pub top_bookmakers: Option<Vec<GroupStat>>,
    pub cumulative_profit: Option<CumulativeProfit>,
    pub monthly_profit: Option<Vec<MonthlyProfit>>,
    /// Series left out for lack of columns.
    pub skipped: Vec<MissingColumns>,
}

fn num(row: &Record, column: &str) -> Option<f64> {
    cell(row, column).as_f64()
}

fn sum(frame: &Frame, column: &str) -> f64 {
    frame.column(column).filter_map(Scalar::as_f64).sum()
}

fn mean(frame: &Frame, column: &str) -> Option<f64> {
    let values: Vec<f64> = frame.column(column).filter_map(Scalar::as_f64).collect();
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

fn yield_pct(profit: f64, stake: f64) -> Option<f64> {
    (stake != 0.0).then(|| profit / stake * 100.0)
}

pub fn kpis(frame: &Frame) -> Kpis {
    let total_bets = frame.len();
    let total_profit = sum(frame, "profit");

    let avg_ev = if frame.has_column("ev") {
        mean(frame, "ev")
    } else if frame.has_column("logged_ev") {
        mean(frame, "logged_ev")
    } else {
        None
    }
    .unwrap_or(0.0);

    let winners = frame
        .column("profit")
        .filter(|p| p.as_f64().is_some_and(|v| v > 0.0))
        .count();
    let win_rate = if total_bets > 0 { winners as f64 / total_bets as f64 } else { 0.0 };

    let (total_stake, avg_stake, combined_yield) = if frame.has_column("stake") {
        let stake = sum(frame, "stake");
        let combined = (stake > 0.0).then(|| total_profit / stake * 100.0);
        (Some(stake), mean(frame, "stake"), combined)
    } else {
        (None, None, None)
    };

    Kpis {
        total_bets,
        total_profit,
        avg_ev,
        win_rate,
        combined_yield,
        avg_stake,
        total_stake,
    }
}

/// Sum profit (and stake, when present) per distinct value of `by`; null
/// keys form no group. Groups come back sorted by label.
pub fn group_by(frame: &Frame, by: &str) -> Vec<GroupStat> {
    let mut groups: BTreeMap<String, GroupStat> = BTreeMap::new();
    for row in frame.rows() {
        let Some(label) = cell(row, by).label() else { continue };
        let g = groups.entry(label.clone()).or_insert_with(|| GroupStat { label, ..Default::default() });
        g.bets += 1;
        g.profit += num(row, "profit").unwrap_or(0.0);
        g.stake += num(row, "stake").unwrap_or(0.0);
    }
    groups
        .into_values()
        .map(|mut g| {
            g.yield_pct = yield_pct(g.profit, g.stake);
            g
        })
        .collect()
}

fn top_by_profit(mut groups: Vec<GroupStat>) -> Vec<GroupStat> {
    groups.sort_by(|a, b| b.profit.total_cmp(&a.profit));
    groups.truncate(TOP_N);
    groups
}

/// Index of the right-inclusive bin holding `odds`.
pub fn odds_bin(odds: f64) -> Option<usize> {
    odds_bins::EDGES
        .windows(2)
        .position(|w| odds > w[0] && odds <= w[1])
}

/// Profit per odds range; every bin is listed, empty ones at zero.
pub fn profit_by_odds(frame: &Frame) -> Vec<GroupStat> {
    let mut bins: Vec<GroupStat> = odds_bins::LABELS
        .iter()
        .map(|l| GroupStat { label: l.to_string(), ..Default::default() })
        .collect();
    for row in frame.rows() {
        let Some(i) = num(row, "odds").and_then(odds_bin) else { continue };
        bins[i].bets += 1;
        bins[i].profit += num(row, "profit").unwrap_or(0.0);
        bins[i].stake += num(row, "stake").unwrap_or(0.0);
    }
    for b in &mut bins {
        b.yield_pct = yield_pct(b.profit, b.stake);
    }
    bins
}

fn timeline_label(column: &str) -> &'static str {
    match column {
        "start_time" => "Event Date",
        "bet_logged" => "Date Bet Was Placed",
        "created_at" => "Date Record Created",
        _ => "Date",
    }
}

/// Running profit along the timeline, future-dated rows removed.
pub fn cumulative_profit(
    frame: &Frame,
    selection: Selection,
    now: DateTime<Utc>,
) -> Result<Option<CumulativeProfit>> {
    let Some(column) = timeline_column(frame, selection) else {
        return Ok(None);
    };
    let timeline = filter_not_future(frame, column, now)?;
    if timeline.future > 0 {
        info!("Filtered out {} future records to fix timeline", timeline.future);
    }

    let mut dated: Vec<(&Record, _)> = timeline
        .frame
        .rows()
        .iter()
        .filter_map(|r| cell(r, column).as_timestamp().map(|ts| (r, *ts)))
        .collect();
    // One awareness per column, so wall clock orders correctly.
    dated.sort_by_key(|(_, ts)| ts.wall_clock());

    let mut running = 0.0;
    let points: Vec<CumulativePoint> = dated
        .iter()
        .map(|(row, ts)| {
            let profit = num(row, "profit").unwrap_or(0.0);
            running += profit;
            CumulativePoint {
                at: ts.to_string(),
                data_source: cell(row, DATA_SOURCE_COLUMN).label(),
                profit,
                cumulative_profit: running,
            }
        })
        .collect();

    let date_range = match (dated.first(), dated.last()) {
        (Some((_, first)), Some((_, last))) => Some((first.date_label(), last.date_label())),
        _ => None,
    };

    Ok(Some(CumulativeProfit {
        column: column.to_string(),
        label: timeline_label(column).to_string(),
        points,
        filtered_future: timeline.future,
        undated: timeline.undated,
        final_profit: running,
        date_range,
    }))
}

/// Profit per (month of `start_time`, data source), ordered by month and
/// then by table order.
pub fn monthly_profit(frame: &Frame) -> Vec<MonthlyProfit> {
    let mut months: BTreeMap<(String, usize), f64> = BTreeMap::new();
    for row in frame.rows() {
        let Some(ts) = cell(row, "start_time").as_timestamp() else { continue };
        let Some(source) = cell(row, DATA_SOURCE_COLUMN).label() else { continue };
        let Some(idx) = TableName::ALL.iter().position(|t| t.as_str() == source) else { continue };
        *months.entry((ts.month_label(), idx)).or_default() += num(row, "profit").unwrap_or(0.0);
    }
    months
        .into_iter()
        .map(|((month, idx), profit)| MonthlyProfit {
            month,
            data_source: TableName::ALL[idx].as_str().to_string(),
            profit,
        })
        .collect()
}

/// Every chart the dashboard shows for `selection`.
pub fn charts(frame: &Frame, selection: Selection, now: DateTime<Utc>) -> Result<Charts> {
    let mut charts = Charts::default();
    let all = selection == Selection::All;

    let need = |required: &[&str], charts: &mut Charts| match frame.require(required) {
        Ok(()) => true,
        Err(missing) => {
            charts.skipped.push(missing);
            false
        }
    };

    if need(&["bookmaker", "stake", "profit"], &mut charts) {
        charts.yield_by_bookmaker = Some(group_by(frame, "bookmaker"));
    }
    if need(&["odds", "profit"], &mut charts) {
        charts.profit_by_odds = Some(profit_by_odds(frame));
    }
    if all && need(&[DATA_SOURCE_COLUMN, "profit"], &mut charts) {
        charts.by_source = Some(group_by(frame, DATA_SOURCE_COLUMN));
    }
    if need(&["sport", "profit"], &mut charts) {
        charts.top_sports = Some(top_by_profit(group_by(frame, "sport")));
    }
    if need(&["bookmaker", "profit"], &mut charts) {
        charts.top_bookmakers = Some(top_by_profit(group_by(frame, "bookmaker")));
    }
    if need(&["profit"], &mut charts) {
        charts.cumulative_profit = cumulative_profit(frame, selection, now)?;
    }
    if all && need(&["start_time", "profit"], &mut charts) {
        charts.monthly_profit = Some(monthly_profit(frame));
    }

    Ok(charts)
}
