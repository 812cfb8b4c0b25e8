use std::collections::HashSet;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::{BUSINESS_KEY, ID_COLUMN};
use crate::types::{cell, Frame, MissingColumns, Scalar, TableName, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupePolicy {
    #[allow(dead_code)]
    None,
    ById,
    #[allow(dead_code)]
    ByBusinessKey,
    /// `ById`, then `ByBusinessKey`: a row goes if either key repeats.
    ByIdThenBusinessKey,
}

impl DedupePolicy {
    /// `ev_daily_bets` logs one wager once per bookmaker, so it always
    /// collapses on the business key as well.
    pub fn for_table(table: TableName) -> Self {
        match table {
            TableName::EvDailyBets => DedupePolicy::ByIdThenBusinessKey,
            _ => DedupePolicy::ById,
        }
    }

    fn by_id(self) -> bool {
        matches!(self, DedupePolicy::ById | DedupePolicy::ByIdThenBusinessKey)
    }

    fn by_business_key(self) -> bool {
        matches!(self, DedupePolicy::ByBusinessKey | DedupePolicy::ByIdThenBusinessKey)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DedupeReport {
    pub removed_by_id: usize,
    pub removed_by_business_key: usize,
    /// Rules that could not run for lack of columns.
    pub skipped: Vec<MissingColumns>,
}

impl DedupeReport {
    pub fn removed(&self) -> usize {
        self.removed_by_id + self.removed_by_business_key
    }
}

/// Hashable view of a cell. Numbers compare by value (so `100` and `100.0`
/// collide, and every NaN is one key); timestamps by instant and awareness.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CellKey {
    Null,
    Bool(bool),
    Number(u64),
    Text(String),
    Time(Timestamp),
}

impl From<&Scalar> for CellKey {
    fn from(s: &Scalar) -> Self {
        match s {
            Scalar::Null => CellKey::Null,
            Scalar::Bool(b) => CellKey::Bool(*b),
            Scalar::Number(n) if n.is_nan() => CellKey::Number(f64::NAN.to_bits()),
            // folds -0.0 into 0.0
            Scalar::Number(n) => CellKey::Number((n + 0.0).to_bits()),
            Scalar::Text(t) => CellKey::Text(t.clone()),
            Scalar::Timestamp(ts) => CellKey::Time(*ts),
        }
    }
}

/// Drop rows whose values in `columns` repeat an earlier row, keeping the
/// first in current order. Returns how many rows went.
pub fn drop_repeats(frame: &mut Frame, columns: &[&str]) -> Result<usize, MissingColumns> {
    frame.require(columns)?;

    let before = frame.len();
    let mut seen: HashSet<Vec<CellKey>> = HashSet::with_capacity(before);
    frame.retain(|row| {
        let key = columns.iter().map(|c| CellKey::from(cell(row, c))).collect();
        seen.insert(key)
    });
    Ok(before - frame.len())
}

/// Apply `policy` to `frame` in place.
///
/// A rule whose columns are absent is skipped and recorded; it never fails
/// the load.
pub fn dedupe(frame: &mut Frame, policy: DedupePolicy, table: &str) -> DedupeReport {
    let mut report = DedupeReport::default();

    if policy.by_id() {
        match drop_repeats(frame, &[ID_COLUMN]) {
            Ok(n) => report.removed_by_id = n,
            Err(missing) => {
                info!(table, "id dedupe skipped: {missing}");
                report.skipped.push(missing);
            }
        }
    }

    if policy.by_business_key() {
        match drop_repeats(frame, BUSINESS_KEY) {
            Ok(n) => report.removed_by_business_key = n,
            Err(missing) => {
                warn!(table, "business-key dedupe skipped: {missing}");
                report.skipped.push(missing);
            }
        }
    }

    if report.removed() > 0 {
        warn!(
            table,
            by_id = report.removed_by_id,
            by_business_key = report.removed_by_business_key,
            "Removed {} duplicate bets from {table}",
            report.removed(),
        );
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Record;
    use chrono::{TimeZone, Utc};

    fn ids(frame: &Frame) -> Vec<f64> {
        frame.column("id").filter_map(Scalar::as_f64).collect()
    }

    fn id_row(id: f64, tag: &str) -> Record {
        Record::from([
            ("id".to_string(), Scalar::Number(id)),
            ("tag".to_string(), Scalar::Text(tag.to_string())),
        ])
    }

    fn wager(id: f64, bookmaker: &str, stake: f64) -> Record {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 15, 0, 0).unwrap();
        Record::from([
            ("id".to_string(), Scalar::Number(id)),
            ("event".to_string(), Scalar::Text("A vs B".into())),
            ("start_time".to_string(), Scalar::Timestamp(Timestamp::Aware(start))),
            ("outcome".to_string(), Scalar::Text("A".into())),
            ("stake".to_string(), Scalar::Number(stake)),
            ("odds".to_string(), Scalar::Number(2.0)),
            ("bookmaker".to_string(), Scalar::Text(bookmaker.into())),
        ])
    }

    #[test]
    fn by_id_keeps_first_occurrence() {
        let mut frame = Frame::from_records(vec![id_row(1.0, "first"), id_row(1.0, "second"), id_row(2.0, "x")]);
        let report = dedupe(&mut frame, DedupePolicy::ById, "t");

        assert_eq!(ids(&frame), vec![1.0, 2.0]);
        assert_eq!(frame.rows()[0]["tag"], Scalar::Text("first".into()));
        assert_eq!(report.removed_by_id, 1);
        assert_eq!(report.removed_by_business_key, 0);
    }

    #[test]
    fn business_key_collapses_bookmakers() {
        let mut frame = Frame::from_records(vec![wager(1.0, "X", 100.0), wager(2.0, "Y", 100.0)]);
        let report = dedupe(&mut frame, DedupePolicy::ByBusinessKey, "ev_daily_bets");

        assert_eq!(frame.len(), 1);
        assert_eq!(frame.rows()[0]["bookmaker"], Scalar::Text("X".into()));
        assert_eq!(report.removed_by_business_key, 1);
    }

    #[test]
    fn either_key_repeating_removes_the_row() {
        let mut frame = Frame::from_records(vec![
            wager(1.0, "X", 100.0),
            wager(1.0, "Z", 50.0), // same id
            wager(2.0, "Y", 100.0), // same business key
            wager(3.0, "Y", 25.0),
        ]);
        let report = dedupe(&mut frame, DedupePolicy::ByIdThenBusinessKey, "ev_daily_bets");

        assert_eq!(ids(&frame), vec![1.0, 3.0]);
        assert_eq!(report.removed_by_id, 1);
        assert_eq!(report.removed_by_business_key, 1);
    }

    #[test]
    fn dedupe_is_idempotent() {
        let mut frame = Frame::from_records(vec![
            wager(1.0, "X", 100.0),
            wager(2.0, "Y", 100.0),
            wager(2.0, "Y", 10.0),
            wager(4.0, "X", 10.0),
        ]);
        dedupe(&mut frame, DedupePolicy::ByIdThenBusinessKey, "t");
        let once = frame.clone();
        let report = dedupe(&mut frame, DedupePolicy::ByIdThenBusinessKey, "t");
        assert_eq!(frame, once);
        assert_eq!(report.removed(), 0);
    }

    #[test]
    fn integer_and_float_numbers_are_the_same_key() {
        let a = Record::from([("stake".to_string(), Scalar::from_json(serde_json::json!(100)))]);
        let b = Record::from([("stake".to_string(), Scalar::from_json(serde_json::json!(100.0)))]);
        let c = Record::from([("stake".to_string(), Scalar::Number(-0.0))]);
        let d = Record::from([("stake".to_string(), Scalar::Number(0.0))]);
        let mut frame = Frame::from_records(vec![a, b, c, d]);
        assert_eq!(drop_repeats(&mut frame, &["stake"]).unwrap(), 2);
    }

    #[test]
    fn nulls_match_each_other() {
        let mut a = id_row(1.0, "a");
        a.insert("id".into(), Scalar::Null);
        let mut b = id_row(2.0, "b");
        b.insert("id".into(), Scalar::Null);
        let mut frame = Frame::from_records(vec![a, b]);
        assert_eq!(drop_repeats(&mut frame, &["id"]).unwrap(), 1);
    }

    #[test]
    fn missing_columns_skip_the_rule() {
        let mut frame = Frame::from_records(vec![id_row(1.0, "a"), id_row(1.0, "b")]);
        let report = dedupe(&mut frame, DedupePolicy::ByIdThenBusinessKey, "t");

        assert_eq!(frame.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].required.len(), BUSINESS_KEY.len());
    }

    #[test]
    fn none_policy_keeps_everything() {
        let mut frame = Frame::from_records(vec![id_row(1.0, "a"), id_row(1.0, "b")]);
        let report = dedupe(&mut frame, DedupePolicy::None, "t");
        assert_eq!(frame.len(), 2);
        assert_eq!(report, DedupeReport::default());
    }

    #[test]
    fn table_policy() {
        assert_eq!(DedupePolicy::for_table(TableName::EvDailyBets), DedupePolicy::ByIdThenBusinessKey);
        assert_eq!(DedupePolicy::for_table(TableName::BettingAnalytics), DedupePolicy::ById);
        assert_eq!(DedupePolicy::for_table(TableName::MatchedBettingBets), DedupePolicy::ById);
    }

    #[test]
    fn ev_daily_bets_business_key_is_always_unique() {
        let mut frame = Frame::from_records(vec![
            wager(1.0, "X", 100.0),
            wager(2.0, "Y", 100.0),
            wager(3.0, "Z", 100.0),
        ]);
        let report = dedupe(&mut frame, DedupePolicy::for_table(TableName::EvDailyBets), "ev_daily_bets");

        assert_eq!(frame.len(), 1);
        assert_eq!(frame.rows()[0]["bookmaker"], Scalar::Text("X".into()));
        assert_eq!(report.removed_by_business_key, 2);
    }
}
