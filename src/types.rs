use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

use crate::error::AppError;

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableName {
    BettingAnalytics,
    EvDailyBets,
    MatchedBettingBets,
}

impl TableName {
    /// Fixed reconciliation order.
    pub const ALL: [TableName; 3] = [
        TableName::BettingAnalytics,
        TableName::EvDailyBets,
        TableName::MatchedBettingBets,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TableName::BettingAnalytics => "betting_analytics",
            TableName::EvDailyBets => "ev_daily_bets",
            TableName::MatchedBettingBets => "matched_betting_bets",
        }
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TableName {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TableName::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| AppError::UnknownTable(s.to_string()))
    }
}

/// What the dashboard is looking at: one table, or the union of all three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Selection {
    Table(TableName),
    All,
}

impl std::fmt::Display for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selection::Table(t) => write!(f, "{t}"),
            Selection::All => write!(f, "all"),
        }
    }
}

impl FromStr for Selection {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") || s.eq_ignore_ascii_case("all tables") {
            return Ok(Selection::All);
        }
        s.parse().map(Selection::Table)
    }
}

impl Serialize for Selection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Awareness {
    Aware,
    Naive,
}

/// A parsed point in time. Aware values are UTC instants; naive values are
/// wall-clock readings with no zone. The two never compare with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timestamp {
    Aware(DateTime<Utc>),
    Naive(NaiveDateTime),
}

impl Timestamp {
    pub fn awareness(&self) -> Awareness {
        match self {
            Timestamp::Aware(_) => Awareness::Aware,
            Timestamp::Naive(_) => Awareness::Naive,
        }
    }

    /// Express `now` in the given awareness: aware stays a UTC instant,
    /// naive drops the zone and keeps the UTC wall clock.
    pub fn moment(now: DateTime<Utc>, awareness: Awareness) -> Self {
        match awareness {
            Awareness::Aware => Timestamp::Aware(now),
            Awareness::Naive => Timestamp::Naive(now.naive_utc()),
        }
    }

    /// `None` when awareness differs.
    pub fn try_cmp(&self, other: &Timestamp) -> Option<Ordering> {
        match (self, other) {
            (Timestamp::Aware(a), Timestamp::Aware(b)) => Some(a.cmp(b)),
            (Timestamp::Naive(a), Timestamp::Naive(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Wall clock as read in UTC; only meaningful within one awareness.
    pub fn wall_clock(&self) -> NaiveDateTime {
        match self {
            Timestamp::Aware(dt) => dt.naive_utc(),
            Timestamp::Naive(dt) => *dt,
        }
    }

    pub fn date_label(&self) -> String {
        self.wall_clock().format("%Y-%m-%d").to_string()
    }

    pub fn month_label(&self) -> String {
        self.wall_clock().format("%Y-%m").to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Timestamp::Aware(dt) => write!(f, "{}", dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Timestamp::Naive(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.f")),
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ---------------------------------------------------------------------------
// Scalars and records
// ---------------------------------------------------------------------------

/// One dynamically-typed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Timestamp(Timestamp),
}

impl Scalar {
    pub fn from_json(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Scalar::Null,
            serde_json::Value::Bool(b) => Scalar::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map_or(Scalar::Null, Scalar::Number),
            serde_json::Value::String(s) => Scalar::Text(s),
            // Nested values are kept verbatim; nothing downstream reads into them.
            other => Scalar::Text(other.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Scalar::Null => true,
            Scalar::Number(n) => n.is_nan(),
            _ => false,
        }
    }

    /// Numeric view. Numeric strings are accepted since the store may render
    /// `numeric` columns as text.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) if !n.is_nan() => Some(*n),
            Scalar::Text(s) => s.trim().parse::<f64>().ok().filter(|n| !n.is_nan()),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<&Timestamp> {
        match self {
            Scalar::Timestamp(ts) => Some(ts),
            _ => None,
        }
    }

    /// Grouping label; `None` for nulls, which never form a group.
    pub fn label(&self) -> Option<String> {
        match self {
            Scalar::Null => None,
            Scalar::Number(n) if n.is_nan() => None,
            Scalar::Bool(b) => Some(b.to_string()),
            Scalar::Number(n) => Some(n.to_string()),
            Scalar::Text(s) => Some(s.clone()),
            Scalar::Timestamp(ts) => Some(ts.to_string()),
        }
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Scalar::Null => serializer.serialize_none(),
            Scalar::Bool(b) => serializer.serialize_bool(*b),
            Scalar::Number(n) if n.is_finite() => serializer.serialize_f64(*n),
            Scalar::Number(_) => serializer.serialize_none(),
            Scalar::Text(s) => serializer.serialize_str(s),
            Scalar::Timestamp(ts) => ts.serialize(serializer),
        }
    }
}

static NULL: Scalar = Scalar::Null;

/// One fetched row: column name → cell.
pub type Record = BTreeMap<String, Scalar>;

/// Cell lookup that treats an absent column as null.
pub fn cell<'a>(row: &'a Record, column: &str) -> &'a Scalar {
    row.get(column).unwrap_or(&NULL)
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// A computation needs columns the frame does not have.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingColumns {
    pub required: Vec<String>,
    pub present: Vec<String>,
}

impl std::fmt::Display for MissingColumns {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let missing: Vec<&str> = self
            .required
            .iter()
            .filter(|c| !self.present.contains(c))
            .map(String::as_str)
            .collect();
        write!(f, "missing columns [{}]", missing.join(", "))
    }
}

impl std::error::Error for MissingColumns {}

/// Ordered rows plus the columns seen across them, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Record>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(rows: Vec<Record>) -> Self {
        let mut frame = Frame::new();
        frame.extend(rows);
        frame
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Record> {
        self.rows
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Check that every column in `required` exists.
    pub fn require(&self, required: &[&str]) -> Result<(), MissingColumns> {
        if required.iter().all(|c| self.has_column(c)) {
            Ok(())
        } else {
            Err(MissingColumns {
                required: required.iter().map(|c| c.to_string()).collect(),
                present: self.columns.clone(),
            })
        }
    }

    /// Values of one column in row order; absent cells read as null.
    pub fn column<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Scalar> + 'a {
        self.rows.iter().map(move |r| cell(r, name))
    }

    pub fn rows_mut(&mut self) -> impl Iterator<Item = &mut Record> {
        self.rows.iter_mut()
    }

    /// Keep rows for which `keep` returns true, preserving order.
    pub fn retain<F: FnMut(&Record) -> bool>(&mut self, keep: F) {
        self.rows.retain(keep);
    }

    /// Set `name` to `value` on every row, registering the column.
    pub fn fill_column(&mut self, name: &str, value: Scalar) {
        for row in &mut self.rows {
            row.insert(name.to_string(), value.clone());
        }
        self.register(name);
    }

    pub fn extend<I: IntoIterator<Item = Record>>(&mut self, rows: I) {
        for row in rows {
            for key in row.keys() {
                if !self.has_column(key) {
                    self.columns.push(key.clone());
                }
            }
            self.rows.push(row);
        }
    }

    /// Append all rows of `other` after this frame's rows.
    pub fn append(&mut self, other: Frame) {
        for c in &other.columns {
            self.register(c);
        }
        self.rows.extend(other.rows);
    }

    fn register(&mut self, name: &str) {
        if !self.has_column(name) {
            self.columns.push(name.to_string());
        }
    }
}
