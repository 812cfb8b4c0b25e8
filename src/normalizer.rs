//! Timestamp coercion for the known date columns.
//!
//! Every value in `start_time`, `bet_logged` and `created_at` leaves here as
//! a UTC-aware timestamp or as null. Naive inputs are read as UTC so a
//! column never mixes awareness.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::config::DATE_COLUMNS;
use crate::types::{Frame, Scalar, Timestamp};

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%#z",
    "%Y-%m-%dT%H:%M:%S%.f%#z",
    "%Y-%m-%d %H:%M%#z",
    "%Y-%m-%dT%H:%M%#z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    // Slash dates are month-first; day-first only when the month would be > 12.
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d/%m/%Y"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnReport {
    pub column: String,
    pub parsed: usize,
    /// Values present but unparseable, now null.
    pub unparseable: usize,
    /// Values that were already null or blank.
    pub missing: usize,
}

impl ColumnReport {
    /// Null cells after normalization.
    pub fn nulls(&self) -> usize {
        self.unparseable + self.missing
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeReport {
    pub columns: Vec<ColumnReport>,
}

impl NormalizeReport {
    pub fn unparseable(&self) -> usize {
        self.columns.iter().map(|c| c.unparseable).sum()
    }
}

/// Coerce every known date column present in `frame`. Never fails; values
/// that cannot be read become null and are counted.
pub fn normalize(frame: &mut Frame, table: &str) -> NormalizeReport {
    let present: Vec<&str> = DATE_COLUMNS
        .iter()
        .copied()
        .filter(|c| frame.has_column(c))
        .collect();

    let mut report = NormalizeReport {
        columns: present
            .iter()
            .map(|c| ColumnReport { column: c.to_string(), ..Default::default() })
            .collect(),
    };

    for row in frame.rows_mut() {
        for (col, stats) in present.iter().zip(report.columns.iter_mut()) {
            let value = row.remove(*col).unwrap_or(Scalar::Null);
            let coerced = coerce(value, stats);
            row.insert(col.to_string(), coerced);
        }
    }

    for c in &report.columns {
        if c.nulls() > 0 {
            warn!(
                table,
                column = %c.column,
                unparseable = c.unparseable,
                missing = c.missing,
                "{} {} values could not be converted to datetime in {table}",
                c.nulls(),
                c.column,
            );
        }
    }

    report
}

fn coerce(value: Scalar, stats: &mut ColumnReport) -> Scalar {
    let parsed = match value {
        Scalar::Timestamp(Timestamp::Aware(dt)) => Some(dt),
        Scalar::Timestamp(Timestamp::Naive(dt)) => Some(dt.and_utc()),
        Scalar::Text(ref s) if s.trim().is_empty() => {
            stats.missing += 1;
            return Scalar::Null;
        }
        Scalar::Text(ref s) => parse_timestamp(s),
        ref v if v.is_null() => {
            stats.missing += 1;
            return Scalar::Null;
        }
        _ => None,
    };

    match parsed {
        Some(dt) => {
            stats.parsed += 1;
            Scalar::Timestamp(Timestamp::Aware(dt))
        }
        None => {
            stats.unparseable += 1;
            Scalar::Null
        }
    }
}

/// Parse one date-like string to a UTC instant. Accepts RFC 3339, ISO-8601
/// with or without an offset, SQL-style `YYYY-MM-DD HH:MM:SS+HH`, bare
/// dates, and day-first `DD/MM/YYYY` forms. Inputs without an offset are
/// taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    // chrono's %#z does not take a bare `Z`
    let zoned = match s.strip_suffix('Z').or_else(|| s.strip_suffix('z')) {
        Some(rest) => format!("{rest}+00:00"),
        None => s.to_string(),
    };
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&zoned, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc());
        }
    }

    DATE_FORMATS.iter().find_map(|fmt| {
        NaiveDate::parse_from_str(s, fmt)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
    })
}
