//! Timezone-safe comparisons against "now".
//!
//! "Now" is always expressed in the awareness of the column it is compared
//! with; a column that mixes the two is rejected before any comparison.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::types::{cell, Awareness, Frame, Scalar, Selection, TableName, Timestamp};

/// Column used to place rows on a timeline, by active selection.
pub fn timeline_column(frame: &Frame, selection: Selection) -> Option<&'static str> {
    let preference: &[&'static str] = match selection {
        Selection::All | Selection::Table(TableName::MatchedBettingBets) => {
            &["start_time", "bet_logged", "created_at"]
        }
        Selection::Table(_) => &["bet_logged", "created_at", "start_time"],
    };
    preference.iter().copied().find(|c| frame.has_column(c))
}

/// Column checked for future-dated records, regardless of selection.
pub fn audit_column(frame: &Frame) -> Option<&'static str> {
    ["bet_logged", "created_at", "start_time"]
        .into_iter()
        .find(|c| frame.has_column(c))
}

/// Awareness shared by every timestamp in `column`; `None` when it holds no
/// timestamps at all.
pub fn column_awareness(frame: &Frame, column: &str) -> Result<Option<Awareness>> {
    let mut seen = None;
    for ts in frame.column(column).filter_map(Scalar::as_timestamp) {
        match seen {
            None => seen = Some(ts.awareness()),
            Some(a) if a != ts.awareness() => {
                return Err(AppError::TimezoneMismatch { column: column.to_string() })
            }
            Some(_) => {}
        }
    }
    Ok(seen)
}

/// Rows on the timeline, in input order.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    pub frame: Frame,
    /// Rows dropped for lying strictly after now.
    pub future: usize,
    /// Rows dropped for having no timestamp.
    pub undated: usize,
}

/// Keep rows whose `column` is at or before `now`.
pub fn filter_not_future(frame: &Frame, column: &str, now: DateTime<Utc>) -> Result<Timeline> {
    let Some(awareness) = column_awareness(frame, column)? else {
        return Ok(Timeline { frame: Frame::new(), future: 0, undated: frame.len() });
    };
    let moment = Timestamp::moment(now, awareness);

    let mut kept = Vec::with_capacity(frame.len());
    let mut future = 0;
    let mut undated = 0;
    for row in frame.rows() {
        let Some(ts) = cell(row, column).as_timestamp() else {
            undated += 1;
            continue;
        };
        match compare(ts, &moment, column)? {
            Ordering::Greater => future += 1,
            _ => kept.push(row.clone()),
        }
    }

    Ok(Timeline { frame: Frame::from_records(kept), future, undated })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FutureRecords {
    pub column: String,
    pub count: usize,
    /// Earliest future date, `YYYY-MM-DD`.
    pub earliest: Option<String>,
}

/// Count rows dated strictly after `now` in the audit column.
pub fn future_records(frame: &Frame, now: DateTime<Utc>) -> Result<Option<FutureRecords>> {
    let Some(column) = audit_column(frame) else {
        return Ok(None);
    };
    let Some(awareness) = column_awareness(frame, column)? else {
        return Ok(Some(FutureRecords { column: column.to_string(), count: 0, earliest: None }));
    };
    let moment = Timestamp::moment(now, awareness);

    let mut count = 0;
    let mut earliest: Option<Timestamp> = None;
    for ts in frame.column(column).filter_map(Scalar::as_timestamp) {
        if compare(ts, &moment, column)? != Ordering::Greater {
            continue;
        }
        count += 1;
        earliest = match earliest {
            Some(e) if compare(&e, ts, column)? != Ordering::Greater => Some(e),
            _ => Some(*ts),
        };
    }

    Ok(Some(FutureRecords {
        column: column.to_string(),
        count,
        earliest: earliest.map(|e| e.date_label()),
    }))
}

fn compare(a: &Timestamp, b: &Timestamp, column: &str) -> Result<Ordering> {
    a.try_cmp(b)
        .ok_or_else(|| AppError::TimezoneMismatch { column: column.to_string() })
}
