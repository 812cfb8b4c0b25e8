use tracing::info;

use crate::config::DATA_SOURCE_COLUMN;
use crate::error::{AppError, Result};
use crate::types::{Frame, Scalar, TableName};

/// Union the three cleaned tables, in `TableName::ALL` order, tagging each
/// row with its table of origin.
///
/// `frames[i]` belongs to `TableName::ALL[i]`. Any `None` aborts the whole
/// union: a combined view over fewer tables is never produced. No rows are
/// dropped across tables.
pub fn reconcile(frames: [Option<Frame>; 3], reason: &str) -> Result<Frame> {
    let missing: Vec<TableName> = TableName::ALL
        .into_iter()
        .zip(frames.iter())
        .filter(|(_, f)| f.is_none())
        .map(|(t, _)| t)
        .collect();
    if !missing.is_empty() {
        return Err(AppError::ReconciliationAborted {
            missing,
            reason: reason.to_string(),
        });
    }

    let mut combined = Frame::new();
    let mut counts = Vec::with_capacity(3);
    for (table, frame) in TableName::ALL.into_iter().zip(frames) {
        let Some(mut frame) = frame else { continue };
        frame.fill_column(DATA_SOURCE_COLUMN, Scalar::Text(table.as_str().to_string()));
        counts.push(format!("{} records from {table}", frame.len()));
        combined.append(frame);
    }

    info!("Combined data: {} = {} total records", counts.join(" + "), combined.len());
    Ok(combined)
}
