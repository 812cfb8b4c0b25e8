use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

use crate::types::TableName;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Error loading data from {table}: {status}")]
    FetchFailed { table: String, status: u16 },

    #[error("Unexpected response from {table}: {detail}")]
    UnexpectedResponse { table: String, detail: String },

    #[error("Failed to load one or more tables ({}): {reason}", join_tables(.missing))]
    ReconciliationAborted { missing: Vec<TableName>, reason: String },

    #[error("Column {column} mixes timezone-aware and naive timestamps")]
    TimezoneMismatch { column: String },

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

fn join_tables(tables: &[TableName]) -> String {
    tables
        .iter()
        .map(TableName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::Http(_)
            | AppError::FetchFailed { .. }
            | AppError::UnexpectedResponse { .. }
            | AppError::ReconciliationAborted { .. } => StatusCode::BAD_GATEWAY,
            AppError::UnknownTable(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconciliation_message_names_missing_tables() {
        let err = AppError::ReconciliationAborted {
            missing: vec![TableName::EvDailyBets, TableName::MatchedBettingBets],
            reason: "Error loading data from ev_daily_bets: 503".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to load one or more tables (ev_daily_bets, matched_betting_bets): \
             Error loading data from ev_daily_bets: 503"
        );
    }

    #[test]
    fn fetch_failures_map_to_bad_gateway() {
        let resp = AppError::FetchFailed { table: "ev_daily_bets".into(), status: 401 }.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let resp = AppError::UnknownTable("bets".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
