use crate::error::{AppError, Result};

/// Rows requested per page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Columns coerced to timestamps on load.
pub const DATE_COLUMNS: &[&str] = &["start_time", "bet_logged", "created_at"];

/// Primary key column.
pub const ID_COLUMN: &str = "id";

/// (event, start_time, outcome, stake, odds) identifies one real-world bet,
/// however many bookmakers it was logged against.
pub const BUSINESS_KEY: &[&str] = &["event", "start_time", "outcome", "stake", "odds"];

/// Column tagging each row of the combined frame with its table of origin.
pub const DATA_SOURCE_COLUMN: &str = "data_source";

/// How many groups the "top N" charts keep.
pub const TOP_N: usize = 10;

/// Odds bins, right-inclusive: (0, 1.5], (1.5, 2], ... (10, 100].
pub mod odds_bins {
    pub const EDGES: &[f64] = &[0.0, 1.5, 2.0, 3.0, 5.0, 10.0, 100.0];
    pub const LABELS: &[&str] = &["1-1.5", "1.5-2", "2-3", "3-5", "5-10", "10+"];
}

#[derive(Debug, Clone)]
pub struct Config {
    /// REST base of the data store, e.g. `https://<project>.supabase.co/rest/v1` (SUPABASE_URL)
    pub supabase_url: String,
    /// Opaque key sent as `apikey` and bearer token (SUPABASE_KEY)
    pub supabase_key: String,
    /// Rows per request, must be > 0 (PAGE_SIZE)
    pub page_size: usize,
    /// PostgREST `order` hint that pins pagination order; None keeps store order (ORDER_BY)
    pub order_by: Option<String>,
    /// Per-request timeout (HTTP_TIMEOUT_SECS)
    pub http_timeout_secs: u64,
    /// Cached table lifetime; 0 disables the cache (CACHE_TTL_SECS)
    pub cache_ttl_secs: u64,
    pub api_port: u16,
    pub log_level: String,
    /// `pretty` or `json` (LOG_FORMAT)
    pub log_format: String,
}

impl Config {
    /// Defaults for everything except the store endpoint and key.
    pub fn new(supabase_url: impl Into<String>, supabase_key: impl Into<String>) -> Self {
        Self {
            supabase_url: supabase_url.into(),
            supabase_key: supabase_key.into(),
            page_size: DEFAULT_PAGE_SIZE,
            order_by: Some("id.asc".to_string()),
            http_timeout_secs: 30,
            cache_ttl_secs: 600,
            api_port: 3000,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }

    pub fn from_env() -> Result<Self> {
        let supabase_url = std::env::var("SUPABASE_URL")
            .map_err(|_| AppError::Config("SUPABASE_URL must be set".to_string()))?;
        let supabase_key = std::env::var("SUPABASE_KEY")
            .map_err(|_| AppError::Config("SUPABASE_KEY must be set".to_string()))?;

        let mut cfg = Self::new(supabase_url, supabase_key);

        if let Ok(v) = std::env::var("PAGE_SIZE") {
            cfg.page_size = v
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| AppError::Config("PAGE_SIZE must be a positive integer".to_string()))?;
        }
        if let Ok(v) = std::env::var("ORDER_BY") {
            let v = v.trim();
            cfg.order_by = (!v.is_empty()).then(|| v.to_string());
        }
        cfg.http_timeout_secs = std::env::var("HTTP_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse::<u64>()
            .unwrap_or(30);
        cfg.cache_ttl_secs = std::env::var("CACHE_TTL_SECS")
            .unwrap_or_else(|_| "600".to_string())
            .parse::<u64>()
            .unwrap_or(600);
        cfg.api_port = std::env::var("API_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?;
        cfg.log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        cfg.log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

        Ok(cfg)
    }
}
