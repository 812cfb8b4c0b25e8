use serde::Deserialize;
use serde_json::Value;

// ---------------------------------------------------------------------------
// API response types (mirror routes.rs shapes)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DashboardResponse {
    pub selection: String,
    pub generated_at: String,
    pub total_records: usize,
    pub tables: Vec<TableSummary>,
    pub kpis: Kpis,
    pub charts: Charts,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Kpis {
    pub total_bets: usize,
    pub total_profit: f64,
    pub avg_ev: f64,
    pub win_rate: f64,
    pub combined_yield: Option<f64>,
    pub avg_stake: Option<f64>,
    pub total_stake: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupStat {
    pub label: String,
    pub bets: usize,
    pub profit: f64,
    pub stake: f64,
    pub yield_pct: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CumulativePoint {
    pub cumulative_profit: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CumulativeProfit {
    pub label: String,
    pub points: Vec<CumulativePoint>,
    pub filtered_future: usize,
    pub undated: usize,
    pub final_profit: f64,
    pub date_range: Option<(String, String)>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonthlyProfit {
    pub month: String,
    pub data_source: String,
    pub profit: f64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Charts {
    pub yield_by_bookmaker: Option<Vec<GroupStat>>,
    pub profit_by_odds: Option<Vec<GroupStat>>,
    pub by_source: Option<Vec<GroupStat>>,
    pub top_sports: Option<Vec<GroupStat>>,
    pub top_bookmakers: Option<Vec<GroupStat>>,
    pub cumulative_profit: Option<CumulativeProfit>,
    pub monthly_profit: Option<Vec<MonthlyProfit>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Diagnostics {
    pub available_date_columns: Vec<String>,
    pub future_records: Option<FutureRecords>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FutureRecords {
    pub column: String,
    pub count: usize,
    pub earliest: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableSummary {
    pub table: String,
    pub raw_count: usize,
    pub clean_count: usize,
    pub dedupe: DedupeCounts,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DedupeCounts {
    pub removed_by_id: usize,
    pub removed_by_business_key: usize,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RowsResponse {
    pub table: String,
    pub columns: Vec<String>,
    pub total: usize,
    pub offset: usize,
    pub rows: Vec<serde_json::Map<String, Value>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LatencyResponse {
    pub p50_ms: Option<f64>,
    pub p99_ms: Option<f64>,
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

pub const TABLES: [&str; 3] = ["betting_analytics", "ev_daily_bets", "matched_betting_bets"];

/// Rows requested per raw-data page.
pub const RAW_PAGE: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Error(String),
    Connecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Performance,
    BetAnalysis,
    TimeSeries,
    RawData,
}

impl Tab {
    pub const ALL: [Tab; 4] = [Tab::Performance, Tab::BetAnalysis, Tab::TimeSeries, Tab::RawData];

    pub fn title(self) -> &'static str {
        match self {
            Tab::Performance => "Performance",
            Tab::BetAnalysis => "Bet Analysis",
            Tab::TimeSeries => "Time Series",
            Tab::RawData => "Raw Data",
        }
    }

    pub fn next(self) -> Tab {
        let idx = Tab::ALL.iter().position(|t| *t == self).unwrap_or(0);
        Tab::ALL[(idx + 1) % Tab::ALL.len()]
    }
}

/// `None` means all tables combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableChoice(pub Option<usize>);

impl TableChoice {
    pub fn query_value(self) -> &'static str {
        match self.0 {
            Some(i) => TABLES[i % TABLES.len()],
            None => "all",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub status: ConnectionStatus,
    pub choice: TableChoice,
    pub tab: Tab,
    pub dashboard: Option<DashboardResponse>,
    pub latency: LatencyResponse,
    /// Table shown on the Raw Data tab when all tables are combined.
    pub raw_table: usize,
    pub raw: RowsResponse,
    pub raw_offset: usize,
    pub scroll: usize,
    pub last_refresh: std::time::Instant,
    pub base_url: String,
}

impl AppState {
    pub fn new(base_url: String) -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            choice: TableChoice(None),
            tab: Tab::Performance,
            dashboard: None,
            latency: LatencyResponse::default(),
            raw_table: 0,
            raw: RowsResponse::default(),
            raw_offset: 0,
            scroll: 0,
            last_refresh: std::time::Instant::now(),
            base_url,
        }
    }

    /// The table the Raw Data tab reads from.
    pub fn raw_table_name(&self) -> &'static str {
        match self.choice.0 {
            Some(i) => TABLES[i % TABLES.len()],
            None => TABLES[self.raw_table % TABLES.len()],
        }
    }

    pub fn select(&mut self, choice: TableChoice) {
        if self.choice != choice {
            self.choice = choice;
            self.reset_raw();
        }
    }

    pub fn cycle_raw_table(&mut self, forward: bool) {
        if self.choice.0.is_some() {
            return;
        }
        self.raw_table = if forward {
            (self.raw_table + 1) % TABLES.len()
        } else {
            (self.raw_table + TABLES.len() - 1) % TABLES.len()
        };
        self.reset_raw();
    }

    fn reset_raw(&mut self) {
        self.raw = RowsResponse::default();
        self.raw_offset = 0;
        self.scroll = 0;
    }

    /// Move the raw-data cursor; returns true when a different page must be
    /// fetched.
    pub fn scroll_by(&mut self, delta: isize) -> bool {
        let total = self.raw.total;
        if total == 0 {
            return false;
        }
        let absolute = (self.raw_offset + self.scroll) as isize + delta;
        let absolute = absolute.clamp(0, total as isize - 1) as usize;
        let page_offset = absolute / RAW_PAGE * RAW_PAGE;
        self.scroll = absolute - page_offset;
        if page_offset != self.raw_offset {
            self.raw_offset = page_offset;
            return true;
        }
        false
    }

    pub async fn refresh(&mut self, client: &reqwest::Client) {
        let dashboard_url = format!(
            "{}/dashboard?table={}",
            self.base_url,
            self.choice.query_value()
        );
        let latency_url = format!("{}/stats/latency", self.base_url);

        let (dashboard_res, latency_res) =
            tokio::join!(client.get(&dashboard_url).send(), client.get(&latency_url).send());

        match dashboard_res {
            Ok(resp) if resp.status().is_success() => match resp.json::<DashboardResponse>().await {
                Ok(d) => {
                    self.dashboard = Some(d);
                    self.status = ConnectionStatus::Connected;
                    self.last_refresh = std::time::Instant::now();
                }
                Err(e) => {
                    self.status = ConnectionStatus::Error(format!("parse error: {e}"));
                    return;
                }
            },
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                self.status = ConnectionStatus::Error(format!("{status}: {body}"));
                return;
            }
            Err(e) => {
                self.status = ConnectionStatus::Error(format!("{e}"));
                return;
            }
        }

        if let Ok(l) = latency_res {
            if let Ok(latency) = l.json::<LatencyResponse>().await {
                self.latency = latency;
            }
        }

        self.fetch_rows(client).await;
    }

    pub async fn fetch_rows(&mut self, client: &reqwest::Client) {
        let url = format!(
            "{}/tables/{}/rows?limit={}&offset={}",
            self.base_url,
            self.raw_table_name(),
            RAW_PAGE,
            self.raw_offset
        );
        match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                if let Ok(rows) = resp.json::<RowsResponse>().await {
                    self.scroll = self.scroll.min(rows.rows.len().saturating_sub(1));
                    self.raw = rows;
                }
            }
            Ok(resp) => {
                self.status = ConnectionStatus::Error(format!("rows: {}", resp.status()));
            }
            Err(e) => {
                self.status = ConnectionStatus::Error(format!("rows: {e}"));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

pub fn format_money(v: f64) -> String {
    if v < 0.0 {
        format!("-R{:.2}", -v)
    } else {
        format!("R{:.2}", v)
    }
}

pub fn format_pct(v: Option<f64>) -> String {
    v.map_or("-".to_string(), |p| format!("{p:.2}%"))
}

/// Render a JSON cell for the raw table.
pub fn format_cell(v: Option<&Value>) -> String {
    match v {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{f:.0}"),
            Some(f) => format!("{f:.3}"),
            None => n.to_string(),
        },
        Some(other) => other.to_string(),
    }
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}
