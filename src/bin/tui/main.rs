mod app;

use std::io;
use std::time::Duration;

use app::{
    format_cell, format_money, format_pct, truncate, AppState, ConnectionStatus, DashboardResponse, GroupStat, Tab,
    TableChoice, RAW_PAGE,
};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Cell, Chart, Dataset, GraphType, Paragraph, Row, Table, TableState, Tabs},
    Frame, Terminal,
};

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> io::Result<()> {
    let base_url = std::env::var("API_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

    // Full loads of the upstream tables can take a while on a cold cache.
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .map_err(io::Error::other)?;

    let mut app = AppState::new(base_url);

    // Initial fetch before rendering
    app.refresh(&client).await;

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut terminal, &mut app, &client).await;

    // Restore terminal regardless of result
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    result
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut AppState,
    client: &reqwest::Client,
) -> io::Result<()> {
    // The server caches tables, so polling is cheap once warm.
    let refresh_interval = Duration::from_secs(30);
    let mut last_tick = std::time::Instant::now();

    loop {
        terminal.draw(|f| render(f, app))?;

        let timeout = refresh_interval
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                let mut reload = false;
                match key.code {
                    KeyCode::Char('q') | KeyCode::Char('Q') => return Ok(()),
                    KeyCode::Char('r') | KeyCode::Char('R') => reload = true,
                    KeyCode::Char(c @ '1'..='3') => {
                        app.select(TableChoice(Some(c as usize - '1' as usize)));
                        reload = true;
                    }
                    KeyCode::Char('a') | KeyCode::Char('A') => {
                        app.select(TableChoice(None));
                        reload = true;
                    }
                    KeyCode::Tab => app.tab = app.tab.next(),
                    KeyCode::Char('[') => {
                        app.cycle_raw_table(false);
                        app.fetch_rows(client).await;
                    }
                    KeyCode::Char(']') => {
                        app.cycle_raw_table(true);
                        app.fetch_rows(client).await;
                    }
                    KeyCode::Down | KeyCode::Char('j') => {
                        if app.scroll_by(1) {
                            app.fetch_rows(client).await;
                        }
                    }
                    KeyCode::Up | KeyCode::Char('k') => {
                        if app.scroll_by(-1) {
                            app.fetch_rows(client).await;
                        }
                    }
                    KeyCode::PageDown => {
                        if app.scroll_by(20) {
                            app.fetch_rows(client).await;
                        }
                    }
                    KeyCode::PageUp => {
                        if app.scroll_by(-20) {
                            app.fetch_rows(client).await;
                        }
                    }
                    _ => {}
                }
                if reload {
                    app.refresh(client).await;
                    last_tick = std::time::Instant::now();
                }
            }
        }

        if last_tick.elapsed() >= refresh_interval {
            app.refresh(client).await;
            last_tick = std::time::Instant::now();
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(f: &mut Frame, app: &AppState) {
    let area = f.area();

    // Outer vertical split: header | tabs | body | footer
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // header
            Constraint::Length(3), // tabs
            Constraint::Min(0),    // body
            Constraint::Length(1), // footer
        ])
        .split(area);

    render_header(f, app, chunks[0]);
    render_tabs(f, app, chunks[1]);

    match (&app.dashboard, app.tab) {
        (_, Tab::RawData) => render_raw(f, app, chunks[2]),
        (Some(d), Tab::Performance) => render_performance(f, d, chunks[2]),
        (Some(d), Tab::BetAnalysis) => render_analysis(f, d, chunks[2]),
        (Some(d), Tab::TimeSeries) => render_time_series(f, d, chunks[2]),
        (None, _) => {
            let msg = Paragraph::new("No data loaded yet. Press [r] to retry.").block(panel(" DASHBOARD "));
            f.render_widget(msg, chunks[2]);
        }
    }

    render_footer(f, app, chunks[3]);
}

fn panel(title: &str) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(title, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)))
}

fn profit_color(v: f64) -> Color {
    if v > 0.0 {
        Color::Green
    } else if v < 0.0 {
        Color::Red
    } else {
        Color::White
    }
}

fn render_header(f: &mut Frame, app: &AppState, area: Rect) {
    let (status_text, status_color) = match &app.status {
        ConnectionStatus::Connected => ("● connected".to_string(), Color::Green),
        ConnectionStatus::Connecting => ("◌ connecting".to_string(), Color::Yellow),
        ConnectionStatus::Error(e) => (format!("✗ {}", truncate(e, 60)), Color::Red),
    };

    let sep = || Span::raw("  │  ");
    let mut title = vec![
        Span::styled(" Betting Analytics  ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::styled(status_text, Style::default().fg(status_color)),
        sep(),
        Span::styled(format!("table: {}", app.choice.query_value()), Style::default().fg(Color::White)),
    ];

    let kpi_line = match &app.dashboard {
        Some(d) => {
            let k = &d.kpis;
            title.push(sep());
            title.push(Span::styled(
                format!("as of {}", d.generated_at),
                Style::default().fg(Color::DarkGray),
            ));
            Line::from(vec![
                Span::raw(format!(" Bets {}", k.total_bets)),
                sep(),
                Span::raw("Profit "),
                Span::styled(format_money(k.total_profit), Style::default().fg(profit_color(k.total_profit))),
                sep(),
                Span::raw(format!("Avg EV {:.2}", k.avg_ev)),
                sep(),
                Span::raw(format!("Win rate {:.1}%", k.win_rate * 100.0)),
                sep(),
                Span::raw(format!("Yield {}", format_pct(k.combined_yield))),
                sep(),
                Span::raw(format!(
                    "Stake {} avg / {} total",
                    k.avg_stake.map_or("-".to_string(), format_money),
                    k.total_stake.map_or("-".to_string(), format_money),
                )),
            ])
        }
        None => Line::from(" -"),
    };

    let paragraph = Paragraph::new(vec![Line::from(title), kpi_line])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::DarkGray)));
    f.render_widget(paragraph, area);
}

fn render_tabs(f: &mut Frame, app: &AppState, area: Rect) {
    let titles: Vec<String> = Tab::ALL.iter().map(|t| t.title().to_string()).collect();
    let selected = Tab::ALL.iter().position(|t| *t == app.tab).unwrap_or(0);
    let tabs = Tabs::new(titles)
        .select(selected)
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::DarkGray)))
        .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
    f.render_widget(tabs, area);
}

fn group_table<'a>(title: &'a str, stats: Option<&'a [GroupStat]>) -> Table<'a> {
    let header_cells = ["Group", "Bets", "Stake", "Profit", "Yield"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells).height(1);

    let rows: Vec<Row> = stats
        .unwrap_or_default()
        .iter()
        .map(|g| {
            Row::new(vec![
                Cell::from(truncate(&g.label, 24)),
                Cell::from(g.bets.to_string()).style(Style::default().fg(Color::Cyan)),
                Cell::from(format_money(g.stake)),
                Cell::from(format_money(g.profit)).style(Style::default().fg(profit_color(g.profit))),
                Cell::from(format_pct(g.yield_pct)).style(Style::default().fg(profit_color(g.yield_pct.unwrap_or(0.0)))),
            ])
        })
        .collect();

    let title = if stats.is_none() { " (columns missing) " } else { title };
    Table::new(
        rows,
        [
            Constraint::Min(12),
            Constraint::Length(6),
            Constraint::Length(12),
            Constraint::Length(12),
            Constraint::Length(9),
        ],
    )
    .header(header)
    .block(panel(title))
}

fn render_performance(f: &mut Frame, d: &DashboardResponse, area: Rect) {
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);
    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(halves[0]);

    f.render_widget(group_table(" YIELD BY BOOKMAKER ", d.charts.yield_by_bookmaker.as_deref()), left[0]);
    f.render_widget(group_table(" PROFIT BY ODDS ", d.charts.profit_by_odds.as_deref()), left[1]);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(7), Constraint::Min(0)])
        .split(halves[1]);
    f.render_widget(group_table(" BY SOURCE ", d.charts.by_source.as_deref()), right[0]);
    render_table_summaries(f, d, right[1]);
}

fn render_table_summaries(f: &mut Frame, d: &DashboardResponse, area: Rect) {
    let header_cells = ["Table", "Raw", "Clean", "Dup id", "Dup key"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let rows: Vec<Row> = d
        .tables
        .iter()
        .map(|t| {
            Row::new(vec![
                Cell::from(t.table.clone()),
                Cell::from(t.raw_count.to_string()),
                Cell::from(t.clean_count.to_string()).style(Style::default().fg(Color::Cyan)),
                Cell::from(t.dedupe.removed_by_id.to_string()).style(Style::default().fg(Color::DarkGray)),
                Cell::from(t.dedupe.removed_by_business_key.to_string()).style(Style::default().fg(Color::DarkGray)),
            ])
        })
        .collect();

    let title = format!(" LOADED: {} ({} records) ", d.selection, d.total_records);
    let table = Table::new(
        rows,
        [
            Constraint::Min(12),
            Constraint::Length(8),
            Constraint::Length(8),
            Constraint::Length(8),
            Constraint::Length(8),
        ],
    )
    .header(Row::new(header_cells))
    .block(panel(&title));
    f.render_widget(table, area);
}

fn render_analysis(f: &mut Frame, d: &DashboardResponse, area: Rect) {
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);
    f.render_widget(group_table(" TOP SPORTS ", d.charts.top_sports.as_deref()), halves[0]);
    f.render_widget(group_table(" TOP BOOKMAKERS ", d.charts.top_bookmakers.as_deref()), halves[1]);
}

fn render_time_series(f: &mut Frame, d: &DashboardResponse, area: Rect) {
    let halves = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(area);

    match &d.charts.cumulative_profit {
        Some(c) if !c.points.is_empty() => {
            let data: Vec<(f64, f64)> = c
                .points
                .iter()
                .enumerate()
                .map(|(i, p)| (i as f64, p.cumulative_profit))
                .collect();
            let (lo, hi) = data
                .iter()
                .fold((0.0f64, 0.0f64), |(lo, hi), (_, y)| (lo.min(*y), hi.max(*y)));
            let (start, end) = c.date_range.clone().unwrap_or_default();

            let dataset = Dataset::default()
                .name(format!("cumulative {}", format_money(c.final_profit)))
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(profit_color(c.final_profit)))
                .data(&data);

            let title = format!(
                " CUMULATIVE PROFIT by {} (future {}, undated {}) ",
                c.label, c.filtered_future, c.undated
            );
            let chart = Chart::new(vec![dataset])
                .block(panel(&title))
                .x_axis(
                    Axis::default()
                        .style(Style::default().fg(Color::DarkGray))
                        .bounds([0.0, (data.len().saturating_sub(1)).max(1) as f64])
                        .labels(vec![start, end]),
                )
                .y_axis(
                    Axis::default()
                        .style(Style::default().fg(Color::DarkGray))
                        .bounds([lo, hi.max(lo + 1.0)])
                        .labels(vec![format_money(lo), format_money(hi)]),
                );
            f.render_widget(chart, halves[0]);
        }
        _ => {
            let mut lines = vec![Line::from(" No dated records to plot.")];
            lines.push(Line::from(format!(
                " Date columns available: {}",
                if d.diagnostics.available_date_columns.is_empty() {
                    "none".to_string()
                } else {
                    d.diagnostics.available_date_columns.join(", ")
                }
            )));
            f.render_widget(Paragraph::new(lines).block(panel(" CUMULATIVE PROFIT ")), halves[0]);
        }
    }

    let header_cells = ["Month", "Source", "Profit"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let rows: Vec<Row> = d
        .charts
        .monthly_profit
        .as_deref()
        .unwrap_or_default()
        .iter()
        .rev()
        .map(|m| {
            Row::new(vec![
                Cell::from(m.month.clone()),
                Cell::from(m.data_source.clone()),
                Cell::from(format_money(m.profit)).style(Style::default().fg(profit_color(m.profit))),
            ])
        })
        .collect();

    let title = match &d.diagnostics.future_records {
        Some(fr) if fr.count > 0 => format!(
            " MONTHLY PROFIT ({} future {} rows, earliest {}) ",
            fr.count,
            fr.column,
            fr.earliest.as_deref().unwrap_or("-")
        ),
        _ => " MONTHLY PROFIT ".to_string(),
    };
    let table = Table::new(rows, [Constraint::Length(9), Constraint::Min(12), Constraint::Length(12)])
        .header(Row::new(header_cells))
        .block(panel(&title));
    f.render_widget(table, halves[1]);
}

fn render_raw(f: &mut Frame, app: &AppState, area: Rect) {
    let raw = &app.raw;
    let header_cells = raw
        .columns
        .iter()
        .map(|h| Cell::from(h.clone()).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells).height(1);

    let rows: Vec<Row> = raw
        .rows
        .iter()
        .map(|r| Row::new(raw.columns.iter().map(|c| Cell::from(truncate(&format_cell(r.get(c)), 20)))))
        .collect();

    let widths = vec![Constraint::Min(8); raw.columns.len().max(1)];
    let shown_to = (raw.offset + raw.rows.len()).min(raw.total);
    let title = format!(
        " {} rows {}-{} of {} ",
        raw.table,
        if raw.total == 0 { 0 } else { raw.offset + 1 },
        shown_to,
        raw.total
    );
    let table = Table::new(rows, widths)
        .header(header)
        .block(panel(&title))
        .row_highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD));

    let mut state = TableState::default();
    if !raw.rows.is_empty() {
        state.select(Some(app.scroll));
    }
    f.render_stateful_widget(table, area, &mut state);
}

fn render_footer(f: &mut Frame, app: &AppState, area: Rect) {
    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow));
    let mut spans = vec![
        key(" [q] "),
        Span::raw("quit  "),
        key("[r] "),
        Span::raw("refresh  "),
        key("[1-3/a] "),
        Span::raw("table  "),
        key("[Tab] "),
        Span::raw("view  "),
    ];
    if app.tab == Tab::RawData {
        spans.push(key("[↑↓] "));
        spans.push(Span::raw(format!("scroll ({RAW_PAGE}/page)  ")));
        if app.choice.0.is_none() {
            spans.push(key("[ [ ] ] "));
            spans.push(Span::raw("raw table  "));
        }
    }
    let latency = match (app.latency.p50_ms, app.latency.p99_ms) {
        (Some(p50), Some(p99)) => format!("page p50 {p50:.0}ms p99 {p99:.0}ms"),
        _ => "page latency: -".to_string(),
    };
    spans.push(Span::styled(
        format!("{latency}  updated {}s ago", app.last_refresh.elapsed().as_secs()),
        Style::default().fg(Color::DarkGray),
    ));

    let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().fg(Color::White));
    f.render_widget(paragraph, area);
}
