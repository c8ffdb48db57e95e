//! Vault dashboard: snapshot sources, display rows and HTTP routes.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::cache::SnapshotCache;
use crate::config::parse_bool;
use crate::fetch::{
    fetch_vaults, fetch_vaults_with_fetcher, FetchConfig, FetchReport, HttpFetcher, VaultFeed,
};
use crate::filter::{sort_rows, summarize, SortOrder, VaultFilters, VaultSummaryMetrics};
use crate::normalize::{normalize_vaults, NormalizedVaultRow};
use crate::observability::log_fetch_report;

pub const DASHBOARD_HEADERS: [&str; 6] = [
    "Name",
    "Leader",
    "APR (%)",
    "TVL (USD)",
    "Age (days)",
    "Record",
];

const NO_DATA_MESSAGE: &str = "No vault data available.";
const NO_MATCH_MESSAGE: &str = "No vaults match the selected filters.";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub rows: Vec<NormalizedVaultRow>,
    pub feed: Option<VaultFeed>,
    pub error: Option<String>,
}

impl DashboardSnapshot {
    pub fn from_report(report: &FetchReport, now_ms: i64) -> Self {
        Self {
            rows: normalize_vaults(&report.records, now_ms),
            feed: report.feed,
            error: report.error.clone(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            rows: Vec::new(),
            feed: None,
            error: Some(message.into()),
        }
    }
}

pub trait DashboardSnapshotSource: Send + Sync + 'static {
    fn snapshot(&self) -> DashboardSnapshot;

    fn refresh(&self);
}

#[derive(Clone)]
pub struct InMemoryVaultSource {
    inner: Arc<RwLock<DashboardSnapshot>>,
}

impl InMemoryVaultSource {
    pub fn new(snapshot: DashboardSnapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(snapshot)),
        }
    }

    pub fn demo() -> Self {
        Self::new(demo_snapshot())
    }

    pub fn replace_snapshot(&self, snapshot: DashboardSnapshot) {
        let mut guard = self
            .inner
            .write()
            .expect("in-memory snapshot lock should not be poisoned");
        *guard = snapshot;
    }
}

impl DashboardSnapshotSource for InMemoryVaultSource {
    fn snapshot(&self) -> DashboardSnapshot {
        self.inner
            .read()
            .expect("in-memory snapshot lock should not be poisoned")
            .clone()
    }

    fn refresh(&self) {}
}

pub struct LiveVaultSource {
    cfg: FetchConfig,
    cache: SnapshotCache<FetchReport>,
    fetcher: Option<Arc<dyn HttpFetcher>>,
}

impl LiveVaultSource {
    pub fn new(cfg: FetchConfig, cache_ttl: Duration) -> Self {
        Self {
            cfg,
            cache: SnapshotCache::new(cache_ttl),
            fetcher: None,
        }
    }

    pub fn with_fetcher(
        cfg: FetchConfig,
        cache_ttl: Duration,
        fetcher: Arc<dyn HttpFetcher>,
    ) -> Self {
        Self {
            cfg,
            cache: SnapshotCache::new(cache_ttl),
            fetcher: Some(fetcher),
        }
    }

    fn fetch(&self) -> FetchReport {
        let report = match &self.fetcher {
            Some(fetcher) => fetch_vaults_with_fetcher(&self.cfg, fetcher.as_ref()),
            None => fetch_vaults(&self.cfg),
        };
        log_fetch_report("dashboard", &report);
        report
    }
}

impl DashboardSnapshotSource for LiveVaultSource {
    fn snapshot(&self) -> DashboardSnapshot {
        let report = self
            .cache
            .get_or_refresh_if(|| self.fetch(), FetchReport::is_success);
        DashboardSnapshot::from_report(&report, Utc::now().timestamp_millis())
    }

    fn refresh(&self) {
        self.cache.clear();
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashboardQuery {
    pub min_apr: Option<String>,
    pub max_apr: Option<String>,
    pub min_tvl: Option<String>,
    pub max_tvl: Option<String>,
    pub min_age: Option<String>,
    pub max_age: Option<String>,
    pub include_closed: Option<String>,
    pub sort: Option<String>,
}

impl DashboardQuery {
    pub fn filters(&self) -> VaultFilters {
        let defaults = VaultFilters::default();
        VaultFilters {
            min_apr: parse_bound(&self.min_apr).unwrap_or(defaults.min_apr),
            max_apr: parse_bound(&self.max_apr).unwrap_or(defaults.max_apr),
            min_tvl: parse_bound(&self.min_tvl).unwrap_or(defaults.min_tvl),
            max_tvl: parse_bound(&self.max_tvl).unwrap_or(defaults.max_tvl),
            min_age: parse_bound(&self.min_age).unwrap_or(defaults.min_age),
            max_age: parse_bound(&self.max_age).unwrap_or(defaults.max_age),
            include_closed: self
                .include_closed
                .as_deref()
                .and_then(parse_bool)
                .unwrap_or(defaults.include_closed),
        }
    }

    pub fn sort_order(&self) -> SortOrder {
        self.sort
            .as_deref()
            .and_then(SortOrder::parse)
            .unwrap_or_default()
    }
}

fn parse_bound(raw: &Option<String>) -> Option<f64> {
    raw.as_deref()
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| !value.is_nan())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardDisplayRow {
    pub id: usize,
    pub name: String,
    pub leader: Option<String>,
    pub vault_address: Option<String>,
    pub apr_percent: f64,
    pub tvl_usd: f64,
    pub age_days: Option<f64>,
    pub is_closed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardDisplaySnapshot {
    pub feed: Option<VaultFeed>,
    pub error: Option<String>,
    pub total_rows: usize,
    pub filters: VaultFilters,
    pub sort: SortOrder,
    pub summary: VaultSummaryMetrics,
    pub rows: Vec<DashboardDisplayRow>,
}

struct IndexedRow<'a> {
    id: usize,
    row: &'a NormalizedVaultRow,
}

impl AsRef<NormalizedVaultRow> for IndexedRow<'_> {
    fn as_ref(&self) -> &NormalizedVaultRow {
        self.row
    }
}

pub fn format_row_for_display(id: usize, row: &NormalizedVaultRow) -> DashboardDisplayRow {
    DashboardDisplayRow {
        id,
        name: row.name.clone(),
        leader: row.leader.clone(),
        vault_address: row.vault_address.clone(),
        apr_percent: row.apr_percent,
        tvl_usd: row.tvl_usd,
        age_days: row.age_days,
        is_closed: row.is_closed,
    }
}

/// Row ids are positions in the unfiltered snapshot, so they stay valid for
/// `/dashboard/vault/{id}` regardless of filters and sort order.
pub fn build_display_snapshot(
    snapshot: &DashboardSnapshot,
    filters: &VaultFilters,
    sort: SortOrder,
) -> DashboardDisplaySnapshot {
    let mut matching: Vec<IndexedRow<'_>> = snapshot
        .rows
        .iter()
        .enumerate()
        .filter(|(_, row)| filters.matches(row))
        .map(|(id, row)| IndexedRow { id, row })
        .collect();
    sort_rows(&mut matching, sort);

    DashboardDisplaySnapshot {
        feed: snapshot.feed,
        error: snapshot.error.clone(),
        total_rows: snapshot.rows.len(),
        filters: *filters,
        sort,
        summary: summarize(matching.iter().map(|entry| entry.row)),
        rows: matching
            .iter()
            .map(|entry| format_row_for_display(entry.id, entry.row))
            .collect(),
    }
}

pub fn dashboard_router(source: Arc<dyn DashboardSnapshotSource>) -> Router {
    Router::new()
        .route("/dashboard", get(get_dashboard_html))
        .route("/dashboard/snapshot", get(get_dashboard_snapshot))
        .route("/dashboard/vault/{id}", get(get_vault_record))
        .route("/dashboard/refresh", post(post_refresh))
        .with_state(DashboardAppState { source })
}

pub fn render_dashboard_html(view: &DashboardDisplaySnapshot) -> String {
    let now_utc = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
    let filters = &view.filters;

    let mut out = String::new();
    out.push_str("<!DOCTYPE html><html><head><meta charset=\"utf-8\">\n");
    out.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    out.push_str("<title>Vault Explorer</title>\n");
    out.push_str("<style>:root{--bg:#f5f1e7;--bg2:#e9f0f2;--card:#ffffff;--ink:#182026;--muted:#5f6a73;--line:#d7dce1;--head:#14343f;--btn:#0c5f78;--warn:#fff5b8;--warnink:#6b5200}*{box-sizing:border-box}body{margin:0;color:var(--ink);font-family:\"Space Grotesk\",\"Avenir Next\",\"Segoe UI\",sans-serif;background:linear-gradient(160deg,var(--bg),var(--bg2));min-height:100vh}.shell{max-width:1300px;margin:0 auto;padding:24px 18px 28px}.hero{background:linear-gradient(135deg,#102f3a 0%,#24576b 100%);color:#f7fbfc;border-radius:16px;padding:18px 20px;box-shadow:0 10px 30px rgba(16,47,58,.25)}.hero h1{margin:0 0 8px;font-size:1.6rem}.hero-meta{display:flex;gap:16px;flex-wrap:wrap;font-size:.92rem;color:#dcebf0}.card{margin-top:16px;background:var(--card);border:1px solid #cbd4db;border-radius:16px;overflow:hidden;box-shadow:0 12px 28px rgba(26,35,42,.12)}.filters-form{display:flex;flex-wrap:wrap;gap:12px;padding:14px;align-items:flex-end}.filters-form label{display:flex;flex-direction:column;font-size:.78rem;color:var(--muted);gap:4px}.filters-form input[type=number],.filters-form select{padding:6px 8px;border:1px solid var(--line);border-radius:8px;width:130px}.btn{background:var(--btn);color:#fff;border:0;border-radius:9px;padding:8px 12px;font-weight:700;cursor:pointer}.refresh-form{padding:0 14px 14px}.warning{margin-top:16px;padding:12px 14px;border-radius:12px;background:var(--warn);color:var(--warnink)}.metrics{display:flex;gap:12px;padding:14px}.metric{flex:1;background:#f8fbfc;border:1px solid var(--line);border-radius:12px;padding:10px 12px}.metric b{display:block;font-size:1.2rem}.table-wrap{overflow:auto;max-height:70vh}table{width:100%;border-collapse:collapse}thead th{position:sticky;top:0;background:var(--head);color:#f2f7f9;font-size:.8rem;text-transform:uppercase;letter-spacing:.04em;padding:10px;text-align:left}tbody td{font-size:.84rem;padding:9px 10px;border-bottom:1px solid var(--line);white-space:nowrap}tbody tr:nth-child(even){background:#fafcfd}tr.closed td{color:var(--muted)}.mono{font-family:\"IBM Plex Mono\",\"SFMono-Regular\",monospace;font-size:.72rem}.empty{padding:18px 14px;color:var(--muted)}</style>\n");
    out.push_str("</head><body><main class=\"shell\">\n");

    out.push_str("<section class=\"hero\"><h1>Vault Explorer</h1><div class=\"hero-meta\">");
    out.push_str(&format!(
        "<span>Source: {}</span>",
        view.feed.map(VaultFeed::as_str).unwrap_or("none")
    ));
    out.push_str(&format!("<span>Vaults loaded: {}</span>", view.total_rows));
    out.push_str(&format!("<span>Generated: {}</span>", escape_html(&now_utc)));
    out.push_str("</div></section>\n");

    out.push_str("<section class=\"card\"><form class=\"filters-form\" method=\"get\" action=\"/dashboard\">");
    push_number_input(&mut out, "min_apr", "Minimum APR (%)", filters.min_apr, "0.1");
    push_number_input(&mut out, "max_apr", "Maximum APR (%)", filters.max_apr, "0.1");
    push_number_input(&mut out, "min_tvl", "Minimum TVL (USD)", filters.min_tvl, "1");
    push_number_input(&mut out, "max_tvl", "Maximum TVL (USD)", filters.max_tvl, "1");
    push_number_input(&mut out, "min_age", "Minimum Age (days)", filters.min_age, "1");
    push_number_input(&mut out, "max_age", "Maximum Age (days)", filters.max_age, "1");
    out.push_str("<label>Include closed<input type=\"checkbox\" name=\"include_closed\" value=\"on\"");
    if filters.include_closed {
        out.push_str(" checked");
    }
    out.push_str("></label>");
    out.push_str("<label>Sort<select name=\"sort\">");
    for (order, label) in [
        (SortOrder::Input, "Source order"),
        (SortOrder::AprDesc, "APR, highest first"),
        (SortOrder::TvlDesc, "TVL, highest first"),
    ] {
        let selected = if order == view.sort { " selected" } else { "" };
        out.push_str(&format!(
            "<option value=\"{}\"{}>{}</option>",
            order.as_str(),
            selected,
            label
        ));
    }
    out.push_str("</select></label>");
    out.push_str("<button class=\"btn\" type=\"submit\">Apply filters</button></form>");
    out.push_str("<form class=\"refresh-form\" method=\"post\" action=\"/dashboard/refresh\"><button class=\"btn btn-refresh\" type=\"submit\">Refresh data</button></form></section>\n");

    if let Some(message) = &view.error {
        out.push_str("<section class=\"warning\">");
        out.push_str(&escape_html(message));
        out.push_str("</section>\n");
    }

    if view.total_rows == 0 {
        out.push_str(&format!(
            "<section class=\"card\"><div class=\"empty\">{NO_DATA_MESSAGE}</div></section>\n"
        ));
        out.push_str("</main></body></html>\n");
        return out;
    }

    out.push_str("<section class=\"card\"><div class=\"metrics\">");
    out.push_str(&format!(
        "<div class=\"metric\">Vaults<b>{}</b></div>",
        view.summary.count
    ));
    out.push_str(&format!(
        "<div class=\"metric\">Mean APR<b>{}</b></div>",
        view.summary
            .mean_apr_percent
            .map(format_percent)
            .unwrap_or_else(|| "-".to_string())
    ));
    out.push_str(&format!(
        "<div class=\"metric\">Total TVL<b>{}</b></div>",
        format_usd(view.summary.total_tvl_usd)
    ));
    out.push_str("</div></section>\n");

    out.push_str(&format!(
        "<section class=\"card\"><h2 class=\"empty\">Filtered results (showing {} vaults)</h2>",
        view.rows.len()
    ));
    if view.rows.is_empty() {
        out.push_str(&format!("<div class=\"empty\">{NO_MATCH_MESSAGE}</div></section>\n"));
        out.push_str("</main></body></html>\n");
        return out;
    }

    out.push_str("<div class=\"table-wrap\"><table id=\"vault-table\"><thead><tr>");
    for header in DASHBOARD_HEADERS {
        out.push_str("<th>");
        out.push_str(&escape_html(header));
        out.push_str("</th>");
    }
    out.push_str("</tr></thead><tbody>\n");

    for row in &view.rows {
        let class = if row.is_closed { "closed" } else { "" };
        out.push_str(&format!("<tr class=\"{class}\" data-row=\"{}\">", row.id));
        out.push_str(&format!("<td>{}</td>", escape_html(&row.name)));
        out.push_str(&format!(
            "<td class=\"mono\">{}</td>",
            escape_html(row.leader.as_deref().unwrap_or("-"))
        ));
        out.push_str(&format!("<td>{}</td>", format_percent(row.apr_percent)));
        out.push_str(&format!("<td>{}</td>", format_usd(row.tvl_usd)));
        out.push_str(&format!("<td>{}</td>", format_age(row.age_days)));
        out.push_str(&format!(
            "<td><a href=\"/dashboard/vault/{}\" target=\"_blank\" rel=\"noopener noreferrer\">Inspect</a></td>",
            row.id
        ));
        out.push_str("</tr>\n");
    }

    out.push_str("</tbody></table></div></section>");
    out.push_str("</main></body></html>\n");
    out
}

pub fn demo_snapshot() -> DashboardSnapshot {
    let now_ms = Utc::now().timestamp_millis();
    let day_ms = 86_400_000;

    let records = vec![
        json!({
            "apr": 0.2412,
            "summary": {
                "name": "Demo Liquidity Provider",
                "vaultAddress": "0xdfc24b077bc1425ad1dea75bcb6f8158e10df303",
                "leader": "0x677d831aef5328190852e24f13c46cac05f984e7",
                "tvl": "412337051.12",
                "isClosed": false,
                "createTimeMillis": now_ms - 700 * day_ms
            }
        }),
        json!({
            "vaultName": "Momentum Basis",
            "leader": "0x5b5d51203a0f9079f8aeb098a6523a13f298c060",
            "apr": 37.5,
            "tvl": "$1,250,000",
            "createdTs": (now_ms - 45 * day_ms) / 1_000
        }),
        json!({
            "leader": "0x8f7a3b2c1d0e9f8a7b6c5d4e3f2a1b0c9d8e7f61",
            "apy": "0.08",
            "totalDeposits": 5808,
            "createTimeMillis": now_ms - day_ms / 2
        }),
        json!({
            "name": "Retired Funding Arb",
            "leader": "0x0d1e2f3a4b5c6d7e8f9a0b1c2d3e4f5a6b7c8d9e",
            "apr": -0.05,
            "tvlUsd": 0,
            "isClosed": true,
            "startTimestamp": now_ms - 400 * day_ms
        }),
        json!({
            "name": "Fresh Vault",
            "apr30d": 0.61,
            "tvl": 2500
        }),
    ];

    DashboardSnapshot::from_report(
        &FetchReport::from_feed(VaultFeed::Snapshot, records),
        now_ms,
    )
}

pub fn format_percent(value: f64) -> String {
    format!("{value:.2}%")
}

pub fn format_usd(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    let fixed = format!("{:.2}", value.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (idx, ch) in whole.chars().enumerate() {
        if idx > 0 && (whole.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{sign}${grouped}.{cents}")
}

pub fn format_age(age_days: Option<f64>) -> String {
    age_days
        .map(|age| format!("{age:.1}"))
        .unwrap_or_else(|| "-".to_string())
}

fn push_number_input(out: &mut String, name: &str, label: &str, value: f64, step: &str) {
    out.push_str(&format!(
        "<label>{label}<input type=\"number\" name=\"{name}\" value=\"{value}\" step=\"{step}\"></label>"
    ));
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[derive(Clone)]
struct DashboardAppState {
    source: Arc<dyn DashboardSnapshotSource>,
}

async fn load_snapshot(source: Arc<dyn DashboardSnapshotSource>) -> DashboardSnapshot {
    match tokio::task::spawn_blocking(move || source.snapshot()).await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            error!(
                component = "dashboard",
                event = "http.snapshot.task_failed",
                error = %err
            );
            DashboardSnapshot::failed(format!("snapshot task failed: {err}"))
        }
    }
}

async fn get_dashboard_html(
    State(state): State<DashboardAppState>,
    Query(query): Query<DashboardQuery>,
) -> impl IntoResponse {
    let snapshot = load_snapshot(state.source).await;
    let view = build_display_snapshot(&snapshot, &query.filters(), query.sort_order());
    info!(
        component = "dashboard",
        event = "http.dashboard.request",
        total_rows = view.total_rows,
        shown_rows = view.rows.len()
    );
    Html(render_dashboard_html(&view))
}

async fn get_dashboard_snapshot(
    State(state): State<DashboardAppState>,
    Query(query): Query<DashboardQuery>,
) -> impl IntoResponse {
    let snapshot = load_snapshot(state.source).await;
    let view = build_display_snapshot(&snapshot, &query.filters(), query.sort_order());
    info!(
        component = "dashboard",
        event = "http.snapshot.request",
        total_rows = view.total_rows,
        shown_rows = view.rows.len(),
        has_error = view.error.is_some()
    );
    Json(view)
}

async fn get_vault_record(
    State(state): State<DashboardAppState>,
    Path(id): Path<usize>,
) -> Response {
    let snapshot = load_snapshot(state.source).await;
    match snapshot.rows.into_iter().nth(id) {
        Some(row) => Json(Value::Object(row.raw)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no vault at row {id}") })),
        )
            .into_response(),
    }
}

async fn post_refresh(State(state): State<DashboardAppState>) -> Redirect {
    let source = Arc::clone(&state.source);
    if let Err(err) = tokio::task::spawn_blocking(move || source.refresh()).await {
        error!(
            component = "dashboard",
            event = "http.refresh.task_failed",
            error = %err
        );
    }
    info!(component = "dashboard", event = "http.refresh.request");
    Redirect::to("/dashboard")
}
