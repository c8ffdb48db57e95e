//! Vault explorer core crate.
//!
//! Fetches Hyperliquid vault summaries (bulk snapshot first, recent summaries
//! as fallback), normalizes the loosely shaped records, filters them by APR,
//! TVL and age, and serves the result as an HTML dashboard or CSV export.

mod cache;
mod config;
mod dashboard;
mod export;
mod fetch;
mod filter;
mod normalize;
mod observability;
mod payload;

pub use cache::{SnapshotCache, DEFAULT_CACHE_TTL};
pub use config::{
    fetch_config_from_env, filters_from_env, server_config_from_env, ConfigError, ServerConfig,
    DEFAULT_DASHBOARD_ADDR,
};
pub use dashboard::{
    build_display_snapshot, dashboard_router, demo_snapshot, format_age, format_percent,
    format_row_for_display, format_usd, render_dashboard_html, DashboardDisplayRow,
    DashboardDisplaySnapshot, DashboardQuery, DashboardSnapshot, DashboardSnapshotSource,
    InMemoryVaultSource, LiveVaultSource, DASHBOARD_HEADERS,
};
pub use export::{write_rows_csv, EXPORT_HEADERS};
pub use fetch::{
    enrich_with_details, fetch_recent_summaries, fetch_snapshot, fetch_vault_details,
    fetch_vaults, fetch_vaults_with_fetcher, normalize_vault_address, FetchConfig, FetchError,
    FetchReport, HttpFetcher, ReqwestBlockingFetcher, VaultFeed, INFO_URL, SNAPSHOT_URL,
};
pub use filter::{
    apply_filters, sort_rows, summarize, SortOrder, VaultFilters, VaultSummaryMetrics,
};
pub use normalize::{
    has_apr_candidate, lookup, normalize_record, normalize_vaults, NormalizedVaultRow,
    VaultRecord, APR_KEYS, CREATED_AT_KEYS, NAME_KEYS, TVL_KEYS, UNKNOWN_NAME,
};
pub use observability::{
    init_logging, log_app_bind, log_app_start, log_fetch_report, log_source_selected,
    logging_config_from_env, LogFormat, LoggingConfig, LoggingInitError,
};
pub use payload::{decode_json_payload, decompress, looks_like_json, PayloadEncoding, PayloadError};
