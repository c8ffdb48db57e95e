//! Shared logging configuration and initialization.

use std::net::SocketAddr;

use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{env_string, parse_bool, ServerConfig};
use crate::fetch::{FetchReport, VaultFeed};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_target: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

pub fn logging_config_from_env() -> LoggingConfig {
    let defaults = LoggingConfig::default();

    LoggingConfig {
        level: env_string("VAULTS_LOG_LEVEL").unwrap_or(defaults.level),
        format: env_string("VAULTS_LOG_FORMAT")
            .and_then(|raw| parse_log_format(&raw))
            .unwrap_or(defaults.format),
        include_target: env_string("VAULTS_LOG_TARGET")
            .and_then(|raw| parse_bool(&raw))
            .unwrap_or(defaults.include_target),
    }
}

// stdout stays free for the exporter's CSV.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let env_filter =
        EnvFilter::try_new(config.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(config.include_target)
        .with_ansi(matches!(config.format, LogFormat::Pretty));

    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }

    Ok(())
}

pub fn log_app_start(component: &'static str, config: &LoggingConfig) {
    info!(
        component,
        event = "app.start",
        log_level = %config.level,
        log_format = ?config.format,
        include_target = config.include_target
    );
}

pub fn log_app_bind(bound_addr: SocketAddr) {
    info!(
        component = "dashboard_server",
        event = "app.bind",
        bind_addr = %bound_addr,
        routes = "/dashboard,/dashboard/snapshot,/dashboard/vault/{id},/dashboard/refresh"
    );
}

pub fn log_source_selected(server_cfg: &ServerConfig) {
    if server_cfg.use_demo {
        info!(
            component = "dashboard_server",
            event = "source.selected",
            source = "demo",
            reason = "VAULTS_DASHBOARD_USE_DEMO"
        );
    } else {
        info!(
            component = "dashboard_server",
            event = "source.selected",
            source = "live",
            cache_ttl_secs = server_cfg.cache_ttl.as_secs()
        );
    }
}

pub fn log_fetch_report(component: &'static str, report: &FetchReport) {
    let feed = report.feed.map(VaultFeed::as_str).unwrap_or("none");
    match &report.error {
        Some(error) => warn!(
            component,
            event = "fetch.report",
            feed,
            records = report.records.len(),
            error = %error
        ),
        None => info!(
            component,
            event = "fetch.report",
            feed,
            records = report.records.len()
        ),
    }
}

fn parse_log_format(raw: &str) -> Option<LogFormat> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "json" => Some(LogFormat::Json),
        "pretty" => Some(LogFormat::Pretty),
        _ => None,
    }
}
