//! Environment-driven configuration for the dashboard server and exporter.

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::cache::DEFAULT_CACHE_TTL;
use crate::fetch::FetchConfig;
use crate::filter::{SortOrder, VaultFilters};

pub const DEFAULT_DASHBOARD_ADDR: &str = "127.0.0.1:8080";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub cache_ttl: Duration,
    pub use_demo: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            cache_ttl: DEFAULT_CACHE_TTL,
            use_demo: false,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}'")]
    InvalidValue { var: &'static str, value: String },
}

pub fn server_config_from_env() -> Result<ServerConfig, ConfigError> {
    let mut config = ServerConfig::default();

    if let Some(addr) = env_parsed::<SocketAddr>("VAULTS_DASHBOARD_ADDR")? {
        config.bind_addr = addr;
    }
    if let Some(secs) = env_parsed::<u64>("VAULTS_CACHE_TTL_SECS")? {
        config.cache_ttl = Duration::from_secs(secs);
    }
    if let Some(use_demo) = env_bool("VAULTS_DASHBOARD_USE_DEMO") {
        config.use_demo = use_demo;
    }

    Ok(config)
}

pub fn fetch_config_from_env() -> Result<FetchConfig, ConfigError> {
    let mut config = FetchConfig::default();

    if let Some(url) = env_string("VAULTS_SNAPSHOT_URL") {
        config.snapshot_url = url;
    }
    if let Some(url) = env_string("VAULTS_INFO_URL") {
        config.info_url = url;
    }
    if let Some(ms) = env_parsed("VAULTS_SNAPSHOT_TIMEOUT_MS")? {
        config.snapshot_timeout_ms = ms;
    }
    if let Some(ms) = env_parsed("VAULTS_INFO_TIMEOUT_MS")? {
        config.info_timeout_ms = ms;
    }
    if let Some(enrich) = env_bool("VAULTS_ENRICH_DETAILS") {
        config.enrich_details = enrich;
    }
    if let Some(ms) = env_parsed("VAULTS_DETAIL_DELAY_MS")? {
        config.detail_delay_ms = ms;
    }
    if let Some(max) = env_parsed("VAULTS_MAX_DETAIL_REQUESTS")? {
        config.max_detail_requests = max;
    }

    Ok(config)
}

pub fn filters_from_env() -> Result<(VaultFilters, SortOrder), ConfigError> {
    let mut filters = VaultFilters::default();

    let bounds: [(&'static str, &mut f64); 6] = [
        ("VAULTS_MIN_APR", &mut filters.min_apr),
        ("VAULTS_MAX_APR", &mut filters.max_apr),
        ("VAULTS_MIN_TVL", &mut filters.min_tvl),
        ("VAULTS_MAX_TVL", &mut filters.max_tvl),
        ("VAULTS_MIN_AGE", &mut filters.min_age),
        ("VAULTS_MAX_AGE", &mut filters.max_age),
    ];
    for (var, slot) in bounds {
        if let Some(value) = env_parsed::<f64>(var)? {
            *slot = value;
        }
    }
    if let Some(include_closed) = env_bool("VAULTS_INCLUDE_CLOSED") {
        filters.include_closed = include_closed;
    }

    let sort = match env_string("VAULTS_SORT") {
        Some(raw) => SortOrder::parse(&raw).ok_or(ConfigError::InvalidValue {
            var: "VAULTS_SORT",
            value: raw,
        })?,
        None => SortOrder::default(),
    };

    Ok((filters, sort))
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub(crate) fn env_string(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

fn env_bool(var: &str) -> Option<bool> {
    env_string(var).and_then(|raw| parse_bool(&raw))
}

fn env_parsed<T: FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match env_string(var) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var, value: raw }),
        None => Ok(None),
    }
}
