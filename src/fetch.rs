//! Vault list retrieval: bulk snapshot first, recent-vaults query as fallback.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::normalize::{has_apr_candidate, json_kind, lookup, VaultRecord};
use crate::payload::{decode_json_payload, PayloadEncoding, PayloadError};

pub const SNAPSHOT_URL: &str = "https://stats-data.hyperliquid.xyz/Mainnet/vaults";
pub const INFO_URL: &str = "https://api.hyperliquid.xyz/info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    pub snapshot_url: String,
    pub info_url: String,
    pub snapshot_timeout_ms: u64,
    pub info_timeout_ms: u64,
    pub enrich_details: bool,
    pub detail_delay_ms: u64,
    pub max_detail_requests: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            snapshot_url: SNAPSHOT_URL.to_string(),
            info_url: INFO_URL.to_string(),
            snapshot_timeout_ms: 30_000,
            info_timeout_ms: 15_000,
            enrich_details: false,
            detail_delay_ms: 250,
            max_detail_requests: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VaultFeed {
    Snapshot,
    RecentSummaries,
}

impl VaultFeed {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::RecentSummaries => "recent_summaries",
        }
    }
}

/// Outcome of one fetch pass. `error` is set only when every source failed,
/// in which case `records` is empty and `feed` is `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchReport {
    pub records: Vec<Value>,
    pub feed: Option<VaultFeed>,
    pub error: Option<String>,
}

impl FetchReport {
    pub fn from_feed(feed: VaultFeed, records: Vec<Value>) -> Self {
        Self {
            records,
            feed: Some(feed),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            records: Vec::new(),
            feed: None,
            error: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP client build error: {0}")]
    HttpClientBuild(String),
    #[error("HTTP request failed for {url}: {message}")]
    HttpRequest { url: String, message: String },
    #[error("unexpected HTTP status {status} from {url}")]
    HttpStatus { url: String, status: u16 },
    #[error("undecodable payload from {url}: {source}")]
    Payload {
        url: String,
        #[source]
        source: PayloadError,
    },
    #[error("expected JSON {expected} from {url}, got {found}")]
    UnexpectedShape {
        url: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("snapshot from {url} contained no vaults")]
    EmptySnapshot { url: String },
    #[error("invalid vault address: {0}")]
    InvalidAddress(String),
}

pub trait HttpFetcher: Send + Sync {
    fn get_bytes(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError>;
    fn post_json(&self, url: &str, body: &Value, timeout: Duration) -> Result<Vec<u8>, FetchError>;
}

pub struct ReqwestBlockingFetcher {
    client: reqwest::blocking::Client,
}

impl ReqwestBlockingFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|err| FetchError::HttpClientBuild(err.to_string()))?;
        Ok(Self { client })
    }

    fn read_body(
        url: &str,
        response: Result<reqwest::blocking::Response, reqwest::Error>,
    ) -> Result<Vec<u8>, FetchError> {
        let response = response.map_err(|err| FetchError::HttpRequest {
            url: url.to_string(),
            message: err.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .bytes()
            .map(|bytes| bytes.to_vec())
            .map_err(|err| FetchError::HttpRequest {
                url: url.to_string(),
                message: err.to_string(),
            })
    }
}

impl HttpFetcher for ReqwestBlockingFetcher {
    fn get_bytes(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError> {
        Self::read_body(url, self.client.get(url).timeout(timeout).send())
    }

    fn post_json(
        &self,
        url: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .timeout(timeout)
            .send();
        Self::read_body(url, response)
    }
}

pub fn fetch_vaults(cfg: &FetchConfig) -> FetchReport {
    match ReqwestBlockingFetcher::new() {
        Ok(fetcher) => fetch_vaults_with_fetcher(cfg, &fetcher),
        Err(err) => {
            error!(
                component = "fetch",
                event = "fetch.client.error",
                error = %err
            );
            FetchReport::failed(err.to_string())
        }
    }
}

pub fn fetch_vaults_with_fetcher(cfg: &FetchConfig, fetcher: &dyn HttpFetcher) -> FetchReport {
    let mut report = fetch_with_fallback(cfg, fetcher);
    if cfg.enrich_details && report.is_success() {
        enrich_with_details(&mut report.records, fetcher, cfg);
    }
    report
}

fn fetch_with_fallback(cfg: &FetchConfig, fetcher: &dyn HttpFetcher) -> FetchReport {
    match fetch_snapshot(fetcher, cfg) {
        Ok(records) => {
            info!(
                component = "fetch",
                event = "fetch.snapshot.ok",
                records = records.len()
            );
            return FetchReport::from_feed(VaultFeed::Snapshot, records);
        }
        Err(err) => warn!(
            component = "fetch",
            event = "fetch.snapshot.error",
            url = %cfg.snapshot_url,
            error = %err
        ),
    }

    info!(
        component = "fetch",
        event = "fetch.fallback",
        url = %cfg.info_url
    );

    match fetch_recent_summaries(fetcher, cfg) {
        Ok(records) => {
            info!(
                component = "fetch",
                event = "fetch.recent_summaries.ok",
                records = records.len()
            );
            FetchReport::from_feed(VaultFeed::RecentSummaries, records)
        }
        Err(err) => {
            error!(
                component = "fetch",
                event = "fetch.failed",
                error = %err
            );
            FetchReport::failed(format!(
                "failed to fetch vault summaries from both endpoints: {err}"
            ))
        }
    }
}

pub fn fetch_snapshot(
    fetcher: &dyn HttpFetcher,
    cfg: &FetchConfig,
) -> Result<Vec<Value>, FetchError> {
    let url = cfg.snapshot_url.as_str();
    let bytes = fetcher.get_bytes(url, Duration::from_millis(cfg.snapshot_timeout_ms))?;
    let (encoding, value) = decode(url, &bytes)?;
    debug!(
        component = "fetch",
        event = "fetch.snapshot.decoded",
        encoding = encoding.as_str(),
        bytes = bytes.len()
    );

    match value {
        Value::Array(items) if items.is_empty() => Err(FetchError::EmptySnapshot {
            url: url.to_string(),
        }),
        Value::Array(items) => Ok(items),
        other => Err(unexpected_shape(url, "array", &other)),
    }
}

pub fn fetch_recent_summaries(
    fetcher: &dyn HttpFetcher,
    cfg: &FetchConfig,
) -> Result<Vec<Value>, FetchError> {
    let url = cfg.info_url.as_str();
    let body = json!({ "type": "vaultSummaries" });
    let bytes = fetcher.post_json(url, &body, Duration::from_millis(cfg.info_timeout_ms))?;

    match decode(url, &bytes)?.1 {
        Value::Array(items) => Ok(items),
        other => Err(unexpected_shape(url, "array", &other)),
    }
}

pub fn fetch_vault_details(
    fetcher: &dyn HttpFetcher,
    cfg: &FetchConfig,
    vault_address: &str,
) -> Result<VaultRecord, FetchError> {
    let url = cfg.info_url.as_str();
    let address = normalize_vault_address(vault_address)?;
    let body = json!({ "type": "vaultDetails", "vaultAddress": address });
    let bytes = fetcher.post_json(url, &body, Duration::from_millis(cfg.info_timeout_ms))?;

    match decode(url, &bytes)?.1 {
        Value::Object(details) => Ok(details),
        other => Err(unexpected_shape(url, "object", &other)),
    }
}

pub fn enrich_with_details(
    records: &mut [Value],
    fetcher: &dyn HttpFetcher,
    cfg: &FetchConfig,
) -> usize {
    let mut requests = 0usize;
    let mut enriched = 0usize;

    for record in records.iter_mut().filter_map(Value::as_object_mut) {
        if has_apr_candidate(record) {
            continue;
        }
        let Some(raw_address) = lookup(record, "vaultAddress").and_then(Value::as_str) else {
            continue;
        };
        let address = match normalize_vault_address(raw_address) {
            Ok(address) => address,
            Err(err) => {
                warn!(
                    component = "fetch",
                    event = "fetch.details.skipped",
                    vault_address = raw_address,
                    error = %err
                );
                continue;
            }
        };

        if requests >= cfg.max_detail_requests {
            info!(
                component = "fetch",
                event = "fetch.details.capped",
                max_detail_requests = cfg.max_detail_requests
            );
            break;
        }
        if requests > 0 && cfg.detail_delay_ms > 0 {
            std::thread::sleep(Duration::from_millis(cfg.detail_delay_ms));
        }
        requests += 1;

        match fetch_vault_details(fetcher, cfg, &address) {
            Ok(details) => {
                if let Some(apr) = details.get("apr").filter(|value| !value.is_null()) {
                    record.insert("apr".to_string(), apr.clone());
                    enriched += 1;
                }
            }
            Err(err) => warn!(
                component = "fetch",
                event = "fetch.details.skipped",
                vault_address = %address,
                error = %err
            ),
        }
    }

    info!(
        component = "fetch",
        event = "fetch.details.finish",
        requests,
        enriched
    );
    enriched
}

pub fn normalize_vault_address(raw: &str) -> Result<String, FetchError> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| FetchError::InvalidAddress(raw.to_string()))?;

    if digits.len() != 40 || hex::decode(digits).is_err() {
        return Err(FetchError::InvalidAddress(raw.to_string()));
    }

    Ok(format!("0x{}", digits.to_ascii_lowercase()))
}

fn decode(url: &str, bytes: &[u8]) -> Result<(PayloadEncoding, Value), FetchError> {
    decode_json_payload(bytes).map_err(|source| FetchError::Payload {
        url: url.to_string(),
        source,
    })
}

fn unexpected_shape(url: &str, expected: &'static str, found: &Value) -> FetchError {
    FetchError::UnexpectedShape {
        url: url.to_string(),
        expected,
        found: json_kind(found),
    }
}
