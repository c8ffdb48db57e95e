use std::io;
use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use tower::util::ServiceExt;
use tracing::dispatcher::with_default;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriter;
use vault_explorer::{
    dashboard_router, demo_snapshot, fetch_vaults_with_fetcher, log_app_bind, log_app_start,
    log_fetch_report, log_source_selected, normalize_vaults, FetchConfig, FetchError, FetchReport,
    HttpFetcher, InMemoryVaultSource, LoggingConfig, ServerConfig, VaultFeed,
};

#[derive(Clone, Default)]
struct SharedWriter {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedWriter {
    fn output_string(&self) -> String {
        let bytes = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        String::from_utf8_lossy(&bytes).to_string()
    }
}

struct SharedWriterGuard {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedWriterGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        out.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture_logs(max_level: Level, f: impl FnOnce()) -> String {
    let writer = SharedWriter::default();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_ansi(false)
        .with_max_level(max_level)
        .with_writer(writer.clone())
        .finish();
    let dispatch = tracing::Dispatch::new(subscriber);

    with_default(&dispatch, f);
    writer.output_string()
}

/// Every request fails with the given status.
struct DownFetcher(u16);

impl HttpFetcher for DownFetcher {
    fn get_bytes(&self, url: &str, _timeout: Duration) -> Result<Vec<u8>, FetchError> {
        Err(FetchError::HttpStatus {
            url: url.to_string(),
            status: self.0,
        })
    }

    fn post_json(&self, url: &str, _body: &Value, _timeout: Duration) -> Result<Vec<u8>, FetchError> {
        Err(FetchError::HttpStatus {
            url: url.to_string(),
            status: self.0,
        })
    }
}

#[test]
fn fetch_logs_fallback_and_total_failure() {
    let logs = capture_logs(Level::INFO, || {
        let report = fetch_vaults_with_fetcher(&FetchConfig::default(), &DownFetcher(502));

        assert!(report.records.is_empty());
        assert!(report
            .error
            .as_deref()
            .is_some_and(|message| message.contains("both endpoints")));
    });

    assert!(logs.contains("\"event\":\"fetch.snapshot.error\""));
    assert!(logs.contains("\"event\":\"fetch.fallback\""));
    assert!(logs.contains("\"event\":\"fetch.failed\""));
}

#[test]
fn fetch_reports_log_feed_and_error() {
    let logs = capture_logs(Level::INFO, || {
        log_fetch_report(
            "vault_export",
            &FetchReport::from_feed(VaultFeed::RecentSummaries, vec![json!({"name": "A"})]),
        );
        log_fetch_report("dashboard", &FetchReport::failed("both endpoints down"));
    });

    assert!(logs.contains("\"event\":\"fetch.report\""));
    assert!(logs.contains("\"feed\":\"recent_summaries\""));
    assert!(logs.contains("\"records\":1"));
    assert!(logs.contains("\"feed\":\"none\""));
    assert!(logs.contains("both endpoints down"));
}

#[test]
fn normalize_logs_skipped_records() {
    let logs = capture_logs(Level::WARN, || {
        let rows = normalize_vaults(&[json!({"name": "ok"}), json!("not a record")], 0);
        assert_eq!(rows.len(), 1);
    });

    assert!(logs.contains("\"event\":\"normalize.record.skipped\""));
    assert!(logs.contains("\"index\":1"));
}

#[test]
fn server_lifecycle_helpers_emit_baseline_events() {
    let logs = capture_logs(Level::INFO, || {
        let cfg = LoggingConfig::default();
        log_app_start("dashboard_server", &cfg);
        log_source_selected(&ServerConfig {
            use_demo: true,
            ..ServerConfig::default()
        });
        log_source_selected(&ServerConfig::default());
        log_app_bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080));
    });

    assert!(logs.contains("\"event\":\"app.start\""));
    assert!(logs.contains("\"component\":\"dashboard_server\""));
    assert!(logs.contains("\"event\":\"source.selected\""));
    assert!(logs.contains("\"source\":\"demo\""));
    assert!(logs.contains("\"reason\":\"VAULTS_DASHBOARD_USE_DEMO\""));
    assert!(logs.contains("\"source\":\"live\""));
    assert!(logs.contains("\"cache_ttl_secs\":300"));
    assert!(logs.contains("\"event\":\"app.bind\""));
}

#[test]
fn snapshot_route_emits_http_snapshot_event() {
    let logs = capture_logs(Level::INFO, || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("single-thread runtime should build");

        rt.block_on(async {
            let source = Arc::new(InMemoryVaultSource::new(demo_snapshot()));
            let app = dashboard_router(source);

            let response = app
                .oneshot(
                    Request::builder()
                        .uri("/dashboard/snapshot")
                        .body(Body::empty())
                        .expect("request should build"),
                )
                .await
                .expect("snapshot request should succeed");

            assert_eq!(response.status(), StatusCode::OK);
        });
    });

    assert!(logs.contains("\"event\":\"http.snapshot.request\""));
}
