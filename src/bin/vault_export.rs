use chrono::Utc;
use tracing::info;
use vault_explorer::{
    apply_filters, fetch_config_from_env, fetch_vaults, filters_from_env, init_logging,
    log_app_start, log_fetch_report, logging_config_from_env, normalize_vaults, sort_rows,
    write_rows_csv,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_app_start("vault_export", &logging_cfg);

    let fetch_cfg = fetch_config_from_env()?;
    let (filters, sort) = filters_from_env()?;

    let report = fetch_vaults(&fetch_cfg);
    log_fetch_report("vault_export", &report);
    if let Some(message) = &report.error {
        eprintln!("{message}");
    }

    let rows = normalize_vaults(&report.records, Utc::now().timestamp_millis());
    let total = rows.len();
    let mut rows = apply_filters(rows, &filters);
    sort_rows(&mut rows, sort);

    write_rows_csv(&rows, std::io::stdout().lock())?;
    info!(
        component = "vault_export",
        event = "export.finish",
        feed = report.feed.map(|feed| feed.as_str()).unwrap_or("none"),
        total_rows = total,
        exported_rows = rows.len(),
        sort = sort.as_str()
    );

    Ok(())
}
