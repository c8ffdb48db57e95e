use std::sync::Arc;

use vault_explorer::{
    dashboard_router, fetch_config_from_env, init_logging, log_app_bind, log_app_start,
    log_source_selected, logging_config_from_env, server_config_from_env, DashboardSnapshotSource,
    InMemoryVaultSource, LiveVaultSource, ServerConfig,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_app_start("dashboard_server", &logging_cfg);

    let server_cfg = server_config_from_env()?;
    let source = source_from_config(&server_cfg)?;
    let app = dashboard_router(source);
    let listener = tokio::net::TcpListener::bind(server_cfg.bind_addr).await?;
    let bound_addr = listener.local_addr()?;

    log_app_bind(bound_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn source_from_config(
    server_cfg: &ServerConfig,
) -> Result<Arc<dyn DashboardSnapshotSource>, Box<dyn std::error::Error>> {
    log_source_selected(server_cfg);
    if server_cfg.use_demo {
        return Ok(Arc::new(InMemoryVaultSource::demo()));
    }

    let fetch_cfg = fetch_config_from_env()?;
    Ok(Arc::new(LiveVaultSource::new(fetch_cfg, server_cfg.cache_ttl)))
}
