//! Service bootstrap

use std::time::Duration;

use anyhow::Context;
use envoy_types::ext_authz::v3::pb::AuthorizationServer;
use pipeline_core::Catalog;
use tracing::info;

use crate::config::Config;
use crate::service::AuthService;
use crate::state_manager::{ConfigSource, StateManager};

const BACKEND_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn run(config: Config) -> anyhow::Result<()> {
    // one pooled client shared by every evaluator backend
    let client = reqwest::Client::builder()
        .timeout(BACKEND_HTTP_TIMEOUT)
        .build()
        .context("building http client")?;

    let catalog = Catalog::new();
    let state_manager = StateManager::new(
        catalog.clone(),
        client,
        ConfigSource::File(config.catalog_path.clone()),
    );
    state_manager.run().await.context("loading catalog")?;

    let service = AuthService::new(catalog.clone(), config.request_timeout);
    info!(
        addr = %config.listen_addr,
        hosts = catalog.len(),
        timeout_ms = config.request_timeout.as_millis() as u64,
        "starting external authorization server"
    );

    tonic::transport::Server::builder()
        .add_service(AuthorizationServer::new(service))
        .serve_with_shutdown(config.listen_addr, shutdown_signal())
        .await
        .context("grpc server")?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received, draining");
}
