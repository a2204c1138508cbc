use std::net::SocketAddr;

use anyhow::{Context, Result};
use instrumentor_service::config::Config;
use instrumentor_service::metric;
use instrumentor_service::services::SharedServices;

use crate::endpoints;

/// Creates the shared services and serves HTTP based on the loaded config.
pub fn run(config: Config) -> Result<()> {
    // Log this metric before actually starting the server. This allows to see restarts even if
    // service creation fails.
    metric!(counter("server.starting") += 1);

    let megs = 1024 * 1024;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("instrumentor-web")
        .enable_all()
        .thread_stack_size(8 * megs)
        .build()?;

    let socket = config
        .bind
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid bind address {}", config.bind))?;

    runtime.block_on(async {
        let services = SharedServices::create(config).context("failed to create services")?;

        tracing::info!("Starting HTTP server on {}", socket);
        axum_server::bind(socket)
            .serve(endpoints::create_app(services).into_make_service())
            .await
            .context("HTTP server failed")
    })?;

    tracing::info!("System shutdown complete");
    Ok(())
}
