use std::net::SocketAddr;

use anyhow::{Context, Result};
use bookcache_service::config::Config;
use bookcache_service::metric;
use bookcache_service::services::SearchService;

use crate::endpoints;

/// Creates the search service and runs the HTTP server until it shuts down.
pub fn run(config: Config) -> Result<()> {
    // Log this metric before actually starting the server. This allows to see restarts even if
    // service creation fails.
    metric!(counter("server.starting") += 1);

    let megs = 1024 * 1024;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("bookcache-web")
        .enable_all()
        .thread_stack_size(8 * megs)
        .build()?;

    let service = runtime
        .block_on(SearchService::create(&config))
        .context("failed to create search service")?;

    let socket = config
        .bind
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid bind address: {}", config.bind))?;
    tracing::info!("Starting HTTP server on {}", socket);

    runtime.block_on(
        axum_server::bind(socket).serve(endpoints::create_app(service).into_make_service()),
    )?;
    tracing::info!("System shutdown complete");

    Ok(())
}
