//! Exposes the command line application.
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bookcache_service::config::Config;
use bookcache_service::metrics;
use clap::{Parser, Subcommand};

use crate::healthcheck;
use crate::logging;
use crate::server;

/// Bookcache commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Run the web server.
    Run,

    /// Check whether a running server is healthy.
    Healthcheck {
        /// Address of the server to check. Defaults to `bind` of the configuration.
        #[arg(long)]
        addr: Option<SocketAddr>,

        /// Request timeout in seconds.
        #[arg(long, default_value_t = 5)]
        timeout: u64,
    },
}

/// A caching proxy for book searches.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Path to your configuration file.
    #[arg(long = "config", short = 'c', global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    /// Returns the path to the configuration file.
    fn config(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}

/// Runs the main application.
pub fn execute() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::get(cli.config()).context("failed loading config")?;

    let sentry = sentry::init(sentry::ClientOptions {
        dsn: config.sentry_dsn.clone(),
        release: sentry::release_name!(),
        session_mode: sentry::SessionMode::Request,
        auto_session_tracking: false,
        ..Default::default()
    });

    // SAFETY: Called before the runtime and its worker threads are started.
    unsafe { logging::init_logging(&config) };

    if let Some(ref statsd) = config.metrics.statsd {
        let hostname = config.metrics.hostname_tag.clone().and_then(|tag| {
            hostname::get()
                .ok()
                .and_then(|s| s.into_string().ok())
                .map(|name| (tag, name))
        });
        let environment = config.metrics.environment_tag.clone().and_then(|tag| {
            sentry
                .options()
                .environment
                .as_ref()
                .map(|name| (tag, name.to_string()))
        });
        let mut tags = config.metrics.custom_tags.clone();
        tags.extend(hostname);
        tags.extend(environment);
        metrics::configure_statsd(&config.metrics.prefix, statsd.as_str(), tags)
            .context("failed to configure metrics")?;
    }

    match cli.command {
        Command::Run => server::run(config).context("failed to start the server")?,
        Command::Healthcheck { addr, timeout } => {
            healthcheck::healthcheck(&config, addr, timeout)?
        }
    }

    Ok(())
}
