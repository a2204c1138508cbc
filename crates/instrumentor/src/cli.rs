//! Exposes the command line application.
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use instrumentor_service::config::Config;
use instrumentor_service::metrics;

use crate::healthcheck;
use crate::logging;
use crate::server;

/// Instrumentor commands.
#[derive(Subcommand)]
enum Command {
    /// Run the web server.
    Run,

    /// Check whether a running instrumentor is healthy.
    Healthcheck {
        /// The address of the instrumentor. Defaults to the `bind` address of the config.
        #[arg(long)]
        addr: Option<SocketAddr>,

        /// Request timeout in seconds.
        #[arg(long, default_value_t = 5)]
        timeout: u64,
    },
}

/// Command line interface parser.
#[derive(Parser)]
#[command(bin_name = "instrumentor", version)]
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

    // SAFETY: we are still single-threaded, the runtimes are only started by the commands.
    unsafe { logging::init_logging(&config) };

    if let Some(ref statsd) = config.metrics.statsd {
        let mut tags = config.metrics.custom_tags.clone();

        if let Some(hostname_tag) = config.metrics.hostname_tag.clone() {
            if tags.contains_key(&hostname_tag) {
                tracing::warn!(
                    "tag {} defined both as hostname tag and as a custom tag",
                    hostname_tag
                );
            }
            if let Some(hostname) = hostname::get().ok().and_then(|s| s.into_string().ok()) {
                tags.insert(hostname_tag, hostname);
            } else {
                tracing::error!("could not read host name");
            }
        };
        if let Some(environment_tag) = config.metrics.environment_tag.clone() {
            if tags.contains_key(&environment_tag) {
                tracing::warn!(
                    "tag {} defined both as environment tag and as a custom tag",
                    environment_tag
                );
            }
            if let Some(environment) = sentry.options().environment.as_ref() {
                tags.insert(environment_tag, environment.to_string());
            } else {
                tracing::error!("environment tag requested but sentry has no environment");
            }
        };

        metrics::configure_statsd(&config.metrics.prefix, statsd, tags)
            .context("failed to set up statsd")?;
    }

    match cli.command {
        Command::Run => server::run(config).context("failed to start the server")?,
        Command::Healthcheck { addr, timeout } => {
            healthcheck::healthcheck(&config, addr, timeout)?
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_healthcheck_args() {
        let cli = Cli::try_parse_from([
            "instrumentor",
            "-c",
            "config.yml",
            "healthcheck",
            "--addr",
            "127.0.0.1:9001",
        ])
        .unwrap();

        assert_eq!(cli.config(), Some(Path::new("config.yml")));
        match cli.command {
            Command::Healthcheck { addr, timeout } => {
                assert_eq!(addr, Some("127.0.0.1:9001".parse().unwrap()));
                assert_eq!(timeout, 5);
            }
            Command::Run => panic!("expected the healthcheck command"),
        }
    }
}
