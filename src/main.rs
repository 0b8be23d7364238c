#![warn(clippy::all)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

use anyhow::Result;
use clap::{Parser, Subcommand};
use employee_auth::auth::AuthEngine;
use employee_auth::config::Config;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Employee identity and session service.
#[derive(Parser, Debug)]
#[command(name = "employee-auth")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to ./employee-auth.toml when present)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP gateway
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Delete expired sessions once and exit
    Sweep,

    /// Validate configuration and exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "employee_auth=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            serve(config).await
        }
        Commands::Sweep => {
            let (engine, _) = employee_auth::build_engine(&config)?;
            let removed = engine.sweep_expired_sessions().await?;
            println!("Removed {removed} expired session(s)");
            Ok(())
        }
        Commands::CheckConfig => {
            println!("Configuration OK: {config:#?}");
            Ok(())
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    let (engine, _) = employee_auth::build_engine(&config)?;

    let sweeper = (config.auth.sweep_interval_secs > 0).then(|| {
        tokio::spawn(sweep_loop(
            engine.clone(),
            Duration::from_secs(config.auth.sweep_interval_secs),
        ))
    });

    let result = employee_auth::gateway::run_gateway(&config, engine, shutdown_signal()).await;

    if let Some(handle) = sweeper {
        handle.abort();
    }
    result
}

async fn sweep_loop(engine: Arc<AuthEngine>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        match engine.sweep_expired_sessions().await {
            Ok(0) => {}
            Ok(removed) => tracing::info!(removed, "Swept expired sessions"),
            Err(e) => tracing::warn!("Session sweep failed: {e}"),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_accepts_bind_overrides() {
        let cli = Cli::try_parse_from(["employee-auth", "serve", "--host", "0.0.0.0", "-p", "9000"])
            .unwrap();
        match cli.command {
            Commands::Serve { host, port } => {
                assert_eq!(host.as_deref(), Some("0.0.0.0"));
                assert_eq!(port, Some(9000));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["employee-auth", "sweep", "--config", "auth.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("auth.toml")));
        assert!(matches!(cli.command, Commands::Sweep));
    }
}
