//! sdbot-server entry point.
//!
//! Startup order:
//! 1. Parse the command line and configuration from environment variables.
//! 2. Initialise structured tracing (JSON in production, pretty in dev).
//! 3. Run the selected command. `serve` wires the outbound clients, builds
//!    the Axum router and serves with graceful shutdown.

mod cli;
mod config;
mod error;
mod middleware;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sdbot_core::commands::CommandRegistrar;
use sdbot_core::discord::DiscordClient;
use sdbot_topology::ranges::IP_RANGES_URL;
use sdbot_topology::{NetworkTopology, instance_connect_cidr};
use tracing::{info, warn};

use crate::cli::{Cli, Command, TopologyArgs};
use crate::config::Config;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Command line + configuration ────────────────────────────────────────
    let cli = Cli::parse();
    let cfg = Config::from_env();

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    init_tracing(&cfg);

    // ── 3. Command ─────────────────────────────────────────────────────────────
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cfg).await,
        Command::RegisterCommands => register_commands(cfg).await,
        Command::Topology(args) => topology(args, &cfg).await,
    }
}

fn init_tracing(cfg: &Config) {
    // Warn loudly if the configured value is not a valid filter expression.
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: SDBOT_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                tracing_subscriber::EnvFilter::new("info")
            }
        },
    };

    // stdout is reserved for command output.
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true);

    if cfg.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

async fn serve(cfg: Config) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "sdbot-server starting");

    let addr: SocketAddr = cfg
        .bind_address
        .parse()
        .with_context(|| format!("invalid SDBOT_BIND '{}'", cfg.bind_address))?;
    let state = Arc::new(AppState::from_config(cfg)?);

    let app = routes::build(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("sdbot-server stopped");
    Ok(())
}

async fn register_commands(cfg: Config) -> anyhow::Result<()> {
    let token = cfg
        .bot_token
        .as_deref()
        .context("SDBOT_BOT_TOKEN must be set")?;
    let client = DiscordClient::new(&cfg.discord_api, token, cfg.http_timeout)?;

    let report = CommandRegistrar::new(client)
        .sync()
        .await
        .context("syncing slash commands")?;
    info!(
        application_id = %report.application_id,
        removed = report.removed.len(),
        registered = ?report.registered,
        "slash commands synced"
    );
    Ok(())
}

async fn topology(args: TopologyArgs, cfg: &Config) -> anyhow::Result<()> {
    let mut builder = NetworkTopology::builder(&args.name)
        .vpc_cidr(args.vpc_cidr)
        .availability_zone(&args.availability_zone)
        .isolated_subnets(args.isolated_subnets);

    if let Some(region) = args.region.as_deref() {
        let ranges = reqwest::Client::builder()
            .timeout(cfg.http_timeout)
            .build()?
            .get(IP_RANGES_URL)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
            .context("fetching AWS IP ranges")?;
        let cidr = instance_connect_cidr(&ranges, region)?;
        info!(%region, %cidr, "instance connect range resolved");
        builder = builder.instance_connect(cidr);
    }

    let topology = builder.build()?;
    if args.user_data {
        print!("{}", topology.nat_instance.user_data);
    } else {
        info!(
            image = %topology.nat_instance.image,
            subnets = topology.subnets.len(),
            "topology built"
        );
        println!("{}", topology.to_json()?);
    }
    Ok(())
}

/// Returns a future that resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}
