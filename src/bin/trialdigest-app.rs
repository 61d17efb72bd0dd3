use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;

use trialdigest::app::{AppState, router};
use trialdigest::config::AppConfig;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct AppArgs {
    #[arg(long, default_value = "127.0.0.1:5000")]
    addr: SocketAddr,

    /// YAML config file (falls back to $TRIALDIGEST_CONFIG, then defaults).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    trialdigest::logging::init_with(trialdigest::logging::SERVER_DIRECTIVE)?;

    let args = AppArgs::parse();
    tracing::info!(?args, "starting trialdigest-app");

    let config = AppConfig::resolve(args.config.as_deref()).context("load config")?;
    let guard = config.allow_list();
    tracing::info!(
        base_path = %config.base_path.display(),
        allowed = ?guard.prefixes().collect::<Vec<_>>(),
        provider = %config.provider,
        model = %config.model,
        "configuration loaded"
    );

    let app = router(AppState::from_config(&config));

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {}: {err}", args.addr))?;
    tracing::info!(addr = %args.addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "install ctrl-c handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
