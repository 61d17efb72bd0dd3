use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

use trialdigest::cli::{Cli, Command};
use trialdigest::config::AppConfig;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    trialdigest::logging::init().context("init logging")?;

    let cli = Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    let config = || AppConfig::resolve(cli.config.as_deref()).context("load config");
    match cli.command {
        Command::Folders(args) => {
            trialdigest::cli::folders(&config()?, args)
                .await
                .context("folders")?;
        }
        Command::Extract(args) => {
            trialdigest::cli::extract(&config()?, args)
                .await
                .context("extract")?;
        }
        Command::ExtractFile(args) => {
            trialdigest::cli::extract_file(&config()?, args)
                .await
                .context("extract-file")?;
        }
        Command::Summarize(args) => {
            trialdigest::cli::summarize(&config()?, args)
                .await
                .context("summarize")?;
        }
        Command::Render(args) => {
            trialdigest::cli::render(args).context("render")?;
        }
    }

    Ok(())
}
