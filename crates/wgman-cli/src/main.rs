//! `wgman` binary entrypoint.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use wgman_cli::{
    Cli, Commands, InterfaceCommand, OutputFormat, PeerCommand, SyncCommand, WgmanConfig,
    DEFAULT_CONFIG_PATH,
};
use wgman_core::{JsonStore, WgManager};
use wgman_wireguard::WgTool;

/// Log filter used when `RUST_LOG` is not set.
const DEFAULT_LOG_FILTER: &str = "wgman=info,wgman_cli=info,wgman_core=info,wgman_wireguard=info";

fn main() -> ExitCode {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let explicit = cli.config.is_some();
    let config_path = cli
        .config
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let format = OutputFormat::new(cli.format);
    let mut stdout = io::stdout().lock();

    if let Commands::InitConfig { force } = cli.command {
        if config_path.exists() && !force {
            bail!(
                "{} already exists, pass --force to overwrite",
                config_path.display()
            );
        }
        WgmanConfig::default().save(&config_path)?;
        let msg = wgman_cli::output::Message::success(format!(
            "Wrote {}",
            config_path.display()
        ));
        format.write(&mut stdout, &msg)?;
        return Ok(());
    }

    let config = if explicit {
        WgmanConfig::from_file(&config_path)?
    } else {
        WgmanConfig::load_or_default(&config_path)?
    };
    let store = JsonStore::open(&config.state_dir).with_context(|| {
        format!("failed to open state in {}", config.state_dir.display())
    })?;
    let manager = WgManager::new(
        WgTool::new(config.tool_config()),
        store,
        config.manager_config(),
    );

    match &cli.command {
        Commands::Interface { command } => {
            InterfaceCommand::new(&manager)
                .execute(&mut stdout, &format, command)
                .await?;
        }
        Commands::Peer { command } => {
            PeerCommand::new(&manager)
                .execute(&mut stdout, &format, command)
                .await?;
        }
        Commands::Sync => SyncCommand::new(&manager).execute(&mut stdout, &format).await?,
        Commands::InitConfig { .. } => {}
    }

    Ok(())
}
