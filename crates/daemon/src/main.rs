//! Deckshell
//!
//! Multiplexes shell sessions over pseudo-terminals from a single console.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use daemon::config::{default_config_path, Config};
use daemon::logging;
use daemon::orchestrator::ShellOrchestrator;
use daemon::ui::{sink, Viewport};
use tokio::io::BufReader;

/// Deckshell - tabbed shell sessions in one terminal.
#[derive(Parser, Debug)]
#[command(name = "deckshell")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start a console with one shell session
    Run,

    /// Inspect or create the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Subcommands for configuration management.
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Print the configuration file path
    Path,

    /// Print the effective configuration
    Show,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = Config::load(&config_path)?;
    config.apply_env_overrides();

    match cli.command {
        Commands::Run => run(config, cli.verbose).await,
        Commands::Config(cmd) => config_command(cmd, &config_path, &config),
    }
}

async fn run(config: Config, verbose: bool) -> anyhow::Result<()> {
    config.validate()?;
    let _log_guard = logging::init(&config.log, verbose)?;

    tracing::info!(shell = %config.shell.program, "Deckshell starting...");

    let viewport = if std::io::stdout().is_terminal() {
        Viewport::Terminal
    } else {
        Viewport::Fixed(config.shell.initial_size())
    };

    let orchestrator = ShellOrchestrator::new(config, sink(std::io::stdout()), viewport);

    let token = orchestrator.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl-C");
            token.cancel();
        }
    });

    let reason = orchestrator.run(BufReader::new(tokio::io::stdin())).await?;
    tracing::info!(?reason, "Deckshell exiting");
    Ok(())
}

fn config_command(cmd: ConfigCommands, path: &Path, config: &Config) -> anyhow::Result<()> {
    match cmd {
        ConfigCommands::Path => println!("{}", path.display()),
        ConfigCommands::Show => print!("{}", config.to_toml()?),
        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "Config file already exists: {} (use --force to overwrite)",
                    path.display()
                );
            }
            Config::default().save(path)?;
            println!("Wrote default configuration to {}", path.display());
        }
    }
    Ok(())
}
