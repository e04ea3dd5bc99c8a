//! # Gradewatch
//!
//! Polls institution backends for grade and schedule changes and pushes
//! notifications to configured channels.
//!
//! Usage:
//!   gradewatch run                     # Poll continuously (daemon)
//!   gradewatch once --force            # Single cycle for every target
//!   gradewatch plugins list            # Adapters available / installed
//!   gradewatch plugins install 10546   # Install an institution adapter
//!   gradewatch config init             # Write a starter config

mod cycle;
mod orchestrator;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use gradewatch_core::GradewatchConfig;

use crate::orchestrator::Orchestrator;

#[derive(Parser)]
#[command(
    name = "gradewatch",
    version,
    about = "🎓 Gradewatch — grade & schedule change notifier"
)]
struct Cli {
    /// Config file (default: ~/.gradewatch/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll continuously until ctrl-c
    Run,
    /// Run one cycle per target, then exit
    Once {
        /// Ask adapters to bypass their upstream caches
        #[arg(long)]
        force: bool,
    },
    /// Manage institution adapter plugins
    Plugins {
        #[command(subcommand)]
        command: PluginsCommand,
    },
    /// Inspect or initialize configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum PluginsCommand {
    /// Show available and installed adapters
    List,
    /// Download, verify, and install an adapter by school code
    Install { school_code: String },
    /// Update an adapter if the index carries a newer version
    Update { school_code: String },
    /// Remove an installed adapter
    Uninstall { school_code: String },
    /// Re-fetch the plugin index, bypassing the cache
    Refresh,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Write a default config file if none exists
    Init,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "gradewatch=debug"
    } else {
        "gradewatch=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => GradewatchConfig::load_from(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => GradewatchConfig::load().context("load config")?,
    };

    match cli.command {
        Command::Run => {
            let orchestrator = Orchestrator::new(config)?;
            orchestrator.run().await?;
        }
        Command::Once { force } => {
            let orchestrator = Orchestrator::new(config)?;
            let failures = orchestrator.run_once(force).await?;
            if failures > 0 {
                anyhow::bail!("{failures} target(s) failed");
            }
        }
        Command::Plugins { command } => run_plugins(command, config).await?,
        Command::Config { command } => run_config(command, cli.config)?,
    }
    Ok(())
}

async fn run_plugins(command: PluginsCommand, config: GradewatchConfig) -> Result<()> {
    let mut registry = gradewatch_plugins::PluginRegistry::new(&config.plugins)?;
    for adapter in gradewatch_plugins::builtin_adapters() {
        registry.register_builtin(adapter);
    }

    match command {
        PluginsCommand::List => {
            let builtins = registry.builtins();
            println!("Builtin adapters ({}):", builtins.len());
            for (code, name) in &builtins {
                println!("  {code}  {name}");
            }
            let installed = registry.installed();
            println!("\nInstalled adapters ({}):", installed.len());
            for (code, version) in &installed {
                println!("  {code}  {version}");
            }
            let available = registry.list_available().await;
            println!("\nAvailable adapters ({}):", available.len());
            for plugin in available {
                let marker = installed
                    .iter()
                    .any(|(code, _)| *code == plugin.school_code)
                    .then_some(" [installed]")
                    .unwrap_or("");
                println!(
                    "  {}  {}  {}{marker}",
                    plugin.school_code, plugin.school_name, plugin.plugin_version
                );
            }
        }
        PluginsCommand::Install { school_code } => {
            let descriptor = registry.install(&school_code).await?;
            println!(
                "✅ Installed {} ({}) version {}",
                descriptor.school_code, descriptor.school_name, descriptor.plugin_version
            );
        }
        PluginsCommand::Update { school_code } => {
            if registry.update_if_newer(&school_code).await? {
                println!("✅ {school_code} updated");
            } else {
                println!("{school_code} is already up to date");
            }
        }
        PluginsCommand::Uninstall { school_code } => {
            registry.uninstall(&school_code).await?;
            println!("✅ {school_code} uninstalled");
        }
        PluginsCommand::Refresh => {
            let count = registry.refresh_index().await?;
            println!("✅ Index refreshed: {count} adapters");
        }
    }
    Ok(())
}

fn run_config(command: ConfigCommand, config_path: Option<PathBuf>) -> Result<()> {
    let path = config_path.unwrap_or_else(GradewatchConfig::default_path);
    match command {
        ConfigCommand::Init => {
            if path.exists() {
                println!("Config already exists: {}", path.display());
            } else {
                GradewatchConfig::default().save_to(&path)?;
                println!("✅ Wrote default config: {}", path.display());
                println!("Edit it to add accounts and notification channels.");
            }
        }
        ConfigCommand::Path => println!("{}", path.display()),
    }
    Ok(())
}
