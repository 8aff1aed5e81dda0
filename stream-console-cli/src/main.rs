//! CLI entry point for stream-console

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use stream_console_core::config::{validate_config, Config, ConfigLoader};
use stream_console_core::logging::init_logging;
use stream_console_server::Console;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "stream-console")]
#[command(about = "Operator console for a live stream's backend modules")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration directory
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing configuration
        #[arg(short, long)]
        force: bool,
    },
    /// Run the console server
    Serve {
        /// Listen on this port instead of the configured one
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print the effective configuration as JSON
    Config,
    /// Show configuration summary
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loader = if let Some(dir) = cli.config_dir {
        ConfigLoader::with_dir(dir)
    } else {
        ConfigLoader::new()
    };

    match cli.command {
        Commands::Init { force } => run_init(&loader, force),
        Commands::Serve { port } => run_serve(&loader, port).await,
        Commands::Config => run_config(&loader),
        Commands::Status => run_status(&loader),
    }
}

fn run_init(loader: &ConfigLoader, force: bool) -> Result<()> {
    let config_path = loader.config_path();
    if config_path.exists() && !force {
        println!(
            "{} Configuration already exists at {}",
            style("✗").red(),
            config_path.display()
        );
        println!("Use {} to overwrite it.", style("--force").cyan());
        return Ok(());
    }

    loader.save(&Config::default())?;

    println!(
        "{} Configuration saved to {}",
        style("✓").green().bold(),
        config_path.display()
    );
    println!("\nYou can now run:");
    println!("  {} - Start the console", style("stream-console serve").cyan());
    Ok(())
}

async fn run_serve(loader: &ConfigLoader, port: Option<u16>) -> Result<()> {
    let mut config = loader.load()?;
    if let Some(port) = port {
        config.server.port = port;
        validate_config(&config)?;
    }
    let _log_guard = init_logging(&config.logging);

    println!("{}", style("Starting stream console...").bold().cyan());
    println!(
        "Console page: http://{}:{}/",
        config.server.host, config.server.port
    );

    let console = Console::bind(config).await?;
    let cancel = CancellationToken::new();

    let signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => println!("\n{}", style("Shutting down...").yellow()),
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
        signal.cancel();
    });

    println!(
        "{}",
        style("Console is running. Press Ctrl+C to stop.").green()
    );
    info!("Console started");
    console.run(cancel).await?;

    println!("{}", style("Console stopped.").green());
    Ok(())
}

fn run_config(loader: &ConfigLoader) -> Result<()> {
    let config = loader.load()?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn run_status(loader: &ConfigLoader) -> Result<()> {
    let config = loader.load()?;

    println!("{}", style("Stream Console Status").bold().cyan());
    println!("Version: {}\n", env!("CARGO_PKG_VERSION"));

    println!("{}", style("Configuration:").bold());
    println!("  Config file: {}", loader.config_path().display());
    println!(
        "  Listen address: {}:{}",
        config.server.host, config.server.port
    );
    println!(
        "  Allowed origins: {}",
        config.server.allowed_origins.join(", ")
    );
    println!("  Backlog replay: {:?}", config.console.replay);
    println!("  Default command target: {}", config.router.default_target);
    println!();

    println!("{}", style("Modules:").bold());
    let chat = &config.modules.chat_integration;
    let state = if chat.enabled {
        style("enabled").green()
    } else {
        style("disabled").dim()
    };
    println!("  chat_integration: {} (#{})", state, chat.channel);

    Ok(())
}
