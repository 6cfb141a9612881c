//! Courier CLI
//!
//! Command-line interface for submitting control requests to a running
//! Courier dispatcher.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{handle_command, Commands};
use config::Config;

#[derive(Parser)]
#[command(name = "courier")]
#[command(about = "Courier control dispatcher CLI", long_about = None)]
struct Cli {
    /// Dispatcher URL
    #[arg(
        long,
        env = "COURIER_DISPATCHER_URL",
        default_value = "http://localhost:8084"
    )]
    dispatcher_url: String,

    /// Bearer token presented on dispatch calls
    #[arg(long, env = "COURIER_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        dispatcher_url: cli.dispatcher_url,
        token: cli.token,
    };

    handle_command(cli.command, &config).await
}
