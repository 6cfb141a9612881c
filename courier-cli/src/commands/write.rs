//! Write subcommand

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use courier_core::dto::dispatch::WriteRequest;

use crate::commands::parse_pairs;
use crate::config::Config;

#[derive(Args)]
pub struct WriteArgs {
    /// Destination type: service, asset, script or broadcast
    #[arg(long, default_value = "service")]
    destination: String,

    /// Destination name (not used for broadcast)
    #[arg(long)]
    name: Option<String>,

    /// Source endpoint type hint for pipeline matching
    #[arg(long)]
    source: Option<String>,

    /// Source endpoint name hint
    #[arg(long)]
    source_name: Option<String>,

    /// Values to write as key=value pairs
    #[arg(required = true)]
    values: Vec<String>,
}

pub async fn run(args: WriteArgs, config: &Config) -> Result<()> {
    let request = WriteRequest {
        destination: args.destination,
        name: args.name,
        write: parse_pairs(&args.values)?,
        source: args.source,
        source_name: args.source_name,
    };

    let response = config.client().write(&request).await?;
    println!("{} {}", "accepted:".green().bold(), response.message);
    Ok(())
}
