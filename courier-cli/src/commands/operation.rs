//! Operation subcommand

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use courier_core::dto::dispatch::OperationRequest;

use crate::commands::parse_pairs;
use crate::config::Config;

#[derive(Args)]
pub struct OperationArgs {
    /// Operation name to invoke
    #[arg(long)]
    operation: String,

    /// Destination type: service, asset or broadcast
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

    /// Operation parameters as key=value pairs
    parameters: Vec<String>,
}

pub async fn run(args: OperationArgs, config: &Config) -> Result<()> {
    let mut operation = serde_json::Map::new();
    operation.insert(args.operation, parse_pairs(&args.parameters)?);

    let request = OperationRequest {
        destination: args.destination,
        name: args.name,
        operation: serde_json::Value::Object(operation),
        source: args.source,
        source_name: args.source_name,
    };

    let response = config.client().operation(&request).await?;
    println!("{} {}", "accepted:".green().bold(), response.message);
    Ok(())
}
