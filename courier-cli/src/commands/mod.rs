//! CLI commands
//!
//! Each submodule implements one subcommand against the dispatch API.

pub mod operation;
pub mod write;

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use crate::config::Config;

#[derive(Subcommand)]
pub enum Commands {
    /// Submit a setpoint write
    Write(write::WriteArgs),
    /// Submit a control operation
    Operation(operation::OperationArgs),
    /// Check dispatcher liveness
    Health,
}

pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Write(args) => write::run(args, config).await,
        Commands::Operation(args) => operation::run(args, config).await,
        Commands::Health => {
            config.client().health().await?;
            println!("{}", "dispatcher is up".green());
            Ok(())
        }
    }
}

/// Parse `key=value` arguments into a JSON object of strings
pub fn parse_pairs(pairs: &[String]) -> Result<serde_json::Value> {
    let mut object = serde_json::Map::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("expected key=value, got '{}'", pair))?;
        object.insert(
            key.to_string(),
            serde_json::Value::String(value.to_string()),
        );
    }
    Ok(serde_json::Value::Object(object))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pairs() {
        let pairs = vec!["speed=40".to_string(), "mode=auto".to_string()];
        let object = parse_pairs(&pairs).unwrap();
        assert_eq!(object["speed"], "40");
        assert_eq!(object["mode"], "auto");
    }

    #[test]
    fn test_parse_pairs_keeps_embedded_equals() {
        let pairs = vec!["expr=a=b".to_string()];
        let object = parse_pairs(&pairs).unwrap();
        assert_eq!(object["expr"], "a=b");
    }

    #[test]
    fn test_parse_pairs_rejects_bare_words() {
        assert!(parse_pairs(&["speed".to_string()]).is_err());
    }
}
