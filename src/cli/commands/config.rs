//! Implementation of the `trellis config` commands.

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;

const REDACTED: &str = "********";

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration after all layers are merged
    Show,
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct ConfigShowOutput {
    pub config: Config,
}

impl ConfigShowOutput {
    /// Wrap `config` with the API key masked.
    pub fn redacted(config: &Config) -> Self {
        let mut config = config.clone();
        if config.backend.api_key.is_some() {
            config.backend.api_key = Some(REDACTED.to_string());
        }
        Self { config }
    }
}

impl CommandOutput for ConfigShowOutput {
    fn to_human(&self) -> String {
        serde_yaml::to_string(&self.config)
            .unwrap_or_else(|e| format!("Failed to render configuration: {e}"))
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or_default()
    }
}

pub fn execute(command: ConfigCommands, config: &Config, json_mode: bool) -> Result<()> {
    match command {
        ConfigCommands::Show => output(&ConfigShowOutput::redacted(config), json_mode),
    }
    Ok(())
}
