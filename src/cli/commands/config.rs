use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::cli::Output;
use crate::config::ParcheckConfig;
use crate::engine::patterns::patterns_from_config;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Display current merged configuration
    Show {
        /// Output format
        #[arg(short, long, value_enum, default_value = "toml")]
        format: ConfigFormat,

        /// Only show this dotted key (e.g. `run.jobs`)
        key: Option<String>,
    },
    /// Validate the merged configuration
    Validate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigFormat {
    Toml,
    Json,
    Yaml,
}

pub async fn execute(args: ConfigArgs, custom_config: Option<&str>) -> Result<()> {
    let config = ParcheckConfig::load(custom_config, None)?;

    match args.command {
        ConfigCommand::Show { format, key } => {
            let value = config.section(key.as_deref().unwrap_or(""))?;
            println!("{}", render(&value, format)?);
        }
        ConfigCommand::Validate => {
            let output = Output::new(false, false);
            config.validate()?;

            let patterns = patterns_from_config(&config.patterns)?;
            output.success("Configuration is valid");
            output.key_value("Enabled patterns:", &patterns.len().to_string(), false);
            output.key_value(
                "Suppression rules:",
                &config.suppressions.rules.len().to_string(),
                false,
            );
            output.key_value("Workers:", &config.effective_jobs().to_string(), true);
        }
    }

    Ok(())
}

fn render(value: &serde_json::Value, format: ConfigFormat) -> Result<String> {
    match (format, value) {
        // Scalars and arrays are not valid TOML documents on their own
        (ConfigFormat::Toml, serde_json::Value::Object(_)) => {
            toml::to_string_pretty(value).context("Failed to render TOML")
        }
        (ConfigFormat::Toml, serde_json::Value::String(s)) => Ok(s.clone()),
        (ConfigFormat::Toml, _) | (ConfigFormat::Json, _) => {
            serde_json::to_string_pretty(value).context("Failed to render JSON")
        }
        (ConfigFormat::Yaml, _) => serde_yml::to_string(value).context("Failed to render YAML"),
    }
}
