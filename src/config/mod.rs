//! Configuration management for parcheck
//!
//! Settings are layered with figment, lowest priority first:
//!
//! 1. Embedded `default-config.toml`
//! 2. User config `~/.config/parcheck/config.{toml,json,yaml,yml}`
//! 3. Repository config `parcheck.{toml,json,yaml,yml}`, or only the file
//!    passed with `--config`
//! 4. `PARCHECK_*` environment variables (`__` separates nesting levels)
//! 5. Command line overrides

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use globset::Glob;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::engine::patterns::patterns_from_config;
use crate::parallel::ExecutionStrategy;
use crate::suppressions::SuppressionRule;
use crate::timing::ShowTime;

// Embed the default config at compile time
const DEFAULT_CONFIG: &str = include_str!("../../default-config.toml");

const ENV_PREFIX: &str = "PARCHECK_";

/// Fully merged configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParcheckConfig {
    pub run: RunConfig,
    pub files: FilesConfig,
    pub suppressions: SuppressionsConfig,
    pub patterns: Vec<PatternConfig>,
}

/// Scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Worker count (0 = size from available cores)
    pub jobs: usize,

    /// Share of cores used when `jobs` is 0
    pub thread_percentage: u8,

    /// Suppress progress reporting
    pub quiet: bool,

    /// Timing summary mode
    pub showtime: ShowTime,

    /// Exit status when errors were found
    pub error_exitcode: i32,

    /// Emit per-file metric lines
    pub metrics: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            jobs: 0,
            thread_percentage: 75,
            quiet: false,
            showtime: ShowTime::None,
            error_exitcode: 1,
            metrics: false,
        }
    }
}

/// File discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    /// Files larger than this are skipped (0 = no limit)
    pub max_file_size_mb: u64,

    /// Respect .gitignore files while walking
    pub use_gitignore: bool,

    pub follow_symlinks: bool,

    /// Glob patterns excluded from discovery
    pub exclude: Vec<String>,

    /// Extensions to check; empty checks all
    pub extensions: Vec<String>,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 10,
            use_gitignore: true,
            follow_symlinks: false,
            exclude: Vec::new(),
            extensions: Vec::new(),
        }
    }
}

/// Suppression settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuppressionsConfig {
    /// Global rules in `id[:file[:line]]` form
    pub rules: Vec<String>,

    /// Discover inline suppression comments
    pub inline: bool,

    /// Report rules that never fired
    pub report_unmatched: bool,
}

impl Default for SuppressionsConfig {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            inline: true,
            report_unmatched: false,
        }
    }
}

/// One configured check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternConfig {
    /// Finding id
    pub id: String,

    /// Regex run against each line
    pub regex: String,

    /// error | warning | style | information
    #[serde(default = "default_severity")]
    pub severity: String,

    #[serde(default)]
    pub message: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_severity() -> String {
    "error".to_string()
}

fn default_enabled() -> bool {
    true
}

/// Command line values layered over every other source.
/// Unset fields leave the lower layers untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CliOverrides {
    pub run: RunOverrides,
    pub suppressions: SuppressionOverrides,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiet: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub showtime: Option<ShowTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_exitcode: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SuppressionOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_unmatched: Option<bool>,
}

impl ParcheckConfig {
    /// Build the layered figment without extracting it
    pub fn figment(custom_config: Option<&str>, cli_overrides: Option<&CliOverrides>) -> Figment {
        tracing::trace!("CONFIG LOAD: Starting");

        let mut figment = Figment::new().merge(Toml::string(DEFAULT_CONFIG));

        // A custom config replaces the user and repository files
        match custom_config {
            Some(path) => figment = merge_file(figment, path),
            None => {
                if let Some(base) = user_config_base_path() {
                    for ext in ["toml", "json", "yaml", "yml"] {
                        figment = merge_file(figment, &format!("{}.{}", base, ext));
                    }
                }
                for ext in ["toml", "json", "yaml", "yml"] {
                    figment = merge_file(figment, &format!("parcheck.{}", ext));
                }
            }
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        if let Some(overrides) = cli_overrides {
            tracing::trace!("CONFIG LOAD: Applying CLI overrides");
            figment = figment.merge(Serialized::defaults(overrides));
        }

        figment
    }

    /// Load and extract the merged configuration
    pub fn load(custom_config: Option<&str>, cli_overrides: Option<&CliOverrides>) -> Result<Self> {
        if let Some(path) = custom_config
            && !Path::new(path).is_file()
        {
            anyhow::bail!("Config file not found: {}", path);
        }

        let config: ParcheckConfig = Self::figment(custom_config, cli_overrides)
            .extract()
            .context("Failed to load configuration")?;
        Ok(config)
    }

    /// Check values that deserialize fine but cannot be used
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.run.thread_percentage) {
            anyhow::bail!(
                "run.thread_percentage must be between 1 and 100, got {}",
                self.run.thread_percentage
            );
        }

        for pattern in &self.files.exclude {
            Glob::new(pattern).with_context(|| format!("Invalid exclude pattern: {}", pattern))?;
        }

        patterns_from_config(&self.patterns).context("Invalid pattern configuration")?;
        self.suppression_rules()?;

        Ok(())
    }

    /// Worker count after resolving `jobs = 0`
    pub fn effective_jobs(&self) -> usize {
        ExecutionStrategy::resolve_jobs(self.run.jobs, self.run.thread_percentage)
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.files.max_file_size_mb.saturating_mul(1024 * 1024)
    }

    /// Parse the configured global suppression rules
    pub fn suppression_rules(&self) -> Result<Vec<SuppressionRule>> {
        self.suppressions
            .rules
            .iter()
            .map(|rule| SuppressionRule::parse(rule))
            .collect()
    }

    /// Extract one section (or the whole config for an empty path) as JSON
    pub fn section(&self, path: &str) -> Result<serde_json::Value> {
        let mut value = serde_json::to_value(self).context("Failed to serialize configuration")?;
        for key in path.split('.').filter(|key| !key.is_empty()) {
            value = match value {
                serde_json::Value::Object(mut map) => map
                    .remove(key)
                    .with_context(|| format!("Configuration key '{}' not found", path))?,
                _ => anyhow::bail!("Configuration key '{}' not found", path),
            };
        }
        Ok(value)
    }
}

fn merge_file(figment: Figment, path: &str) -> Figment {
    match Path::new(path).extension().and_then(|ext| ext.to_str()) {
        Some("json") => figment.merge(Json::file(path)),
        Some("yaml") | Some("yml") => figment.merge(Yaml::file(path)),
        _ => figment.merge(Toml::file(path)),
    }
}

fn user_config_base_path() -> Option<String> {
    std::env::var("HOME")
        .ok()
        .map(|home| format!("{}/.config/parcheck/config", home))
}
