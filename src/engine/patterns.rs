//! Check patterns
//!
//! Loads the regex checks declared in configuration and converts them to the
//! compiled form the engine runs.

use anyhow::{Context, Result};
use regex::Regex;

use super::{Severity, parse_severity};
use crate::config::PatternConfig;

/// A compiled line check
#[derive(Debug, Clone)]
pub struct CheckPattern {
    /// Finding id reported on match
    pub id: String,

    /// Regular expression run against each line
    pub regex: Regex,

    /// Severity level
    pub severity: Severity,

    /// Message reported on match
    pub message: String,
}

impl CheckPattern {
    /// Create a new check pattern
    pub fn new(id: impl Into<String>, pattern: &str, severity: Severity, message: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let regex = Regex::new(pattern)
            .with_context(|| format!("Invalid regex pattern for {}: {}", id, pattern))?;

        Ok(Self {
            id,
            regex,
            severity,
            message: message.into(),
        })
    }
}

/// Convert configuration patterns to compiled check patterns
pub fn patterns_from_config(config_patterns: &[PatternConfig]) -> Result<Vec<CheckPattern>> {
    let mut patterns = Vec::new();

    for config_pattern in config_patterns {
        if !config_pattern.enabled {
            continue;
        }

        if patterns.iter().any(|p: &CheckPattern| p.id == config_pattern.id) {
            anyhow::bail!("Duplicate pattern id: {}", config_pattern.id);
        }

        let message = if config_pattern.message.is_empty() {
            format!("Pattern '{}' matched", config_pattern.id)
        } else {
            config_pattern.message.clone()
        };

        patterns.push(CheckPattern::new(
            config_pattern.id.clone(),
            &config_pattern.regex,
            parse_severity(&config_pattern.severity),
            message,
        )?);
    }

    Ok(patterns)
}
