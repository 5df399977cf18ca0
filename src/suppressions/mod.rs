//! Suppression rules
//!
//! Rules come from two places:
//! - global rules given up front (config file, `--suppress`), meaningful for the whole run
//! - inline rules written in source comments, discovered only while checking that file
//!
//! Supported inline comment formats:
//! - `parcheck:ignore [id]` - suppress findings on the same line
//! - `parcheck:ignore-next [id]` - suppress findings on the next line
//! - `parcheck:ignore-file [id]` - suppress findings anywhere in the file
//!
//! A missing id means every finding id (`*`).

use anyhow::{Context, Result};
use globset::{Glob, GlobMatcher};
use lazy_static::lazy_static;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;

pub mod database;


pub use database::{SharedSuppressions, SuppressionConflict, SuppressionDatabase};

use crate::engine::{Finding, Severity};

lazy_static! {
    static ref INLINE_DIRECTIVE: Regex =
        Regex::new(r"parcheck:(ignore-file|ignore-next|ignore)\b(?:[ \t]+([A-Za-z0-9_.*?\-]+))?")
            .expect("inline suppression regex is valid");
}

const GLOB_META: &[char] = &['*', '?', '[', '{'];

/// Identity of a rule inside the suppression database.
/// A global rule and an inline rule with the same scope are distinct entries.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuleKey {
    pub error_id: String,
    pub file: Option<String>,
    pub line: Option<usize>,
    pub is_inline: bool,
}

/// A single suppression rule plus whether it fired during the run
#[derive(Debug, Clone)]
pub struct SuppressionRule {
    pub error_id: String,
    pub file: Option<String>,
    pub line: Option<usize>,
    pub is_inline: bool,
    pub matched: bool,
    file_is_literal: bool,
    id_matcher: GlobMatcher,
    file_matcher: Option<GlobMatcher>,
}

impl SuppressionRule {
    /// Create a global rule. `error_id` and `file` may use glob wildcards.
    pub fn new(error_id: &str, file: Option<&str>, line: Option<usize>) -> Result<Self> {
        let error_id = error_id.trim();
        if error_id.is_empty() {
            anyhow::bail!("Suppression rule has an empty error id");
        }

        let file = file.map(normalize_file_scope);
        let file_matcher = match file {
            Some(pattern) => Some(compile(pattern)?),
            None => None,
        };

        Ok(Self {
            error_id: error_id.to_string(),
            file: file.map(str::to_string),
            line,
            is_inline: false,
            matched: false,
            file_is_literal: file.is_some_and(|f| !f.contains(GLOB_META)),
            id_matcher: compile(error_id)?,
            file_matcher,
        })
    }

    /// Create an inline rule for the exact file it was found in
    pub fn inline(error_id: &str, file: &str, line: Option<usize>) -> Result<Self> {
        let file = normalize_file_scope(file);
        Ok(Self {
            error_id: error_id.to_string(),
            file: Some(file.to_string()),
            line,
            is_inline: true,
            matched: false,
            file_is_literal: true,
            id_matcher: compile(error_id)?,
            file_matcher: Some(compile(&globset::escape(file))?),
        })
    }

    /// Parse the textual form `id`, `id:file` or `id:file:line`
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let (error_id, rest) = match text.split_once(':') {
            Some((id, rest)) => (id, Some(rest)),
            None => (text, None),
        };

        let (file, line) = match rest {
            None => (None, None),
            Some(rest) => match rest.rsplit_once(':') {
                Some((file, line)) if !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit()) => {
                    let line = line
                        .parse::<usize>()
                        .with_context(|| format!("Invalid line number in suppression: {}", text))?;
                    (Some(file), Some(line))
                }
                _ => (Some(rest), None),
            },
        };

        let file = file.filter(|f| !f.is_empty());
        Self::new(error_id, file, line)
            .with_context(|| format!("Invalid suppression rule: {}", text))
    }

    pub fn key(&self) -> RuleKey {
        RuleKey {
            error_id: self.error_id.clone(),
            file: self.file.clone(),
            line: self.line,
            is_inline: self.is_inline,
        }
    }

    /// Scoped to exactly one file (a file scope without wildcards)
    pub fn is_local(&self) -> bool {
        self.file.is_some() && self.file_is_literal
    }

    /// Whether this rule covers the finding. Does not change matched state.
    pub fn matches(&self, finding: &Finding) -> bool {
        if let Some(line) = self.line
            && finding.line != line
        {
            return false;
        }
        if let Some(matcher) = &self.file_matcher
            && !matcher.is_match(&finding.file)
        {
            return false;
        }
        self.id_matcher.is_match(&finding.id)
    }

    /// Check the finding and remember that the rule fired
    pub fn try_suppress(&mut self, finding: &Finding) -> bool {
        if self.matches(finding) {
            self.matched = true;
            true
        } else {
            false
        }
    }

    /// Information finding reported for a rule that never fired
    pub fn unmatched_finding(&self) -> Finding {
        Finding {
            id: "unmatchedSuppression".to_string(),
            severity: Severity::Information,
            message: format!("Unmatched suppression: {}", self.error_id),
            file: self.file.clone().unwrap_or_else(|| "*".to_string()),
            line: self.line.unwrap_or(0),
            column: 0,
        }
    }
}

impl PartialEq for SuppressionRule {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for SuppressionRule {}

impl PartialOrd for SuppressionRule {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SuppressionRule {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for SuppressionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error_id)?;
        if let Some(file) = &self.file {
            write!(f, ":{}", file)?;
        }
        if let Some(line) = self.line {
            write!(f, ":{}", line)?;
        }
        Ok(())
    }
}

/// File scopes name paths relative to the run root, without a leading `./`
fn normalize_file_scope(file: &str) -> &str {
    let mut file = file.trim();
    while let Some(rest) = file.strip_prefix("./") {
        file = rest;
    }
    file
}

fn compile(pattern: &str) -> Result<GlobMatcher> {
    let glob = Glob::new(pattern).with_context(|| format!("Invalid glob pattern: {}", pattern))?;
    Ok(glob.compile_matcher())
}

/// Collect the inline suppression comments of one file
pub fn parse_inline(content: &str, file: &str) -> Result<Vec<SuppressionRule>> {
    let mut rules = Vec::new();

    for (index, line) in content.lines().enumerate() {
        let line_number = index + 1;
        for captures in INLINE_DIRECTIVE.captures_iter(line) {
            let error_id = captures.get(2).map_or("*", |m| m.as_str());
            let target = match &captures[1] {
                "ignore-file" => None,
                "ignore-next" => Some(line_number + 1),
                _ => Some(line_number),
            };
            rules.push(SuppressionRule::inline(error_id, file, target)?);
        }
    }

    Ok(rules)
}
