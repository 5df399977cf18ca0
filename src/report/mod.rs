//! Console reporting
//!
//! [`ConsoleReporter`] is the unsynchronized sink at the end of the
//! forwarding chain: it writes findings, progress, metrics and free text to a
//! writer (stdout for the CLI) as styled text or as JSON lines.

use console::style;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::io::{self, Write};

use crate::engine::{Finding, Severity};
use crate::parallel::Reporter;
use crate::work::ProgressCounters;

/// Report format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `file:line:col: severity: message [id]`
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

pub struct ConsoleReporter<W: Write + Send = io::Stdout> {
    writer: W,
    format: OutputFormat,
    counts: BTreeMap<Severity, usize>,
}

impl ConsoleReporter<io::Stdout> {
    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(io::stdout(), format)
    }
}

impl<W: Write + Send> ConsoleReporter<W> {
    pub fn new(writer: W, format: OutputFormat) -> Self {
        Self {
            writer,
            format,
            counts: BTreeMap::new(),
        }
    }

    /// Findings written so far, per severity
    pub fn severity_counts(&self) -> &BTreeMap<Severity, usize> {
        &self.counts
    }

    pub fn findings_reported(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn into_writer(self) -> W {
        self.writer
    }

    fn emit(&mut self, line: &str) {
        if let Err(e) = writeln!(self.writer, "{}", line) {
            tracing::debug!("Failed to write report line: {}", e);
        }
    }

    fn styled_finding(finding: &Finding) -> String {
        let severity = match finding.severity {
            Severity::Error => style(finding.severity.to_string()).red().bold(),
            Severity::Warning => style(finding.severity.to_string()).yellow().bold(),
            Severity::Style => style(finding.severity.to_string()).cyan(),
            Severity::Information => style(finding.severity.to_string()).blue(),
        };
        format!(
            "{}:{}:{}: {}: {} {}",
            style(&finding.file).bold(),
            finding.line,
            finding.column,
            severity,
            finding.message,
            style(format!("[{}]", finding.id)).dim()
        )
    }
}

impl<W: Write + Send> Reporter for ConsoleReporter<W> {
    fn report_out(&mut self, text: &str) {
        let line = match self.format {
            OutputFormat::Text => text.to_string(),
            OutputFormat::Json => json!({ "type": "text", "text": text }).to_string(),
        };
        self.emit(&line);
    }

    fn report_err(&mut self, finding: &Finding) {
        *self.counts.entry(finding.severity).or_default() += 1;
        let line = match self.format {
            OutputFormat::Text => Self::styled_finding(finding),
            OutputFormat::Json => {
                let mut value = json!({ "type": "finding" });
                if let (Some(object), Ok(serde_json::Value::Object(fields))) =
                    (value.as_object_mut(), serde_json::to_value(finding))
                {
                    object.extend(fields);
                }
                value.to_string()
            }
        };
        self.emit(&line);
    }

    fn report_metric(&mut self, text: &str) {
        let line = match self.format {
            OutputFormat::Text => format!("{} {}", style("metric").magenta(), text),
            OutputFormat::Json => json!({ "type": "metric", "text": text }).to_string(),
        };
        self.emit(&line);
    }

    fn report_status(&mut self, progress: &ProgressCounters) {
        let line = match self.format {
            OutputFormat::Text => style(progress.status_line()).dim().to_string(),
            OutputFormat::Json => json!({
                "type": "status",
                "units_processed": progress.units_processed,
                "total_units": progress.total_units,
                "bytes_processed": progress.bytes_processed,
                "total_bytes": progress.total_bytes,
                "percent": progress.percent_done(),
            })
            .to_string(),
        };
        self.emit(&line);
    }
}
