//! Text and JSON report generation.
//!
//! This module renders the values a run delivered and the coordinator's
//! summary, either as plain text or as one JSON document.

use crate::models::{FaultPolicy, RunSummary};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything the consumer observed during one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Requested producer count.
    pub producers: i64,
    /// Requested values per producer.
    pub count: i64,
    pub fault_policy: FaultPolicy,
    /// Values in the order they were delivered.
    pub values: Vec<i64>,
    /// Terminal error seen on the stream, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_error: Option<String>,
    /// True if the consumer stopped early (`--take`).
    pub truncated: bool,
    pub summary: RunSummary,
}

impl RunReport {
    /// Values expected from a run that completes cleanly.
    pub fn expected_values(&self) -> i64 {
        self.producers.saturating_mul(self.count)
    }

    /// How many times each value was delivered.
    pub fn value_histogram(&self) -> BTreeMap<i64, usize> {
        let mut histogram = BTreeMap::new();
        for value in &self.values {
            *histogram.entry(*value).or_insert(0) += 1;
        }
        histogram
    }
}

/// Generate the plain-text summary printed after the values.
pub fn generate_text_summary(report: &RunReport) -> String {
    let summary = &report.summary;
    let mut lines = Vec::new();

    lines.push(format!("Run {}", summary.run_id));
    lines.push(format!(
        "- Producers: {} x {} values ({})",
        report.producers, report.count, report.fault_policy
    ));
    lines.push(format!(
        "- Delivered: {} of {} expected",
        report.values.len(),
        report.expected_values()
    ));
    lines.push(format!(
        "- Finished: {} | Cancelled: {} | Faulted: {} | Aborted: {}",
        summary.finished, summary.cancelled, summary.faulted, summary.aborted
    ));
    lines.push(format!("- Emitted: {}", summary.values_emitted));
    if let Some(line) = delivery_line(&report.value_histogram()) {
        lines.push(line);
    }
    lines.push(format!("- Duration: {:.3}s", summary.duration_seconds()));

    if report.truncated {
        lines.push("- Consumer stopped early".to_string());
    }
    if let Some(ref error) = report.terminal_error {
        lines.push(format!("- Terminal error: {}", error));
    }

    lines.join("\n")
}

/// Describes how often each distinct value arrived, e.g. "each delivered 2 times".
fn delivery_line(histogram: &BTreeMap<i64, usize>) -> Option<String> {
    let min = histogram.values().min()?;
    let max = histogram.values().max()?;

    let spread = if min == max {
        format!("each delivered {} times", min)
    } else {
        format!("delivered {} to {} times each", min, max)
    };
    Some(format!("- Distinct values: {} ({})", histogram.len(), spread))
}

/// Generate a JSON report.
pub fn generate_json_report(report: &RunReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}
