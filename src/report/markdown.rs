// SPDX-License-Identifier: PMPL-1.0-or-later

//! Markdown rendering of a report

use super::Report;
use crate::types::*;
use chrono::{DateTime, Utc};

pub(super) const METADATA_HEADING: &str = "## Metadata";
pub(super) const PARAMETERS_HEADING: &str = "## Parameters";
pub(super) const ANALYSIS_HEADING: &str = "## AI Analysis";
pub(super) const LOGS_HEADING: &str = "## Raw Logs";

pub(super) fn render(report: &Report) -> String {
    let run = &report.run;
    let request = &run.request;
    let definition = request.definition();

    let mut lines = Vec::new();
    lines.push(format!("# Chaos Experiment Report: {}", definition.name()));
    lines.push(String::new());
    lines.push(format!("_Saved {}_", timestamp(&report.generated_at)));
    lines.push(String::new());

    lines.push(METADATA_HEADING.to_string());
    lines.push(String::new());
    lines.push(format!("- **Run:** {}", run.run_id));
    lines.push(format!("- **Kind:** {}", request.kind().label()));
    lines.push(format!("- **Action:** {}", request.action().slug()));
    lines.push(format!("- **Target:** {}", inline(request.target())));
    lines.push(format!(
        "- **Affected resource:** {}",
        definition.describe_target(request.target())
    ));
    lines.push(format!("- **Description:** {}", definition.description));
    lines.push(format!("- **Risk:** {}", definition.risk_summary));
    lines.push(format!(
        "- **Duration:** {}",
        request
            .duration()
            .map(format_duration)
            .unwrap_or_else(|| "none".to_string())
    ));
    lines.push(format!("- **Status:** {}", run.status));
    lines.push(format!(
        "- **Started:** {}",
        run.started_at.as_ref().map(timestamp).unwrap_or_else(|| "-".to_string())
    ));
    lines.push(format!(
        "- **Finished:** {}",
        run.finished_at
            .as_ref()
            .map(timestamp)
            .unwrap_or_else(|| "still running".to_string())
    ));
    lines.push(format!("- **Log lines:** {}", run.lines.len()));
    lines.push(format!("- **Log SHA-256:** `{}`", report.log_digest));
    lines.push(String::new());

    lines.push(PARAMETERS_HEADING.to_string());
    lines.push(String::new());
    if request.parameters().is_empty() {
        lines.push("_No parameters._".to_string());
    }
    for (name, value) in request.parameters() {
        lines.push(format!("- `{}`: {}", name, inline(&value.to_string())));
    }
    lines.push(String::new());

    lines.push(ANALYSIS_HEADING.to_string());
    lines.push(String::new());
    match &report.analysis {
        AnalysisResult::Ready(text) => lines.push(text.clone()),
        AnalysisResult::Pending => lines.push(
            "_Analysis unavailable: still pending when this report was saved._".to_string(),
        ),
        AnalysisResult::Failed(reason) => {
            lines.push(format!("_Analysis unavailable: failed ({})._", reason.trim()))
        }
    }
    lines.push(String::new());

    lines.push(LOGS_HEADING.to_string());
    lines.push(String::new());
    let fence = log_fence(&run.lines);
    lines.push(format!("{}text", fence));
    lines.extend(run.lines.iter().cloned());
    lines.push(fence);
    lines.push(String::new());

    lines.join("\n")
}

/// A backtick fence longer than any backtick run inside the logs, so the
/// log block can never be closed early.
pub fn log_fence(lines: &[String]) -> String {
    let longest = lines
        .iter()
        .map(|line| longest_backtick_run(line))
        .max()
        .unwrap_or(0);
    "`".repeat(longest.max(2) + 1)
}

fn longest_backtick_run(line: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in line.chars() {
        if c == '`' {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn inline(value: &str) -> String {
    format!("`{}`", value.replace('`', "'"))
}
