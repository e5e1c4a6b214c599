// SPDX-License-Identifier: PMPL-1.0-or-later

//! Experiment reports
//!
//! A `Report` is frozen at the moment it is taken: later log lines or a late
//! analysis never change a report that has already been built.

mod markdown;
mod store;

pub use markdown::log_fence;
pub use store::{list_reports, report_file_name, ReportWriter, REPORT_PREFIX};

use crate::engine::{ExecutionHandle, RunSnapshot};
use crate::types::AnalysisResult;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub run: RunSnapshot,
    pub analysis: AnalysisResult,
    pub generated_at: DateTime<Utc>,
    /// SHA-256 over the log lines, each terminated by `\n`.
    pub log_digest: String,
}

impl Report {
    pub fn snapshot(handle: &ExecutionHandle, analysis: &AnalysisResult) -> Self {
        Self::from_run(handle.snapshot(), analysis.clone(), Utc::now())
    }

    pub fn from_run(run: RunSnapshot, analysis: AnalysisResult, generated_at: DateTime<Utc>) -> Self {
        let log_digest = digest_lines(&run.lines);
        Self {
            run,
            analysis,
            generated_at,
            log_digest,
        }
    }

    pub fn render_markdown(&self) -> String {
        markdown::render(self)
    }
}

pub fn digest_lines(lines: &[String]) -> String {
    let mut hasher = Sha256::new();
    for line in lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}
