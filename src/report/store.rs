// SPDX-License-Identifier: PMPL-1.0-or-later

//! Persistent storage for experiment reports

use super::Report;
use crate::engine::ExecutionHandle;
use crate::types::*;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

pub const REPORT_PREFIX: &str = "chaos_report_";
const MAX_SUFFIX: usize = 1000;

/// `chaos_report_{kind}_{action}_{YYYYmmdd_HHMMSS}[_N].md`
pub fn report_file_name(
    kind: ExperimentKind,
    action: FaultAction,
    at: &DateTime<Utc>,
    suffix: usize,
) -> String {
    let stamp = at.format("%Y%m%d_%H%M%S");
    if suffix == 0 {
        format!("{}{}_{}_{}.md", REPORT_PREFIX, kind.slug(), action.slug(), stamp)
    } else {
        format!(
            "{}{}_{}_{}_{}.md",
            REPORT_PREFIX,
            kind.slug(),
            action.slug(),
            stamp,
            suffix
        )
    }
}

#[derive(Debug, Clone)]
pub struct ReportWriter {
    output_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Snapshot the handle now and persist it.
    pub fn save(&self, handle: &ExecutionHandle, analysis: &AnalysisResult) -> Result<PathBuf> {
        self.write(&Report::snapshot(handle, analysis))
    }

    /// Write the report under a name no other file holds. The document only
    /// becomes visible once complete.
    pub fn write(&self, report: &Report) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("creating report directory {}", self.output_dir.display())
        })?;

        let mut staged = NamedTempFile::new_in(&self.output_dir).with_context(|| {
            format!("creating temporary file in {}", self.output_dir.display())
        })?;
        staged
            .write_all(report.render_markdown().as_bytes())
            .context("writing report contents")?;
        staged.as_file().sync_all().context("flushing report")?;

        let request = &report.run.request;
        for suffix in 0..MAX_SUFFIX {
            let name = report_file_name(
                request.kind(),
                request.action(),
                &report.generated_at,
                suffix,
            );
            let path = self.output_dir.join(name);
            match staged.persist_noclobber(&path) {
                Ok(_) => {
                    info!(run_id = %report.run.run_id, path = %path.display(), "report saved");
                    return Ok(path);
                }
                Err(err) if err.error.kind() == ErrorKind::AlreadyExists => staged = err.file,
                Err(err) => {
                    return Err(err.error)
                        .with_context(|| format!("persisting report to {}", path.display()))
                }
            }
        }
        Err(anyhow!(
            "no free report name in {} after {} attempts",
            self.output_dir.display(),
            MAX_SUFFIX
        ))
    }
}

/// The newest `count` reports in `dir`, newest first.
pub fn list_reports(dir: &Path, count: usize) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Err(anyhow!("report directory not found: {}", dir.display()));
    }

    let mut entries: Vec<(std::time::SystemTime, PathBuf)> = fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            let is_report = path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with(REPORT_PREFIX))
                .unwrap_or(false);
            let is_markdown = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("md"))
                .unwrap_or(false);
            is_report && is_markdown
        })
        .filter_map(|path| {
            let modified = fs::metadata(&path).and_then(|meta| meta.modified()).ok()?;
            Some((modified, path))
        })
        .collect();

    entries.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.file_name().cmp(&a.1.file_name())));
    Ok(entries.into_iter().take(count).map(|(_, path)| path).collect())
}
