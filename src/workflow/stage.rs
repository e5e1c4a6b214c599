// SPDX-License-Identifier: PMPL-1.0-or-later

//! Workflow stages and their payloads

use crate::config::{ParamForm, ValidationErrors};
use crate::engine::ExecutionHandle;
use crate::types::*;
use std::fmt;
use std::path::PathBuf;

/// Where the operator is in the workflow. Each stage carries exactly the data
/// it needs, so a request cannot exist before validation and a handle cannot
/// exist before confirmation.
#[derive(Debug)]
pub enum Stage {
    Select,
    Configure {
        definition: &'static ExperimentDefinition,
        form: ParamForm,
        errors: Option<ValidationErrors>,
    },
    Confirm {
        request: ExperimentRequest,
        /// Raw input, restored if the operator cancels.
        form: ParamForm,
    },
    Monitor {
        run: ActiveRun,
    },
    Report {
        run: ActiveRun,
    },
}

impl Stage {
    pub fn kind(&self) -> StageKind {
        match self {
            Stage::Select => StageKind::Select,
            Stage::Configure { .. } => StageKind::Configure,
            Stage::Confirm { .. } => StageKind::Confirm,
            Stage::Monitor { .. } => StageKind::Monitor,
            Stage::Report { .. } => StageKind::Report,
        }
    }

    pub fn run(&self) -> Option<&ActiveRun> {
        match self {
            Stage::Monitor { run } | Stage::Report { run } => Some(run),
            _ => None,
        }
    }

    pub(super) fn run_mut(&mut self) -> Option<&mut ActiveRun> {
        match self {
            Stage::Monitor { run } | Stage::Report { run } => Some(run),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Select,
    Configure,
    Confirm,
    Monitor,
    Report,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageKind::Select => "Select",
            StageKind::Configure => "Configure",
            StageKind::Confirm => "Confirm",
            StageKind::Monitor => "Monitor",
            StageKind::Report => "Report",
        };
        f.write_str(name)
    }
}

/// A confirmed run as the controller sees it
#[derive(Debug)]
pub struct ActiveRun {
    handle: ExecutionHandle,
    analysis: AnalysisResult,
    analysis_requested: bool,
    display: Vec<String>,
    saved: Vec<PathBuf>,
}

impl ActiveRun {
    pub(super) fn new(handle: ExecutionHandle) -> Self {
        Self {
            handle,
            analysis: AnalysisResult::Pending,
            analysis_requested: false,
            display: Vec::new(),
            saved: Vec::new(),
        }
    }

    pub fn run_id(&self) -> RunId {
        self.handle.run_id()
    }

    pub fn handle(&self) -> &ExecutionHandle {
        &self.handle
    }

    pub fn status(&self) -> RunStatus {
        self.handle.status()
    }

    pub fn analysis(&self) -> &AnalysisResult {
        &self.analysis
    }

    pub fn analysis_requested(&self) -> bool {
        self.analysis_requested
    }

    /// Lines delivered to the display so far, in log order.
    pub fn display_lines(&self) -> &[String] {
        &self.display
    }

    pub fn saved_reports(&self) -> &[PathBuf] {
        &self.saved
    }

    /// Catch the display up with the handle's log.
    pub(super) fn sync_display(&mut self) -> usize {
        let (fresh, _) = self.handle.lines_since(self.display.len());
        let added = fresh.len();
        self.display.extend(fresh);
        added
    }

    /// Returns false when analysis was already requested for this run.
    pub(super) fn mark_analysis_requested(&mut self) -> bool {
        !std::mem::replace(&mut self.analysis_requested, true)
    }

    /// Only the first result for a requested analysis is kept.
    pub(super) fn resolve_analysis(&mut self, result: AnalysisResult) -> bool {
        if !self.analysis_requested || !self.analysis.is_pending() || result.is_pending() {
            return false;
        }
        self.analysis = result;
        true
    }

    pub(super) fn record_save(&mut self, path: PathBuf) {
        self.saved.push(path);
    }
}
