// SPDX-License-Identifier: PMPL-1.0-or-later

//! Notifications from background work to the workflow controller

use crate::types::{AnalysisResult, RunId, RunStatus};

/// Everything background threads report. All variants carry the run id so the
/// controller can drop events that belong to a run it has already discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    /// A line was appended to the run's log at position `seq`.
    Log {
        run_id: RunId,
        seq: usize,
        line: String,
    },
    /// The run reached a terminal status.
    Finished { run_id: RunId, status: RunStatus },
    /// The analysis call for the run completed.
    Analysis {
        run_id: RunId,
        result: AnalysisResult,
    },
}

impl RunEvent {
    pub fn run_id(&self) -> RunId {
        match self {
            RunEvent::Log { run_id, .. }
            | RunEvent::Finished { run_id, .. }
            | RunEvent::Analysis { run_id, .. } => *run_id,
        }
    }
}
