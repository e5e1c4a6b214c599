// SPDX-License-Identifier: PMPL-1.0-or-later

//! Shared state of one execution

use crate::types::*;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug)]
struct RunState {
    status: RunStatus,
    lines: Vec<String>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct HandleInner {
    run_id: RunId,
    request: ExperimentRequest,
    state: Mutex<RunState>,
    stop: AtomicBool,
    /// Set once the pump has let go of the action, stopping it if asked to.
    released: Mutex<bool>,
    released_cv: Condvar,
}

/// Cheap-to-clone view of one run. The engine's pump thread is the only
/// writer of the log; any number of readers may take snapshots.
#[derive(Debug, Clone)]
pub struct ExecutionHandle {
    inner: Arc<HandleInner>,
}

/// Point-in-time copy of a run, taken under a single lock.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSnapshot {
    pub run_id: RunId,
    pub request: ExperimentRequest,
    pub status: RunStatus,
    pub lines: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExecutionHandle {
    pub(crate) fn new(run_id: RunId, request: ExperimentRequest) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                run_id,
                request,
                state: Mutex::new(RunState {
                    status: RunStatus::Pending,
                    lines: Vec::new(),
                    started_at: None,
                    finished_at: None,
                }),
                stop: AtomicBool::new(false),
                released: Mutex::new(false),
                released_cv: Condvar::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, RunState> {
        // Every write is a single push, so a poisoned lock still guards a consistent log.
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn run_id(&self) -> RunId {
        self.inner.run_id
    }

    pub fn request(&self) -> &ExperimentRequest {
        &self.inner.request
    }

    pub fn status(&self) -> RunStatus {
        self.state().status
    }

    pub fn is_finished(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn log_len(&self) -> usize {
        self.state().lines.len()
    }

    /// Every line appended so far.
    pub fn log_snapshot(&self) -> Vec<String> {
        self.state().lines.clone()
    }

    /// Lines from `cursor` onward, plus the cursor to pass next time.
    pub fn lines_since(&self, cursor: usize) -> (Vec<String>, usize) {
        let state = self.state();
        let start = cursor.min(state.lines.len());
        (state.lines[start..].to_vec(), state.lines.len())
    }

    pub fn snapshot(&self) -> RunSnapshot {
        let state = self.state();
        RunSnapshot {
            run_id: self.inner.run_id,
            request: self.inner.request.clone(),
            status: state.status,
            lines: state.lines.clone(),
            started_at: state.started_at,
            finished_at: state.finished_at,
        }
    }

    /// Force the run to `Aborted` and ask the pump to stop the action.
    /// Returns false when the run had already finished.
    pub fn abort(&self) -> bool {
        self.inner.stop.store(true, Ordering::SeqCst);
        self.transition(RunStatus::Aborted)
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.inner.stop.load(Ordering::SeqCst)
    }

    /// True once nothing is left running for this handle: the action exited
    /// on its own, never started, or its `stop` has returned.
    pub fn is_released(&self) -> bool {
        *self
            .inner
            .released
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until `is_released` or until `timeout` passes. Returns whether
    /// the action was released.
    pub fn wait_released(&self, timeout: Duration) -> bool {
        let guard = self
            .inner
            .released
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .inner
            .released_cv
            .wait_timeout_while(guard, timeout, |released| !*released)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }

    pub(crate) fn mark_released(&self) {
        let mut released = self
            .inner
            .released
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *released = true;
        self.inner.released_cv.notify_all();
    }

    /// Append a line unless the run is already terminal. Returns its position.
    pub(crate) fn append(&self, line: String) -> Option<usize> {
        let mut state = self.state();
        if state.status.is_terminal() {
            return None;
        }
        state.lines.push(line);
        Some(state.lines.len() - 1)
    }

    /// Move forward to `next`; illegal or backward moves are ignored.
    pub(crate) fn transition(&self, next: RunStatus) -> bool {
        let mut state = self.state();
        if !state.status.can_advance_to(next) {
            return false;
        }
        let now = Utc::now();
        if next == RunStatus::Running {
            state.started_at = Some(now);
        }
        if next.is_terminal() {
            state.started_at.get_or_insert(now);
            state.finished_at = Some(now);
        }
        state.status = next;
        true
    }
}
