// SPDX-License-Identifier: PMPL-1.0-or-later

//! Experiment execution engine
//!
//! `ExecutionEngine::start` launches the fault through a `FaultInjector` and
//! hands the running action to a pump thread. The pump is the single writer of
//! the run's log: it appends each line to the handle first and only then
//! notifies the controller, so a reader of the handle is never behind the
//! event stream.

mod command;
mod handle;
mod scripted;

pub use command::KubectlInjector;
pub use handle::{ExecutionHandle, RunSnapshot};
pub use scripted::{ScriptOutcome, ScriptedInjector};

use crate::events::RunEvent;
use crate::types::*;
use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const DEFAULT_POLL: Duration = Duration::from_millis(50);

/// What a running fault reports on each poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultEvent {
    Line(String),
    /// Nothing new within the poll window.
    Idle,
    Exited { success: bool },
}

/// The infrastructure action behind an experiment.
pub trait FaultInjector: Send + Sync {
    /// Start the action. An error means nothing was started.
    fn launch(&self, request: &ExperimentRequest) -> Result<Box<dyn RunningFault>>;

    fn describe(&self) -> String;
}

/// A launched action whose output is being pumped.
pub trait RunningFault: Send {
    /// Wait up to `wait` for the next line or for the action to exit.
    fn poll(&mut self, wait: Duration) -> FaultEvent;

    /// Ask the action to stop and undo what it can. Called at most once.
    fn stop(&mut self);
}

pub struct ExecutionEngine {
    injector: Arc<dyn FaultInjector>,
    poll_interval: Duration,
    next_run: AtomicU64,
}

impl ExecutionEngine {
    pub fn new(injector: Arc<dyn FaultInjector>) -> Self {
        Self {
            injector,
            poll_interval: DEFAULT_POLL,
            next_run: AtomicU64::new(1),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn injector(&self) -> &Arc<dyn FaultInjector> {
        &self.injector
    }

    /// Launch the fault for a validated request. Never fails: a launch error
    /// leaves the handle `Failed` with a diagnostic line and a `Finished` event.
    pub fn start(&self, request: ExperimentRequest, events: Sender<RunEvent>) -> ExecutionHandle {
        let run_id = RunId(self.next_run.fetch_add(1, Ordering::SeqCst));
        let handle = ExecutionHandle::new(run_id, request);
        info!(
            run_id = %run_id,
            experiment = %handle.request().summary(),
            injector = %self.injector.describe(),
            "launching fault injection"
        );

        let process = match self.injector.launch(handle.request()) {
            Ok(process) => process,
            Err(err) => {
                warn!(run_id = %run_id, error = %format!("{:#}", err), "fault injection failed to start");
                fail_launch(&handle, &events, format!("failed to start: {:#}", err));
                return handle;
            }
        };

        handle.transition(RunStatus::Running);
        let deadline = handle.request().duration().map(|bound| Instant::now() + bound);
        let pump = Pump {
            handle: handle.clone(),
            process,
            events: events.clone(),
            poll_interval: self.poll_interval,
            deadline,
        };

        let spawned = thread::Builder::new()
            .name(format!("pump-{}", run_id))
            .spawn(move || pump.run());
        if let Err(err) = spawned {
            fail_launch(&handle, &events, format!("failed to start output pump: {}", err));
        }
        handle
    }

    /// Force a run to `Aborted`. The pump stops the action on its next poll;
    /// `ExecutionHandle::wait_released` tells when that has happened.
    pub fn abort(&self, handle: &ExecutionHandle) -> bool {
        let aborted = handle.abort();
        if aborted {
            info!(run_id = %handle.run_id(), "abort requested");
        }
        aborted
    }
}

fn fail_launch(handle: &ExecutionHandle, events: &Sender<RunEvent>, diagnostic: String) {
    if let Some(seq) = handle.append(diagnostic.clone()) {
        let _ = events.send(RunEvent::Log {
            run_id: handle.run_id(),
            seq,
            line: diagnostic,
        });
    }
    handle.transition(RunStatus::Failed);
    handle.mark_released();
    let _ = events.send(RunEvent::Finished {
        run_id: handle.run_id(),
        status: handle.status(),
    });
}

struct Pump {
    handle: ExecutionHandle,
    process: Box<dyn RunningFault>,
    events: Sender<RunEvent>,
    poll_interval: Duration,
    deadline: Option<Instant>,
}

impl Pump {
    fn run(mut self) {
        let run_id = self.handle.run_id();
        loop {
            if self.handle.stop_requested() || self.handle.is_finished() {
                debug!(run_id = %run_id, "stopping aborted fault");
                self.process.stop();
                break;
            }

            if let Some(deadline) = self.deadline {
                if Instant::now() >= deadline {
                    self.emit(
                        "duration bound reached before the action finished; aborting".to_string(),
                    );
                    self.handle.abort();
                    self.process.stop();
                    warn!(run_id = %run_id, "fault exceeded its duration bound");
                    break;
                }
            }

            let wait = match self.deadline {
                Some(deadline) => self
                    .poll_interval
                    .min(deadline.saturating_duration_since(Instant::now())),
                None => self.poll_interval,
            };

            match self.process.poll(wait) {
                FaultEvent::Line(line) => {
                    if !self.emit(line) {
                        self.process.stop();
                        break;
                    }
                }
                FaultEvent::Idle => {}
                FaultEvent::Exited { success } => {
                    let status = if success {
                        RunStatus::Succeeded
                    } else {
                        RunStatus::Failed
                    };
                    self.handle.transition(status);
                    break;
                }
            }
        }

        self.handle.mark_released();
        let status = self.handle.status();
        info!(run_id = %run_id, status = %status, lines = self.handle.log_len(), "fault injection finished");
        let _ = self.events.send(RunEvent::Finished { run_id, status });
    }

    /// Append then notify. False once the run is terminal and delivery has stopped.
    fn emit(&self, line: String) -> bool {
        match self.handle.append(line.clone()) {
            Some(seq) => {
                let _ = self.events.send(RunEvent::Log {
                    run_id: self.handle.run_id(),
                    seq,
                    line,
                });
                true
            }
            None => false,
        }
    }
}
