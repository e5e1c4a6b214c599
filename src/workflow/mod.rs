// SPDX-License-Identifier: PMPL-1.0-or-later

//! Experiment workflow state machine
//!
//! ```text
//! Select -> Configure -> Confirm -> Monitor -> Report -> Select
//!             |  ^          |
//!             v  '----------'
//!           Select  (back / cancel)
//! ```
//!
//! The engine is only ever started from `confirm`, and `confirm` is only
//! accepted in the Confirm stage. Background work reports through one channel
//! that `drain_events` empties once per UI tick.

mod stage;

pub use stage::{ActiveRun, Stage, StageKind};

use crate::analysis::{AnalysisClient, AnalysisRequest};
use crate::catalog::ExperimentCatalog;
use crate::config::{ConfigBuilder, ParamForm, ValidationErrors};
use crate::engine::{ExecutionEngine, ExecutionHandle};
use crate::events::RunEvent;
use crate::report::ReportWriter;
use crate::types::*;
use std::mem;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("cannot {action} from the {stage} stage")]
    InvalidTransition {
        action: &'static str,
        stage: StageKind,
    },
    #[error("no experiment at catalog position {0}")]
    UnknownExperiment(usize),
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error("could not save report: {0}")]
    Persist(String),
}

pub struct WorkflowController {
    catalog: ExperimentCatalog,
    engine: ExecutionEngine,
    analysis: AnalysisClient,
    writer: ReportWriter,
    events_tx: Sender<RunEvent>,
    events_rx: Receiver<RunEvent>,
    stage: Stage,
    /// Runs left behind by `new_experiment` whose action may still be stopping.
    retired: Vec<ExecutionHandle>,
    notice: Option<String>,
}

impl WorkflowController {
    pub fn new(
        catalog: ExperimentCatalog,
        engine: ExecutionEngine,
        analysis: AnalysisClient,
        writer: ReportWriter,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            catalog,
            engine,
            analysis,
            writer,
            events_tx,
            events_rx,
            stage: Stage::Select,
            retired: Vec::new(),
            notice: None,
        }
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn stage_kind(&self) -> StageKind {
        self.stage.kind()
    }

    pub fn catalog(&self) -> &ExperimentCatalog {
        &self.catalog
    }

    pub fn current_run(&self) -> Option<&ActiveRun> {
        self.stage.run()
    }

    /// Last operator-facing message, e.g. where a report was saved.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn injector_description(&self) -> String {
        self.engine.injector().describe()
    }

    pub fn writer(&self) -> &ReportWriter {
        &self.writer
    }

    /// Select -> Configure
    pub fn select(&mut self, index: usize) -> Result<(), WorkflowError> {
        if !matches!(self.stage, Stage::Select) {
            return Err(self.invalid("select an experiment"));
        }
        let definition = self
            .catalog
            .get(index)
            .ok_or(WorkflowError::UnknownExperiment(index))?;
        self.enter(
            StageKind::Select,
            Stage::Configure {
                definition,
                form: ParamForm::for_definition(definition),
                errors: None,
            },
        );
        Ok(())
    }

    /// Configure -> Select
    pub fn back(&mut self) -> Result<(), WorkflowError> {
        if !matches!(self.stage, Stage::Configure { .. }) {
            return Err(self.invalid("go back"));
        }
        self.enter(StageKind::Configure, Stage::Select);
        Ok(())
    }

    /// Configure -> Confirm when the form validates. On failure the stage
    /// stays Configure, holding the submitted input and its errors.
    pub fn submit(&mut self, form: ParamForm) -> Result<(), WorkflowError> {
        let definition = match &self.stage {
            Stage::Configure { definition, .. } => *definition,
            _ => return Err(self.invalid("submit parameters")),
        };

        match ConfigBuilder::new(definition).build(&form) {
            Ok(request) => {
                self.enter(StageKind::Configure, Stage::Confirm { request, form });
                Ok(())
            }
            Err(errors) => {
                debug!(experiment = %definition.name(), errors = %errors, "parameters rejected");
                self.stage = Stage::Configure {
                    definition,
                    form,
                    errors: Some(errors.clone()),
                };
                Err(WorkflowError::Validation(errors))
            }
        }
    }

    /// Confirm -> Configure. Nothing is launched; the raw input is kept.
    pub fn cancel(&mut self) -> Result<(), WorkflowError> {
        match self.take_stage() {
            Stage::Confirm { request, form } => {
                self.enter(
                    StageKind::Confirm,
                    Stage::Configure {
                        definition: request.definition(),
                        form,
                        errors: None,
                    },
                );
                Ok(())
            }
            other => Err(self.restore(other, "cancel")),
        }
    }

    /// Confirm -> Monitor. The only path to the fault injector.
    pub fn confirm(&mut self) -> Result<RunId, WorkflowError> {
        match self.take_stage() {
            Stage::Confirm { request, .. } => {
                let handle = self.engine.start(request, self.events_tx.clone());
                let run_id = handle.run_id();
                let mut run = ActiveRun::new(handle);
                run.sync_display();
                self.enter(StageKind::Confirm, Stage::Monitor { run });
                Ok(run_id)
            }
            other => Err(self.restore(other, "confirm")),
        }
    }

    /// Monitor -> Report. The run is aborted and analysis of what was
    /// captured is requested straight away.
    pub fn abort(&mut self) -> Result<bool, WorkflowError> {
        let aborted = match &self.stage {
            Stage::Monitor { run } => self.engine.abort(run.handle()),
            _ => return Err(self.invalid("abort")),
        };
        self.finish_monitoring();
        if aborted {
            self.notice = Some("Experiment aborted".to_string());
        }
        Ok(aborted)
    }

    /// Persist the current run. The document reflects the run at this
    /// instant; the stage does not change.
    pub fn save_report(&mut self) -> Result<PathBuf, WorkflowError> {
        let Stage::Report { run } = &mut self.stage else {
            return Err(self.invalid("save a report"));
        };

        match self.writer.save(run.handle(), run.analysis()) {
            Ok(path) => {
                run.record_save(path.clone());
                self.notice = Some(format!("Report saved to {}", path.display()));
                Ok(path)
            }
            Err(err) => {
                let message = format!("{:#}", err);
                warn!(run_id = %run.run_id(), error = %message, "report save failed");
                self.notice = Some(format!("Could not save report: {}", message));
                Err(WorkflowError::Persist(message))
            }
        }
    }

    /// Report -> Select. The finished run is dropped; its late events are ignored.
    pub fn new_experiment(&mut self) -> Result<(), WorkflowError> {
        match self.take_stage() {
            Stage::Report { run } => {
                self.retired.retain(|handle| !handle.is_released());
                if !run.handle().is_released() {
                    self.retired.push(run.handle().clone());
                }
                self.enter(StageKind::Report, Stage::Select);
                Ok(())
            }
            other => Err(self.restore(other, "start a new experiment")),
        }
    }

    /// Abort a run that is still in progress, then wait up to `grace` for
    /// every launched action to be released. False when something was still
    /// being stopped when time ran out.
    pub fn shutdown(&mut self, grace: Duration) -> bool {
        if matches!(self.stage, Stage::Monitor { .. }) {
            let _ = self.abort();
        }

        let mut handles: Vec<ExecutionHandle> = self.retired.drain(..).collect();
        if let Some(run) = self.stage.run() {
            handles.push(run.handle().clone());
        }

        let deadline = Instant::now() + grace;
        let mut released = true;
        for handle in handles {
            if handle.is_released() {
                continue;
            }
            info!(run_id = %handle.run_id(), "waiting for fault to be stopped");
            if !handle.wait_released(deadline.saturating_duration_since(Instant::now())) {
                warn!(run_id = %handle.run_id(), "fault still stopping at shutdown");
                released = false;
            }
        }
        released
    }

    /// Apply every queued background event without blocking. Returns how
    /// many events were taken off the channel.
    pub fn drain_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            handled += 1;
            self.apply(event);
        }
        handled
    }

    fn apply(&mut self, event: RunEvent) {
        let current = self.stage.run().map(ActiveRun::run_id);
        if current != Some(event.run_id()) {
            debug!(run_id = %event.run_id(), "discarding event for inactive run");
            return;
        }

        match event {
            RunEvent::Log { .. } => {
                if let Some(run) = self.stage.run_mut() {
                    run.sync_display();
                }
            }
            RunEvent::Finished { .. } => self.finish_monitoring(),
            RunEvent::Analysis { run_id, result } => {
                if let Some(run) = self.stage.run_mut() {
                    if run.resolve_analysis(result) {
                        info!(run_id = %run_id, "analysis attached");
                    } else {
                        debug!(run_id = %run_id, "ignoring duplicate analysis result");
                    }
                }
            }
        }
    }

    /// Monitor -> Report once the run is terminal; fires analysis once.
    fn finish_monitoring(&mut self) {
        match self.take_stage() {
            Stage::Monitor { mut run } if run.handle().is_finished() => {
                run.sync_display();
                self.request_analysis(&mut run);
                self.enter(StageKind::Monitor, Stage::Report { run });
            }
            Stage::Report { mut run } => {
                run.sync_display();
                self.stage = Stage::Report { run };
            }
            other => self.stage = other,
        }
    }

    fn request_analysis(&self, run: &mut ActiveRun) {
        if !run.mark_analysis_requested() {
            return;
        }
        let snapshot = run.handle().snapshot();
        info!(run_id = %run.run_id(), status = %snapshot.status, "requesting analysis");
        self.analysis.dispatch(
            run.run_id(),
            AnalysisRequest::from_snapshot(&snapshot),
            self.events_tx.clone(),
        );
    }

    /// Install `next`. `from` is passed in because callers that took the
    /// stage out with `take_stage` leave a placeholder behind.
    fn enter(&mut self, from: StageKind, next: Stage) {
        let to = next.kind();
        match next.run() {
            Some(run) => info!(from = %from, to = %to, run_id = %run.run_id(), "stage transition"),
            None => info!(from = %from, to = %to, "stage transition"),
        }
        self.stage = next;
        self.notice = None;
    }

    fn take_stage(&mut self) -> Stage {
        mem::replace(&mut self.stage, Stage::Select)
    }

    /// Put back a stage taken for an action it does not allow.
    fn restore(&mut self, stage: Stage, action: &'static str) -> WorkflowError {
        self.stage = stage;
        self.invalid(action)
    }

    fn invalid(&self, action: &'static str) -> WorkflowError {
        let stage = self.stage.kind();
        debug!(action, stage = %stage, "rejected action");
        WorkflowError::InvalidTransition { action, stage }
    }
}
