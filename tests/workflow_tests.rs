// SPDX-License-Identifier: PMPL-1.0-or-later

//! End-to-end workflow tests against scripted collaborators

use fault_injector::analysis::{AnalysisClient, AnalysisError, AnalysisRequest, Analyzer};
use fault_injector::catalog::ExperimentCatalog;
use fault_injector::config::ParamForm;
use fault_injector::engine::{ExecutionEngine, ScriptedInjector};
use fault_injector::report::ReportWriter;
use fault_injector::types::*;
use fault_injector::workflow::{StageKind, WorkflowController, WorkflowError};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Answers with fixed text, or fails when `text` is None; counts calls.
struct CountingAnalyzer {
    text: Option<&'static str>,
    calls: AtomicUsize,
}

impl CountingAnalyzer {
    fn new(text: Option<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            text,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Analyzer for CountingAnalyzer {
    fn analyze(&self, _request: &AnalysisRequest) -> Result<String, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.text
            .map(str::to_string)
            .ok_or_else(|| AnalysisError::NotConfigured("test analyzer has no answer".into()))
    }
}

/// Blocks each call until the test hands it an answer.
struct GatedAnalyzer {
    answers: Mutex<Receiver<String>>,
    completed: AtomicUsize,
}

impl GatedAnalyzer {
    fn new() -> (Arc<Self>, Sender<String>) {
        let (tx, rx) = mpsc::channel();
        let analyzer = Arc::new(Self {
            answers: Mutex::new(rx),
            completed: AtomicUsize::new(0),
        });
        (analyzer, tx)
    }
}

impl Analyzer for GatedAnalyzer {
    fn analyze(&self, _request: &AnalysisRequest) -> Result<String, AnalysisError> {
        let answer = self
            .answers
            .lock()
            .map_err(|_| AnalysisError::Malformed("poisoned".into()))?
            .recv()
            .map_err(|_| AnalysisError::Malformed("no answer".into()))?;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(answer)
    }
}

fn controller(
    output: &Path,
    injector: &ScriptedInjector,
    analyzer: Arc<dyn Analyzer>,
) -> WorkflowController {
    WorkflowController::new(
        ExperimentCatalog::builtin(),
        ExecutionEngine::new(Arc::new(injector.clone())).with_poll_interval(Duration::from_millis(2)),
        AnalysisClient::new(analyzer),
        ReportWriter::new(output),
    )
}

fn index_of(kind: ExperimentKind, action: FaultAction) -> usize {
    ExperimentCatalog::builtin().index_of(kind, action).unwrap()
}

fn form_for(kind: ExperimentKind, action: FaultAction) -> ParamForm {
    let definition = ExperimentCatalog::builtin().find(kind, action).unwrap();
    ParamForm::for_definition(definition)
}

fn pump_until(ctl: &mut WorkflowController, done: impl Fn(&WorkflowController) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done(ctl) {
        assert!(
            Instant::now() < deadline,
            "timed out waiting in stage {}",
            ctl.stage_kind()
        );
        ctl.drain_events();
        thread::sleep(Duration::from_millis(2));
    }
}

fn prepare_pod_kill(ctl: &mut WorkflowController, target: &str) {
    ctl.select(index_of(ExperimentKind::PodFault, FaultAction::Kill))
        .unwrap();
    ctl.submit(form_for(ExperimentKind::PodFault, FaultAction::Kill).with_target(target))
        .unwrap();
    assert_eq!(ctl.stage_kind(), StageKind::Confirm);
}

#[test]
fn test_pod_kill_run_is_analyzed_and_saved() {
    let dir = TempDir::new().unwrap();
    let injector = ScriptedInjector::new([
        "pod svc-a-7d9f killed",
        "replacement pod scheduled",
        "replacement pod ready",
    ]);
    let analyzer = CountingAnalyzer::new(Some("No impact detected"));
    let mut ctl = controller(dir.path(), &injector, analyzer.clone());

    prepare_pod_kill(&mut ctl, "svc-a");
    ctl.confirm().unwrap();
    assert_eq!(ctl.stage_kind(), StageKind::Monitor);

    pump_until(&mut ctl, |ctl| {
        ctl.current_run()
            .map(|run| run.analysis().text().is_some())
            .unwrap_or(false)
    });
    assert_eq!(ctl.stage_kind(), StageKind::Report);
    let run = ctl.current_run().unwrap();
    assert_eq!(run.status(), RunStatus::Succeeded);
    assert_eq!(run.display_lines().len(), 3);
    assert_eq!(analyzer.calls(), 1);

    let path = ctl.save_report().unwrap();
    assert!(path.starts_with(dir.path()));
    let saved = fs::read_to_string(&path).unwrap();
    for line in [
        "pod svc-a-7d9f killed",
        "replacement pod scheduled",
        "replacement pod ready",
    ] {
        assert!(saved.contains(line), "report is missing {:?}", line);
    }
    assert!(saved.contains("No impact detected"));
    assert!(ctl.notice().unwrap().contains("Report saved"));
}

#[test]
fn test_abort_moves_to_report_without_fabricated_analysis() {
    let dir = TempDir::new().unwrap();
    let injector =
        ScriptedInjector::new(["delay injected on eth0", "never delivered"]).pause_after(1);
    let analyzer = CountingAnalyzer::new(None);
    let mut ctl = controller(dir.path(), &injector, analyzer.clone());

    ctl.select(index_of(ExperimentKind::NetworkFault, FaultAction::Delay))
        .unwrap();
    ctl.submit(
        form_for(ExperimentKind::NetworkFault, FaultAction::Delay)
            .with_target("svc-b")
            .with(DURATION_PARAM, "5s"),
    )
    .unwrap();
    ctl.confirm().unwrap();

    pump_until(&mut ctl, |ctl| {
        ctl.current_run()
            .map(|run| run.display_lines().len() == 1)
            .unwrap_or(false)
    });
    assert!(ctl.abort().unwrap());
    assert_eq!(ctl.stage_kind(), StageKind::Report);

    let run = ctl.current_run().unwrap();
    assert_eq!(run.status(), RunStatus::Aborted);
    assert_eq!(run.display_lines(), ["delay injected on eth0".to_string()]);
    assert!(matches!(
        run.analysis(),
        AnalysisResult::Pending | AnalysisResult::Failed(_)
    ));

    pump_until(&mut ctl, |ctl| {
        !ctl.current_run().unwrap().analysis().is_pending()
    });
    let run = ctl.current_run().unwrap();
    assert!(matches!(run.analysis(), AnalysisResult::Failed(_)));
    assert_eq!(run.handle().log_len(), 1);
    assert_eq!(analyzer.calls(), 1);

    let deadline = Instant::now() + Duration::from_secs(5);
    while injector.stops() == 0 {
        assert!(Instant::now() < deadline, "aborted fault was never stopped");
        thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(injector.stops(), 1);
}

#[test]
fn test_cancel_never_launches_or_analyzes() {
    let dir = TempDir::new().unwrap();
    let injector = ScriptedInjector::new(["should not run"]);
    let analyzer = CountingAnalyzer::new(Some("unused"));
    let mut ctl = controller(dir.path(), &injector, analyzer.clone());

    prepare_pod_kill(&mut ctl, "svc-a");
    ctl.cancel().unwrap();
    assert_eq!(ctl.stage_kind(), StageKind::Configure);
    assert!(ctl.current_run().is_none());

    thread::sleep(Duration::from_millis(20));
    assert_eq!(ctl.drain_events(), 0);
    assert_eq!(injector.launches(), 0);
    assert_eq!(analyzer.calls(), 0);
}

#[test]
fn test_injector_is_only_reached_through_confirm() {
    let dir = TempDir::new().unwrap();
    let injector = ScriptedInjector::new(["ok"]);
    let mut ctl = controller(dir.path(), &injector, CountingAnalyzer::new(Some("fine")));

    assert!(matches!(
        ctl.confirm(),
        Err(WorkflowError::InvalidTransition { .. })
    ));
    ctl.select(index_of(ExperimentKind::StressFault, FaultAction::Cpu))
        .unwrap();
    assert!(ctl.confirm().is_err());
    assert!(ctl.abort().is_err());
    assert!(ctl.save_report().is_err());
    assert!(ctl.new_experiment().is_err());
    ctl.back().unwrap();
    ctl.select(index_of(ExperimentKind::PodFault, FaultAction::Kill))
        .unwrap();
    assert_eq!(ctl.stage_kind(), StageKind::Configure);
    assert_eq!(injector.launches(), 0);

    let bad = form_for(ExperimentKind::PodFault, FaultAction::Kill).with_target("");
    assert!(matches!(ctl.submit(bad), Err(WorkflowError::Validation(_))));
    assert_eq!(ctl.stage_kind(), StageKind::Configure);
    assert_eq!(injector.launches(), 0);

    ctl.submit(form_for(ExperimentKind::PodFault, FaultAction::Kill).with_target("svc-a"))
        .unwrap();
    assert_eq!(injector.launches(), 0);
    let run_id = ctl.confirm().unwrap();
    assert_eq!(injector.launches(), 1);
    assert!(ctl.confirm().is_err());
    assert_eq!(ctl.current_run().unwrap().run_id(), run_id);

    pump_until(&mut ctl, |ctl| ctl.stage_kind() == StageKind::Report);
    assert_eq!(injector.launches(), 1);
}

#[test]
fn test_late_analysis_for_previous_run_is_discarded() {
    let dir = TempDir::new().unwrap();
    let injector = ScriptedInjector::new(["line"]);
    let (analyzer, answers) = GatedAnalyzer::new();
    let mut ctl = controller(dir.path(), &injector, analyzer.clone());

    prepare_pod_kill(&mut ctl, "svc-a");
    let first = ctl.confirm().unwrap();
    pump_until(&mut ctl, |ctl| ctl.stage_kind() == StageKind::Report);
    ctl.new_experiment().unwrap();

    prepare_pod_kill(&mut ctl, "svc-b");
    let second = ctl.confirm().unwrap();
    assert_ne!(first, second);
    pump_until(&mut ctl, |ctl| ctl.stage_kind() == StageKind::Report);

    answers.send("stale analysis".to_string()).unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while analyzer.completed.load(Ordering::SeqCst) < 1 {
        assert!(Instant::now() < deadline);
        thread::sleep(Duration::from_millis(2));
    }
    thread::sleep(Duration::from_millis(50));
    ctl.drain_events();
    assert!(ctl.current_run().unwrap().analysis().is_pending());

    answers.send("fresh analysis".to_string()).unwrap();
    pump_until(&mut ctl, |ctl| {
        !ctl.current_run().unwrap().analysis().is_pending()
    });
    assert_eq!(
        ctl.current_run().unwrap().analysis(),
        &AnalysisResult::Ready("fresh analysis".to_string())
    );
}

#[test]
fn test_save_failure_keeps_report_stage() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-directory");
    fs::write(&blocker, "occupied").unwrap();

    let injector = ScriptedInjector::new(["line"]);
    let mut ctl = controller(&blocker, &injector, CountingAnalyzer::new(None));
    prepare_pod_kill(&mut ctl, "svc-a");
    ctl.confirm().unwrap();
    pump_until(&mut ctl, |ctl| ctl.stage_kind() == StageKind::Report);

    assert!(matches!(ctl.save_report(), Err(WorkflowError::Persist(_))));
    assert_eq!(ctl.stage_kind(), StageKind::Report);
    assert!(ctl.current_run().unwrap().saved_reports().is_empty());
    assert!(ctl.notice().unwrap().contains("Could not save report"));
    assert_eq!(fs::read_to_string(&blocker).unwrap(), "occupied");
}
