// SPDX-License-Identifier: PMPL-1.0-or-later

//! Report rendering and persistence tests

use chrono::{TimeZone, Utc};
use fault_injector::catalog::ExperimentCatalog;
use fault_injector::config::{ConfigBuilder, ParamForm};
use fault_injector::engine::{ExecutionEngine, ExecutionHandle, ScriptOutcome, ScriptedInjector};
use fault_injector::events::RunEvent;
use fault_injector::report::{list_reports, Report, ReportWriter};
use fault_injector::types::*;
use std::collections::BTreeMap;
use std::fs;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn finished_run(lines: &[&str], outcome: ScriptOutcome) -> ExecutionHandle {
    let definition = ExperimentCatalog::builtin()
        .find(ExperimentKind::PodFault, FaultAction::Kill)
        .unwrap();
    let request = ConfigBuilder::new(definition)
        .build(&ParamForm::for_definition(definition).with_target("svc-a"))
        .unwrap();
    let injector = ScriptedInjector::new(lines.iter().copied()).with_outcome(outcome);
    let engine =
        ExecutionEngine::new(Arc::new(injector)).with_poll_interval(Duration::from_millis(2));
    let (tx, rx) = mpsc::channel();
    let handle = engine.start(request, tx);
    loop {
        let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        if matches!(event, RunEvent::Finished { .. }) {
            return handle;
        }
    }
}

/// Section title -> body, keyed on `## ` headings.
fn sections(markdown: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for chunk in markdown.split("\n## ").skip(1) {
        let (title, body) = chunk.split_once('\n').unwrap_or((chunk, ""));
        out.insert(title.trim().to_string(), body.to_string());
    }
    out
}

#[test]
fn test_same_second_saves_get_distinct_files() {
    let dir = TempDir::new().unwrap();
    let writer = ReportWriter::new(dir.path().join("reports"));
    let handle = finished_run(&["one"], ScriptOutcome::Succeed);
    let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();

    let first = Report::from_run(handle.snapshot(), AnalysisResult::Pending, at);
    let second = Report::from_run(
        handle.snapshot(),
        AnalysisResult::Ready("all good".into()),
        at,
    );
    let a = writer.write(&first).unwrap();
    let b = writer.write(&second).unwrap();

    assert_ne!(a, b);
    assert_eq!(
        a.file_name().unwrap(),
        "chaos_report_pod-fault_kill_20260102_030405.md"
    );
    assert_eq!(
        b.file_name().unwrap(),
        "chaos_report_pod-fault_kill_20260102_030405_1.md"
    );
    assert!(fs::read_to_string(&a).unwrap().contains("still pending"));
    assert!(fs::read_to_string(&b).unwrap().contains("all good"));

    let leftovers: Vec<_> = fs::read_dir(dir.path().join("reports"))
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| !entry.file_name().to_string_lossy().starts_with("chaos_report_"))
        .collect();
    assert!(leftovers.is_empty(), "temporary files left behind");
}

#[test]
fn test_pending_and_ready_reports_differ_only_in_analysis() {
    let handle = finished_run(&["alpha", "beta"], ScriptOutcome::Succeed);
    let at = Utc.with_ymd_and_hms(2026, 5, 6, 7, 8, 9).unwrap();
    let pending = Report::from_run(handle.snapshot(), AnalysisResult::Pending, at).render_markdown();
    let ready = Report::from_run(
        handle.snapshot(),
        AnalysisResult::Ready("No impact detected".into()),
        at,
    )
    .render_markdown();

    let mut pending_sections = sections(&pending);
    let mut ready_sections = sections(&ready);
    let pending_analysis = pending_sections.remove("AI Analysis").unwrap();
    let ready_analysis = ready_sections.remove("AI Analysis").unwrap();

    assert_ne!(pending_analysis, ready_analysis);
    assert_eq!(pending_sections, ready_sections);
    assert_eq!(
        pending_sections.keys().collect::<Vec<_>>(),
        vec!["Metadata", "Parameters", "Raw Logs"]
    );
}

#[test]
fn test_report_content() {
    let handle = finished_run(&["boom", "```nested fence```"], ScriptOutcome::Fail);
    let report = Report::snapshot(&handle, &AnalysisResult::Failed("HTTP 503".into()));
    let markdown = report.render_markdown();

    assert!(markdown.contains("Pod-fault"));
    assert!(markdown.contains("**Status:** Failed"));
    assert!(markdown.contains("**Target:** `svc-a`"));
    assert!(markdown.contains("`mode`: `one`"));
    assert!(markdown.contains("failed (HTTP 503)"));
    assert!(markdown.contains(&report.log_digest));
    assert!(markdown.contains("````text\nboom\n```nested fence```\n````"));
}

#[test]
fn test_saved_reports_are_listed_newest_first() {
    let dir = TempDir::new().unwrap();
    let writer = ReportWriter::new(dir.path());
    let handle = finished_run(&["x"], ScriptOutcome::Succeed);

    let first = writer.save(&handle, &AnalysisResult::Pending).unwrap();
    std::thread::sleep(Duration::from_millis(20));
    let second = writer.save(&handle, &AnalysisResult::Pending).unwrap();
    assert_ne!(first, second);

    let listed = list_reports(dir.path(), 5).unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.contains(&first));
    assert!(listed.contains(&second));
    assert_eq!(list_reports(dir.path(), 1).unwrap().len(), 1);
}
