// SPDX-License-Identifier: PMPL-1.0-or-later

//! Screen layout for each workflow stage

use super::App;
use crate::config::TARGET_FIELD;
use crate::manifest;
use crate::types::*;
use crate::workflow::{ActiveRun, Stage};
use colored::*;

pub(super) fn screen(app: &App, width: usize, height: usize) -> Vec<String> {
    let controller = app.controller();
    let mut lines = vec![
        format!(
            "{} {}",
            "FAULT INJECTOR".bold().cyan(),
            format!("[{} | {}]", controller.stage_kind(), controller.injector_description()).dimmed()
        ),
        String::new(),
    ];

    // The risk of the pending action is never cut to make room for the body.
    let pinned = match controller.stage() {
        Stage::Confirm { request, .. } => risk_block(request.definition().risk_summary, width),
        _ => Vec::new(),
    };

    let body_height = height.saturating_sub(lines.len() + pinned.len() + 3);
    let body = match controller.stage() {
        Stage::Select => select_screen(app),
        Stage::Configure { .. } => configure_screen(app),
        Stage::Confirm { request, .. } => confirm_screen(request, width),
        Stage::Monitor { run } => monitor_screen(run, body_height),
        Stage::Report { run } => report_screen(run, width),
    };
    lines.extend(body.into_iter().take(body_height));
    lines.extend(pinned);

    lines.push(String::new());
    if let Some(message) = app.message.as_deref() {
        lines.push(message.yellow().to_string());
    } else if let Some(notice) = controller.notice() {
        lines.push(notice.green().to_string());
    }
    lines.push(controls(app).dimmed().to_string());
    lines
}

fn controls(app: &App) -> &'static str {
    match app.controller().stage() {
        Stage::Select => "[Up/Down] Move  [Enter] Configure  [?] Help  [q] Quit",
        Stage::Configure { .. } => "[Tab] Next field  [Type] Edit  [Enter] Review  [Esc] Back",
        Stage::Confirm { .. } => "[y] Launch experiment  [n/Esc] Back to parameters",
        Stage::Monitor { .. } => "[a] Abort  [Ctrl+C] Abort and quit",
        Stage::Report { .. } => "[s] Save report  [n] New experiment  [q] Quit",
    }
}

fn select_screen(app: &App) -> Vec<String> {
    let catalog = app.controller().catalog();
    let mut lines = vec!["Select an experiment:".bold().to_string()];
    for (idx, definition) in catalog.definitions().iter().enumerate() {
        let indicator = if idx == app.cursor {
            "➤".green()
        } else {
            " ".normal()
        };
        lines.push(format!(
            "{} {:28} {}",
            indicator,
            definition.name(),
            definition.description.dimmed()
        ));
    }

    if app.show_help {
        if let Some(definition) = catalog.get(app.cursor) {
            lines.push(String::new());
            lines.push(format!("{} {}", "Help:".bold(), definition.name()));
            lines.push(format!("  Affects: {}", definition.target));
            lines.push(format!("  Risk: {}", definition.risk_summary));
            lines.push(format!("  {:16} text (Kubernetes label value, required)", TARGET_FIELD));
            for spec in definition.parameters {
                let default = spec
                    .default
                    .map(|value| format!(" [default {}]", value))
                    .unwrap_or_default();
                let required = if spec.required { " (required)" } else { "" };
                lines.push(format!(
                    "  {:16} {}{}{} {}",
                    spec.name,
                    spec.param_type.describe(),
                    default,
                    required,
                    spec.help.dimmed()
                ));
            }
        }
    }
    lines
}

fn configure_screen(app: &App) -> Vec<String> {
    let Stage::Configure {
        definition, errors, ..
    } = app.controller().stage()
    else {
        return Vec::new();
    };
    let Some(draft) = app.draft.as_ref() else {
        return Vec::new();
    };

    let mut lines = vec![
        format!("{} {}", "Configure".bold(), definition.name().bold().cyan()),
        format!("  {}", definition.description.dimmed()),
        String::new(),
    ];
    for (idx, field) in draft.fields.iter().enumerate() {
        let focused = idx == draft.focus;
        let value = draft.form.field(field);
        let cursor = if focused { "_" } else { "" };
        let indicator = if focused { "➤".green() } else { " ".normal() };
        lines.push(format!("{} {:16} {}{}", indicator, field, value, cursor));

        if let Some(error) = errors.as_ref().and_then(|errors| errors.for_field(field)) {
            lines.push(format!("    {}", error.message.red()));
        } else if focused {
            if let Some(spec) = definition.param(field) {
                lines.push(format!("    {}", spec.help.dimmed()));
            }
        }
    }

    if let Some(errors) = errors {
        let unknown: Vec<_> = errors
            .errors
            .iter()
            .filter(|error| !draft.fields.iter().any(|field| *field == error.field))
            .collect();
        for error in unknown {
            lines.push(error.to_string().red().to_string());
        }
    }
    lines
}

fn confirm_screen(request: &ExperimentRequest, width: usize) -> Vec<String> {
    let definition = request.definition();
    let mut lines = vec![
        "Review before launch".bold().yellow().to_string(),
        format!("  Experiment: {}", definition.name().bold()),
        format!("  Target:     {}", request.target()),
        format!("  Affects:    {}", definition.describe_target(request.target())),
        format!(
            "  Duration:   {}",
            request
                .duration()
                .map(format_duration)
                .unwrap_or_else(|| "none (one-shot)".to_string())
        ),
    ];
    for (name, value) in request.parameters() {
        lines.push(format!("  {:11} {}", format!("{}:", name), value));
    }
    lines.push(String::new());
    lines.push("Manifest:".bold().to_string());
    match manifest::render(request) {
        Ok(yaml) => lines.extend(yaml.lines().map(|line| format!("  {}", truncate(line, width)))),
        Err(err) => lines.push(format!("  {}", format!("{:#}", err).red())),
    }
    lines
}

/// Risk text wrapped to the terminal, shown right above the launch prompt.
fn risk_block(risk: &str, width: usize) -> Vec<String> {
    const LABEL: &str = "RISK:";
    wrap(risk, width.saturating_sub(LABEL.len() + 2))
        .into_iter()
        .enumerate()
        .map(|(idx, line)| {
            if idx == 0 {
                format!("{} {}", LABEL.red().bold(), line)
            } else {
                format!("{:pad$} {}", "", line, pad = LABEL.len())
            }
        })
        .collect()
}

fn monitor_screen(run: &ActiveRun, height: usize) -> Vec<String> {
    let request = run.handle().request();
    let mut lines = vec![
        format!("{} {}", "Running".bold(), request.summary()),
        format!("  {} {}  lines {}", run.run_id(), status_label(run.status()), run.display_lines().len()),
        String::new(),
    ];
    let room = height.saturating_sub(lines.len());
    let shown = run.display_lines();
    let skip = shown.len().saturating_sub(room);
    lines.extend(shown[skip..].iter().map(|line| format!("  {}", line)));
    lines
}

fn report_screen(run: &ActiveRun, width: usize) -> Vec<String> {
    let request = run.handle().request();
    let mut lines = vec![
        format!("{} {}", "Result".bold(), request.summary()),
        format!(
            "  {} {}  {} log lines",
            run.run_id(),
            status_label(run.status()),
            run.display_lines().len()
        ),
        String::new(),
        "AI analysis:".bold().to_string(),
    ];
    match run.analysis() {
        AnalysisResult::Pending => lines.push("  pending...".dimmed().to_string()),
        AnalysisResult::Failed(reason) => {
            lines.push(format!("  {} {}", "unavailable:".red(), reason))
        }
        AnalysisResult::Ready(text) => {
            for paragraph in text.lines() {
                lines.extend(wrap(paragraph, width.saturating_sub(2)).into_iter().map(|l| format!("  {}", l)));
            }
        }
    }

    if !run.saved_reports().is_empty() {
        lines.push(String::new());
        lines.push("Saved reports:".bold().to_string());
        for path in run.saved_reports() {
            lines.push(format!("  {}", path.display()));
        }
    }

    lines.push(String::new());
    lines.push("Last log lines:".bold().to_string());
    let shown = run.display_lines();
    let skip = shown.len().saturating_sub(8);
    lines.extend(shown[skip..].iter().map(|line| format!("  {}", line)));
    lines
}

fn status_label(status: RunStatus) -> ColoredString {
    match status {
        RunStatus::Pending | RunStatus::Running => status.label().yellow(),
        RunStatus::Succeeded => status.label().green(),
        RunStatus::Failed => status.label().red(),
        RunStatus::Aborted => status.label().magenta(),
    }
}

fn truncate(line: &str, width: usize) -> String {
    line.chars().take(width.saturating_sub(2)).collect()
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(10);
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisClient, OfflineAnalyzer};
    use crate::catalog::ExperimentCatalog;
    use crate::engine::{ExecutionEngine, ScriptedInjector};
    use crate::report::ReportWriter;
    use crate::workflow::{StageKind, WorkflowController};
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Drop SGR escape sequences so widths count visible characters.
    fn visible(line: &str) -> String {
        let mut out = String::new();
        let mut chars = line.chars();
        while let Some(c) = chars.next() {
            if c == '\u{1b}' {
                for next in chars.by_ref() {
                    if next == 'm' {
                        break;
                    }
                }
            } else {
                out.push(c);
            }
        }
        out
    }

    fn confirm_app(dir: &TempDir) -> App {
        let mut app = App::new(WorkflowController::new(
            ExperimentCatalog::builtin(),
            ExecutionEngine::new(Arc::new(ScriptedInjector::new(["one"]))),
            AnalysisClient::new(Arc::new(OfflineAnalyzer::new("offline"))),
            ReportWriter::new(dir.path()),
        ));
        app.handle_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE));
        for c in "svc-a".chars() {
            app.handle_key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE));
        }
        app.handle_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE));
        assert_eq!(app.controller().stage_kind(), StageKind::Confirm);
        app
    }

    #[test]
    fn test_confirm_shows_whole_risk_within_width() {
        let dir = TempDir::new().unwrap();
        let app = confirm_app(&dir);
        let risk = ExperimentCatalog::builtin().definitions()[0].risk_summary;
        let expected = risk.split_whitespace().collect::<Vec<_>>().join(" ");

        for (width, height) in [(80, 24), (80, 10), (120, 50)] {
            let rows: Vec<String> = app.view(width, height).iter().map(|row| visible(row)).collect();
            for row in &rows {
                assert!(
                    row.chars().count() <= width,
                    "{}x{} row is {} wide: {}",
                    width,
                    height,
                    row.chars().count(),
                    row
                );
            }

            let start = rows
                .iter()
                .position(|row| row.starts_with("RISK:"))
                .unwrap_or_else(|| panic!("{}x{} has no risk line", width, height));
            let shown = rows[start..]
                .iter()
                .flat_map(|row| row.split_whitespace())
                .skip(1)
                .collect::<Vec<_>>()
                .join(" ");
            assert!(shown.starts_with(&expected), "{}x{} risk cut: {}", width, height, shown);
        }
    }

    #[test]
    fn test_confirm_keeps_height_at_minimum() {
        let dir = TempDir::new().unwrap();
        let app = confirm_app(&dir);
        assert!(app.view(80, 10).len() <= 10);
    }

    #[test]
    fn test_wrap_respects_width() {
        let wrapped = wrap("alpha beta gamma delta epsilon", 11);
        assert_eq!(wrapped, vec!["alpha beta", "gamma delta", "epsilon"]);
        assert_eq!(wrap("", 20), vec![String::new()]);
    }
}
