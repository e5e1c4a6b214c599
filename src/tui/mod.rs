// SPDX-License-Identifier: PMPL-1.0-or-later

//! Interactive terminal front end for the workflow controller

mod view;

use crate::config::{ParamForm, TARGET_FIELD};
use crate::workflow::{Stage, StageKind, WorkflowController, WorkflowError};
use anyhow::{bail, Result};
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{self, ClearType},
};
use std::io::{stdout, Write};
use std::time::Duration;

const TICK: Duration = Duration::from_millis(100);
/// How long quitting waits for an aborted fault to be rolled back.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

pub fn run(controller: WorkflowController) -> Result<()> {
    terminal::enable_raw_mode()?;
    let mut out = stdout();
    let mut app = App::new(controller);
    let result = execute!(out, terminal::EnterAlternateScreen, cursor::Hide)
        .map_err(anyhow::Error::from)
        .and_then(|_| run_inner(&mut out, &mut app));
    let _ = execute!(out, cursor::Show, terminal::LeaveAlternateScreen);
    terminal::disable_raw_mode()?;

    if !app.finish(SHUTDOWN_GRACE) {
        bail!(
            "an aborted experiment was still being stopped after {}s; check the cluster for leftover chaos resources",
            SHUTDOWN_GRACE.as_secs()
        );
    }
    result
}

fn run_inner(out: &mut impl Write, app: &mut App) -> Result<()> {
    loop {
        app.tick();
        let (width, height) = terminal::size()?;
        render(out, &app.view(width as usize, height as usize))?;
        if app.should_quit() {
            break;
        }

        if event::poll(TICK)? {
            if let Event::Key(key) = event::read()? {
                app.handle_key(key);
            }
        }
    }
    Ok(())
}

fn render(out: &mut impl Write, lines: &[String]) -> Result<()> {
    execute!(out, terminal::Clear(ClearType::All))?;
    for (row, line) in lines.iter().enumerate() {
        execute!(out, cursor::MoveTo(0, row as u16))?;
        write!(out, "{}", line)?;
    }
    out.flush()?;
    Ok(())
}

/// Form being edited on the Configure screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Draft {
    form: ParamForm,
    fields: Vec<&'static str>,
    focus: usize,
}

impl Draft {
    fn new(fields: Vec<&'static str>, form: ParamForm) -> Self {
        Self {
            form,
            fields,
            focus: 0,
        }
    }

    fn focused(&self) -> &'static str {
        self.fields.get(self.focus).copied().unwrap_or(TARGET_FIELD)
    }

    fn next(&mut self) {
        self.focus = (self.focus + 1) % self.fields.len().max(1);
    }

    fn previous(&mut self) {
        let len = self.fields.len().max(1);
        self.focus = (self.focus + len - 1) % len;
    }
}

/// UI state layered over the controller. The controller owns the workflow;
/// the app only owns cursors and the form being typed.
pub struct App {
    controller: WorkflowController,
    cursor: usize,
    draft: Option<Draft>,
    show_help: bool,
    message: Option<String>,
    quit: bool,
}

impl App {
    pub fn new(controller: WorkflowController) -> Self {
        let mut app = Self {
            controller,
            cursor: 0,
            draft: None,
            show_help: true,
            message: None,
            quit: false,
        };
        app.sync_draft();
        app
    }

    pub fn controller(&self) -> &WorkflowController {
        &self.controller
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    /// Wait for anything aborted or still running to be stopped before the
    /// process exits.
    pub fn finish(&mut self, grace: Duration) -> bool {
        self.controller.shutdown(grace)
    }

    /// Apply background events; called once per UI tick.
    pub fn tick(&mut self) {
        self.controller.drain_events();
        self.sync_draft();
    }

    pub fn view(&self, width: usize, height: usize) -> Vec<String> {
        view::screen(self, width.max(20), height.max(10))
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.quit_now();
            return;
        }

        let outcome = match self.controller.stage_kind() {
            StageKind::Select => self.select_key(key.code),
            StageKind::Configure => self.configure_key(key.code),
            StageKind::Confirm => self.confirm_key(key.code),
            StageKind::Monitor => self.monitor_key(key.code),
            StageKind::Report => self.report_key(key.code),
        };
        match outcome {
            Ok(()) => {}
            Err(WorkflowError::Validation(errors)) => {
                self.message = Some(format!("Fix {} field(s) before continuing", errors.errors.len()));
            }
            Err(err) => self.message = Some(err.to_string()),
        }
        self.sync_draft();
    }

    fn select_key(&mut self, code: KeyCode) -> Result<(), WorkflowError> {
        let count = self.controller.catalog().len();
        match code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.cursor = (self.cursor + count.max(1) - 1) % count.max(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.cursor = (self.cursor + 1) % count.max(1);
            }
            KeyCode::Char('?') | KeyCode::Char('h') => self.show_help = !self.show_help,
            KeyCode::Enter => {
                self.message = None;
                self.controller.select(self.cursor)?;
            }
            KeyCode::Char('q') | KeyCode::Esc => self.quit = true,
            _ => {}
        }
        Ok(())
    }

    fn configure_key(&mut self, code: KeyCode) -> Result<(), WorkflowError> {
        let Some(draft) = self.draft.as_mut() else {
            return Ok(());
        };
        match code {
            KeyCode::Tab | KeyCode::Down => draft.next(),
            KeyCode::BackTab | KeyCode::Up => draft.previous(),
            KeyCode::Backspace => {
                let field = draft.focused();
                draft.form.field_mut(field).pop();
            }
            KeyCode::Char(c) => {
                let field = draft.focused();
                draft.form.field_mut(field).push(c);
            }
            KeyCode::Enter => {
                let form = draft.form.clone();
                self.message = None;
                self.controller.submit(form)?;
            }
            KeyCode::Esc => {
                self.message = None;
                self.controller.back()?;
            }
            _ => {}
        }
        Ok(())
    }

    fn confirm_key(&mut self, code: KeyCode) -> Result<(), WorkflowError> {
        match code {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                self.message = None;
                self.controller.confirm()?;
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                self.controller.cancel()?;
            }
            _ => {}
        }
        Ok(())
    }

    fn monitor_key(&mut self, code: KeyCode) -> Result<(), WorkflowError> {
        match code {
            KeyCode::Char('a') | KeyCode::Char('A') => {
                self.controller.abort()?;
            }
            KeyCode::Char('q') | KeyCode::Esc => {
                self.message = Some("Press a to abort the running experiment first".to_string());
            }
            _ => {}
        }
        Ok(())
    }

    fn report_key(&mut self, code: KeyCode) -> Result<(), WorkflowError> {
        match code {
            KeyCode::Char('s') | KeyCode::Char('S') => {
                self.message = None;
                self.controller.save_report()?;
            }
            KeyCode::Char('n') | KeyCode::Char('N') => {
                self.message = None;
                self.controller.new_experiment()?;
            }
            KeyCode::Char('q') | KeyCode::Esc => self.quit = true,
            _ => {}
        }
        Ok(())
    }

    /// Abort anything still running, then leave.
    fn quit_now(&mut self) {
        if self.controller.stage_kind() == StageKind::Monitor {
            let _ = self.controller.abort();
        }
        self.quit = true;
    }

    /// Keep the draft in step with the Configure stage it edits.
    fn sync_draft(&mut self) {
        match self.controller.stage() {
            Stage::Configure {
                definition, form, ..
            } => {
                if self.draft.is_none() {
                    let mut fields = vec![TARGET_FIELD];
                    fields.extend(definition.parameters.iter().map(|spec| spec.name));
                    self.draft = Some(Draft::new(fields, form.clone()));
                }
            }
            _ => self.draft = None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisClient, OfflineAnalyzer};
    use crate::catalog::ExperimentCatalog;
    use crate::engine::{ExecutionEngine, ScriptedInjector};
    use crate::report::ReportWriter;
    use std::sync::Arc;
    use std::time::Instant;
    use tempfile::TempDir;

    fn app(dir: &TempDir) -> App {
        let controller = WorkflowController::new(
            ExperimentCatalog::builtin(),
            ExecutionEngine::new(Arc::new(ScriptedInjector::new(["one", "two"])))
                .with_poll_interval(Duration::from_millis(2)),
            AnalysisClient::new(Arc::new(OfflineAnalyzer::new("offline"))),
            ReportWriter::new(dir.path()),
        );
        App::new(controller)
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            app.handle_key(key(KeyCode::Char(c)));
        }
    }

    #[test]
    fn test_keyboard_walkthrough_to_report() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir);

        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.controller().stage_kind(), StageKind::Configure);
        type_text(&mut app, "svc-a");
        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.controller().stage_kind(), StageKind::Confirm);

        app.handle_key(key(KeyCode::Char('y')));
        let deadline = Instant::now() + Duration::from_secs(5);
        while app.controller().stage_kind() != StageKind::Report {
            assert!(Instant::now() < deadline);
            app.tick();
            std::thread::sleep(Duration::from_millis(2));
        }
        let screen = app.view(80, 24).join("\n");
        assert!(screen.contains("Succeeded"));

        app.handle_key(key(KeyCode::Char('s')));
        assert_eq!(app.controller().current_run().unwrap().saved_reports().len(), 1);
        app.handle_key(key(KeyCode::Char('n')));
        assert_eq!(app.controller().stage_kind(), StageKind::Select);
    }

    #[test]
    fn test_ctrl_c_waits_for_rollback_before_exit() {
        let dir = TempDir::new().unwrap();
        let injector = Arc::new(ScriptedInjector::new(["first", "second"]).pause_after(1));
        let mut app = App::new(WorkflowController::new(
            ExperimentCatalog::builtin(),
            ExecutionEngine::new(injector.clone()),
            AnalysisClient::new(Arc::new(OfflineAnalyzer::new("offline"))),
            ReportWriter::new(dir.path()),
        ));

        app.handle_key(key(KeyCode::Enter));
        type_text(&mut app, "svc-a");
        app.handle_key(key(KeyCode::Enter));
        app.handle_key(key(KeyCode::Char('y')));
        let deadline = Instant::now() + Duration::from_secs(5);
        while app.controller().current_run().unwrap().display_lines().is_empty() {
            assert!(Instant::now() < deadline);
            app.tick();
            std::thread::sleep(Duration::from_millis(2));
        }

        app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(app.should_quit());
        assert!(app.finish(Duration::from_secs(5)));
        assert_eq!(injector.stops(), 1);
    }

    #[test]
    fn test_quit_from_report_right_after_abort_waits_for_rollback() {
        let dir = TempDir::new().unwrap();
        let injector = Arc::new(ScriptedInjector::new(["first", "second"]).pause_after(1));
        let mut app = App::new(WorkflowController::new(
            ExperimentCatalog::builtin(),
            ExecutionEngine::new(injector.clone()),
            AnalysisClient::new(Arc::new(OfflineAnalyzer::new("offline"))),
            ReportWriter::new(dir.path()),
        ));

        app.handle_key(key(KeyCode::Enter));
        type_text(&mut app, "svc-a");
        app.handle_key(key(KeyCode::Enter));
        app.handle_key(key(KeyCode::Char('y')));
        app.handle_key(key(KeyCode::Char('a')));
        assert_eq!(app.controller().stage_kind(), StageKind::Report);
        app.handle_key(key(KeyCode::Char('q')));
        assert!(app.should_quit());

        assert!(app.finish(Duration::from_secs(5)));
        assert_eq!(injector.stops(), 1);
    }

    #[test]
    fn test_invalid_form_stays_on_configure() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir);
        app.handle_key(key(KeyCode::Enter));
        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.controller().stage_kind(), StageKind::Configure);
        assert!(app.message.as_deref().unwrap().contains("Fix"));
        let screen = app.view(80, 30).join("\n");
        assert!(screen.contains("target"));
    }

    #[test]
    fn test_cancel_restores_typed_input() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir);
        app.handle_key(key(KeyCode::Enter));
        type_text(&mut app, "svc-b");
        app.handle_key(key(KeyCode::Enter));
        app.handle_key(key(KeyCode::Char('n')));
        assert_eq!(app.controller().stage_kind(), StageKind::Configure);
        assert_eq!(app.draft.as_ref().unwrap().form.target, "svc-b");
    }

    #[test]
    fn test_help_toggle_and_navigation() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir);
        app.handle_key(key(KeyCode::Up));
        assert_eq!(app.cursor, app.controller().catalog().len() - 1);
        app.handle_key(key(KeyCode::Down));
        assert_eq!(app.cursor, 0);
        assert!(app.show_help);
        app.handle_key(key(KeyCode::Char('?')));
        assert!(!app.show_help);
        app.handle_key(key(KeyCode::Char('q')));
        assert!(app.should_quit());
    }
}
