// SPDX-License-Identifier: PMPL-1.0-or-later

//! `fault-injector doctor`

use crate::catalog::ExperimentCatalog;
use crate::report::REPORT_PREFIX;
use crate::settings::Settings;
use anyhow::{anyhow, Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub fn run_self_diagnostics(settings: &Settings, config_path: Option<&Path>) -> Result<()> {
    println!("fault-injector self-diagnostics");

    let checks = collect(settings, config_path);
    println!();
    for entry in &checks {
        entry.print();
    }

    if checks.iter().any(|entry| entry.level == Level::Error) {
        Err(anyhow!("self-diagnostics reported issues"))
    } else {
        Ok(())
    }
}

fn collect(settings: &Settings, config_path: Option<&Path>) -> Vec<Diagnostic> {
    let mut checks = Vec::new();
    checks.push(Diagnostic::ok(
        "version",
        format!("fault-injector {}", env!("CARGO_PKG_VERSION")),
    ));
    checks.push(match config_path {
        Some(path) => Diagnostic::ok("settings", format!("loaded from {}", path.display())),
        None => Diagnostic::ok("settings", "built-in defaults".to_string()),
    });
    checks.push(Diagnostic::ok(
        "catalog",
        format!("{} experiments", ExperimentCatalog::builtin().len()),
    ));
    checks.push(if settings.dry_run {
        Diagnostic::ok("mode", "dry-run (no cluster changes)".to_string())
    } else {
        Diagnostic::warning("mode", "live: confirmed experiments modify the cluster".to_string())
    });

    checks.push(check_reports(&settings.output_dir));
    checks.push(check_kubectl(&settings.kubectl, settings.dry_run));
    checks.push(check_api_key(&settings.analysis.api_key_env));
    checks
}

#[derive(Debug, PartialEq, Eq)]
enum Level {
    Ok,
    Warn,
    Error,
}

impl Level {
    fn tag(&self) -> &'static str {
        match self {
            Level::Ok => "OK",
            Level::Warn => "WARN",
            Level::Error => "ERR",
        }
    }
}

#[derive(Debug)]
struct Diagnostic {
    label: &'static str,
    level: Level,
    detail: String,
}

impl Diagnostic {
    fn new(label: &'static str, level: Level, detail: String) -> Self {
        Self {
            label,
            level,
            detail,
        }
    }

    fn ok(label: &'static str, detail: String) -> Self {
        Self::new(label, Level::Ok, detail)
    }

    fn warning(label: &'static str, detail: String) -> Self {
        Self::new(label, Level::Warn, detail)
    }

    fn error(label: &'static str, detail: String) -> Self {
        Self::new(label, Level::Error, detail)
    }

    fn print(&self) {
        println!("  [{}] {:18} {}", self.level.tag(), self.label, self.detail);
    }
}

fn check_reports(dir: &Path) -> Diagnostic {
    if !dir.exists() {
        return Diagnostic::warning(
            "report directory",
            format!("{} missing (created on first save)", dir.display()),
        );
    }
    if !dir.is_dir() {
        return Diagnostic::error(
            "report directory",
            format!("{} exists but is not a directory", dir.display()),
        );
    }

    let entries = fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))
        .map(|iter| {
            iter.filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_name().to_string_lossy().starts_with(REPORT_PREFIX))
                .count()
        });
    match entries {
        Ok(count) => Diagnostic::ok(
            "report directory",
            format!("{} ({} reports stored)", dir.display(), count),
        ),
        Err(err) => Diagnostic::error(
            "report directory",
            format!("unable to read {}: {:#}", dir.display(), err),
        ),
    }
}

fn check_kubectl(kubectl: &Path, dry_run: bool) -> Diagnostic {
    match find_executable(kubectl) {
        Some(path) => Diagnostic::ok("kubectl", format!("found at {}", path.display())),
        None if dry_run => Diagnostic::warning(
            "kubectl",
            format!("{} not found (only needed for live runs)", kubectl.display()),
        ),
        None => Diagnostic::error(
            "kubectl",
            format!("{} not found; live runs cannot start", kubectl.display()),
        ),
    }
}

fn check_api_key(env_key: &str) -> Diagnostic {
    match env::var(env_key) {
        Ok(value) if !value.trim().is_empty() => {
            Diagnostic::ok("AI analysis", format!("configured ({})", env_key))
        }
        _ => Diagnostic::warning(
            "AI analysis",
            format!("not configured (set {} to enable)", env_key),
        ),
    }
}

/// Resolve a bare program name against `PATH`; paths are checked directly.
fn find_executable(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 {
        return program.is_file().then(|| program.to_path_buf());
    }
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_kubectl_is_only_fatal_when_live() {
        let missing = Path::new("/definitely/not/here/kubectl");
        assert_eq!(check_kubectl(missing, true).level, Level::Warn);
        assert_eq!(check_kubectl(missing, false).level, Level::Error);
    }

    #[test]
    fn test_report_directory_counts_reports() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("chaos_report_x.md"), "x").unwrap();
        fs::write(dir.path().join("other.txt"), "x").unwrap();
        let check = check_reports(dir.path());
        assert_eq!(check.level, Level::Ok);
        assert!(check.detail.contains("1 reports"));

        let file = dir.path().join("other.txt");
        assert_eq!(check_reports(&file).level, Level::Error);
        assert_eq!(check_reports(&dir.path().join("absent")).level, Level::Warn);
    }

    #[test]
    fn test_default_settings_produce_no_errors_in_dry_run() {
        let dir = TempDir::new().unwrap();
        let settings = Settings {
            output_dir: dir.path().to_path_buf(),
            kubectl: PathBuf::from("/definitely/not/here/kubectl"),
            ..Settings::default()
        };
        let checks = collect(&settings, None);
        assert!(checks.iter().all(|check| check.level != Level::Error));
    }
}
