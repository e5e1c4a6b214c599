// SPDX-License-Identifier: PMPL-1.0-or-later

//! fault-injector: guided chaos experiments with a mandatory safety gate
//!
//! Pick an experiment, fill in its parameters, review exactly what will be
//! applied, confirm, watch it run, then keep a markdown report of the outcome.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use fault_injector::analysis::{AnalysisClient, MessagesAnalyzer};
use fault_injector::catalog::ExperimentCatalog;
use fault_injector::config::{ConfigBuilder, ParamForm};
use fault_injector::engine::{ExecutionEngine, FaultInjector, KubectlInjector, ScriptedInjector};
use fault_injector::report::{list_reports, ReportWriter};
use fault_injector::settings::Settings;
use fault_injector::types::*;
use fault_injector::workflow::WorkflowController;
use fault_injector::{diagnostics, logging, manifest, tui};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "fault-injector")]
#[command(version)]
#[command(about = "Interactive chaos experiments for Kubernetes with a confirmation gate")]
#[command(long_about = None)]
struct Cli {
    /// Settings file (YAML or JSON)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory for saved reports
    #[arg(long, global = true, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Apply experiments to the cluster instead of simulating them
    #[arg(long, global = true)]
    live: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive experiment workflow (default)
    Tui,

    /// List the experiment catalog
    List,

    /// Validate parameters and print the Chaos Mesh manifest without applying it
    Manifest {
        /// Experiment kind (pod, network, stress)
        #[arg(value_name = "KIND")]
        kind: String,

        /// Fault action (kill, failure, container-kill, delay, loss, partition, cpu, memory)
        #[arg(value_name = "ACTION")]
        action: String,

        /// Value of the target's `app` label
        #[arg(short, long)]
        target: String,

        /// Parameter override, repeatable
        #[arg(short, long = "param", value_name = "NAME=VALUE")]
        params: Vec<String>,

        /// Fault duration (e.g. 30s, 2m)
        #[arg(short, long)]
        duration: Option<String>,
    },

    /// Show the newest saved reports
    Reports {
        /// Number of reports to list
        #[arg(short, long, default_value = "10")]
        count: usize,
    },

    /// Check settings, kubectl and analysis credentials
    Doctor,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let cwd = env::current_dir().context("resolving working directory")?;
    let (mut settings, config_path) = Settings::discover(cli.config.as_deref(), &cwd)?;
    if let Some(dir) = cli.output_dir {
        settings.output_dir = dir;
    }
    if cli.live {
        settings.dry_run = false;
    }

    match cli.command.unwrap_or(Commands::Tui) {
        Commands::Tui => {
            logging::init_file(&settings.log_path())?;
            info!(
                dry_run = settings.dry_run,
                output_dir = %settings.output_dir.display(),
                "starting interactive session"
            );
            tui::run(build_controller(&settings))?;
        }

        Commands::List => {
            logging::init_stderr();
            print_catalog(&ExperimentCatalog::builtin());
        }

        Commands::Manifest {
            kind,
            action,
            target,
            params,
            duration,
        } => {
            logging::init_stderr();
            let yaml = render_manifest(&kind, &action, target, &params, duration)?;
            print!("{}", yaml);
        }

        Commands::Reports { count } => {
            logging::init_stderr();
            let reports = list_reports(&settings.output_dir, count)?;
            if reports.is_empty() {
                println!("No reports in {}", settings.output_dir.display());
            }
            for path in reports {
                println!("{}", path.display());
            }
        }

        Commands::Doctor => {
            logging::init_stderr();
            diagnostics::run_self_diagnostics(&settings, config_path.as_deref())?;
        }
    }

    Ok(())
}

fn build_controller(settings: &Settings) -> WorkflowController {
    let injector: Arc<dyn FaultInjector> = if settings.dry_run {
        Arc::new(ScriptedInjector::dry_run())
    } else {
        Arc::new(KubectlInjector::new(&settings.kubectl))
    };
    let analyzer = MessagesAnalyzer::from_env(&settings.analysis);

    WorkflowController::new(
        ExperimentCatalog::builtin(),
        ExecutionEngine::new(injector),
        AnalysisClient::new(analyzer),
        ReportWriter::new(&settings.output_dir),
    )
}

fn print_catalog(catalog: &ExperimentCatalog) {
    println!("{}", "EXPERIMENT CATALOG".bold().cyan());
    for kind in ExperimentKind::all() {
        println!();
        println!("{}", kind.label().bold().yellow());
        for definition in catalog.definitions().iter().filter(|def| def.kind == kind) {
            println!("  {:16} {}", definition.action.slug().bold(), definition.description);
            for spec in definition.parameters {
                let default = spec.default.unwrap_or("-");
                println!(
                    "    {:14} {:34} default {}",
                    spec.name,
                    spec.param_type.describe(),
                    default
                );
            }
            println!("    {} {}", "risk:".red(), definition.risk_summary);
        }
    }
}

fn render_manifest(
    kind: &str,
    action: &str,
    target: String,
    params: &[String],
    duration: Option<String>,
) -> Result<String> {
    let kind = ExperimentKind::parse(kind).ok_or_else(|| anyhow!("unknown experiment kind '{}'", kind))?;
    let action = FaultAction::parse(action).ok_or_else(|| anyhow!("unknown fault action '{}'", action))?;
    let definition = ExperimentCatalog::builtin()
        .find(kind, action)
        .ok_or_else(|| anyhow!("{} has no '{}' action", kind.label(), action.slug()))?;

    let mut form = ParamForm::for_definition(definition).with_target(target);
    for raw in params {
        let (name, value) = raw
            .split_once('=')
            .ok_or_else(|| anyhow!("parameter '{}' is not NAME=VALUE", raw))?;
        form = form.with(name.trim(), value.trim());
    }
    if let Some(bound) = duration {
        form = form.with(DURATION_PARAM, bound);
    }

    let request = ConfigBuilder::new(definition).build(&form)?;
    manifest::render(&request)
}
