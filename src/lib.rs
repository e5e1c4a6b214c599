// SPDX-License-Identifier: PMPL-1.0-or-later

//! Fault-Injector: guided chaos experiments with a safety gate.
//!
//! An operator picks an experiment from the catalog, supplies parameters,
//! reviews the exact Chaos Mesh resource about to be applied and confirms it.
//! The run's output streams into the UI, an analysis of the run is requested
//! once it ends, and the outcome can be kept as a markdown report.
//!
//! PIECES:
//! 1. **Catalog / Config**: static experiment definitions and validation of
//!    operator input into an `ExperimentRequest`.
//! 2. **Engine**: launches the fault through a `FaultInjector` and pumps its
//!    output into an `ExecutionHandle`.
//! 3. **Workflow**: the stage machine that only starts the engine after an
//!    explicit confirmation.
//! 4. **Analysis / Report**: background analysis and persisted reports.

pub mod analysis;
pub mod catalog;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod events;
pub mod logging;
pub mod manifest;
pub mod report;
pub mod settings;
pub mod tui;
pub mod types;
pub mod workflow;
