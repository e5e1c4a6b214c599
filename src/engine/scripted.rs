// SPDX-License-Identifier: PMPL-1.0-or-later

//! Scripted fault injector for dry runs and tests

use super::{FaultEvent, FaultInjector, RunningFault};
use crate::manifest;
use crate::types::*;
use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// How a scripted run ends once its lines are exhausted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOutcome {
    Succeed,
    Fail,
    /// Stay running until stopped.
    Hang,
    /// Refuse to launch with this reason.
    RefuseLaunch(String),
}

#[derive(Debug, Clone)]
enum Script {
    Fixed(Vec<String>),
    /// Narrate what a live run would do for the request.
    DryRun,
}

/// Replays lines with a fixed delay. Counts launches and stops so callers can
/// check how often the "destructive" path was entered.
#[derive(Debug, Clone)]
pub struct ScriptedInjector {
    script: Script,
    delay: Duration,
    outcome: ScriptOutcome,
    pause_after: Option<usize>,
    launches: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
}

impl ScriptedInjector {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Script::Fixed(lines.into_iter().map(Into::into).collect()),
            delay: Duration::from_millis(1),
            outcome: ScriptOutcome::Succeed,
            pause_after: None,
            launches: Arc::new(AtomicUsize::new(0)),
            stops: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Simulation used when no cluster should be touched.
    pub fn dry_run() -> Self {
        Self {
            script: Script::DryRun,
            delay: Duration::from_millis(400),
            ..Self::new(Vec::<String>::new())
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_outcome(mut self, outcome: ScriptOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Emit `count` lines, then go quiet until stopped.
    pub fn pause_after(mut self, count: usize) -> Self {
        self.pause_after = Some(count);
        self
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    fn lines_for(&self, request: &ExperimentRequest) -> Vec<String> {
        match &self.script {
            Script::Fixed(lines) => lines.clone(),
            Script::DryRun => dry_run_lines(request),
        }
    }
}

fn dry_run_lines(request: &ExperimentRequest) -> Vec<String> {
    let namespace = manifest::namespace(request);
    let resource = format!(
        "{}.chaos-mesh.org/{}",
        request.kind().chaos_kind().to_ascii_lowercase(),
        manifest::resource_name(request)
    );
    let mut lines = vec![
        format!("[dry-run] {}", request.summary()),
        format!(
            "[dry-run] affected: {}",
            request.definition().describe_target(request.target())
        ),
        format!("[dry-run] kubectl apply -n {} -f - ({})", namespace, request.kind().chaos_kind()),
        format!("[dry-run] {} created", resource),
    ];
    match request.duration() {
        Some(bound) => lines.push(format!(
            "[dry-run] fault window {} is enforced by the Chaos Mesh controller",
            format_duration(bound)
        )),
        None => lines.push("[dry-run] one-shot fault applied".to_string()),
    }
    lines.push("[dry-run] no cluster was modified".to_string());
    lines
}

impl FaultInjector for ScriptedInjector {
    fn launch(&self, request: &ExperimentRequest) -> Result<Box<dyn RunningFault>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if let ScriptOutcome::RefuseLaunch(reason) = &self.outcome {
            return Err(anyhow!("{}", reason));
        }
        Ok(Box::new(ScriptedRun {
            lines: self.lines_for(request).into(),
            emitted: 0,
            delay: self.delay,
            next_at: Instant::now() + self.delay,
            outcome: self.outcome.clone(),
            pause_after: self.pause_after,
            stops: self.stops.clone(),
        }))
    }

    fn describe(&self) -> String {
        match self.script {
            Script::DryRun => "dry-run simulation".to_string(),
            Script::Fixed(_) => "scripted".to_string(),
        }
    }
}

struct ScriptedRun {
    lines: VecDeque<String>,
    emitted: usize,
    delay: Duration,
    next_at: Instant,
    outcome: ScriptOutcome,
    pause_after: Option<usize>,
    stops: Arc<AtomicUsize>,
}

impl ScriptedRun {
    fn paused(&self) -> bool {
        self.pause_after.is_some_and(|limit| self.emitted >= limit)
    }
}

impl RunningFault for ScriptedRun {
    fn poll(&mut self, wait: Duration) -> FaultEvent {
        if self.paused() {
            thread::sleep(wait);
            return FaultEvent::Idle;
        }

        let now = Instant::now();
        if now < self.next_at {
            let remaining = self.next_at - now;
            thread::sleep(remaining.min(wait));
            if Instant::now() < self.next_at {
                return FaultEvent::Idle;
            }
        }
        self.next_at = Instant::now() + self.delay;

        if let Some(line) = self.lines.pop_front() {
            self.emitted += 1;
            return FaultEvent::Line(line);
        }
        match self.outcome {
            ScriptOutcome::Succeed => FaultEvent::Exited { success: true },
            ScriptOutcome::Fail | ScriptOutcome::RefuseLaunch(_) => {
                FaultEvent::Exited { success: false }
            }
            ScriptOutcome::Hang => {
                thread::sleep(wait);
                FaultEvent::Idle
            }
        }
    }

    fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.lines.clear();
    }
}
