// SPDX-License-Identifier: PMPL-1.0-or-later

//! Live fault injection through `kubectl` and Chaos Mesh

use super::{FaultEvent, FaultInjector, RunningFault};
use crate::manifest;
use crate::types::ExperimentRequest;
use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Applies the rendered manifest with `kubectl apply -f -`
#[derive(Debug, Clone)]
pub struct KubectlInjector {
    kubectl: PathBuf,
}

impl KubectlInjector {
    pub fn new(kubectl: impl Into<PathBuf>) -> Self {
        Self {
            kubectl: kubectl.into(),
        }
    }

    fn spawn(&self, verb: &str, manifest: &str) -> Result<Child> {
        let mut child = Command::new(&self.kubectl)
            .arg(verb)
            .arg("-f")
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to execute {}", self.kubectl.display()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(manifest.as_bytes())
                .context("writing manifest to kubectl")?;
        }
        Ok(child)
    }
}

impl FaultInjector for KubectlInjector {
    fn launch(&self, request: &ExperimentRequest) -> Result<Box<dyn RunningFault>> {
        let manifest = manifest::render(request)?;
        let mut child = self.spawn("apply", &manifest)?;

        let (tx, lines) = mpsc::channel();
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(forward_lines(stdout, "", tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(forward_lines(stderr, "[stderr] ", tx));
        }

        Ok(Box::new(KubectlRun {
            injector: self.clone(),
            manifest,
            child: Some(child),
            lines,
            readers_done: readers.is_empty(),
        }))
    }

    fn describe(&self) -> String {
        format!("{} (Chaos Mesh)", self.kubectl.display())
    }
}

fn forward_lines<R>(stream: R, prefix: &'static str, tx: mpsc::Sender<String>) -> thread::JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        for line in BufReader::new(stream).lines() {
            match line {
                Ok(line) => {
                    if tx.send(format!("{}{}", prefix, line)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    })
}

struct KubectlRun {
    injector: KubectlInjector,
    manifest: String,
    child: Option<Child>,
    lines: Receiver<String>,
    readers_done: bool,
}

impl RunningFault for KubectlRun {
    fn poll(&mut self, wait: Duration) -> FaultEvent {
        if !self.readers_done {
            match self.lines.recv_timeout(wait) {
                Ok(line) => return FaultEvent::Line(line),
                Err(RecvTimeoutError::Timeout) => return FaultEvent::Idle,
                // Both pipes closed; every line has been delivered.
                Err(RecvTimeoutError::Disconnected) => self.readers_done = true,
            }
        }

        let Some(child) = self.child.as_mut() else {
            return FaultEvent::Exited { success: false };
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                self.child = None;
                FaultEvent::Exited {
                    success: status.success(),
                }
            }
            Ok(None) => {
                thread::sleep(wait);
                FaultEvent::Idle
            }
            Err(err) => {
                warn!(error = %err, "waiting on kubectl failed");
                self.child = None;
                FaultEvent::Exited { success: false }
            }
        }
    }

    fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        // Roll the fault back; output is not delivered once a run is aborted.
        match self.injector.spawn("delete", &self.manifest) {
            Ok(mut cleanup) => {
                let status = cleanup.wait();
                debug!(status = ?status, "kubectl delete finished");
            }
            Err(err) => warn!(error = %format!("{:#}", err), "could not remove chaos resource"),
        }
    }
}

impl Drop for KubectlRun {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
