// SPDX-License-Identifier: PMPL-1.0-or-later

//! Natural-language analysis of a finished run
//!
//! The call runs on its own thread and reports back through the controller's
//! event channel, tagged with the run id it was made for.

use crate::engine::RunSnapshot;
use crate::events::RunEvent;
use crate::settings::AnalysisSettings;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Logs beyond this many trailing lines are elided from the prompt.
const MAX_PROMPT_LINES: usize = 400;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis service not configured: {0}")]
    NotConfigured(String),
    #[error("request to analysis service failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("analysis service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed analysis response: {0}")]
    Malformed(String),
}

/// Everything the service is told about a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub kind: ExperimentKind,
    pub action: FaultAction,
    pub target: String,
    pub duration: Option<Duration>,
    pub status: RunStatus,
    pub parameters: Vec<(String, String)>,
    pub logs: Vec<String>,
}

impl AnalysisRequest {
    pub fn from_snapshot(snapshot: &RunSnapshot) -> Self {
        let request = &snapshot.request;
        Self {
            kind: request.kind(),
            action: request.action(),
            target: request.target().to_string(),
            duration: request.duration(),
            status: snapshot.status,
            parameters: request
                .parameters()
                .iter()
                .map(|(name, value)| (name.clone(), value.to_string()))
                .collect(),
            logs: snapshot.lines.clone(),
        }
    }

    pub fn prompt(&self) -> String {
        let mut out = String::new();
        out.push_str(
            "You are reviewing the output of a chaos engineering experiment. \
             Summarize what happened, whether the target showed any impact, \
             and what the operator should check next. Be concise.\n\n",
        );
        out.push_str(&format!("Experiment: {} / {}\n", self.kind.label(), self.action.slug()));
        out.push_str(&format!("Target: {}\n", self.target));
        out.push_str(&format!(
            "Duration: {}\n",
            self.duration
                .map(format_duration)
                .unwrap_or_else(|| "none".to_string())
        ));
        out.push_str(&format!("Final status: {}\n", self.status));
        for (name, value) in &self.parameters {
            out.push_str(&format!("Parameter {}: {}\n", name, value));
        }

        out.push_str("\nExecution log:\n");
        let skipped = self.logs.len().saturating_sub(MAX_PROMPT_LINES);
        if skipped > 0 {
            out.push_str(&format!("[{} earlier lines omitted]\n", skipped));
        }
        for line in &self.logs[skipped..] {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

/// External text-generation service
pub trait Analyzer: Send + Sync {
    fn analyze(&self, request: &AnalysisRequest) -> Result<String, AnalysisError>;
}

/// Dispatches at most one analysis per call site onto a background thread.
#[derive(Clone)]
pub struct AnalysisClient {
    analyzer: Arc<dyn Analyzer>,
}

impl AnalysisClient {
    pub fn new(analyzer: Arc<dyn Analyzer>) -> Self {
        Self { analyzer }
    }

    /// Run the analysis synchronously and fold errors into `Failed`.
    pub fn analyze(&self, request: &AnalysisRequest) -> AnalysisResult {
        match self.analyzer.analyze(request) {
            Ok(text) if !text.trim().is_empty() => AnalysisResult::Ready(text.trim().to_string()),
            Ok(_) => AnalysisResult::Failed("analysis service returned no text".to_string()),
            Err(err) => AnalysisResult::Failed(err.to_string()),
        }
    }

    /// Fire and forget: the result arrives later as `RunEvent::Analysis`.
    pub fn dispatch(&self, run_id: RunId, request: AnalysisRequest, events: Sender<RunEvent>) {
        let client = self.clone();
        let fallback = events.clone();
        let spawned = thread::Builder::new()
            .name(format!("analysis-{}", run_id))
            .spawn(move || {
                let result = client.analyze(&request);
                match &result {
                    AnalysisResult::Ready(_) => info!(run_id = %run_id, "analysis ready"),
                    AnalysisResult::Failed(reason) => {
                        warn!(run_id = %run_id, reason = %reason, "analysis failed")
                    }
                    AnalysisResult::Pending => {}
                }
                let _ = events.send(RunEvent::Analysis { run_id, result });
            });
        if let Err(err) = spawned {
            let _ = fallback.send(RunEvent::Analysis {
                run_id,
                result: AnalysisResult::Failed(format!("could not start analysis: {}", err)),
            });
        }
    }
}

/// Used when no credentials are available; every call fails with the reason.
#[derive(Debug, Clone)]
pub struct OfflineAnalyzer {
    reason: String,
}

impl OfflineAnalyzer {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Analyzer for OfflineAnalyzer {
    fn analyze(&self, _request: &AnalysisRequest) -> Result<String, AnalysisError> {
        Err(AnalysisError::NotConfigured(self.reason.clone()))
    }
}

#[derive(Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Client for an Anthropic-style `/v1/messages` endpoint
pub struct MessagesAnalyzer {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
    api_key: String,
}

impl MessagesAnalyzer {
    pub fn new(settings: &AnalysisSettings, api_key: String) -> Result<Self, AnalysisError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(concat!("fault-injector/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            api_key,
        })
    }

    /// Real client when the key variable is set, otherwise an offline stand-in.
    pub fn from_env(settings: &AnalysisSettings) -> Arc<dyn Analyzer> {
        match env::var(&settings.api_key_env) {
            Ok(key) if !key.trim().is_empty() => match Self::new(settings, key.trim().to_string())
            {
                Ok(analyzer) => Arc::new(analyzer),
                Err(err) => Arc::new(OfflineAnalyzer::new(err.to_string())),
            },
            _ => Arc::new(OfflineAnalyzer::new(format!(
                "set {} to enable AI analysis",
                settings.api_key_env
            ))),
        }
    }
}

impl Analyzer for MessagesAnalyzer {
    fn analyze(&self, request: &AnalysisRequest) -> Result<String, AnalysisError> {
        let body = MessagesBody {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![Message {
                role: "user",
                content: request.prompt(),
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AnalysisError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: MessagesResponse = response
            .json()
            .map_err(|err| AnalysisError::Malformed(err.to_string()))?;
        extract_text(payload)
    }
}

fn extract_text(payload: MessagesResponse) -> Result<String, AnalysisError> {
    let text: Vec<String> = payload
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .collect();
    if text.is_empty() {
        return Err(AnalysisError::Malformed("no text blocks in response".to_string()));
    }
    Ok(text.join("\n"))
}
