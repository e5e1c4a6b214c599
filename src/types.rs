// SPDX-License-Identifier: PMPL-1.0-or-later

//! Core type definitions for fault-injector
//!
//! Catalog entries are `'static` data built at compile time; everything that
//! varies per run (requests, statuses, analysis results) is owned data that
//! the workflow controller moves between stages.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Family of fault an experiment injects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExperimentKind {
    PodFault,
    NetworkFault,
    StressFault,
}

impl ExperimentKind {
    pub fn all() -> Vec<Self> {
        vec![
            ExperimentKind::PodFault,
            ExperimentKind::NetworkFault,
            ExperimentKind::StressFault,
        ]
    }

    /// Human-readable label used on screens and in reports.
    pub fn label(&self) -> &'static str {
        match self {
            ExperimentKind::PodFault => "Pod-fault",
            ExperimentKind::NetworkFault => "Network-fault",
            ExperimentKind::StressFault => "Stress-fault",
        }
    }

    /// Lowercase token used in report file names and on the command line.
    pub fn slug(&self) -> &'static str {
        match self {
            ExperimentKind::PodFault => "pod-fault",
            ExperimentKind::NetworkFault => "network-fault",
            ExperimentKind::StressFault => "stress-fault",
        }
    }

    /// Chaos Mesh custom resource kind for this family.
    pub fn chaos_kind(&self) -> &'static str {
        match self {
            ExperimentKind::PodFault => "PodChaos",
            ExperimentKind::NetworkFault => "NetworkChaos",
            ExperimentKind::StressFault => "StressChaos",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pod" | "pod-fault" | "pod_fault" | "podchaos" => Some(ExperimentKind::PodFault),
            "network" | "network-fault" | "network_fault" | "networkchaos" => {
                Some(ExperimentKind::NetworkFault)
            }
            "stress" | "stress-fault" | "stress_fault" | "stresschaos" => {
                Some(ExperimentKind::StressFault)
            }
            _ => None,
        }
    }
}

impl fmt::Display for ExperimentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Concrete fault within a kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FaultAction {
    Kill,
    Failure,
    ContainerKill,
    Delay,
    Loss,
    Partition,
    Cpu,
    Memory,
}

impl FaultAction {
    pub fn slug(&self) -> &'static str {
        match self {
            FaultAction::Kill => "kill",
            FaultAction::Failure => "failure",
            FaultAction::ContainerKill => "container-kill",
            FaultAction::Delay => "delay",
            FaultAction::Loss => "loss",
            FaultAction::Partition => "partition",
            FaultAction::Cpu => "cpu",
            FaultAction::Memory => "memory",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "kill" | "pod-kill" => Some(FaultAction::Kill),
            "failure" | "pod-failure" => Some(FaultAction::Failure),
            "container-kill" | "container_kill" => Some(FaultAction::ContainerKill),
            "delay" | "latency" => Some(FaultAction::Delay),
            "loss" => Some(FaultAction::Loss),
            "partition" => Some(FaultAction::Partition),
            "cpu" => Some(FaultAction::Cpu),
            "memory" | "mem" => Some(FaultAction::Memory),
            _ => None,
        }
    }
}

impl fmt::Display for FaultAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Shape a parameter value must have
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Text,
    Integer { min: i64, max: i64 },
    /// Whole number in 0..=100
    Percent,
    Duration,
    Choice(&'static [&'static str]),
}

impl ParamType {
    pub fn describe(&self) -> String {
        match self {
            ParamType::Text => "text".to_string(),
            ParamType::Integer { min, max } => format!("integer {}..={}", min, max),
            ParamType::Percent => "percent 0..=100".to_string(),
            ParamType::Duration => "duration (e.g. 500ms, 30s, 2m)".to_string(),
            ParamType::Choice(options) => format!("one of {}", options.join("|")),
        }
    }
}

/// One named parameter in a definition's schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub param_type: ParamType,
    pub default: Option<&'static str>,
    pub required: bool,
    pub help: &'static str,
}

/// Parameter carrying the optional time bound of a fault
pub const DURATION_PARAM: &str = "duration";

/// Immutable catalog entry
#[derive(Debug, PartialEq, Eq)]
pub struct ExperimentDefinition {
    pub kind: ExperimentKind,
    pub action: FaultAction,
    /// Descriptor of the affected resource; `<target>` is replaced by the operator's target.
    pub target: &'static str,
    pub description: &'static str,
    pub parameters: &'static [ParamSpec],
    pub risk_summary: &'static str,
}

impl ExperimentDefinition {
    pub fn name(&self) -> String {
        format!("{}/{}", self.kind.label(), self.action.slug())
    }

    pub fn param(&self, name: &str) -> Option<&'static ParamSpec> {
        self.parameters.iter().find(|spec| spec.name == name)
    }

    pub fn describe_target(&self, target: &str) -> String {
        self.target.replace("<target>", target)
    }

    pub fn is_time_bounded(&self) -> bool {
        self.param(DURATION_PARAM).is_some()
    }
}

/// Typed, validated parameter value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Text(String),
    Integer(i64),
    Percent(u8),
    Duration(Duration),
    Choice(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Text(text) | ParamValue::Choice(text) => f.write_str(text),
            ParamValue::Integer(value) => write!(f, "{}", value),
            ParamValue::Percent(value) => write!(f, "{}", value),
            ParamValue::Duration(value) => f.write_str(&format_duration(*value)),
        }
    }
}

/// Validated instantiation of a definition. Only `ConfigBuilder` creates these.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentRequest {
    definition: &'static ExperimentDefinition,
    target: String,
    parameters: BTreeMap<String, ParamValue>,
    duration: Option<Duration>,
}

impl ExperimentRequest {
    pub(crate) fn new(
        definition: &'static ExperimentDefinition,
        target: String,
        parameters: BTreeMap<String, ParamValue>,
        duration: Option<Duration>,
    ) -> Self {
        Self {
            definition,
            target,
            parameters,
            duration,
        }
    }

    pub fn definition(&self) -> &'static ExperimentDefinition {
        self.definition
    }

    pub fn kind(&self) -> ExperimentKind {
        self.definition.kind
    }

    pub fn action(&self) -> FaultAction {
        self.definition.action
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn parameters(&self) -> &BTreeMap<String, ParamValue> {
        &self.parameters
    }

    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.parameters.get(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.parameters.get(name) {
            Some(ParamValue::Text(text)) | Some(ParamValue::Choice(text)) => Some(text),
            _ => None,
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn summary(&self) -> String {
        let bound = self
            .duration
            .map(format_duration)
            .unwrap_or_else(|| "unbounded".to_string());
        format!(
            "{} against {} ({})",
            self.definition.name(),
            self.target,
            bound
        )
    }
}

/// Identifier of one execution, unique within the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{:04}", self.0)
    }
}

/// Lifecycle of one execution. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Aborted,
}

impl RunStatus {
    fn rank(&self) -> u8 {
        match self {
            RunStatus::Pending => 0,
            RunStatus::Running => 1,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::Aborted => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank() == 2
    }

    /// Whether `self -> next` is a legal forward step.
    pub fn can_advance_to(&self, next: RunStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunStatus::Pending => "Pending",
            RunStatus::Running => "Running",
            RunStatus::Succeeded => "Succeeded",
            RunStatus::Failed => "Failed",
            RunStatus::Aborted => "Aborted",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of the external analysis call for one run
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AnalysisResult {
    #[default]
    Pending,
    Ready(String),
    Failed(String),
}

impl AnalysisResult {
    pub fn is_pending(&self) -> bool {
        matches!(self, AnalysisResult::Pending)
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            AnalysisResult::Ready(text) => Some(text),
            _ => None,
        }
    }
}

/// Render a duration the way Chaos Mesh and Go expect (`250ms`, `30s`).
pub fn format_duration(duration: Duration) -> String {
    if duration.subsec_millis() != 0 {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{}s", duration.as_secs())
    }
}

/// Parse `500ms`, `30s`, `2m`, `1h` or a bare number of seconds.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let trimmed = raw.trim().to_ascii_lowercase();
    if trimmed.is_empty() {
        return Err(anyhow!("duration cannot be empty"));
    }

    let (value_str, unit) = if let Some(rest) = trimmed.strip_suffix("ms") {
        (rest, "ms")
    } else if let Some(rest) = trimmed.strip_suffix('s') {
        (rest, "s")
    } else if let Some(rest) = trimmed.strip_suffix('m') {
        (rest, "m")
    } else if let Some(rest) = trimmed.strip_suffix('h') {
        (rest, "h")
    } else {
        (trimmed.as_str(), "s")
    };

    let value: f64 = value_str
        .trim()
        .parse()
        .with_context(|| format!("invalid duration '{}'", raw))?;
    if !value.is_finite() || value.is_sign_negative() {
        return Err(anyhow!("duration must be a non-negative number: {}", raw));
    }

    let millis = match unit {
        "ms" => value,
        "m" => value * 60_000.0,
        "h" => value * 3_600_000.0,
        _ => value * 1000.0,
    };
    Ok(Duration::from_millis(millis.round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_only_moves_forward() {
        assert!(RunStatus::Pending.can_advance_to(RunStatus::Running));
        assert!(RunStatus::Pending.can_advance_to(RunStatus::Failed));
        assert!(RunStatus::Running.can_advance_to(RunStatus::Aborted));
        assert!(!RunStatus::Running.can_advance_to(RunStatus::Pending));
        assert!(!RunStatus::Running.can_advance_to(RunStatus::Running));
        assert!(!RunStatus::Succeeded.can_advance_to(RunStatus::Failed));
        assert!(!RunStatus::Aborted.can_advance_to(RunStatus::Succeeded));
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration(" 7 ").unwrap(), Duration::from_secs(7));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("-3s").is_err());
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_format_duration_is_go_compatible() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_duration(Duration::from_millis(10)), "10ms");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }

    #[test]
    fn test_kind_and_action_parse_aliases() {
        assert_eq!(ExperimentKind::parse("Pod"), Some(ExperimentKind::PodFault));
        assert_eq!(
            ExperimentKind::parse("network-fault"),
            Some(ExperimentKind::NetworkFault)
        );
        assert_eq!(FaultAction::parse("latency"), Some(FaultAction::Delay));
        assert_eq!(FaultAction::parse("explode"), None);
    }
}
