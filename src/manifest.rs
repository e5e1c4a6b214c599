// SPDX-License-Identifier: PMPL-1.0-or-later

//! Chaos Mesh manifest rendering
//!
//! Every request maps onto one `chaos-mesh.org/v1alpha1` custom resource. The
//! confirm screen shows exactly this document, and the kubectl injector applies
//! exactly this document, so what the operator approves is what runs.

use crate::types::*;
use anyhow::{Context, Result};
use serde_json::{json, Map, Value};

const API_VERSION: &str = "chaos-mesh.org/v1alpha1";
const MAX_NAME_LEN: usize = 63;

/// Deterministic resource name; also used to delete the resource on abort.
pub fn resource_name(request: &ExperimentRequest) -> String {
    let raw = format!(
        "fi-{}-{}",
        request.action().slug(),
        request.target().to_ascii_lowercase()
    );
    let mut name: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .take(MAX_NAME_LEN)
        .collect();
    while name.ends_with('-') {
        name.pop();
    }
    name
}

pub fn namespace(request: &ExperimentRequest) -> &str {
    request.text("namespace").unwrap_or("default")
}

/// The manifest as a JSON value.
pub fn build(request: &ExperimentRequest) -> Value {
    let namespace = namespace(request);
    let mode = request.text("mode").unwrap_or("one");
    let selector = json!({
        "namespaces": [namespace],
        "labelSelectors": { "app": request.target() },
    });

    let mut spec = Map::new();
    spec.insert("mode".into(), json!(mode));
    spec.insert("selector".into(), selector);

    match request.action() {
        FaultAction::Kill => {
            spec.insert("action".into(), json!("pod-kill"));
            if let Some(ParamValue::Integer(grace)) = request.param("grace-period") {
                spec.insert("gracePeriod".into(), json!(grace));
            }
        }
        FaultAction::Failure => {
            spec.insert("action".into(), json!("pod-failure"));
        }
        FaultAction::ContainerKill => {
            spec.insert("action".into(), json!("container-kill"));
            if let Some(container) = request.text("container") {
                spec.insert("containerNames".into(), json!([container]));
            }
        }
        FaultAction::Delay => {
            spec.insert("action".into(), json!("delay"));
            spec.insert(
                "delay".into(),
                json!({
                    "latency": param_string(request, "latency"),
                    "jitter": param_string(request, "jitter"),
                    "correlation": param_string(request, "correlation"),
                }),
            );
        }
        FaultAction::Loss => {
            spec.insert("action".into(), json!("loss"));
            spec.insert(
                "loss".into(),
                json!({
                    "loss": param_string(request, "loss"),
                    "correlation": param_string(request, "correlation"),
                }),
            );
        }
        FaultAction::Partition => {
            spec.insert("action".into(), json!("partition"));
            spec.insert("direction".into(), json!(request.text("direction").unwrap_or("to")));
            spec.insert(
                "target".into(),
                json!({
                    "mode": "all",
                    "selector": {
                        "namespaces": [namespace],
                        "labelSelectors": { "app": request.text("peer").unwrap_or_default() },
                    },
                }),
            );
        }
        FaultAction::Cpu => {
            spec.insert(
                "stressors".into(),
                json!({ "cpu": {
                    "workers": param_number(request, "workers"),
                    "load": param_number(request, "load"),
                }}),
            );
        }
        FaultAction::Memory => {
            spec.insert(
                "stressors".into(),
                json!({ "memory": {
                    "workers": param_number(request, "workers"),
                    "size": param_string(request, "size"),
                }}),
            );
        }
    }

    if let Some(bound) = request.duration() {
        spec.insert("duration".into(), json!(format_duration(bound)));
    }

    json!({
        "apiVersion": API_VERSION,
        "kind": request.kind().chaos_kind(),
        "metadata": {
            "name": resource_name(request),
            "namespace": namespace,
            "labels": { "app.kubernetes.io/managed-by": "fault-injector" },
        },
        "spec": Value::Object(spec),
    })
}

/// The manifest as YAML, ready for `kubectl apply -f -`.
pub fn render(request: &ExperimentRequest) -> Result<String> {
    serde_yaml::to_string(&build(request))
        .with_context(|| format!("rendering manifest for {}", request.summary()))
}

fn param_string(request: &ExperimentRequest, name: &str) -> Value {
    request
        .param(name)
        .map(|value| Value::String(value.to_string()))
        .unwrap_or(Value::Null)
}

fn param_number(request: &ExperimentRequest, name: &str) -> Value {
    match request.param(name) {
        Some(ParamValue::Integer(value)) => json!(value),
        Some(ParamValue::Percent(value)) => json!(value),
        Some(other) => Value::String(other.to_string()),
        None => Value::Null,
    }
}
