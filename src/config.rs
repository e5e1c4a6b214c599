// SPDX-License-Identifier: PMPL-1.0-or-later

//! Operator input validation: raw strings in, `ExperimentRequest` out.

use crate::types::*;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Field name used for the target in forms and errors.
pub const TARGET_FIELD: &str = "target";

const MAX_LABEL_LEN: usize = 63;

fn label_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9]([-A-Za-z0-9_.]*[A-Za-z0-9])?$").expect("static label regex")
    })
}

/// Raw operator input for one definition, exactly as typed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParamForm {
    pub target: String,
    pub values: BTreeMap<String, String>,
}

impl ParamForm {
    /// Empty target, every parameter prefilled with its default.
    pub fn for_definition(definition: &ExperimentDefinition) -> Self {
        let values = definition
            .parameters
            .iter()
            .map(|spec| {
                (
                    spec.name.to_string(),
                    spec.default.unwrap_or_default().to_string(),
                )
            })
            .collect();
        Self {
            target: String::new(),
            values,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> &str {
        if name == TARGET_FIELD {
            &self.target
        } else {
            self.values.get(name).map(String::as_str).unwrap_or("")
        }
    }

    pub fn field_mut(&mut self, name: &str) -> &mut String {
        if name == TARGET_FIELD {
            &mut self.target
        } else {
            self.values.entry(name.to_string()).or_default()
        }
    }
}

/// One problem with one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every field-level problem found in one submission
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} invalid field(s): {}", .errors.len(), summarize(.errors))]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    pub fn for_field(&self, field: &str) -> Option<&FieldError> {
        self.errors.iter().find(|err| err.field == field)
    }
}

/// Validates a `ParamForm` against a definition's schema
#[derive(Debug, Clone, Copy)]
pub struct ConfigBuilder {
    definition: &'static ExperimentDefinition,
}

impl ConfigBuilder {
    pub fn new(definition: &'static ExperimentDefinition) -> Self {
        Self { definition }
    }

    pub fn definition(&self) -> &'static ExperimentDefinition {
        self.definition
    }

    /// Validate and normalize. All problems are collected, not just the first.
    pub fn build(&self, form: &ParamForm) -> Result<ExperimentRequest, ValidationErrors> {
        let mut errors = Vec::new();

        let target = form.target.trim();
        if let Err(message) = check_label(target) {
            errors.push(FieldError::new(TARGET_FIELD, message));
        }

        for name in form.values.keys() {
            if self.definition.param(name).is_none() {
                errors.push(FieldError::new(name, "unknown parameter"));
            }
        }

        let mut parameters = BTreeMap::new();
        let mut duration = None;
        for spec in self.definition.parameters {
            let raw = form
                .values
                .get(spec.name)
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
                .or(spec.default);

            let Some(raw) = raw else {
                if spec.required {
                    errors.push(FieldError::new(spec.name, "is required"));
                }
                continue;
            };

            match parse_value(spec, raw) {
                Ok(ParamValue::Duration(bound)) if spec.name == DURATION_PARAM => {
                    if bound.is_zero() {
                        errors.push(FieldError::new(spec.name, "must be greater than zero"));
                    } else {
                        duration = Some(bound);
                    }
                }
                Ok(value) => {
                    parameters.insert(spec.name.to_string(), value);
                }
                Err(message) => errors.push(FieldError::new(spec.name, message)),
            }
        }

        if errors.is_empty() {
            Ok(ExperimentRequest::new(
                self.definition,
                target.to_string(),
                parameters,
                duration,
            ))
        } else {
            Err(ValidationErrors { errors })
        }
    }
}

fn check_label(value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err("is required".to_string());
    }
    if value.len() > MAX_LABEL_LEN {
        return Err(format!("must be at most {} characters", MAX_LABEL_LEN));
    }
    if !label_pattern().is_match(value) {
        return Err("must be a Kubernetes label value (letters, digits, '-', '_', '.')".to_string());
    }
    Ok(())
}

fn parse_value(spec: &ParamSpec, raw: &str) -> Result<ParamValue, String> {
    match spec.param_type {
        ParamType::Text => {
            if spec.name == "namespace" || spec.name == "peer" || spec.name == "container" {
                check_label(raw)?;
            }
            Ok(ParamValue::Text(raw.to_string()))
        }
        ParamType::Integer { min, max } => {
            let value: i64 = raw
                .parse()
                .map_err(|_| format!("'{}' is not an integer", raw))?;
            if value < min || value > max {
                return Err(format!("must be between {} and {}", min, max));
            }
            Ok(ParamValue::Integer(value))
        }
        ParamType::Percent => {
            let value: u8 = raw
                .trim_end_matches('%')
                .parse()
                .map_err(|_| format!("'{}' is not a percentage", raw))?;
            if value > 100 {
                return Err("must be between 0 and 100".to_string());
            }
            Ok(ParamValue::Percent(value))
        }
        ParamType::Duration => parse_duration(raw)
            .map(ParamValue::Duration)
            .map_err(|err| err.to_string()),
        ParamType::Choice(options) => {
            let lowered = raw.to_ascii_lowercase();
            if options.contains(&lowered.as_str()) {
                Ok(ParamValue::Choice(lowered))
            } else {
                Err(format!("must be one of {}", options.join(", ")))
            }
        }
    }
}
