//! Validation and routing of model-issued tool calls.
//!
//! The dispatcher is stateless: it looks the tool up, validates the raw
//! argument payload against the tool's schema, invokes the implementation,
//! and folds every failure mode into a [`ToolCallResult`]. Nothing here
//! aborts the surrounding loop; one bad call among several in a turn must
//! not poison the others.

use std::fmt;

use itertools::Itertools;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::tools::{value_type_name, ParameterSchema, ToolRegistry};
use crate::transcript::ToolCallRequest;

/// How a dispatched tool call failed.
///
/// Failures are data, not errors: they are rendered into the transcript so
/// the model can react to them in natural language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolFailure {
    UnknownTool { name: String },
    InvalidArguments { detail: String },
    ExecutionFailed { message: String },
}

impl fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolFailure::UnknownTool { name } => {
                write!(f, "unknown tool {name:?}")
            }
            ToolFailure::InvalidArguments { detail } => {
                write!(f, "invalid arguments: {detail}")
            }
            ToolFailure::ExecutionFailed { message } => {
                write!(f, "tool execution failed: {message}")
            }
        }
    }
}

/// Outcome of dispatching one [`ToolCallRequest`].
///
/// Carries the originating call identifier so the result can be correlated
/// back to its request. Every request produces exactly one result.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallResult {
    pub call_id: String,
    pub value: Result<Value, ToolFailure>,
}

impl ToolCallResult {
    /// Render the outcome as transcript text.
    ///
    /// String values are injected bare, other values as compact JSON, and
    /// failures as an `error:` line the model can read.
    pub fn content(&self) -> String {
        match &self.value {
            Ok(Value::String(s)) => s.clone(),
            Ok(value) => value.to_string(),
            Err(failure) => format!("error: {failure}"),
        }
    }

    pub fn is_success(&self) -> bool {
        self.value.is_ok()
    }
}

/// Validate and execute one tool call against the registry.
///
/// `strict_arguments` forces rejection of undeclared argument keys even for
/// schemas that did not opt into strictness themselves.
pub async fn dispatch(
    request: &ToolCallRequest,
    registry: &ToolRegistry,
    strict_arguments: bool,
) -> ToolCallResult {
    let fail = |failure: ToolFailure| ToolCallResult {
        call_id: request.call_id.clone(),
        value: Err(failure),
    };

    let Some(binding) = registry.lookup(&request.name) else {
        warn!(tool = %request.name, call_id = %request.call_id, "unknown tool requested");
        return fail(ToolFailure::UnknownTool {
            name: request.name.clone(),
        });
    };

    let args = match parse_arguments(&request.arguments) {
        Ok(args) => args,
        Err(detail) => {
            warn!(tool = %request.name, %detail, "argument payload rejected");
            return fail(ToolFailure::InvalidArguments { detail });
        }
    };

    let schema = &binding.spec().parameters;
    let strict = strict_arguments || schema.is_strict();
    if let Err(detail) = validate_arguments(schema, &args, strict) {
        warn!(tool = %request.name, %detail, "argument validation failed");
        return fail(ToolFailure::InvalidArguments { detail });
    }

    info!(tool = %request.name, call_id = %request.call_id, "invoking tool");
    match binding.tool().call(args).await {
        Ok(value) => {
            debug!(tool = %request.name, %value, "tool succeeded");
            ToolCallResult {
                call_id: request.call_id.clone(),
                value: Ok(value),
            }
        }
        Err(err) => {
            warn!(tool = %request.name, error = %err, "tool failed");
            fail(ToolFailure::ExecutionFailed {
                message: err.to_string(),
            })
        }
    }
}

fn parse_arguments(raw: &str) -> Result<Map<String, Value>, String> {
    // Some backends emit an empty string for a no-argument call.
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    let value: Value =
        serde_json::from_str(raw).map_err(|e| format!("payload is not valid JSON: {e}"))?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(format!(
            "payload must be a JSON object, got {}",
            value_type_name(&other)
        )),
    }
}

fn validate_arguments(
    schema: &ParameterSchema,
    args: &Map<String, Value>,
    strict: bool,
) -> Result<(), String> {
    let mut problems = Vec::new();

    for (name, ty) in schema.required_params() {
        if !args.contains_key(name) {
            problems.push(format!(
                "missing required parameter {name:?} ({})",
                ty.json_name()
            ));
        }
    }

    for (name, value) in args {
        match schema.get(name) {
            Some(ty) if !ty.matches(value) => {
                problems.push(format!(
                    "parameter {name:?} expects {}, got {}",
                    ty.json_name(),
                    value_type_name(value)
                ));
            }
            Some(_) => {}
            None if strict => {
                problems.push(format!("unexpected parameter {name:?}"));
            }
            None => {}
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems.iter().join("; "))
    }
}
