//! Tool specifications and the registry of callable implementations.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Error type for tool execution.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0}")]
    Failed(String),
}

impl From<reqwest::Error> for ToolError {
    fn from(err: reqwest::Error) -> Self {
        ToolError::Failed(err.to_string())
    }
}

/// A callable implementation behind a registered tool name.
///
/// The dispatcher only ever hands implementations an argument mapping that
/// has already been validated against the tool's [`ParameterSchema`].
#[async_trait]
pub trait Tool: Send + Sync {
    async fn call(&self, args: Map<String, Value>) -> Result<Value, ToolError>;
}

/// Primitive parameter types a tool schema can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Number,
    String,
    Boolean,
}

impl ParamType {
    pub(crate) fn json_name(self) -> &'static str {
        match self {
            ParamType::Number => "number",
            ParamType::String => "string",
            ParamType::Boolean => "boolean",
        }
    }

    pub(crate) fn matches(self, value: &Value) -> bool {
        match self {
            ParamType::Number => value.is_number(),
            ParamType::String => value.is_string(),
            ParamType::Boolean => value.is_boolean(),
        }
    }
}

/// Human-readable name for a JSON value's type, used in diagnostics.
pub(crate) fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone)]
struct Param {
    name: String,
    ty: ParamType,
    required: bool,
}

/// Declarative description of a tool's named parameters.
///
/// When strict, argument keys the schema does not declare are rejected at
/// dispatch time instead of being passed through.
#[derive(Debug, Clone, Default)]
pub struct ParameterSchema {
    params: Vec<Param>,
    strict: bool,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: impl Into<String>, ty: ParamType) -> Self {
        self.params.push(Param {
            name: name.into(),
            ty,
            required: true,
        });
        self
    }

    pub fn optional(mut self, name: impl Into<String>, ty: ParamType) -> Self {
        self.params.push(Param {
            name: name.into(),
            ty,
            required: false,
        });
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub(crate) fn get(&self, name: &str) -> Option<ParamType> {
        self.params.iter().find(|p| p.name == name).map(|p| p.ty)
    }

    pub(crate) fn required_params(&self) -> impl Iterator<Item = (&str, ParamType)> {
        self.params
            .iter()
            .filter(|p| p.required)
            .map(|p| (p.name.as_str(), p.ty))
    }

    /// Render the schema as a JSON Schema object for the declaration payload.
    pub fn to_json(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in &self.params {
            properties.insert(param.name.clone(), json!({ "type": param.ty.json_name() }));
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": !self.strict,
        })
    }
}

/// Declarative description of a callable capability, surfaced to the model.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: ParameterSchema,
}

impl ToolSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ParameterSchema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A [`ToolSpec`] paired with its executable implementation.
pub struct ToolBinding {
    spec: ToolSpec,
    tool: Box<dyn Tool>,
}

impl ToolBinding {
    pub fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    pub fn tool(&self) -> &dyn Tool {
        self.tool.as_ref()
    }
}

/// Errors that can occur during tool registration.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("tool {0:?} is already registered")]
    DuplicateTool(String),
}

/// Maps tool names to bindings.
///
/// Read-only after initialization; a registry may be shared across
/// concurrently running conversations. Declaration order is registration
/// order, which some backends are sensitive to when tie-breaking among
/// equally plausible tools.
#[derive(Default)]
pub struct ToolRegistry {
    bindings: Vec<ToolBinding>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Duplicate names are an error, never an overwrite.
    pub fn register(&mut self, spec: ToolSpec, tool: Box<dyn Tool>) -> Result<(), RegistryError> {
        if self.index.contains_key(&spec.name) {
            return Err(RegistryError::DuplicateTool(spec.name.clone()));
        }
        self.index.insert(spec.name.clone(), self.bindings.len());
        self.bindings.push(ToolBinding { spec, tool });
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&ToolBinding> {
        self.index.get(name).map(|&i| &self.bindings[i])
    }

    /// Specs in registration order, for the backend declaration payload.
    pub fn describe_all(&self) -> Vec<ToolSpec> {
        self.bindings.iter().map(|b| b.spec.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
