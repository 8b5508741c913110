//! Error types for schema construction and validation.
//!
//! Two classes of failure exist. [`SchemaError`] is returned synchronously by
//! declaration and builder calls: a schema that would be invalid is never
//! produced. [`ValidationError`] describes why a value failed a published
//! schema; validation never returns `Err`, it reports errors and warnings in
//! a [`ValidationReport`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value::{Context, Value};

/// Construction-time failures.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A type or rule declaration is malformed.
    #[error("invalid declaration: {0}")]
    InvalidDeclaration(String),

    /// The schema's type does not declare the requested rule.
    #[error("unknown rule {rule} for type {type_name}")]
    UnknownRule { type_name: String, rule: String },

    /// The schema's type does not declare the requested modifier.
    #[error("unknown rule modifier: {0}")]
    UnknownModifier(String),

    /// The schema's type does not declare the requested term.
    #[error("type {type_name} does not support term {term}")]
    UnknownTerm { type_name: String, term: String },

    /// The schema's type cannot cast to the requested representation.
    #[error("type {type_name} cannot cast to {to}")]
    UnknownCast { type_name: String, to: String },

    /// No type with this name is registered.
    #[error("unknown schema type: {0}")]
    UnknownType(String),

    /// A rule argument was not declared by the rule.
    #[error("rule {rule} does not accept argument {arg}")]
    UnexpectedArgument { rule: String, arg: String },

    /// A reference was bound to an argument that only accepts literals.
    #[error("rule {rule} argument {arg} does not support references")]
    ReferenceNotAllowed { rule: String, arg: String },

    /// A literal rule argument failed its assertion.
    #[error("rule {rule} argument {arg} {reason}")]
    InvalidArgument {
        rule: String,
        arg: String,
        reason: String,
    },

    /// A modifier was applied to a schema without rules.
    #[error("cannot apply modifier {0} to a schema without rules")]
    EmptyRuleset(String),

    /// Two schemas of unrelated types were combined.
    #[error("cannot combine {base} schema with {other} schema")]
    IncompatibleTypes { base: String, other: String },

    /// A builder received a value it does not accept.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// A reference key could not be parsed.
    #[error("invalid reference {key}: {reason}")]
    InvalidReference { key: String, reason: String },

    /// A message template could not be compiled.
    #[error("invalid message template {template:?}: {reason}")]
    InvalidTemplate { template: String, reason: String },

    /// A description could not be rebuilt into a schema.
    #[error("invalid description: {0}")]
    InvalidDescription(String),

    /// User code invoked during construction (an alteration adjuster) panicked.
    #[error("adjuster for {target} panicked: {message}")]
    AdjusterPanicked { target: String, message: String },

    /// JSON parsing or serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Convenience alias for results with [`SchemaError`].
pub type Result<T> = std::result::Result<T, SchemaError>;

/// A single validation failure (or warning).
///
/// `code` is a dot-namespaced identifier such as `any.custom` or
/// `binary.length`; `context` carries the values the message was rendered
/// from (`value`, `label`, `limit`, `error`, ...).
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ValidationError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<String>,
    #[serde(default)]
    pub context: Context,
}

impl ValidationError {
    /// Returns a context entry, if present.
    pub fn context_value(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }
}

/// Outcome of validating one value.
///
/// `value` is the (possibly coerced, corrected or cast) value. Warnings never
/// affect [`is_ok`](ValidationReport::is_ok).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub value: Value,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationError>,
}

impl ValidationReport {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Returns `true` when no hard errors were produced.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the first hard error.
    pub fn error(&self) -> Option<&ValidationError> {
        self.errors.first()
    }

    /// Converts into the validated value or the list of errors.
    pub fn into_result(self) -> std::result::Result<Value, Vec<ValidationError>> {
        if self.errors.is_empty() {
            Ok(self.value)
        } else {
            Err(self.errors)
        }
    }
}
