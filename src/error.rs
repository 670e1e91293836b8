//! Error types for conversion and transformation

use thiserror::Error;

use crate::store::StoreError;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that abort an operation and are surfaced to the caller
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Type not found: {type_id}{}", suggestion_suffix(.suggestion))]
    TypeNotFound {
        type_id: String,
        suggestion: Option<String>,
    },

    #[error("Unable to instantiate type {type_id}: {reason}")]
    Instantiation { type_id: String, reason: String },

    #[error("No transformation description found from {source_type} to {target_type}")]
    NoTransformationFound {
        source_type: String,
        target_type: String,
    },

    #[error("Record store error: {0}")]
    RecordStore(#[from] StoreError),

    #[error("Field access error: {0}")]
    Field(#[from] FieldError),

    #[error("Coercion error: {0}")]
    Coercion(#[from] CoercionError),

    #[error("Transformation step error: {0}")]
    Step(#[from] StepError),

    #[error("Invalid transformation definition: {0}")]
    InvalidDefinition(String),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(" (did you mean '{}'?)", s),
        None => String::new(),
    }
}

impl BridgeError {
    pub fn type_not_found(type_id: impl Into<String>) -> Self {
        BridgeError::TypeNotFound {
            type_id: type_id.into(),
            suggestion: None,
        }
    }

    pub fn no_transformation(source_type: &str, target_type: &str) -> Self {
        BridgeError::NoTransformationFound {
            source_type: source_type.to_string(),
            target_type: target_type.to_string(),
        }
    }

    /// True for the resolution-class errors that callers are expected to handle
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            BridgeError::TypeNotFound { .. } | BridgeError::NoTransformationFound { .. }
        )
    }
}

/// Failure to read or write a named field on a model
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    #[error("type {type_id} has no field '{field}'")]
    NoSuchField { type_id: String, field: String },

    #[error("field '{field}' expects {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("field '{field}' is not writable")]
    NotWritable { field: String },
}

/// A value that cannot be cast to the declared type of a field
#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot coerce {actual} value '{value}' to {expected}")]
pub struct CoercionError {
    pub value: String,
    pub actual: String,
    pub expected: String,
}

/// Failure inside a single transformation step; the step is skipped
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StepError {
    #[error("step has no source field")]
    MissingSourceField,

    #[error("step has no target field")]
    MissingTargetField,

    #[error("source field '{0}' is not set")]
    UnsetSourceField(String),

    #[error("temporary field '{0}' doesn't exist")]
    MissingTemporaryField(String),

    #[error("field '{field}' holds {actual}, expected a string")]
    NotAString { field: String, actual: String },

    #[error("there is no parameter with the name '{0}' present")]
    MissingParameter(String),

    #[error("the string '{value}' given for '{param}' is not a number")]
    InvalidNumber { param: String, value: String },

    #[error("regex '{regex}' can't be compiled: {reason}")]
    InvalidRegex { regex: String, reason: String },

    #[error("regex '{regex}' has no match with index {index}")]
    NoRegexMatch { regex: String, index: usize },

    #[error("invalid range {from}..{to} for a string of length {length}")]
    InvalidRange { from: usize, to: usize, length: usize },

    #[error("invalid parameter '{param}': {reason}")]
    InvalidParameter { param: String, reason: String },

    #[error("unable to instantiate {target_type} from '{value}'")]
    Instantiation { target_type: String, value: String },

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error(transparent)]
    Coercion(#[from] CoercionError),
}
