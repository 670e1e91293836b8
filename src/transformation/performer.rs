//! Transformation Performer
//!
//! Runs a [`TransformationDescription`] against a source model. Each step
//! either succeeds or fails with a [`StepError`]; a failed step is logged and
//! skipped, and the remaining steps still run.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::operations::{self, PadDirection, StepParams};
use super::{is_temporary_field, params, TransformationDescription, TransformationOperation, TransformationStep};
use crate::error::{FieldError, Result, StepError};
use crate::model::Model;
use crate::types::TypeResolver;
use crate::value::Value;

/// Executes transformation descriptions
#[derive(Clone)]
pub struct TransformationPerformer {
    resolver: Arc<dyn TypeResolver>,
}

impl TransformationPerformer {
    pub fn new(resolver: Arc<dyn TypeResolver>) -> Self {
        Self { resolver }
    }

    /// Build a new target model from `source`.
    ///
    /// Only instantiating the target type can fail; step failures leave the
    /// affected target fields unset.
    pub fn transform(&self, description: &TransformationDescription, source: &dyn Model) -> Result<Box<dyn Model>> {
        let target = self.resolver.instantiate(&description.target)?;
        if source.model_type() != description.source {
            warn!(
                expected = %description.source,
                found = source.model_type(),
                "source model type differs from the description"
            );
        }

        let mut execution = Execution {
            source,
            target,
            temporary: HashMap::new(),
        };
        let mut failed = 0usize;
        for step in &description.steps {
            if let Err(e) = execution.perform(step) {
                failed += 1;
                match e {
                    StepError::UnsetSourceField(_) | StepError::MissingTemporaryField(_) => {
                        debug!(step = %step, error = %e, "skipping transformation step")
                    }
                    _ => warn!(step = %step, error = %e, "skipping transformation step"),
                }
            }
        }
        debug!(
            transformation = %description,
            steps = description.steps.len(),
            failed,
            "performed transformation"
        );
        Ok(execution.target)
    }
}

/// State of one transformation run
struct Execution<'a> {
    source: &'a dyn Model,
    target: Box<dyn Model>,
    temporary: HashMap<String, Value>,
}

impl Execution<'_> {
    fn perform(&mut self, step: &TransformationStep) -> std::result::Result<(), StepError> {
        let args = StepParams::new(&step.params);
        let value = match step.operation {
            TransformationOperation::Forward => self.read(first_source(step)?)?,
            TransformationOperation::Concat => {
                let separator = args.optional(params::CONCAT).unwrap_or_default();
                let parts: Vec<String> = step
                    .source_fields
                    .iter()
                    .filter_map(|field| self.read(field).ok())
                    .map(|value| value.to_string())
                    .collect();
                Value::String(operations::concat(&parts, separator))
            }
            TransformationOperation::Split => {
                let input = self.read_string(first_source(step)?)?;
                let delimiter = args.required(params::SPLIT)?;
                let index = args.lenient_index(params::INDEX, 0);
                Value::String(operations::split(&input, delimiter, index))
            }
            TransformationOperation::SplitRegex => {
                let input = self.read_string(first_source(step)?)?;
                let regex = args.required(params::REGEX)?;
                let index = args.lenient_index(params::INDEX, 0);
                Value::String(operations::split_regex(&input, regex, index)?)
            }
            TransformationOperation::Map => {
                let value = self.read(first_source(step)?)?;
                match step.params.get(&value.to_string()) {
                    Some(mapped) => Value::String(mapped.clone()),
                    None => value,
                }
            }
            TransformationOperation::Substring => {
                let input = self.read_string(first_source(step)?)?;
                let length = input.chars().count();
                let from = args.lenient_index(params::FROM, 0);
                let to = args.lenient_index(params::TO, length);
                Value::String(operations::substring(&input, from, to)?)
            }
            TransformationOperation::Value => match args.optional(params::VALUE) {
                Some(literal) => Value::String(literal.to_string()),
                None => {
                    warn!(step = %step, "value step has no value, skipping");
                    return Ok(());
                }
            },
            TransformationOperation::Length => {
                let value = self.read(first_source(step)?)?;
                let function = args.optional(params::LENGTH_FUNCTION).unwrap_or("length");
                let length = value.measure(function).unwrap_or_else(|| {
                    warn!(function, kind = value.kind_name(), "value doesn't support the length function, using 0");
                    0
                });
                Value::String(length.to_string())
            }
            TransformationOperation::Trim => {
                Value::String(self.read_string(first_source(step)?)?.trim().to_string())
            }
            TransformationOperation::ToLower => {
                Value::String(self.read_string(first_source(step)?)?.to_lowercase())
            }
            TransformationOperation::ToUpper => {
                Value::String(self.read_string(first_source(step)?)?.to_uppercase())
            }
            TransformationOperation::Replace => {
                let input = self.read_string(first_source(step)?)?;
                let old = args.required(params::OLD)?;
                let new = args.optional(params::NEW).unwrap_or_default();
                Value::String(input.replace(old, new))
            }
            TransformationOperation::Reverse => {
                Value::String(operations::reverse(&self.read_string(first_source(step)?)?))
            }
            TransformationOperation::Pad => {
                let input = self.read_string(first_source(step)?)?;
                let length = args.strict_index(params::LENGTH)?;
                let character = match args.optional(params::CHARACTER) {
                    None => ' ',
                    Some(raw) => raw.chars().next().ok_or_else(|| StepError::InvalidParameter {
                        param: params::CHARACTER.to_string(),
                        reason: "empty pad character".to_string(),
                    })?,
                };
                let direction = match args.optional(params::DIRECTION) {
                    None => PadDirection::default(),
                    Some(raw) => raw.parse()?,
                };
                Value::String(operations::pad(&input, length, character, direction))
            }
            TransformationOperation::RemoveLeading => {
                let input = self.read_string(first_source(step)?)?;
                let regex = args.required(params::REGEX)?;
                let max_length = match args.lenient_index(params::LENGTH, 0) {
                    0 => None,
                    limit => Some(limit),
                };
                Value::String(operations::remove_leading(&input, regex, max_length)?)
            }
            TransformationOperation::Instantiate => {
                let input = self.read_string(first_source(step)?)?;
                let target_type = args.required(params::TARGET_TYPE)?;
                operations::instantiate(&input, target_type)?
            }
        };

        let target = step.target_field.as_deref().ok_or(StepError::MissingTargetField)?;
        self.write(target, value)
    }

    /// Read a source or temporary field
    fn read(&self, field: &str) -> std::result::Result<Value, StepError> {
        if is_temporary_field(field) {
            return self
                .temporary
                .get(field)
                .cloned()
                .ok_or_else(|| StepError::MissingTemporaryField(field.to_string()));
        }
        if self.source.descriptor().get_field(field).is_none() {
            return Err(FieldError::NoSuchField {
                type_id: self.source.model_type().to_string(),
                field: field.to_string(),
            }
            .into());
        }
        self.source
            .get(field)
            .ok_or_else(|| StepError::UnsetSourceField(field.to_string()))
    }

    fn read_string(&self, field: &str) -> std::result::Result<String, StepError> {
        match self.read(field)? {
            Value::String(s) => Ok(s),
            other => Err(StepError::NotAString {
                field: field.to_string(),
                actual: other.kind_name().to_string(),
            }),
        }
    }

    /// Write a temporary field, or a target field after coercing to its declared kind
    fn write(&mut self, field: &str, value: Value) -> std::result::Result<(), StepError> {
        if is_temporary_field(field) {
            self.temporary.insert(field.to_string(), value);
            return Ok(());
        }
        let kind = self
            .target
            .descriptor()
            .get_field(field)
            .map(|f| f.kind.clone())
            .ok_or_else(|| FieldError::NoSuchField {
                type_id: self.target.model_type().to_string(),
                field: field.to_string(),
            })?;
        let value = value.coerce(&kind)?;
        self.target.set(field, value)?;
        Ok(())
    }
}

fn first_source(step: &TransformationStep) -> std::result::Result<&str, StepError> {
    step.source_fields
        .first()
        .map(String::as_str)
        .ok_or(StepError::MissingSourceField)
}
