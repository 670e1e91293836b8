//! Transformation Descriptions
//!
//! A [`TransformationDescription`] maps fields of one model type onto fields
//! of another through an ordered list of [`TransformationStep`]s. Each step
//! names an operator, its source fields, at most one target field and a
//! string parameter map.
//!
//! Field names starting with `temp.` address a scratch map that lives for one
//! execution and never touches the target model.

pub mod operations;
pub mod performer;

pub use operations::PadDirection;
pub use performer::TransformationPerformer;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;
use crate::model::TypeDescriptor;

/// Prefix of temporary field names
pub const TEMP_PREFIX: &str = "temp.";

pub fn is_temporary_field(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX)
}

/// Parameter names understood by the operators
pub mod params {
    pub const CONCAT: &str = "concat";
    pub const SPLIT: &str = "split";
    pub const INDEX: &str = "index";
    pub const REGEX: &str = "regex";
    pub const FROM: &str = "from";
    pub const TO: &str = "to";
    pub const VALUE: &str = "value";
    pub const LENGTH_FUNCTION: &str = "lengthFunction";
    pub const OLD: &str = "old";
    pub const NEW: &str = "new";
    pub const LENGTH: &str = "length";
    pub const CHARACTER: &str = "character";
    pub const DIRECTION: &str = "direction";
    pub const TARGET_TYPE: &str = "targetType";
}

/// Field-level operator of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransformationOperation {
    #[serde(rename = "forward")]
    Forward,
    #[serde(rename = "concat")]
    Concat,
    #[serde(rename = "split")]
    Split,
    #[serde(rename = "splitRegex")]
    SplitRegex,
    #[serde(rename = "map")]
    Map,
    #[serde(rename = "substring")]
    Substring,
    #[serde(rename = "value")]
    Value,
    #[serde(rename = "length")]
    Length,
    #[serde(rename = "trim")]
    Trim,
    #[serde(rename = "toLower")]
    ToLower,
    #[serde(rename = "toUpper")]
    ToUpper,
    #[serde(rename = "replace")]
    Replace,
    #[serde(rename = "reverse")]
    Reverse,
    #[serde(rename = "pad")]
    Pad,
    #[serde(rename = "removeleading")]
    RemoveLeading,
    #[serde(rename = "instantiate")]
    Instantiate,
}

impl TransformationOperation {
    pub const ALL: [TransformationOperation; 16] = [
        TransformationOperation::Forward,
        TransformationOperation::Concat,
        TransformationOperation::Split,
        TransformationOperation::SplitRegex,
        TransformationOperation::Map,
        TransformationOperation::Substring,
        TransformationOperation::Value,
        TransformationOperation::Length,
        TransformationOperation::Trim,
        TransformationOperation::ToLower,
        TransformationOperation::ToUpper,
        TransformationOperation::Replace,
        TransformationOperation::Reverse,
        TransformationOperation::Pad,
        TransformationOperation::RemoveLeading,
        TransformationOperation::Instantiate,
    ];

    /// Name used in definition files
    pub fn name(&self) -> &'static str {
        match self {
            TransformationOperation::Forward => "forward",
            TransformationOperation::Concat => "concat",
            TransformationOperation::Split => "split",
            TransformationOperation::SplitRegex => "splitRegex",
            TransformationOperation::Map => "map",
            TransformationOperation::Substring => "substring",
            TransformationOperation::Value => "value",
            TransformationOperation::Length => "length",
            TransformationOperation::Trim => "trim",
            TransformationOperation::ToLower => "toLower",
            TransformationOperation::ToUpper => "toUpper",
            TransformationOperation::Replace => "replace",
            TransformationOperation::Reverse => "reverse",
            TransformationOperation::Pad => "pad",
            TransformationOperation::RemoveLeading => "removeleading",
            TransformationOperation::Instantiate => "instantiate",
        }
    }

    /// Parameter an `operation-string` element fills for this operator
    pub fn primary_param(&self) -> Option<&'static str> {
        match self {
            TransformationOperation::Concat => Some(params::CONCAT),
            TransformationOperation::Split => Some(params::SPLIT),
            TransformationOperation::SplitRegex | TransformationOperation::RemoveLeading => {
                Some(params::REGEX)
            }
            TransformationOperation::Value => Some(params::VALUE),
            TransformationOperation::Length => Some(params::LENGTH_FUNCTION),
            TransformationOperation::Instantiate => Some(params::TARGET_TYPE),
            _ => None,
        }
    }

    /// Whether the operator reads a source field
    pub fn needs_source(&self) -> bool {
        !matches!(self, TransformationOperation::Value)
    }
}

impl fmt::Display for TransformationOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TransformationOperation {
    type Err = BridgeError;

    /// Case-insensitive; `-` and `_` are ignored so `split-regex` and `TO_LOWER` parse too
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        TransformationOperation::ALL
            .iter()
            .copied()
            .find(|op| op.name().to_ascii_lowercase() == normalized)
            .ok_or_else(|| BridgeError::InvalidDefinition(format!("unknown operation '{}'", s)))
    }
}

/// One operator application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationStep {
    pub operation: TransformationOperation,
    #[serde(default)]
    pub source_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_field: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl TransformationStep {
    pub fn new(operation: TransformationOperation) -> Self {
        Self {
            operation,
            source_fields: Vec::new(),
            target_field: None,
            params: BTreeMap::new(),
        }
    }

    pub fn source(mut self, field: impl Into<String>) -> Self {
        self.source_fields.push(field.into());
        self
    }

    pub fn target(mut self, field: impl Into<String>) -> Self {
        self.target_field = Some(field.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn get_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

impl fmt::Display for TransformationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}) -> {}",
            self.operation,
            self.source_fields.join(", "),
            self.target_field.as_deref().unwrap_or("?")
        )
    }
}

/// Rules for turning a model of the source type into one of the target type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationDescription {
    pub source: String,
    pub target: String,
    /// Explicit id; the graph assigns an internal one when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Definition file this description was loaded from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default)]
    pub steps: Vec<TransformationStep>,
}

impl TransformationDescription {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            id: None,
            file_name: None,
            steps: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    /// Whether this description converts `source` into `target`
    pub fn connects(&self, source: &str, target: &str) -> bool {
        self.source == source && self.target == target
    }

    pub fn add_step(&mut self, step: TransformationStep) -> &mut Self {
        self.steps.push(step);
        self
    }

    /// Copy the source value unchanged
    pub fn forward_field(&mut self, source: &str, target: &str) -> &mut Self {
        let step = unary(TransformationOperation::Forward, source, target);
        self.add_step(step)
    }

    /// Join the readable source values with a separator
    pub fn concat_field(&mut self, target: &str, separator: &str, sources: &[&str]) -> &mut Self {
        let mut step = TransformationStep::new(TransformationOperation::Concat)
            .target(target)
            .param(params::CONCAT, separator);
        step.source_fields = sources.iter().map(|s| s.to_string()).collect();
        self.add_step(step)
    }

    /// Split on a literal delimiter and take one part
    pub fn split_field(
        &mut self,
        source: &str,
        target: &str,
        delimiter: &str,
        index: impl ToString,
    ) -> &mut Self {
        let step = unary(TransformationOperation::Split, source, target)
            .param(params::SPLIT, delimiter)
            .param(params::INDEX, index.to_string());
        self.add_step(step)
    }

    /// Take the `index`-th match of a regular expression
    pub fn split_regex_field(
        &mut self,
        source: &str,
        target: &str,
        regex: &str,
        index: impl ToString,
    ) -> &mut Self {
        let step = unary(TransformationOperation::SplitRegex, source, target)
            .param(params::REGEX, regex)
            .param(params::INDEX, index.to_string());
        self.add_step(step)
    }

    pub fn map_field<I, K, V>(&mut self, source: &str, target: &str, mapping: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut step = unary(TransformationOperation::Map, source, target);
        step.params = mapping
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.add_step(step)
    }

    pub fn substring_field(
        &mut self,
        source: &str,
        target: &str,
        from: impl ToString,
        to: impl ToString,
    ) -> &mut Self {
        let step = unary(TransformationOperation::Substring, source, target)
            .param(params::FROM, from.to_string())
            .param(params::TO, to.to_string());
        self.add_step(step)
    }

    /// Write a literal
    pub fn value_field(&mut self, target: &str, value: &str) -> &mut Self {
        let step = TransformationStep::new(TransformationOperation::Value)
            .target(target)
            .param(params::VALUE, value);
        self.add_step(step)
    }

    /// Write the result of a named measurement (`length` when `None`)
    pub fn length_field(&mut self, source: &str, target: &str, function: Option<&str>) -> &mut Self {
        let mut step = unary(TransformationOperation::Length, source, target);
        if let Some(function) = function {
            step = step.param(params::LENGTH_FUNCTION, function);
        }
        self.add_step(step)
    }

    pub fn trim_field(&mut self, source: &str, target: &str) -> &mut Self {
        let step = unary(TransformationOperation::Trim, source, target);
        self.add_step(step)
    }

    pub fn to_lower_field(&mut self, source: &str, target: &str) -> &mut Self {
        let step = unary(TransformationOperation::ToLower, source, target);
        self.add_step(step)
    }

    pub fn to_upper_field(&mut self, source: &str, target: &str) -> &mut Self {
        let step = unary(TransformationOperation::ToUpper, source, target);
        self.add_step(step)
    }

    pub fn replace_field(&mut self, source: &str, target: &str, old: &str, new: &str) -> &mut Self {
        let step = unary(TransformationOperation::Replace, source, target)
            .param(params::OLD, old)
            .param(params::NEW, new);
        self.add_step(step)
    }

    pub fn reverse_field(&mut self, source: &str, target: &str) -> &mut Self {
        let step = unary(TransformationOperation::Reverse, source, target);
        self.add_step(step)
    }

    /// Pad to `length` with `character` at the start or end
    pub fn pad_field(
        &mut self,
        source: &str,
        target: &str,
        length: impl ToString,
        character: char,
        direction: PadDirection,
    ) -> &mut Self {
        let step = unary(TransformationOperation::Pad, source, target)
            .param(params::LENGTH, length.to_string())
            .param(params::CHARACTER, character.to_string())
            .param(params::DIRECTION, direction.to_string());
        self.add_step(step)
    }

    /// Strip a leading regex match, looking only at the first `length` characters (0 = all)
    pub fn remove_leading_field(
        &mut self,
        source: &str,
        target: &str,
        regex: &str,
        length: impl ToString,
    ) -> &mut Self {
        let step = unary(TransformationOperation::RemoveLeading, source, target)
            .param(params::REGEX, regex)
            .param(params::LENGTH, length.to_string());
        self.add_step(step)
    }

    /// Parse the source string into `string`, `integer`, `float` or `boolean`
    pub fn instantiate_field(&mut self, source: &str, target: &str, target_type: &str) -> &mut Self {
        let step = unary(TransformationOperation::Instantiate, source, target)
            .param(params::TARGET_TYPE, target_type);
        self.add_step(step)
    }

    /// For every field of the source type, the target fields it influences.
    ///
    /// Chains through temporary fields are followed; temporary names never
    /// appear in the result.
    pub fn property_connections(&self, source_type: &TypeDescriptor) -> BTreeMap<String, BTreeSet<String>> {
        let mut direct: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for step in &self.steps {
            let Some(target) = step.target_field.as_deref() else {
                continue;
            };
            for source in &step.source_fields {
                direct.entry(source.as_str()).or_default().insert(target);
            }
        }

        let mut connections = BTreeMap::new();
        for field in source_type.field_names() {
            let mut reached = BTreeSet::new();
            let mut visited = BTreeSet::new();
            let mut pending = vec![field];
            while let Some(current) = pending.pop() {
                if !visited.insert(current) {
                    continue;
                }
                for &target in direct.get(current).into_iter().flatten() {
                    if is_temporary_field(target) {
                        pending.push(target);
                    } else {
                        reached.insert(target.to_string());
                    }
                }
            }
            connections.insert(field.to_string(), reached);
        }
        connections
    }
}

fn unary(operation: TransformationOperation, source: &str, target: &str) -> TransformationStep {
    TransformationStep::new(operation).source(source).target(target)
}

impl fmt::Display for TransformationDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)?;
        if let Some(id) = &self.id {
            write!(f, " [{}]", id)?;
        }
        Ok(())
    }
}
