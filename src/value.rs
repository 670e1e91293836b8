//! Values held by model fields and record entries

use std::fmt;
use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::CoercionError;
use crate::model::{FieldKind, Model};

/// Binary content together with the name of the file it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileWrapper {
    pub filename: String,
    pub content: Vec<u8>,
}

impl FileWrapper {
    pub fn new(filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }

    /// Base64 text of the content, as stored in records
    pub fn encoded_content(&self) -> String {
        general_purpose::STANDARD.encode(&self.content)
    }

    /// Rebuild a wrapper from its record form
    pub fn decode(filename: impl Into<String>, encoded: &str) -> Result<Self, base64::DecodeError> {
        let content = general_purpose::STANDARD.decode(encoded)?;
        Ok(Self::new(filename, content))
    }
}

/// A field value of a structured model
#[derive(Debug, Clone)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Bytes(Vec<u8>),
    /// Enumeration variant, by name
    Enum(String),
    File(FileWrapper),
    Model(Arc<dyn Model>),
    List(Vec<Value>),
    /// Key/value entries; keys may be any value, so no hashing is assumed
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Short name of the value's kind, used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Boolean(_) => "boolean",
            Value::Bytes(_) => "bytes",
            Value::Enum(_) => "enum",
            Value::File(_) => "file",
            Value::Model(_) => "model",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_model(&self) -> Option<&Arc<dyn Model>> {
        match self {
            Value::Model(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Calls the named zero-argument measurement on this value.
    ///
    /// Strings answer `length`/`len` in characters, collections answer
    /// `size`/`length`/`len`, byte payloads and files answer `length`/`len`/`size`.
    pub fn measure(&self, function: &str) -> Option<usize> {
        match (self, function) {
            (Value::String(s), "length" | "len") => Some(s.chars().count()),
            (Value::String(s), "bytes") => Some(s.len()),
            (Value::List(items), "size" | "length" | "len") => Some(items.len()),
            (Value::Map(entries), "size" | "length" | "len") => Some(entries.len()),
            (Value::Bytes(b), "size" | "length" | "len") => Some(b.len()),
            (Value::File(f), "size" | "length" | "len") => Some(f.content.len()),
            (Value::Enum(name), "length" | "len") => Some(name.chars().count()),
            _ => None,
        }
    }

    /// Convert this value into the given declared kind.
    ///
    /// Values already matching the kind pass through; strings are parsed into
    /// numbers, booleans and enum variants; scalars are rendered into strings.
    pub fn coerce(self, kind: &FieldKind) -> Result<Value, CoercionError> {
        if kind.accepts(&self) {
            return Ok(self);
        }
        let fail = |value: &Value| CoercionError {
            value: value.to_string(),
            actual: value.kind_name().to_string(),
            expected: kind.to_string(),
        };
        match (self, kind) {
            (Value::String(s), FieldKind::Integer) => {
                s.trim().parse().map(Value::Integer).map_err(|_| fail(&Value::String(s)))
            }
            (Value::String(s), FieldKind::Float) => {
                s.trim().parse().map(Value::Float).map_err(|_| fail(&Value::String(s)))
            }
            (Value::String(s), FieldKind::Boolean) => match s.trim() {
                "true" => Ok(Value::Boolean(true)),
                "false" => Ok(Value::Boolean(false)),
                _ => Err(fail(&Value::String(s))),
            },
            (Value::String(s), FieldKind::Enum { variants }) | (Value::Enum(s), FieldKind::Enum { variants }) => {
                if variants.iter().any(|v| v == &s) {
                    Ok(Value::Enum(s))
                } else {
                    Err(fail(&Value::String(s)))
                }
            }
            (Value::Integer(i), FieldKind::Float) => Ok(Value::Float(i as f64)),
            (Value::Integer(i), FieldKind::String) => Ok(Value::String(i.to_string())),
            (Value::Float(f), FieldKind::String) => Ok(Value::String(f.to_string())),
            (Value::Boolean(b), FieldKind::String) => Ok(Value::String(b.to_string())),
            (Value::Enum(name), FieldKind::String) => Ok(Value::String(name)),
            (Value::List(items), FieldKind::List { item }) => items
                .into_iter()
                .map(|v| v.coerce(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            (Value::Map(entries), FieldKind::Map { key, value }) => entries
                .into_iter()
                .map(|(k, v)| Ok((k.coerce(key)?, v.coerce(value)?)))
                .collect::<Result<Vec<_>, CoercionError>>()
                .map(Value::Map),
            (other, _) => Err(fail(&other)),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Enum(a), Value::Enum(b)) => a == b,
            (Value::File(a), Value::File(b)) => a == b,
            (Value::Model(a), Value::Model(b)) => crate::model::models_equal(a.as_ref(), b.as_ref()),
            (Value::List(a), Value::List(b)) => a == b,
            // Entry order is not significant
            (Value::Map(a), Value::Map(b)) => a.len() == b.len() && a.iter().all(|entry| b.contains(entry)),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{}", s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Bytes(b) => write!(f, "{}", general_purpose::STANDARD.encode(b)),
            Value::Enum(name) => write!(f, "{}", name),
            Value::File(file) => write!(f, "{}", file.filename),
            Value::Model(m) => match m.model_id() {
                Some(id) => write!(f, "{}({})", m.model_type(), id),
                None => write!(f, "{}", m.model_type()),
            },
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Value::Map(entries) => {
                let parts: Vec<String> = entries.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<FileWrapper> for Value {
    fn from(file: FileWrapper) -> Self {
        Value::File(file)
    }
}

/// A scalar stored under one record key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl RecordValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RecordValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// The scalar as a model value, without any type information applied
    pub fn to_value(&self) -> Value {
        match self {
            RecordValue::String(s) => Value::String(s.clone()),
            RecordValue::Integer(i) => Value::Integer(*i),
            RecordValue::Float(x) => Value::Float(*x),
            RecordValue::Boolean(b) => Value::Boolean(*b),
            RecordValue::Bytes(b) => Value::Bytes(b.clone()),
        }
    }

    /// Record form of a scalar model value; `None` for structured values
    pub fn from_scalar(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(RecordValue::String(s.clone())),
            Value::Integer(i) => Some(RecordValue::Integer(*i)),
            Value::Float(x) => Some(RecordValue::Float(*x)),
            Value::Boolean(b) => Some(RecordValue::Boolean(*b)),
            Value::Bytes(b) => Some(RecordValue::Bytes(b.clone())),
            Value::Enum(name) => Some(RecordValue::String(name.clone())),
            Value::File(_) | Value::Model(_) | Value::List(_) | Value::Map(_) => None,
        }
    }
}

impl fmt::Display for RecordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

impl From<&str> for RecordValue {
    fn from(s: &str) -> Self {
        RecordValue::String(s.to_string())
    }
}

impl From<String> for RecordValue {
    fn from(s: String) -> Self {
        RecordValue::String(s)
    }
}

impl From<i64> for RecordValue {
    fn from(i: i64) -> Self {
        RecordValue::Integer(i)
    }
}

impl From<bool> for RecordValue {
    fn from(b: bool) -> Self {
        RecordValue::Boolean(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_string_to_numbers() {
        assert_eq!(Value::from("42").coerce(&FieldKind::Integer).unwrap(), Value::Integer(42));
        assert_eq!(Value::from("1.5").coerce(&FieldKind::Float).unwrap(), Value::Float(1.5));
        assert_eq!(Value::from("true").coerce(&FieldKind::Boolean).unwrap(), Value::Boolean(true));
        assert!(Value::from("abc").coerce(&FieldKind::Integer).is_err());
    }

    #[test]
    fn test_coerce_enum_by_name() {
        let kind = FieldKind::Enum {
            variants: vec!["OPEN".to_string(), "CLOSED".to_string()],
        };
        assert_eq!(Value::from("OPEN").coerce(&kind).unwrap(), Value::Enum("OPEN".to_string()));
        let err = Value::from("MERGED").coerce(&kind).unwrap_err();
        assert_eq!(err.actual, "string");
    }

    #[test]
    fn test_coerce_list_items() {
        let kind = FieldKind::List {
            item: Box::new(FieldKind::Integer),
        };
        let list = Value::List(vec![Value::from("1"), Value::Integer(2)]);
        assert_eq!(
            list.coerce(&kind).unwrap(),
            Value::List(vec![Value::Integer(1), Value::Integer(2)])
        );
    }

    #[test]
    fn test_coerce_map_entries() {
        let kind = FieldKind::map(FieldKind::String, FieldKind::Integer);
        let map = Value::Map(vec![(Value::from("a"), Value::from("1"))]);
        assert_eq!(
            map.coerce(&kind).unwrap(),
            Value::Map(vec![(Value::from("a"), Value::Integer(1))])
        );
        let bad = Value::Map(vec![(Value::from("a"), Value::from("x"))]);
        assert!(bad.coerce(&kind).is_err());
    }

    #[test]
    fn test_map_equality_ignores_order() {
        let a = Value::Map(vec![(Value::from("x"), Value::Integer(1)), (Value::from("y"), Value::Integer(2))]);
        let b = Value::Map(vec![(Value::from("y"), Value::Integer(2)), (Value::from("x"), Value::Integer(1))]);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "{x: 1, y: 2}");
    }

    #[test]
    fn test_measure() {
        assert_eq!(Value::from("héllo").measure("length"), Some(5));
        assert_eq!(Value::List(vec![Value::Integer(1)]).measure("size"), Some(1));
        assert_eq!(Value::Integer(3).measure("length"), None);
    }

    #[test]
    fn test_file_wrapper_encoding() {
        let file = FileWrapper::new("a.bin", vec![0u8, 159, 146, 150]);
        let encoded = file.encoded_content();
        let decoded = FileWrapper::decode("a.bin", &encoded).unwrap();
        assert_eq!(decoded, file);
    }

    #[test]
    fn test_record_value_json_is_untagged() {
        let values = vec![
            RecordValue::from("x"),
            RecordValue::Integer(3),
            RecordValue::Boolean(false),
        ];
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(json, r#"["x",3,false]"#);
    }
}
