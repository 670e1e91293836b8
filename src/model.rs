//! Structured models and field access
//!
//! A model type is described by a [`TypeDescriptor`]: its id, its ordered
//! fields and the kind of each field. Field access goes through the [`Model`]
//! trait, so hand-written structs and [`DynamicModel`] values are handled the
//! same way by the converter and the transformation interpreter.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, FieldError, Result};
use crate::types::TypeResolver;
use crate::value::{FileWrapper, Value};

/// Declared kind of a model field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Integer,
    Float,
    Boolean,
    Bytes,
    Enum { variants: Vec<String> },
    /// Binary content with a filename
    File,
    /// Nested structured model of the given type
    Model { type_id: String },
    List { item: Box<FieldKind> },
    /// Key/value entries, in insertion order
    Map { key: Box<FieldKind>, value: Box<FieldKind> },
}

impl FieldKind {
    pub fn model(type_id: impl Into<String>) -> Self {
        FieldKind::Model {
            type_id: type_id.into(),
        }
    }

    pub fn list(item: FieldKind) -> Self {
        FieldKind::List {
            item: Box::new(item),
        }
    }

    pub fn map(key: FieldKind, value: FieldKind) -> Self {
        FieldKind::Map {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    pub fn enumeration<I, S>(variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldKind::Enum {
            variants: variants.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_model(&self) -> bool {
        matches!(self, FieldKind::Model { .. })
    }

    pub fn is_list(&self) -> bool {
        matches!(self, FieldKind::List { .. })
    }

    pub fn is_map(&self) -> bool {
        matches!(self, FieldKind::Map { .. })
    }

    pub fn is_file(&self) -> bool {
        matches!(self, FieldKind::File)
    }

    pub fn is_enum(&self) -> bool {
        matches!(self, FieldKind::Enum { .. })
    }

    /// Type id of a nested model field
    pub fn model_type(&self) -> Option<&str> {
        match self {
            FieldKind::Model { type_id } => Some(type_id),
            _ => None,
        }
    }

    /// Element kind of a list field
    pub fn item_kind(&self) -> Option<&FieldKind> {
        match self {
            FieldKind::List { item } => Some(item),
            _ => None,
        }
    }

    /// Key and value kinds of a map field
    pub fn entry_kinds(&self) -> Option<(&FieldKind, &FieldKind)> {
        match self {
            FieldKind::Map { key, value } => Some((key, value)),
            _ => None,
        }
    }

    /// Whether the value can be stored in a field of this kind as-is
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (FieldKind::String, Value::String(_))
            | (FieldKind::Integer, Value::Integer(_))
            | (FieldKind::Float, Value::Float(_))
            | (FieldKind::Boolean, Value::Boolean(_))
            | (FieldKind::Bytes, Value::Bytes(_))
            | (FieldKind::File, Value::File(_)) => true,
            (FieldKind::Enum { variants }, Value::Enum(name)) => variants.contains(name),
            (FieldKind::Model { type_id }, Value::Model(m)) => m.model_type() == type_id,
            (FieldKind::List { item }, Value::List(items)) => items.iter().all(|v| item.accepts(v)),
            (FieldKind::Map { key, value }, Value::Map(entries)) => {
                entries.iter().all(|(k, v)| key.accepts(k) && value.accepts(v))
            }
            _ => false,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::String => write!(f, "string"),
            FieldKind::Integer => write!(f, "integer"),
            FieldKind::Float => write!(f, "float"),
            FieldKind::Boolean => write!(f, "boolean"),
            FieldKind::Bytes => write!(f, "bytes"),
            FieldKind::Enum { variants } => write!(f, "enum({})", variants.join("|")),
            FieldKind::File => write!(f, "file"),
            FieldKind::Model { type_id } => write!(f, "model({})", type_id),
            FieldKind::List { item } => write!(f, "list({})", item),
            FieldKind::Map { key, value } => write!(f, "map({}, {})", key, value),
        }
    }
}

/// One declared field of a model type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default = "default_true")]
    pub writable: bool,
}

fn default_true() -> bool {
    true
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            writable: true,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }
}

/// Description of a model type: id, identifying field and ordered fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub type_id: String,
    /// Field whose value becomes the record-local part of the OID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_field: Option<String>,
    pub fields: Vec<FieldDescriptor>,
}

impl TypeDescriptor {
    pub fn new(type_id: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            id_field: None,
            fields: Vec::new(),
        }
    }

    pub fn with_id_field(mut self, name: impl Into<String>) -> Self {
        self.id_field = Some(name.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDescriptor::new(name, kind));
        self
    }

    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Look up a declared field by name
    pub fn get_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Writable fields, in declaration order
    pub fn writable_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.writable)
    }
}

/// Uniform field access on a structured value
pub trait Model: fmt::Debug + Send + Sync {
    /// The type this model is an instance of
    fn descriptor(&self) -> &TypeDescriptor;

    /// Read a field; `None` when the field is unknown or unset
    fn get(&self, field: &str) -> Option<Value>;

    /// Write a field
    fn set(&mut self, field: &str, value: Value) -> std::result::Result<(), FieldError>;

    fn model_type(&self) -> &str {
        &self.descriptor().type_id
    }

    /// Explicit id of this instance, taken from the descriptor's id field
    fn model_id(&self) -> Option<String> {
        let id_field = self.descriptor().id_field.as_deref()?;
        self.get(id_field).map(|v| v.to_string())
    }

    /// Set fields with their declared kinds, in declaration order
    fn entries(&self) -> Vec<(&FieldDescriptor, Value)> {
        self.descriptor()
            .fields
            .iter()
            .filter_map(|f| self.get(&f.name).map(|v| (f, v)))
            .collect()
    }
}

/// Structural equality: same type and the same set fields
pub fn models_equal(a: &dyn Model, b: &dyn Model) -> bool {
    if a.model_type() != b.model_type() {
        return false;
    }
    a.descriptor()
        .fields
        .iter()
        .all(|f| a.get(&f.name) == b.get(&f.name))
}

/// Check a write against the declared field before storing it
pub fn check_write(
    descriptor: &TypeDescriptor,
    field: &str,
    value: &Value,
) -> std::result::Result<(), FieldError> {
    let declared = descriptor.get_field(field).ok_or_else(|| FieldError::NoSuchField {
        type_id: descriptor.type_id.clone(),
        field: field.to_string(),
    })?;
    if !declared.writable {
        return Err(FieldError::NotWritable {
            field: field.to_string(),
        });
    }
    if !declared.kind.accepts(value) {
        return Err(FieldError::TypeMismatch {
            field: field.to_string(),
            expected: declared.kind.to_string(),
            actual: value.kind_name().to_string(),
        });
    }
    Ok(())
}

/// A model whose shape is known only through its descriptor
#[derive(Debug, Clone)]
pub struct DynamicModel {
    descriptor: Arc<TypeDescriptor>,
    values: BTreeMap<String, Value>,
}

impl DynamicModel {
    pub fn new(descriptor: Arc<TypeDescriptor>) -> Self {
        Self {
            descriptor,
            values: BTreeMap::new(),
        }
    }

    /// Builder-style write, for constructing instances in code
    pub fn with(
        mut self,
        field: &str,
        value: impl Into<Value>,
    ) -> std::result::Result<Self, FieldError> {
        self.set(field, value.into())?;
        Ok(self)
    }

    pub fn descriptor_arc(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    /// Remove a field value, returning it
    pub fn unset(&mut self, field: &str) -> Option<Value> {
        self.values.remove(field)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Build an instance from JSON, following the declared field kinds.
    ///
    /// Nested objects are resolved through the resolver. Files are objects
    /// with `filename` and base64 `content`. Unknown keys are ignored.
    pub fn from_json(
        resolver: &dyn TypeResolver,
        type_id: &str,
        json: &serde_json::Value,
    ) -> Result<Self> {
        let descriptor = resolver.resolve(type_id)?;
        let object = json.as_object().ok_or_else(|| {
            BridgeError::InvalidDefinition(format!("expected a JSON object for type {}", type_id))
        })?;
        let mut model = DynamicModel::new(descriptor.clone());
        for field in &descriptor.fields {
            let Some(raw) = object.get(&field.name) else {
                continue;
            };
            if raw.is_null() {
                continue;
            }
            let value = json_to_value(resolver, &field.kind, raw)?;
            model.values.insert(field.name.clone(), value);
        }
        Ok(model)
    }
}

impl Model for DynamicModel {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn get(&self, field: &str) -> Option<Value> {
        self.values.get(field).cloned()
    }

    fn set(&mut self, field: &str, value: Value) -> std::result::Result<(), FieldError> {
        check_write(&self.descriptor, field, &value)?;
        self.values.insert(field.to_string(), value);
        Ok(())
    }
}

fn json_to_value(
    resolver: &dyn TypeResolver,
    kind: &FieldKind,
    raw: &serde_json::Value,
) -> Result<Value> {
    let mismatch = || {
        BridgeError::Coercion(crate::error::CoercionError {
            value: raw.to_string(),
            actual: "json".to_string(),
            expected: kind.to_string(),
        })
    };
    let value = match kind {
        FieldKind::Model { type_id } => {
            Value::Model(Arc::new(DynamicModel::from_json(resolver, type_id, raw)?))
        }
        FieldKind::List { item } => {
            let items = raw.as_array().ok_or_else(mismatch)?;
            Value::List(
                items
                    .iter()
                    .map(|v| json_to_value(resolver, item, v))
                    .collect::<Result<Vec<_>>>()?,
            )
        }
        FieldKind::Map { key, value } => {
            let object = raw.as_object().ok_or_else(mismatch)?;
            let mut entries = Vec::with_capacity(object.len());
            for (k, v) in object {
                let k = Value::String(k.clone()).coerce(key)?;
                entries.push((k, json_to_value(resolver, value, v)?));
            }
            Value::Map(entries)
        }
        FieldKind::File => {
            let filename = raw.get("filename").and_then(|v| v.as_str()).unwrap_or_default();
            let content = raw.get("content").and_then(|v| v.as_str()).ok_or_else(mismatch)?;
            Value::File(FileWrapper::decode(filename, content).map_err(|_| mismatch())?)
        }
        FieldKind::Bytes => {
            let items = raw.as_array().ok_or_else(mismatch)?;
            Value::Bytes(
                items
                    .iter()
                    .map(|v| v.as_u64().and_then(|b| u8::try_from(b).ok()))
                    .collect::<Option<Vec<u8>>>()
                    .ok_or_else(mismatch)?,
            )
        }
        _ => {
            let scalar = match raw {
                serde_json::Value::String(s) => Value::String(s.clone()),
                serde_json::Value::Bool(b) => Value::Boolean(*b),
                serde_json::Value::Number(n) => match n.as_i64() {
                    Some(i) => Value::Integer(i),
                    None => Value::Float(n.as_f64().ok_or_else(mismatch)?),
                },
                _ => return Err(mismatch()),
            };
            scalar.coerce(kind)?
        }
    };
    Ok(value)
}

/// Render any model as a JSON object
pub fn model_to_json(model: &dyn Model) -> serde_json::Value {
    let mut object = serde_json::Map::new();
    for (field, value) in model.entries() {
        object.insert(field.name.clone(), value_to_json(&value));
    }
    serde_json::Value::Object(object)
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::String(s) | Value::Enum(s) => serde_json::Value::String(s.clone()),
        Value::Integer(i) => serde_json::Value::from(*i),
        Value::Float(x) => serde_json::Value::from(*x),
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::Bytes(b) => serde_json::Value::from(b.clone()),
        Value::File(file) => serde_json::json!({
            "filename": file.filename,
            "content": file.encoded_content(),
        }),
        Value::Model(m) => model_to_json(m.as_ref()),
        Value::List(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        // JSON object keys are strings
        Value::Map(entries) => serde_json::Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), value_to_json(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeRegistry;

    fn issue_type() -> Arc<TypeDescriptor> {
        Arc::new(
            TypeDescriptor::new("Issue")
                .with_id_field("id")
                .field("id", FieldKind::String)
                .field("priority", FieldKind::Integer)
                .field("state", FieldKind::enumeration(["OPEN", "CLOSED"]))
                .with_field(FieldDescriptor::new("created", FieldKind::String).read_only()),
        )
    }

    #[test]
    fn test_set_and_get() {
        let mut issue = DynamicModel::new(issue_type());
        issue.set("id", Value::from("42")).unwrap();
        assert_eq!(issue.get("id"), Some(Value::from("42")));
        assert_eq!(issue.model_id(), Some("42".to_string()));
        assert_eq!(issue.get("priority"), None);
    }

    #[test]
    fn test_field_errors() {
        let mut issue = DynamicModel::new(issue_type());
        assert!(matches!(
            issue.set("missing", Value::from("x")),
            Err(FieldError::NoSuchField { .. })
        ));
        assert!(matches!(
            issue.set("priority", Value::from("high")),
            Err(FieldError::TypeMismatch { .. })
        ));
        assert!(matches!(
            issue.set("created", Value::from("today")),
            Err(FieldError::NotWritable { .. })
        ));
        assert!(matches!(
            issue.set("state", Value::Enum("MERGED".to_string())),
            Err(FieldError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_kind_queries() {
        let kind = FieldKind::list(FieldKind::model("Comment"));
        assert!(kind.is_list());
        assert!(kind.item_kind().unwrap().is_model());
        assert_eq!(kind.item_kind().unwrap().model_type(), Some("Comment"));

        let map = FieldKind::map(FieldKind::String, FieldKind::Integer);
        assert!(map.is_map());
        assert_eq!(map.entry_kinds(), Some((&FieldKind::String, &FieldKind::Integer)));
        assert_eq!(map.to_string(), "map(string, integer)");
        assert!(FieldKind::File.is_file());
        assert!(FieldKind::enumeration(["A"]).is_enum());
    }

    #[test]
    fn test_descriptor_json_shape() {
        let json = r#"{
            "type_id": "Issue",
            "id_field": "id",
            "fields": [
                { "name": "id", "type": { "kind": "string" } },
                { "name": "tags", "type": { "kind": "list", "item": { "kind": "string" } } },
                { "name": "owner", "type": { "kind": "model", "type_id": "Person" }, "writable": false }
            ]
        }"#;
        let descriptor: TypeDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.fields.len(), 3);
        assert_eq!(descriptor.fields[1].kind, FieldKind::list(FieldKind::String));
        assert!(!descriptor.fields[2].writable);
        assert_eq!(descriptor.writable_fields().count(), 2);
    }

    #[test]
    fn test_json_bridge() {
        let registry = TypeRegistry::new();
        registry.register(
            TypeDescriptor::new("Person")
                .field("name", FieldKind::String)
                .field("tags", FieldKind::list(FieldKind::String)),
        );
        let json = serde_json::json!({ "name": "Ada", "tags": ["a", "b"], "ignored": 1 });
        let person = DynamicModel::from_json(&registry, "Person", &json).unwrap();
        assert_eq!(person.get("name"), Some(Value::from("Ada")));
        assert_eq!(
            model_to_json(&person),
            serde_json::json!({ "name": "Ada", "tags": ["a", "b"] })
        );
    }
}
