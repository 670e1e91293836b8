//! Record/Object Conversion
//!
//! Flattens a structured model graph into keyed records and rebuilds models
//! from records.
//!
//! Encoding:
//! - scalar entry: one key/value
//! - nested model: its own record; the parent stores the child OID under the key
//! - list: `key0, key1, ...` with no length entry; a missing index ends the list
//! - map: `key0.key` and `key0.value` per entry; a missing key entry ends the map
//! - file: `key` holds base64 content, `key.filename` the filename
//! - every record carries `domainId`, `connectorId`, `instanceId` and `modelType`

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::Result;
use crate::model::{FieldDescriptor, FieldKind, Model};
use crate::record::{filename_key, list_key, map_key_key, map_value_key, ConnectorIdentity, Record};
use crate::store::RecordFetch;
use crate::types::TypeResolver;
use crate::value::{FileWrapper, RecordValue, Value};

/// Output of flattening one model graph
#[derive(Debug, Clone)]
pub struct Flattened {
    /// OID of the record produced for the root model
    pub root_oid: String,
    /// Every produced record; children precede their parents
    pub records: Vec<Record>,
}

impl Flattened {
    pub fn root(&self) -> Option<&Record> {
        self.records.iter().find(|r| r.oid == self.root_oid)
    }
}

/// Converts between models and records
#[derive(Clone)]
pub struct RecordConverter {
    resolver: Arc<dyn TypeResolver>,
}

impl RecordConverter {
    pub fn new(resolver: Arc<dyn TypeResolver>) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &Arc<dyn TypeResolver> {
        &self.resolver
    }

    /// Flatten a model and everything reachable from it.
    ///
    /// A nested instance referenced from several entries is emitted once and
    /// every reference stores the same OID.
    pub fn flatten(&self, model: &dyn Model, identity: &ConnectorIdentity) -> Flattened {
        let mut seen = Seen::default();
        let mut records = Vec::new();
        let root_oid = flatten_model(model, identity, &mut seen, &mut records);
        debug!(root = %root_oid, count = records.len(), "flattened model");
        Flattened { root_oid, records }
    }

    /// Records for a model graph, children first
    pub fn convert_object_to_records(&self, model: &dyn Model, identity: &ConnectorIdentity) -> Vec<Record> {
        self.flatten(model, identity).records
    }

    pub fn convert_record_to_object(
        &self,
        type_id: &str,
        record: &Record,
        fetch: &dyn RecordFetch,
    ) -> Result<Option<Box<dyn Model>>> {
        self.unflatten(type_id, record, fetch)
    }

    /// Rebuild a model of the given type from a record.
    ///
    /// Returns `Ok(None)` when no declared field received a value or the
    /// record was produced from a different type. Type resolution and record
    /// fetch failures are returned as errors.
    pub fn unflatten(
        &self,
        type_id: &str,
        record: &Record,
        fetch: &dyn RecordFetch,
    ) -> Result<Option<Box<dyn Model>>> {
        let descriptor = self.resolver.resolve(type_id)?;
        match record.model_type() {
            Some(tagged) if tagged != type_id => {
                warn!(oid = %record.oid, expected = type_id, found = tagged, "record holds a different model type");
                return Ok(None);
            }
            Some(_) => {}
            None => warn!(oid = %record.oid, type_id, "record carries no model type tag"),
        }

        let mut instance = self.resolver.new_instance(&descriptor)?;
        let mut assigned = 0usize;
        for field in descriptor.writable_fields() {
            let Some(raw) = self.read_field(field, record, fetch)? else {
                continue;
            };
            let value = match raw.coerce(&field.kind) {
                Ok(value) => value,
                Err(e) => {
                    warn!(oid = %record.oid, field = %field.name, error = %e, "skipping field");
                    continue;
                }
            };
            match instance.set(&field.name, value) {
                Ok(()) => assigned += 1,
                Err(e) => warn!(oid = %record.oid, field = %field.name, error = %e, "skipping field"),
            }
        }

        if assigned == 0 {
            debug!(oid = %record.oid, type_id, "no field matched");
            return Ok(None);
        }
        Ok(Some(instance))
    }

    /// Rebuild every record that yields a model; the others are omitted
    pub fn unflatten_many(
        &self,
        type_id: &str,
        records: &[Record],
        fetch: &dyn RecordFetch,
    ) -> Result<Vec<Box<dyn Model>>> {
        let mut models = Vec::with_capacity(records.len());
        for record in records {
            if let Some(model) = self.unflatten(type_id, record, fetch)? {
                models.push(model);
            }
        }
        Ok(models)
    }

    /// Raw value for one declared field, before coercion
    fn read_field(
        &self,
        field: &FieldDescriptor,
        record: &Record,
        fetch: &dyn RecordFetch,
    ) -> Result<Option<Value>> {
        let key = field.name.as_str();

        if record.contains(&map_key_key(key, 0)) && (field.kind.is_map() || !record.contains(key)) {
            let (key_kind, value_kind) = field.kind.entry_kinds().unwrap_or((&field.kind, &field.kind));
            let mut entries = Vec::new();
            let mut index = 0;
            while record.contains(&map_key_key(key, index)) {
                let entry_key = self.read_single(&map_key_key(key, index), key_kind, record, fetch)?;
                let entry_value = self.read_single(&map_value_key(key, index), value_kind, record, fetch)?;
                match (entry_key, entry_value) {
                    (Some(k), Some(v)) => entries.push((k, v)),
                    _ => warn!(key, index, "incomplete map entry, skipping"),
                }
                index += 1;
            }
            return Ok(Some(Value::Map(entries)));
        }

        // A plain scalar entry wins over a sibling key that merely looks like `key0`
        if record.contains(&list_key(key, 0)) && (field.kind.is_list() || !record.contains(key)) {
            let item_kind = field.kind.item_kind().unwrap_or(&field.kind);
            let mut items = Vec::new();
            let mut index = 0;
            while record.contains(&list_key(key, index)) {
                let element_key = list_key(key, index);
                if let Some(item) = self.read_single(&element_key, item_kind, record, fetch)? {
                    items.push(item);
                }
                index += 1;
            }
            return Ok(Some(Value::List(items)));
        }

        self.read_single(key, &field.kind, record, fetch)
    }

    fn read_single(
        &self,
        key: &str,
        kind: &FieldKind,
        record: &Record,
        fetch: &dyn RecordFetch,
    ) -> Result<Option<Value>> {
        let Some(stored) = record.get(key) else {
            return Ok(None);
        };

        match kind {
            FieldKind::Model { type_id } => {
                let Some(oid) = stored.as_str() else {
                    warn!(key, "nested model entry is not an OID string");
                    return Ok(None);
                };
                let child = fetch.fetch(oid)?;
                let model = self.unflatten(type_id, &child, fetch)?;
                Ok(model.map(|m| Value::Model(Arc::from(m))))
            }
            FieldKind::File => {
                let Some(encoded) = stored.as_str() else {
                    warn!(key, "file entry is not base64 text");
                    return Ok(None);
                };
                let filename = record.get_str(&filename_key(key)).unwrap_or_default();
                match FileWrapper::decode(filename, encoded) {
                    Ok(file) => Ok(Some(Value::File(file))),
                    Err(e) => {
                        warn!(key, error = %e, "file entry is not valid base64");
                        Ok(None)
                    }
                }
            }
            // Enumerations are matched by name during coercion
            _ => Ok(Some(stored.to_value())),
        }
    }
}

/// Models already flattened during one call, by address.
///
/// Every nested `Arc` reached is pinned until the call ends. A model may build
/// its children on the fly in `get`, and a dropped child's address could
/// otherwise be handed to a different child later in the walk.
#[derive(Default)]
struct Seen {
    oids: HashMap<*const (), String>,
    pinned: Vec<Arc<dyn Model>>,
}

impl Seen {
    fn address(model: &dyn Model) -> *const () {
        model as *const dyn Model as *const ()
    }

    fn pin(&mut self, model: &Arc<dyn Model>) {
        if !self.oids.contains_key(&Self::address(model.as_ref())) {
            self.pinned.push(model.clone());
        }
    }
}

fn flatten_model(
    model: &dyn Model,
    identity: &ConnectorIdentity,
    seen: &mut Seen,
    out: &mut Vec<Record>,
) -> String {
    let address = Seen::address(model);
    if let Some(oid) = seen.oids.get(&address) {
        return oid.clone();
    }
    let oid = identity.oid_for(model.model_id().as_deref());
    seen.oids.insert(address, oid.clone());

    let mut record = Record::new(oid.clone());
    for (field, value) in model.entries() {
        write_entry(&mut record, &field.name, &value, identity, seen, out);
    }
    record.stamp(identity, model.model_type());
    out.push(record);
    oid
}

fn write_entry(
    record: &mut Record,
    key: &str,
    value: &Value,
    identity: &ConnectorIdentity,
    seen: &mut Seen,
    out: &mut Vec<Record>,
) {
    match value {
        Value::Model(child) => {
            seen.pin(child);
            let child_oid = flatten_model(child.as_ref(), identity, seen, out);
            record.put(key, child_oid);
        }
        Value::File(file) => {
            record.put(key, file.encoded_content());
            record.put(filename_key(key), file.filename.as_str());
        }
        Value::List(items) => {
            for (index, item) in items.iter().enumerate() {
                if matches!(item, Value::List(_) | Value::Map(_)) {
                    warn!(key, index, "nested collections cannot be flattened, skipping element");
                    continue;
                }
                write_entry(record, &list_key(key, index), item, identity, seen, out);
            }
        }
        Value::Map(entries) => {
            let mut index = 0;
            for (k, v) in entries {
                if [k, v].iter().any(|e| matches!(e, Value::List(_) | Value::Map(_))) {
                    warn!(key, index, "nested collections cannot be flattened, skipping entry");
                    continue;
                }
                write_entry(record, &map_key_key(key, index), k, identity, seen, out);
                write_entry(record, &map_value_key(key, index), v, identity, seen, out);
                index += 1;
            }
        }
        scalar => {
            if let Some(stored) = RecordValue::from_scalar(scalar) {
                record.put(key, stored);
            }
        }
    }
}
