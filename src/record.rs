//! Flat keyed records
//!
//! A [`Record`] is the storage form of one structured model: a mapping from
//! string keys to scalar values plus an OID and a store-owned version.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value::RecordValue;

pub const DOMAIN_ID_KEY: &str = "domainId";
pub const CONNECTOR_ID_KEY: &str = "connectorId";
pub const INSTANCE_ID_KEY: &str = "instanceId";
/// Type id of the model the record was produced from
pub const MODEL_TYPE_KEY: &str = "modelType";
/// Suffix of the key holding a binary entry's filename
pub const FILENAME_SUFFIX: &str = ".filename";

/// Keys written on every record regardless of the model's fields
pub const RESERVED_KEYS: [&str; 4] = [DOMAIN_ID_KEY, CONNECTOR_ID_KEY, INSTANCE_ID_KEY, MODEL_TYPE_KEY];

/// Identity of the connector a model is stored for
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorIdentity {
    pub domain_id: String,
    pub connector_id: String,
    pub instance_id: String,
}

impl ConnectorIdentity {
    pub fn new(
        domain_id: impl Into<String>,
        connector_id: impl Into<String>,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            domain_id: domain_id.into(),
            connector_id: connector_id.into(),
            instance_id: instance_id.into(),
        }
    }

    /// Namespace shared by all OIDs of this connector: `domainId/connectorId`
    pub fn oid_prefix(&self) -> String {
        format!("{}/{}", self.domain_id, self.connector_id)
    }

    /// OID for a model, reusing its explicit id or generating a random one
    pub fn oid_for(&self, model_id: Option<&str>) -> String {
        match model_id {
            Some(id) => format!("{}/{}", self.oid_prefix(), id),
            None => format!("{}/{}", self.oid_prefix(), Uuid::new_v4()),
        }
    }
}

/// One stored record
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    pub oid: String,
    pub entries: BTreeMap<String, RecordValue>,
    /// Assigned by the store on commit
    #[serde(default)]
    pub version: u64,
}

impl Record {
    pub fn new(oid: impl Into<String>) -> Self {
        Self {
            oid: oid.into(),
            entries: BTreeMap::new(),
            version: 0,
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<RecordValue>) -> Self {
        self.put(key, value);
        self
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<RecordValue>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&RecordValue> {
        self.entries.get(key)
    }

    /// String entry, or `None` when absent or not a string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(RecordValue::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<RecordValue> {
        self.entries.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn model_type(&self) -> Option<&str> {
        self.get_str(MODEL_TYPE_KEY)
    }

    /// Stamp the connector identity and model type, overwriting any previous values
    pub fn stamp(&mut self, identity: &ConnectorIdentity, model_type: &str) {
        self.put(DOMAIN_ID_KEY, identity.domain_id.as_str());
        self.put(CONNECTOR_ID_KEY, identity.connector_id.as_str());
        self.put(INSTANCE_ID_KEY, identity.instance_id.as_str());
        self.put(MODEL_TYPE_KEY, model_type);
    }

    /// Whether every criterion key holds the given value
    pub fn matches(&self, criteria: &BTreeMap<String, RecordValue>) -> bool {
        criteria
            .iter()
            .all(|(key, value)| self.entries.get(key) == Some(value))
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (v{}) {{", self.oid, self.version)?;
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, " {}: {}", key, value)?;
        }
        write!(f, " }}")
    }
}

/// Key of the `index`-th element of a list entry
pub fn list_key(key: &str, index: usize) -> String {
    format!("{}{}", key, index)
}

/// Key holding the key of the `index`-th entry of a map, e.g. `props0.key`
pub fn map_key_key(key: &str, index: usize) -> String {
    format!("{}.key", list_key(key, index))
}

/// Key holding the value of the `index`-th entry of a map, e.g. `props0.value`
pub fn map_value_key(key: &str, index: usize) -> String {
    format!("{}.value", list_key(key, index))
}

pub fn filename_key(key: &str) -> String {
    format!("{}{}", key, FILENAME_SUFFIX)
}
