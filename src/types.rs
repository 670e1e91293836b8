//! Type Resolution
//!
//! Locates model types by id and constructs fresh instances of them.
//! [`TypeRegistry`] is the in-memory resolver; hand-written [`Model`]
//! implementations can register a factory, everything else is instantiated
//! as a [`DynamicModel`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use tracing::{debug, info};

use crate::error::{BridgeError, Result};
use crate::model::{DynamicModel, Model, TypeDescriptor};

/// Locates types by id and creates empty instances of them
pub trait TypeResolver: Send + Sync {
    /// Resolve a type id; fails with [`BridgeError::TypeNotFound`] when unknown
    fn resolve(&self, type_id: &str) -> Result<Arc<TypeDescriptor>>;

    /// Create an empty instance of a resolved type
    fn new_instance(&self, descriptor: &Arc<TypeDescriptor>) -> Result<Box<dyn Model>>;

    fn instantiate(&self, type_id: &str) -> Result<Box<dyn Model>> {
        let descriptor = self.resolve(type_id)?;
        self.new_instance(&descriptor)
    }
}

/// Builds an empty instance of a registered type
pub type ModelFactory = Arc<dyn Fn(Arc<TypeDescriptor>) -> Box<dyn Model> + Send + Sync>;

struct RegisteredType {
    descriptor: Arc<TypeDescriptor>,
    factory: Option<ModelFactory>,
}

/// In-memory type resolver
#[derive(Default)]
pub struct TypeRegistry {
    types: RwLock<HashMap<String, RegisteredType>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a type instantiated as a [`DynamicModel`]
    pub fn register(&self, descriptor: TypeDescriptor) -> Arc<TypeDescriptor> {
        self.insert(descriptor, None)
    }

    /// Register a type with its own constructor
    pub fn register_with_factory<F>(&self, descriptor: TypeDescriptor, factory: F) -> Arc<TypeDescriptor>
    where
        F: Fn(Arc<TypeDescriptor>) -> Box<dyn Model> + Send + Sync + 'static,
    {
        self.insert(descriptor, Some(Arc::new(factory)))
    }

    fn insert(&self, descriptor: TypeDescriptor, factory: Option<ModelFactory>) -> Arc<TypeDescriptor> {
        let descriptor = Arc::new(descriptor);
        debug!(type_id = %descriptor.type_id, "registering type");
        let mut types = self.types.write().unwrap_or_else(|e| e.into_inner());
        types.insert(
            descriptor.type_id.clone(),
            RegisteredType {
                descriptor: descriptor.clone(),
                factory,
            },
        );
        descriptor
    }

    pub fn unregister(&self, type_id: &str) -> bool {
        let mut types = self.types.write().unwrap_or_else(|e| e.into_inner());
        types.remove(type_id).is_some()
    }

    pub fn contains(&self, type_id: &str) -> bool {
        let types = self.types.read().unwrap_or_else(|e| e.into_inner());
        types.contains_key(type_id)
    }

    /// Registered type ids, sorted
    pub fn type_ids(&self) -> Vec<String> {
        let types = self.types.read().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<String> = types.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.types.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register every descriptor in a JSON array
    pub fn load_json(&self, json: &str) -> Result<usize> {
        let descriptors: Vec<TypeDescriptor> = serde_json::from_str(json)?;
        let count = descriptors.len();
        for descriptor in descriptors {
            self.register(descriptor);
        }
        Ok(count)
    }

    /// Register every descriptor in a JSON file
    pub fn load_file(&self, path: &Path) -> Result<usize> {
        let content = std::fs::read_to_string(path)?;
        let count = self.load_json(&content)?;
        info!(path = %path.display(), count, "loaded type descriptors");
        Ok(count)
    }

    /// Closest registered type id to an unknown one
    fn suggest(&self, type_id: &str) -> Option<String> {
        let matcher = SkimMatcherV2::default();
        let types = self.types.read().unwrap_or_else(|e| e.into_inner());
        types
            .keys()
            .filter_map(|candidate| {
                matcher
                    .fuzzy_match(candidate, type_id)
                    .map(|score| (score, candidate))
            })
            .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(a.1)))
            .map(|(_, candidate)| candidate.clone())
    }
}

impl TypeResolver for TypeRegistry {
    fn resolve(&self, type_id: &str) -> Result<Arc<TypeDescriptor>> {
        let found = {
            let types = self.types.read().unwrap_or_else(|e| e.into_inner());
            types.get(type_id).map(|t| t.descriptor.clone())
        };
        found.ok_or_else(|| BridgeError::TypeNotFound {
            type_id: type_id.to_string(),
            suggestion: self.suggest(type_id),
        })
    }

    fn new_instance(&self, descriptor: &Arc<TypeDescriptor>) -> Result<Box<dyn Model>> {
        let factory = {
            let types = self.types.read().unwrap_or_else(|e| e.into_inner());
            types
                .get(&descriptor.type_id)
                .and_then(|t| t.factory.clone())
        };
        let instance: Box<dyn Model> = match factory {
            Some(factory) => factory(descriptor.clone()),
            None => Box::new(DynamicModel::new(descriptor.clone())),
        };
        if instance.model_type() != descriptor.type_id {
            return Err(BridgeError::Instantiation {
                type_id: descriptor.type_id.clone(),
                reason: format!("factory produced an instance of {}", instance.model_type()),
            });
        }
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldKind;

    #[test]
    fn test_resolve_registered_type() {
        let registry = TypeRegistry::new();
        registry.register(TypeDescriptor::new("Issue").field("id", FieldKind::String));
        let descriptor = registry.resolve("Issue").unwrap();
        assert_eq!(descriptor.fields.len(), 1);
        let instance = registry.instantiate("Issue").unwrap();
        assert_eq!(instance.model_type(), "Issue");
    }

    #[test]
    fn test_unknown_type_suggests_close_name() {
        let registry = TypeRegistry::new();
        registry.register(TypeDescriptor::new("Issue"));
        registry.register(TypeDescriptor::new("Person"));
        match registry.resolve("Isue") {
            Err(BridgeError::TypeNotFound { type_id, suggestion }) => {
                assert_eq!(type_id, "Isue");
                assert_eq!(suggestion.as_deref(), Some("Issue"));
            }
            other => panic!("expected TypeNotFound, got {:?}", other.map(|d| d.type_id.clone())),
        }
    }

    #[test]
    fn test_factory_mismatch_is_rejected() {
        let registry = TypeRegistry::new();
        let other = Arc::new(TypeDescriptor::new("Other"));
        registry.register_with_factory(TypeDescriptor::new("Issue"), move |_| {
            Box::new(DynamicModel::new(other.clone())) as Box<dyn Model>
        });
        assert!(matches!(
            registry.instantiate("Issue"),
            Err(BridgeError::Instantiation { .. })
        ));
    }

    #[test]
    fn test_load_json() {
        let registry = TypeRegistry::new();
        let count = registry
            .load_json(r#"[{ "type_id": "A", "fields": [] }, { "type_id": "B", "fields": [] }]"#)
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(registry.type_ids(), vec!["A".to_string(), "B".to_string()]);
        assert!(registry.unregister("A"));
        assert!(!registry.contains("A"));
    }
}
