//! Transformation Engine
//!
//! Facade owning the type resolver, the description registry and the
//! transformation graph. Descriptions saved through the engine land in both,
//! and each (source, target) pair has at most one description in either.
//!
//! Engine updates hold the engine lock for writing across the registry and
//! graph changes, engine lookups hold it for reading. A lookup therefore
//! never sees a description in one structure but not yet in the other.

use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use crate::config::BridgeConfig;
use crate::converter::RecordConverter;
use crate::error::{BridgeError, Result};
use crate::graph::TransformationGraph;
use crate::loader::{self, DefinitionBundle, LoadConfig};
use crate::model::Model;
use crate::registry::TransformationRegistry;
use crate::transformation::performer::TransformationPerformer;
use crate::transformation::TransformationDescription;
use crate::types::TypeResolver;

pub struct TransformationEngine {
    resolver: Arc<dyn TypeResolver>,
    registry: TransformationRegistry,
    graph: TransformationGraph,
    performer: TransformationPerformer,
    lock: RwLock<()>,
}

impl TransformationEngine {
    pub fn new(resolver: Arc<dyn TypeResolver>) -> Self {
        Self::with_graph(resolver, TransformationGraph::new())
    }

    /// Engine using the configured internal id prefix
    pub fn from_config(resolver: Arc<dyn TypeResolver>, config: &BridgeConfig) -> Self {
        Self::with_graph(resolver, TransformationGraph::with_internal_prefix(&config.graph.internal_prefix))
    }

    pub fn with_graph(resolver: Arc<dyn TypeResolver>, graph: TransformationGraph) -> Self {
        Self {
            performer: TransformationPerformer::new(resolver.clone()),
            registry: TransformationRegistry::new(),
            graph,
            resolver,
            lock: RwLock::new(()),
        }
    }

    pub fn resolver(&self) -> &Arc<dyn TypeResolver> {
        &self.resolver
    }

    pub fn registry(&self) -> &TransformationRegistry {
        &self.registry
    }

    pub fn graph(&self) -> &TransformationGraph {
        &self.graph
    }

    /// Record converter sharing this engine's resolver
    pub fn converter(&self) -> RecordConverter {
        RecordConverter::new(self.resolver.clone())
    }

    fn read_lock(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write().unwrap_or_else(|e| e.into_inner())
    }

    // ========== Descriptions ==========

    /// Save a description, replacing the one for the same type pair.
    ///
    /// Returns the id of the graph edge.
    pub fn save_description(&self, description: TransformationDescription) -> String {
        let _lock = self.write_lock();
        self.store(description)
    }

    /// Save many descriptions in one update
    pub fn save_descriptions(&self, descriptions: Vec<TransformationDescription>) -> Vec<String> {
        let _lock = self.write_lock();
        descriptions.into_iter().map(|d| self.store(d)).collect()
    }

    fn store(&self, description: TransformationDescription) -> String {
        let (id, stored) = self.graph.replace_transformation(description);
        self.registry.save(stored);
        id
    }

    /// Remove the description matching the graph's removal rule.
    ///
    /// Without an explicit id only an internally identified description of
    /// the pair goes. Returns whether anything was removed.
    pub fn delete_description(&self, description: &TransformationDescription) -> bool {
        let _lock = self.write_lock();
        let removed = self.graph.remove_transformation(description);
        for description in &removed {
            self.registry.delete_exact(description);
        }
        !removed.is_empty()
    }

    /// Parse descriptions without saving them
    pub fn load_descriptions(&self, text: &str) -> Result<Vec<TransformationDescription>> {
        loader::load_descriptions(text, self.resolver.as_ref())
    }

    /// Parse a definition file and save every description in it
    pub fn add_descriptions_from_file(&self, path: &Path) -> Result<usize> {
        let descriptions = loader::load_from_file(path, self.resolver.as_ref())?;
        let count = descriptions.len();
        self.save_descriptions(descriptions);
        info!(path = %path.display(), count, "added transformation descriptions");
        Ok(count)
    }

    /// Replace everything previously loaded from a file with its current content
    pub fn reload_file(&self, path: &Path) -> Result<Vec<String>> {
        let descriptions = loader::load_from_file(path, self.resolver.as_ref())?;
        let _lock = self.write_lock();
        Ok(self.replace_file(&path.display().to_string(), descriptions))
    }

    /// Caller holds the write lock
    fn replace_file(&self, file_name: &str, descriptions: Vec<TransformationDescription>) -> Vec<String> {
        let (removed, added) = self.graph.reload_file(file_name, descriptions);
        for description in &removed {
            self.registry.delete_exact(description);
        }
        let ids = added.iter().filter_map(|d| d.id.clone()).collect();
        self.registry.save_all(added);
        ids
    }

    /// Forget every description loaded from a file
    pub fn remove_file(&self, file_name: &str) -> usize {
        let _lock = self.write_lock();
        let removed = self.graph.remove_file(file_name);
        for description in &removed {
            self.registry.delete_exact(description);
        }
        removed.len()
    }

    /// Load every definition file under `dir`
    pub fn load_directory(&self, dir: &Path, config: &LoadConfig) -> Result<DefinitionBundle> {
        let bundle = loader::load_from_directory(dir, config, self.resolver.as_ref())?;
        let _lock = self.write_lock();
        for file in &bundle.files {
            self.replace_file(&file.file_name, file.descriptions.clone());
        }
        Ok(bundle)
    }

    // ========== Types ==========

    /// Mark a type available in the graph; unknown types are rejected
    pub fn activate_type(&self, type_id: &str) -> Result<()> {
        let descriptor = self.resolver.resolve(type_id)?;
        self.graph.add_type(&descriptor.type_id);
        Ok(())
    }

    pub fn deactivate_type(&self, type_id: &str) {
        self.graph.remove_type(type_id);
    }

    // ========== Transforming ==========

    pub fn is_transformation_possible(&self, source_type: &str, target_type: &str) -> bool {
        let _lock = self.read_lock();
        self.registry.is_possible(source_type, target_type)
    }

    /// Transform with the registered description for the pair
    pub fn perform_transformation(
        &self,
        source_type: &str,
        target_type: &str,
        source: &dyn Model,
    ) -> Result<Box<dyn Model>> {
        let lock = self.read_lock();
        let description = self
            .registry
            .lookup(source_type, target_type)
            .ok_or_else(|| BridgeError::no_transformation(source_type, target_type))?;
        drop(lock);
        debug!(transformation = %description, "performing transformation");
        self.performer.transform(&description, source)
    }

    /// Transform along the graph edge, restricted to `ids` when given
    pub fn perform_transformation_with_ids(
        &self,
        source_type: &str,
        target_type: &str,
        ids: &[String],
        source: &dyn Model,
    ) -> Result<Box<dyn Model>> {
        let lock = self.read_lock();
        let description = self.graph.path(source_type, target_type, ids)?;
        drop(lock);
        debug!(transformation = %description, ?ids, "performing transformation");
        self.performer.transform(&description, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DynamicModel, FieldKind, TypeDescriptor};
    use crate::types::TypeRegistry;
    use crate::value::Value;

    fn engine() -> (Arc<TypeRegistry>, TransformationEngine) {
        let types = Arc::new(TypeRegistry::new());
        types.register(TypeDescriptor::new("A").field("x", FieldKind::String));
        types.register(TypeDescriptor::new("B").field("y", FieldKind::String));
        let engine = TransformationEngine::new(types.clone());
        (types, engine)
    }

    #[test]
    fn test_save_and_perform() {
        let (types, engine) = engine();
        let mut desc = TransformationDescription::new("A", "B");
        desc.to_upper_field("x", "y");
        engine.save_description(desc);

        let source = DynamicModel::new(types.resolve("A").unwrap()).with("x", "hi").unwrap();
        let target = engine.perform_transformation("A", "B", &source).unwrap();
        assert_eq!(target.get("y"), Some(Value::from("HI")));
        assert!(engine.is_transformation_possible("A", "B"));
        assert_eq!(engine.graph().edge_count(), 1);
    }

    #[test]
    fn test_saving_same_pair_keeps_one_edge() {
        let (_, engine) = engine();
        engine.save_description(TransformationDescription::new("A", "B"));
        engine.save_description(TransformationDescription::new("A", "B"));
        assert_eq!(engine.registry().len(), 1);
        assert_eq!(engine.graph().edge_count(), 1);
    }

    #[test]
    fn test_missing_description_is_an_error() {
        let (types, engine) = engine();
        let source = DynamicModel::new(types.resolve("A").unwrap());
        let err = engine.perform_transformation("A", "B", &source).unwrap_err();
        assert!(matches!(err, BridgeError::NoTransformationFound { .. }));
    }

    #[test]
    fn test_delete_description() {
        let (_, engine) = engine();
        let desc = TransformationDescription::new("A", "B");
        engine.save_description(desc.clone());
        assert!(engine.delete_description(&desc));
        assert!(!engine.is_transformation_possible("A", "B"));
        assert!(!engine.graph().path_exists("A", "B", &[]));
    }

    #[test]
    fn test_delete_without_id_keeps_explicit_description() {
        let (_, engine) = engine();
        engine.save_description(TransformationDescription::new("A", "B").with_id("a-to-b"));
        assert!(!engine.delete_description(&TransformationDescription::new("A", "B")));
        assert!(engine.is_transformation_possible("A", "B"));
        assert!(engine.delete_description(&TransformationDescription::new("A", "B").with_id("a-to-b")));
        assert!(engine.registry().is_empty());
    }

    fn write_definition(dir: &Path, name: &str, id: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let xml = format!(
            r#"<transformations>
                <transformation source="A" target="B" id="{}">
                    <forward>
                        <source-fields><source-field>x</source-field></source-fields>
                        <target-field>y</target-field>
                    </forward>
                </transformation>
            </transformations>"#,
            id
        );
        std::fs::write(&path, xml).unwrap();
        path
    }

    fn assert_registry_matches_graph(engine: &TransformationEngine, expected: Option<&str>) {
        let registered = engine.registry().lookup("A", "B").and_then(|d| d.id);
        let routed = engine.graph().path("A", "B", &[]).ok().and_then(|d| d.id);
        assert_eq!(registered.as_deref(), expected);
        assert_eq!(routed.as_deref(), expected);
    }

    #[test]
    fn test_two_files_defining_same_pair() {
        let (_, engine) = engine();
        let dir = tempfile::tempdir().unwrap();
        let one = write_definition(dir.path(), "one.transformation", "from-one");
        let two = write_definition(dir.path(), "two.transformation", "from-two");

        engine.reload_file(&one).unwrap();
        engine.reload_file(&two).unwrap();
        assert_eq!(engine.graph().edge_count(), 1);
        assert_registry_matches_graph(&engine, Some("from-two"));

        // The later file already took over the pair
        assert_eq!(engine.remove_file(&one.display().to_string()), 0);
        assert_registry_matches_graph(&engine, Some("from-two"));

        assert_eq!(engine.remove_file(&two.display().to_string()), 1);
        assert_registry_matches_graph(&engine, None);
    }

    #[test]
    fn test_lookups_never_see_a_half_saved_description() {
        let (types, engine) = engine();
        let engine = Arc::new(engine);
        engine.save_description(TransformationDescription::new("A", "B"));
        let source = Arc::new(DynamicModel::new(types.resolve("A").unwrap()).with("x", "hi").unwrap());

        let writer = {
            let engine = engine.clone();
            std::thread::spawn(move || {
                for i in 0..200 {
                    let description = TransformationDescription::new("A", "B");
                    let description = if i % 2 == 0 {
                        description.with_id(format!("explicit-{}", i))
                    } else {
                        description
                    };
                    engine.save_description(description);
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let engine = engine.clone();
                let source = source.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        assert!(engine.is_transformation_possible("A", "B"));
                        assert!(engine.perform_transformation("A", "B", &*source).is_ok());
                        assert!(engine
                            .perform_transformation_with_ids("A", "B", &[], &*source)
                            .is_ok());
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(engine.graph().edge_count(), 1);
        assert_eq!(engine.registry().len(), 1);
        let last = engine.registry().lookup("A", "B").and_then(|d| d.id);
        assert_eq!(engine.graph().path("A", "B", &[]).unwrap().id, last);
    }

    #[test]
    fn test_activate_unknown_type_fails() {
        let (_, engine) = engine();
        assert!(engine.activate_type("A").is_ok());
        assert!(engine.graph().is_type_active("A"));
        assert!(engine.activate_type("Zzz").is_err());
        engine.deactivate_type("A");
        assert!(!engine.graph().is_type_active("A"));
    }
}
