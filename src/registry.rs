//! Transformation Registry
//!
//! In-memory table of transformation descriptions keyed by their
//! (source, target) type pair. At most one description is kept per pair.

use std::sync::RwLock;

use tracing::debug;

use crate::transformation::TransformationDescription;

/// Shared table of descriptions; every mutation happens under the write lock
#[derive(Debug, Default)]
pub struct TransformationRegistry {
    descriptions: RwLock<Vec<TransformationDescription>>,
}

impl TransformationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a description, replacing any with the same source and target
    pub fn save(&self, description: TransformationDescription) {
        let mut descriptions = self.descriptions.write().unwrap_or_else(|e| e.into_inner());
        let before = descriptions.len();
        descriptions.retain(|d| !d.connects(&description.source, &description.target));
        debug!(
            transformation = %description,
            replaced = before - descriptions.len(),
            "saved transformation description"
        );
        descriptions.push(description);
    }

    /// Store many descriptions in one atomic update
    pub fn save_all(&self, batch: Vec<TransformationDescription>) {
        let mut descriptions = self.descriptions.write().unwrap_or_else(|e| e.into_inner());
        for description in batch {
            descriptions.retain(|d| !d.connects(&description.source, &description.target));
            descriptions.push(description);
        }
    }

    /// Remove the description for the pair; returns whether one was removed
    pub fn delete(&self, description: &TransformationDescription) -> bool {
        let mut descriptions = self.descriptions.write().unwrap_or_else(|e| e.into_inner());
        let before = descriptions.len();
        descriptions.retain(|d| !d.connects(&description.source, &description.target));
        before != descriptions.len()
    }

    /// Remove the stored description only if it is this exact one.
    ///
    /// Matches on the pair and the id, so a description that already
    /// replaced the given one for its pair stays in place.
    pub fn delete_exact(&self, description: &TransformationDescription) -> bool {
        let mut descriptions = self.descriptions.write().unwrap_or_else(|e| e.into_inner());
        let before = descriptions.len();
        descriptions.retain(|d| !(d.connects(&description.source, &description.target) && d.id == description.id));
        before != descriptions.len()
    }

    /// The description converting `source` into `target`
    pub fn lookup(&self, source: &str, target: &str) -> Option<TransformationDescription> {
        let descriptions = self.descriptions.read().unwrap_or_else(|e| e.into_inner());
        descriptions.iter().find(|d| d.connects(source, target)).cloned()
    }

    pub fn is_possible(&self, source: &str, target: &str) -> bool {
        let descriptions = self.descriptions.read().unwrap_or_else(|e| e.into_inner());
        descriptions.iter().any(|d| d.connects(source, target))
    }

    /// Snapshot of all stored descriptions
    pub fn descriptions(&self) -> Vec<TransformationDescription> {
        self.descriptions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.descriptions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
