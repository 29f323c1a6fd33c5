use std::collections::HashMap;

use crate::entity::Entity;
use crate::error::SchemaError;
use crate::index::{IndexDef, IndexState};

/// `(major, minor, patch)` triple, `spec.md` §4.2: "used only for change
/// tracking" — compared but never interpreted beyond equality/ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SchemaVersion(pub u32, pub u32, pub u32);

/// `spec.md` §4.2 "Schema": holds the set of entities, indexes, per-entity
/// primary key, and index configuration. Exposes `indexes(for entityName)`
/// and `index(named)` lookups.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    entities: HashMap<String, Entity>,
    indexes: HashMap<String, IndexDef>,
    version: Option<SchemaVersion>,
}

impl Schema {
    pub fn new() -> Self { Self::default() }

    pub fn with_version(mut self, version: SchemaVersion) -> Self {
        self.version = Some(version);
        self
    }

    pub fn version(&self) -> Option<SchemaVersion> { self.version }

    pub fn add_entity(&mut self, entity: Entity) -> Result<(), SchemaError> {
        if self.entities.contains_key(&entity.name) {
            return Err(SchemaError::DuplicateEntity { name: entity.name });
        }
        self.entities.insert(entity.name.clone(), entity);
        Ok(())
    }

    pub fn add_index(&mut self, index: IndexDef) -> Result<(), SchemaError> {
        if self.indexes.contains_key(&index.name) {
            return Err(SchemaError::DuplicateIndex { name: index.name });
        }
        self.indexes.insert(index.name.clone(), index);
        Ok(())
    }

    pub fn entity(&self, name: &str) -> Result<&Entity, SchemaError> { self.entities.get(name).ok_or_else(|| SchemaError::UnknownEntity(name.to_string())) }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> { self.entities.values() }

    pub fn index(&self, name: &str) -> Result<&IndexDef, SchemaError> { self.indexes.get(name).ok_or_else(|| SchemaError::UnknownIndex(name.to_string())) }

    /// All indexes whose `recordTypes` include `entity_name`, regardless of
    /// state (callers filter by state for read-vs-write purposes).
    pub fn indexes_for(&self, entity_name: &str) -> Vec<&IndexDef> { self.indexes.values().filter(|i| i.applies_to(entity_name)).collect() }

    pub fn indexes(&self) -> impl Iterator<Item = &IndexDef> { self.indexes.values() }

    pub fn set_index_state(&mut self, name: &str, state: IndexState) -> Result<(), SchemaError> {
        let index = self.indexes.get_mut(name).ok_or_else(|| SchemaError::UnknownIndex(name.to_string()))?;
        index.state.validate_transition(state)?;
        index.state = state;
        Ok(())
    }
}
