use super::{EntityMetadata, MetadataProvider};
use crate::core::{DetachError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Entity mappings known to a store.
///
/// Immutable once built; every change returns a new catalog, so clones are
/// cheap and readers never lock.
#[derive(Debug, Clone)]
pub struct Catalog {
    entities: Arc<HashMap<String, EntityMetadata>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            entities: Arc::new(HashMap::new()),
        }
    }

    /// Registers an entity type, returning the extended catalog.
    pub fn with_entity(self, metadata: EntityMetadata) -> Result<Self> {
        let name = metadata.type_name.clone();
        if self.entities.contains_key(&name) {
            return Err(DetachError::DuplicateType(name));
        }

        let mut entities = (*self.entities).clone();
        entities.insert(name, metadata);

        Ok(Self {
            entities: Arc::new(entities),
        })
    }

    pub fn without_entity(self, name: &str) -> Result<Self> {
        if !self.entities.contains_key(name) {
            return Err(DetachError::UnknownType(name.to_string()));
        }

        let mut entities = (*self.entities).clone();
        entities.remove(name);

        Ok(Self {
            entities: Arc::new(entities),
        })
    }

    pub fn get(&self, name: &str) -> Result<&EntityMetadata> {
        self.entities
            .get(name)
            .ok_or_else(|| DetachError::UnknownType(name.to_string()))
    }

    pub fn entity_exists(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    pub fn list_entities(&self) -> Vec<&str> {
        self.entities.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataProvider for Catalog {
    fn entity(&self, type_name: &str) -> Option<&EntityMetadata> {
        self.entities.get(type_name)
    }
}
