//! Tag → entity type lookup, populated once at startup.

use std::collections::HashMap;
use std::sync::Arc;

use crate::entity::Entity;
use crate::error::{OrmError, OrmResult};
use crate::meta::EntityMeta;

/// Registered entity types, keyed by a caller-chosen tag.
#[derive(Debug, Default, Clone)]
pub struct EntityRegistry {
    types: HashMap<String, Arc<EntityMeta>>,
}

impl EntityRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `meta` under `tag`.
    ///
    /// # Errors
    /// Returns [`OrmError::InvalidArgument`] if `tag` is already registered.
    pub fn register(&mut self, tag: impl Into<String>, meta: Arc<EntityMeta>) -> OrmResult<()> {
        let tag = tag.into();
        if self.types.contains_key(&tag) {
            return Err(OrmError::invalid_argument(format!(
                "entity tag '{tag}' is already registered"
            )));
        }
        self.types.insert(tag, meta);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, tag: &str) -> Option<&Arc<EntityMeta>> {
        self.types.get(tag)
    }

    /// Creates an empty entity of the type registered under `tag`.
    ///
    /// # Errors
    /// Returns [`OrmError::InvalidArgument`] for an unknown tag.
    pub fn create(&self, tag: &str) -> OrmResult<Entity> {
        self.get(tag)
            .map(Entity::new)
            .ok_or_else(|| OrmError::invalid_argument(format!("unknown entity tag '{tag}'")))
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
