//! Typed wrappers over [`Entity`].
//!
//! A model is a newtype around an entity that exposes domain accessors while
//! reusing the entity's dirty tracking and persistence.

use std::sync::Arc;

use crate::connection::Connection;
use crate::entity::Entity;
use crate::error::OrmResult;
use crate::meta::EntityMeta;
use crate::persistence::Lookup;

pub trait Model: Sized {
    /// Shared metadata of this model's entity type.
    fn meta() -> Arc<EntityMeta>;

    fn from_entity(entity: Entity) -> Self;

    fn entity(&self) -> &Entity;

    fn entity_mut(&mut self) -> &mut Entity;

    /// An empty, unsaved model.
    #[must_use]
    fn new() -> Self {
        Self::from_entity(Entity::new(&Self::meta()))
    }

    /// Loads the model matching `lookup`.
    ///
    /// # Errors
    /// Same as [`Entity::find`].
    fn find(conn: &mut dyn Connection, lookup: impl Into<Lookup>) -> OrmResult<Self> {
        Entity::load(conn, &Self::meta(), lookup).map(Self::from_entity)
    }

    fn into_entity(self) -> Entity {
        self.entity().clone()
    }
}
