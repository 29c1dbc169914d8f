//! Dirty-tracked entity instances.
//!
//! An [`Entity`] owns two row snapshots: `data` (current values) and
//! `original` (values at the last load or save). All property access goes
//! through the shared [`EntityMeta`], which resolves property names to
//! columns and applies the column format codec.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};

use crate::error::{OrmError, OrmResult};
use crate::key::{Identity, PrimaryKey};
use crate::meta::EntityMeta;
use crate::value::{Row, Value};

/// One row of an entity type.
#[derive(Clone)]
pub struct Entity {
    meta: Arc<EntityMeta>,
    data: Row,
    original: Row,
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("table", &self.meta.table())
            .field("data", &self.data)
            .field("original", &self.original)
            .finish()
    }
}

impl Entity {
    /// Creates an empty entity of the type described by `meta`.
    #[must_use]
    pub fn new(meta: &Arc<EntityMeta>) -> Self {
        Self {
            meta: Arc::clone(meta),
            data: Row::new(),
            original: Row::new(),
        }
    }

    /// Creates an entity already loaded with `row`.
    #[must_use]
    pub fn from_row(meta: &Arc<EntityMeta>, row: Row) -> Self {
        let mut entity = Self::new(meta);
        entity.set_data(row);
        entity
    }

    #[must_use]
    pub fn meta(&self) -> &Arc<EntityMeta> {
        &self.meta
    }

    /// Current raw values, keyed by column.
    #[must_use]
    pub fn data(&self) -> &Row {
        &self.data
    }

    /// Raw values as of the last load or save.
    #[must_use]
    pub fn original(&self) -> &Row {
        &self.original
    }

    /// Reads a property (or column) through the format codec.
    ///
    /// A name absent from the data falls back to the computed-property
    /// registry.
    ///
    /// # Errors
    /// - [`OrmError::ColumnNotFound`] if the name is neither present nor computed
    /// - key errors when `name` is the scalar primary key and it is unset
    /// - codec errors from decoding
    pub fn get(&self, name: &str) -> OrmResult<Value> {
        let meta = Arc::clone(&self.meta);
        let column = meta.column_for(name);

        if meta.is_scalar_key(column) {
            let id = self.get_id()?;
            return meta.decode(column, id.as_scalar()?.clone());
        }

        if let Some(raw) = self.data.get(column) {
            return meta.decode(column, raw.clone());
        }

        match meta.computed(meta.property_for(column)) {
            Some(computed) => computed(self),
            None => Err(OrmError::ColumnNotFound(name.to_owned())),
        }
    }

    /// Writes a property (or column) through the format codec.
    ///
    /// Writing the scalar primary key goes through [`Entity::set_id`], so it
    /// succeeds only once.
    ///
    /// # Errors
    /// - codec errors from encoding
    /// - [`OrmError::KeyAlreadySet`] when re-assigning the scalar key
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> OrmResult<()> {
        let meta = Arc::clone(&self.meta);
        let column = meta.column_for(name);
        let encoded = meta.encode(column, value.into())?;

        if meta.is_scalar_key(column) {
            return self.set_id(Identity::Scalar(encoded));
        }
        self.data.insert(column.to_owned(), encoded);
        Ok(())
    }

    /// Typed [`Entity::get`].
    ///
    /// # Errors
    /// Same as [`Entity::get`], plus [`OrmError::Serde`] on type mismatch.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> OrmResult<T> {
        Ok(serde_json::from_value(self.get(name)?)?)
    }

    /// Typed [`Entity::set`].
    ///
    /// # Errors
    /// Same as [`Entity::set`], plus [`OrmError::Serde`] if `value` does not serialize.
    pub fn set_as<T: Serialize + ?Sized>(&mut self, name: &str, value: &T) -> OrmResult<()> {
        self.set(name, serde_json::to_value(value)?)
    }

    /// Replaces both the current data and the snapshot with `raw`.
    pub fn set_data(&mut self, raw: Row) {
        self.data.clone_from(&raw);
        self.original = raw;
    }

    /// Property-named, decoded projection of the data without hidden properties.
    ///
    /// # Errors
    /// Propagates codec failures.
    pub fn values(&self) -> OrmResult<Row> {
        let mut out = Row::with_capacity(self.data.len());
        for (column, raw) in &self.data {
            let property = self.meta.property_for(column);
            if self.meta.is_hidden(property) {
                continue;
            }
            out.insert(property.to_owned(), self.meta.decode(column, raw.clone())?);
        }
        Ok(out)
    }

    /// Non-key columns that are new or differ from the snapshot.
    #[must_use]
    pub fn changes(&self) -> Row {
        self.data
            .iter()
            .filter(|(column, value)| {
                !self.meta.is_key_column(column) && self.original.get(*column) != Some(*value)
            })
            .map(|(column, value)| (column.clone(), value.clone()))
            .collect()
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.changes().is_empty()
    }

    /// The identity of this entity.
    ///
    /// # Errors
    /// - [`OrmError::Unconfigured`] if the type has no primary key
    /// - [`OrmError::KeyNotSet`] if the scalar key is absent
    /// - [`OrmError::KeyIncomplete`] if any compound key column is absent
    pub fn get_id(&self) -> OrmResult<Identity> {
        match self.meta.require_primary_key()? {
            PrimaryKey::Scalar(column) => self
                .data
                .get(column)
                .cloned()
                .map(Identity::Scalar)
                .ok_or_else(|| OrmError::KeyNotSet {
                    column: column.clone(),
                }),
            PrimaryKey::Compound(columns) => {
                let missing: Vec<String> = columns
                    .iter()
                    .filter(|c| !self.data.contains_key(*c))
                    .cloned()
                    .collect();
                if !missing.is_empty() {
                    return Err(OrmError::KeyIncomplete { missing });
                }
                Ok(Identity::Compound(
                    columns
                        .iter()
                        .filter_map(|c| self.data.get(c).map(|v| (c.clone(), v.clone())))
                        .collect(),
                ))
            }
        }
    }

    /// Assigns the identity. A scalar key can be assigned only once.
    ///
    /// # Errors
    /// - [`OrmError::KeyAlreadySet`] if the scalar key is already present
    /// - [`OrmError::KeyIncomplete`] if a compound identity lacks key columns
    /// - [`OrmError::InvalidArgument`] on a scalar/compound shape mismatch
    pub fn set_id(&mut self, id: impl Into<Identity>) -> OrmResult<()> {
        let meta = Arc::clone(&self.meta);
        match (meta.require_primary_key()?, id.into()) {
            (PrimaryKey::Scalar(column), Identity::Scalar(value)) => {
                if self.data.contains_key(column) {
                    return Err(OrmError::KeyAlreadySet {
                        column: column.clone(),
                    });
                }
                self.data.insert(column.clone(), value);
                Ok(())
            }
            (PrimaryKey::Compound(columns), Identity::Compound(mut values)) => {
                let missing: Vec<String> = columns
                    .iter()
                    .filter(|c| !values.contains_key(*c))
                    .cloned()
                    .collect();
                if !missing.is_empty() {
                    return Err(OrmError::KeyIncomplete { missing });
                }
                for column in columns {
                    if let Some(value) = values.shift_remove(column) {
                        self.data.insert(column.clone(), value);
                    }
                }
                Ok(())
            }
            (PrimaryKey::Scalar(column), Identity::Compound(_)) => Err(OrmError::invalid_argument(
                format!("primary key '{column}' is scalar, got a compound identity"),
            )),
            (PrimaryKey::Compound(_), Identity::Scalar(_)) => Err(OrmError::invalid_argument(
                "primary key is compound, got a scalar identity",
            )),
        }
    }

    /// Whether [`Entity::get_id`] would succeed.
    #[must_use]
    pub fn has_id(&self) -> bool {
        self.get_id().is_ok()
    }

    /// The scalar identity value.
    ///
    /// # Errors
    /// Same as [`Entity::get_id`], plus [`OrmError::CompoundKeyAsScalar`].
    pub fn id_value(&self) -> OrmResult<Value> {
        match self.get_id()? {
            Identity::Scalar(value) => Ok(value),
            Identity::Compound(_) => Err(OrmError::CompoundKeyAsScalar),
        }
    }

    /// `(column, value)` pairs identifying this row, in key order.
    ///
    /// # Errors
    /// Same as [`Entity::get_id`].
    pub fn where_clause(&self) -> OrmResult<Vec<(String, Value)>> {
        let key = self.meta.require_primary_key()?;
        Ok(self.get_id()?.pairs(key))
    }

    pub(crate) fn data_mut(&mut self) -> &mut Row {
        &mut self.data
    }

    pub(crate) fn snapshot(&mut self) {
        self.original.clone_from(&self.data);
    }
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.values()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}
