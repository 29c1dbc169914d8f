//! Per-entity-type metadata: table, primary key, field/format maps and hooks.
//!
//! `EntityMeta` replaces runtime attribute interception with an explicit
//! accessor table built once per entity type and shared through `Arc`.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use sea_query::SelectStatement;
use serde::{Deserialize, Serialize};

use crate::DbEngine;
use crate::config::OrmConfig;
use crate::entity::Entity;
use crate::error::{OrmError, OrmResult};
use crate::format::{ColumnFormat, FormatCodec, StandardCodec};
use crate::key::PrimaryKey;
use crate::search::SearchParams;
use crate::value::Value;

/// Computed property: evaluated when a name is not present in the entity data.
pub type ComputedProperty = Arc<dyn Fn(&Entity) -> OrmResult<Value> + Send + Sync>;

/// Engine-specific hook applied to the final search result query.
pub trait QueryRewriter: Send + Sync {
    fn rewrite(&self, query: &mut SelectStatement, params: &SearchParams, engine: DbEngine);
}

/// Names of the creation/modification timestamp columns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimestampColumns {
    #[serde(default = "default_created")]
    pub created: String,
    #[serde(default = "default_updated")]
    pub updated: String,
}

impl Default for TimestampColumns {
    fn default() -> Self {
        Self {
            created: default_created(),
            updated: default_updated(),
        }
    }
}

fn default_created() -> String {
    "created".to_owned()
}

fn default_updated() -> String {
    "updated".to_owned()
}

/// Immutable description of one entity type.
pub struct EntityMeta {
    table: String,
    primary_key: Option<PrimaryKey>,
    // column -> property
    field_map: IndexMap<String, String>,
    // property -> column
    value_map: HashMap<String, String>,
    formats: HashMap<String, ColumnFormat>,
    hidden: HashSet<String>,
    timestamps: Option<TimestampColumns>,
    sequence: Option<String>,
    computed: HashMap<String, ComputedProperty>,
    codec: Arc<dyn FormatCodec>,
    rewriter: Option<Arc<dyn QueryRewriter>>,
}

impl fmt::Debug for EntityMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityMeta")
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("field_map", &self.field_map)
            .field("formats", &self.formats)
            .field("hidden", &self.hidden)
            .field("timestamps", &self.timestamps)
            .field("sequence", &self.sequence)
            .field("computed", &self.computed.keys().collect::<Vec<_>>())
            .field("codec", &self.codec)
            .field("rewriter", &self.rewriter.is_some())
            .finish_non_exhaustive()
    }
}

impl EntityMeta {
    /// Starts describing the entity stored in `table`.
    pub fn builder(table: impl Into<String>) -> EntityMetaBuilder {
        EntityMetaBuilder::new(table.into())
    }

    /// Like [`EntityMeta::builder`], taking codec layouts and timestamp
    /// column names from `config`.
    pub fn builder_with(config: &OrmConfig, table: impl Into<String>) -> EntityMetaBuilder {
        let mut builder = EntityMetaBuilder::new(table.into());
        builder.codec = Arc::new(StandardCodec::new(
            config.formats.datetime.clone(),
            config.formats.date.clone(),
        ));
        builder.timestamp_columns = config.timestamps.clone();
        builder
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Table name, or `IllegalState` when none is configured.
    ///
    /// # Errors
    /// Returns [`OrmError::Unconfigured`] if the table name is empty.
    pub fn require_table(&self) -> OrmResult<&str> {
        if self.table.trim().is_empty() {
            return Err(OrmError::Unconfigured("table"));
        }
        Ok(&self.table)
    }

    #[must_use]
    pub fn primary_key(&self) -> Option<&PrimaryKey> {
        self.primary_key.as_ref()
    }

    /// # Errors
    /// Returns [`OrmError::Unconfigured`] if no primary key is configured.
    pub fn require_primary_key(&self) -> OrmResult<&PrimaryKey> {
        self.primary_key
            .as_ref()
            .ok_or(OrmError::Unconfigured("primary key"))
    }

    /// The scalar primary-key column.
    ///
    /// # Errors
    /// - [`OrmError::Unconfigured`] if no primary key is configured
    /// - [`OrmError::CompoundKeyAsScalar`] if the key is compound
    pub fn scalar_key(&self) -> OrmResult<&str> {
        match self.require_primary_key()? {
            PrimaryKey::Scalar(column) => Ok(column),
            PrimaryKey::Compound(_) => Err(OrmError::CompoundKeyAsScalar),
        }
    }

    /// Whether `column` is the non-compound primary key.
    #[must_use]
    pub fn is_scalar_key(&self, column: &str) -> bool {
        matches!(&self.primary_key, Some(PrimaryKey::Scalar(pk)) if pk == column)
    }

    /// Whether `column` is part of the primary key (scalar or compound).
    #[must_use]
    pub fn is_key_column(&self, column: &str) -> bool {
        self.primary_key
            .as_ref()
            .is_some_and(|pk| pk.columns().iter().any(|c| c == column))
    }

    /// Resolves a property (or column) name to its column.
    #[must_use]
    pub fn column_for<'a>(&'a self, name: &'a str) -> &'a str {
        self.value_map.get(name).map_or(name, String::as_str)
    }

    /// Resolves a column to its property name.
    #[must_use]
    pub fn property_for<'a>(&'a self, column: &'a str) -> &'a str {
        self.field_map.get(column).map_or(column, String::as_str)
    }

    #[must_use]
    pub fn field_map(&self) -> &IndexMap<String, String> {
        &self.field_map
    }

    #[must_use]
    pub fn format_of(&self, column: &str) -> Option<ColumnFormat> {
        self.formats.get(column).copied()
    }

    #[must_use]
    pub fn is_hidden(&self, property: &str) -> bool {
        self.hidden.contains(property)
    }

    #[must_use]
    pub fn timestamps(&self) -> Option<&TimestampColumns> {
        self.timestamps.as_ref()
    }

    #[must_use]
    pub fn sequence(&self) -> Option<&str> {
        self.sequence.as_deref()
    }

    #[must_use]
    pub fn computed(&self, property: &str) -> Option<&ComputedProperty> {
        self.computed.get(property)
    }

    #[must_use]
    pub fn codec(&self) -> &dyn FormatCodec {
        self.codec.as_ref()
    }

    #[must_use]
    pub fn rewriter(&self) -> Option<&dyn QueryRewriter> {
        self.rewriter.as_deref()
    }

    /// Stored → application value for `column`.
    ///
    /// # Errors
    /// Propagates codec failures.
    pub fn decode(&self, column: &str, raw: Value) -> OrmResult<Value> {
        match self.format_of(column) {
            Some(format) => self.codec.decode(format, raw),
            None => Ok(raw),
        }
    }

    /// Application → stored value for `column`.
    ///
    /// # Errors
    /// Propagates codec failures.
    pub fn encode(&self, column: &str, value: Value) -> OrmResult<Value> {
        match self.format_of(column) {
            Some(format) => self.codec.encode(format, value),
            None => Ok(value),
        }
    }

    /// Default search alias: the first character of the table name.
    #[must_use]
    pub fn default_alias(table: &str) -> String {
        table.chars().next().map(String::from).unwrap_or_default()
    }
}

/// Builder for [`EntityMeta`].
#[must_use]
pub struct EntityMetaBuilder {
    table: String,
    primary_key: Option<PrimaryKey>,
    field_map: IndexMap<String, String>,
    formats: HashMap<String, ColumnFormat>,
    hidden: HashSet<String>,
    track_timestamps: bool,
    timestamp_columns: TimestampColumns,
    sequence: Option<String>,
    computed: HashMap<String, ComputedProperty>,
    codec: Arc<dyn FormatCodec>,
    rewriter: Option<Arc<dyn QueryRewriter>>,
}

impl EntityMetaBuilder {
    fn new(table: String) -> Self {
        Self {
            table,
            primary_key: None,
            field_map: IndexMap::new(),
            formats: HashMap::new(),
            hidden: HashSet::new(),
            track_timestamps: false,
            timestamp_columns: TimestampColumns::default(),
            sequence: None,
            computed: HashMap::new(),
            codec: Arc::new(StandardCodec::default()),
            rewriter: None,
        }
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = Some(PrimaryKey::Scalar(column.into()));
        self
    }

    pub fn compound_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = Some(PrimaryKey::Compound(
            columns.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Maps `column` to the application-facing `property` name.
    pub fn field(mut self, column: impl Into<String>, property: impl Into<String>) -> Self {
        self.field_map.insert(column.into(), property.into());
        self
    }

    pub fn format(mut self, column: impl Into<String>, format: ColumnFormat) -> Self {
        self.formats.insert(column.into(), format);
        self
    }

    /// Hides a property from [`Entity::values`].
    pub fn hidden(mut self, property: impl Into<String>) -> Self {
        self.hidden.insert(property.into());
        self
    }

    /// Maintains the configured created/updated columns on save and update.
    pub fn track_timestamps(mut self) -> Self {
        self.track_timestamps = true;
        self
    }

    pub fn timestamp_columns(mut self, columns: TimestampColumns) -> Self {
        self.timestamp_columns = columns;
        self.track_timestamps = true;
        self
    }

    /// Sequence consulted for generated keys on engines that need one.
    pub fn sequence(mut self, name: impl Into<String>) -> Self {
        self.sequence = Some(name.into());
        self
    }

    pub fn computed<F>(mut self, property: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Entity) -> OrmResult<Value> + Send + Sync + 'static,
    {
        self.computed.insert(property.into(), Arc::new(f));
        self
    }

    pub fn codec(mut self, codec: Arc<dyn FormatCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn rewriter(mut self, rewriter: Arc<dyn QueryRewriter>) -> Self {
        self.rewriter = Some(rewriter);
        self
    }

    /// Finalizes the metadata, deriving the property → column map.
    ///
    /// # Errors
    /// Returns [`OrmError::InvalidArgument`] if two columns map to the same
    /// property, or a property name shadows another mapped column.
    pub fn build(self) -> OrmResult<Arc<EntityMeta>> {
        let mut value_map = HashMap::with_capacity(self.field_map.len());
        for (column, property) in &self.field_map {
            if let Some(previous) = value_map.insert(property.clone(), column.clone()) {
                return Err(OrmError::invalid_argument(format!(
                    "property '{property}' is mapped from both '{previous}' and '{column}'"
                )));
            }
        }
        for (property, column) in &value_map {
            if property != column && self.field_map.contains_key(property) {
                return Err(OrmError::invalid_argument(format!(
                    "property '{property}' (from '{column}') shadows a mapped column"
                )));
            }
        }

        Ok(Arc::new(EntityMeta {
            table: self.table,
            primary_key: self.primary_key,
            field_map: self.field_map,
            value_map,
            formats: self.formats,
            hidden: self.hidden,
            timestamps: self.track_timestamps.then_some(self.timestamp_columns),
            sequence: self.sequence,
            computed: self.computed,
            codec: self.codec,
            rewriter: self.rewriter,
        }))
    }
}
