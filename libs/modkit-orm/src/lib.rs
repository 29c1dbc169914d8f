#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! `ModKit` entity mapping layer.
//!
//! This crate maps single-table rows onto dirty-tracked [`Entity`] values and
//! provides the data-access operations around them:
//! - column ↔ property mapping with an explicit format codec (`meta`, `format`)
//! - scalar and compound primary keys (`key`)
//! - find / save / update / delete / exists / reload (`persistence`)
//! - a condition DSL and a paginated, counted search (`cond`, `search`)
//! - diff-based many-to-many join table maintenance (`relation`)
//!
//! All database access goes through the synchronous [`Connection`] trait.
//! Queries are built with `sea-query` and rendered for the connection's
//! [`DbEngine`]. With the `sqlite` feature (default) a `rusqlite`-backed
//! adapter is available in [`sqlite`].
//!
//! # Example
//! ```rust,no_run
//! use modkit_orm::sqlite::SqliteConnection;
//! use modkit_orm::{Entity, EntityMeta, OrmResult, SearchParams};
//!
//! fn main() -> OrmResult<()> {
//!     let users = EntityMeta::builder("users")
//!         .primary_key("id")
//!         .field("first_name", "firstName")
//!         .hidden("password")
//!         .build()?;
//!
//!     let mut conn = SqliteConnection::open_in_memory()?;
//!     conn.execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY, first_name TEXT, password TEXT)")?;
//!
//!     let mut user = Entity::new(&users);
//!     user.set("firstName", "Ada")?;
//!     user.save(&mut conn)?;
//!
//!     let page = modkit_orm::search::search(&mut conn, &users, &SearchParams::default().count(10))?;
//!     assert_eq!(page.total(), Some(1));
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod cond;
pub mod connection;
pub mod entity;
pub mod error;
pub mod format;
pub mod key;
pub mod meta;
pub mod model;
pub mod registry;
pub mod relation;
pub mod search;
pub mod value;

mod persistence;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(test)]
mod test_support;

pub use config::OrmConfig;
pub use cond::{CondKey, CondValue, Conditions};
pub use connection::{Connection, Statement, transaction};
pub use entity::Entity;
pub use error::{ErrorKind, OrmError, OrmResult};
pub use format::{ColumnFormat, FormatCodec, StandardCodec};
pub use key::{Identity, PrimaryKey};
pub use meta::{EntityMeta, EntityMetaBuilder, QueryRewriter, TimestampColumns};
pub use model::Model;
pub use persistence::{FoundRows, Lookup};
pub use registry::EntityRegistry;
pub use relation::{RelationDiff, RelationTable};
pub use search::{Join, SearchParams, SearchResult, SearchRows};
pub use value::{RawSql, Row, Value};

/// Supported engines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbEngine {
    Postgres,
    MySql,
    Sqlite,
}

impl DbEngine {
    /// Whether the engine understands `MySQL` extensions such as
    /// `SQL_CALC_FOUND_ROWS` / `FOUND_ROWS()`.
    #[must_use]
    pub fn is_mysql_family(self) -> bool {
        matches!(self, DbEngine::MySql)
    }
}
