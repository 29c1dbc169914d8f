//! Configuration for the mapping layer.
//!
//! Read from the `orm` section of the application's figment:
//!
//! ```yaml
//! orm:
//!   search:
//!     default_count: 50
//!   timestamps:
//!     created: created_at
//!     updated: updated_at
//!   formats:
//!     datetime: "%Y-%m-%d %H:%M:%S"
//!   sqlite:
//!     path: data/app.db
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use serde::{Deserialize, Serialize};

use crate::error::OrmResult;
use crate::format::{DEFAULT_DATE_LAYOUT, DEFAULT_DATETIME_LAYOUT};
use crate::meta::TimestampColumns;
use crate::search::DEFAULT_COUNT;

/// Figment key holding the configuration.
pub const CONFIG_KEY: &str = "orm";

/// Environment prefix for overrides, e.g. `MODKIT_ORM__SEARCH__DEFAULT_COUNT=50`.
pub const ENV_PREFIX: &str = "MODKIT_ORM__";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct OrmConfig {
    pub search: SearchConfig,
    pub timestamps: TimestampColumns,
    pub formats: FormatConfig,
    pub sqlite: SqliteConfig,
}

/// Search defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SearchConfig {
    /// Page size when the caller does not set one.
    pub default_count: u64,
    /// Whether totals are computed unless the caller opts out.
    pub count_total: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_count: DEFAULT_COUNT,
            count_total: true,
        }
    }
}

/// Stored layouts used by the standard codec (`chrono` format strings).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FormatConfig {
    pub datetime: String,
    pub date: String,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            datetime: DEFAULT_DATETIME_LAYOUT.to_owned(),
            date: DEFAULT_DATE_LAYOUT.to_owned(),
        }
    }
}

/// Settings for the bundled `SQLite` adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SqliteConfig {
    /// Database file; in-memory when absent.
    pub path: Option<PathBuf>,
    pub busy_timeout_ms: u64,
    pub foreign_keys: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: 5_000,
            foreign_keys: true,
        }
    }
}

impl OrmConfig {
    /// Extracts the `orm` section of `figment`, or the defaults when it is absent.
    ///
    /// # Errors
    /// Returns [`crate::OrmError::Config`] if the section is malformed.
    pub fn from_figment(figment: &Figment) -> OrmResult<Self> {
        if !figment.contains(CONFIG_KEY) {
            return Ok(Self::default());
        }
        Ok(figment.extract_inner(CONFIG_KEY)?)
    }

    /// Layers an optional YAML file and `MODKIT_ORM__*` environment variables.
    ///
    /// # Errors
    /// Returns [`crate::OrmError::Config`] if a source is malformed.
    pub fn load(path: Option<&Path>) -> OrmResult<Self> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment = figment.merge(
            Env::prefixed(ENV_PREFIX)
                .map(|key| format!("{CONFIG_KEY}.{}", key.as_str().replace("__", ".")).into()),
        );
        Self::from_figment(&figment)
    }
}
