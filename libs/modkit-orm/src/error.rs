//! Error taxonomy for the mapping layer.

use thiserror::Error;

use crate::format::ColumnFormat;

/// Library-local result type.
pub type OrmResult<T> = Result<T, OrmError>;

/// Coarse error categories callers branch on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A lookup matched no row.
    NotFound,
    /// Malformed key shape, wrong key type or otherwise unusable input.
    InvalidArgument,
    /// The entity (or its metadata) is in a state that forbids the operation.
    IllegalState,
    /// Unmapped column with no computed fallback, configuration failures.
    Generic,
    /// Failure reported by the connection collaborator.
    Connection,
}

/// Typed error for entity, search and connection operations.
#[derive(Debug, Error)]
pub enum OrmError {
    #[error("no row in '{table}' matches {lookup}")]
    NotFound { table: String, lookup: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("cannot convert value for {format} column: {message}")]
    Codec {
        format: ColumnFormat,
        message: String,
    },

    #[error("primary key '{column}' is already set")]
    KeyAlreadySet { column: String },

    #[error("primary key '{column}' is not set")]
    KeyNotSet { column: String },

    #[error("compound primary key is incomplete, missing: {}", missing.join(", "))]
    KeyIncomplete { missing: Vec<String> },

    #[error("entity metadata has no {0} configured")]
    Unconfigured(&'static str),

    #[error("compound primary key requested as a scalar")]
    CompoundKeyAsScalar,

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OrmError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Creates a codec error for the given column format.
    pub fn codec(format: ColumnFormat, message: impl Into<String>) -> Self {
        Self::Codec {
            format,
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(table: impl Into<String>, lookup: impl Into<String>) -> Self {
        Self::NotFound {
            table: table.into(),
            lookup: lookup.into(),
        }
    }

    /// Category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrmError::NotFound { .. } => ErrorKind::NotFound,
            OrmError::InvalidArgument(_) | OrmError::Codec { .. } | OrmError::Serde(_) => {
                ErrorKind::InvalidArgument
            }
            OrmError::KeyAlreadySet { .. }
            | OrmError::KeyNotSet { .. }
            | OrmError::KeyIncomplete { .. }
            | OrmError::Unconfigured(_)
            | OrmError::CompoundKeyAsScalar => ErrorKind::IllegalState,
            OrmError::ColumnNotFound(_) | OrmError::Config(_) => ErrorKind::Generic,
            #[cfg(feature = "sqlite")]
            OrmError::Sqlite(_) => ErrorKind::Connection,
            OrmError::Other(_) => ErrorKind::Connection,
        }
    }

    /// `true` for [`ErrorKind::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl From<figment::Error> for OrmError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}
