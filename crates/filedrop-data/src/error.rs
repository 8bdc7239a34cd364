//! Error types for the metadata store.

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;

use filedrop_core::IngestError;

/// Result alias for data layer operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors raised by the metadata store.
#[derive(Debug)]
pub enum DataError {
    /// The database could not be reached.
    ConnectFailed {
        /// Underlying SQL error.
        source: sqlx::Error,
    },
    /// Migration execution failed.
    MigrationFailed {
        /// Underlying migration error.
        source: sqlx::migrate::MigrateError,
    },
    /// A database operation failed.
    QueryFailed {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying SQL error.
        source: sqlx::Error,
    },
    /// A path could not be represented as UTF-8.
    PathNotUtf8 {
        /// Field name that contained the invalid path.
        field: &'static str,
        /// Path value.
        path: PathBuf,
    },
    /// A file size did not fit the `BIGINT` column.
    SizeOutOfRange {
        /// Offending size in bytes.
        size_bytes: u64,
    },
}

impl Display for DataError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectFailed { .. } => formatter.write_str("database connection failed"),
            Self::MigrationFailed { .. } => formatter.write_str("migration failed"),
            Self::QueryFailed { .. } => formatter.write_str("database operation failed"),
            Self::PathNotUtf8 { .. } => formatter.write_str("path contained invalid utf-8"),
            Self::SizeOutOfRange { .. } => formatter.write_str("file size out of range"),
        }
    }
}

impl Error for DataError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ConnectFailed { source } | Self::QueryFailed { source, .. } => Some(source),
            Self::MigrationFailed { source } => Some(source),
            Self::PathNotUtf8 { .. } | Self::SizeOutOfRange { .. } => None,
        }
    }
}

impl From<DataError> for IngestError {
    fn from(error: DataError) -> Self {
        let operation = match &error {
            DataError::ConnectFailed { .. } => "metadata.connect",
            DataError::MigrationFailed { .. } => "metadata.migrate",
            DataError::QueryFailed { operation, .. } => *operation,
            DataError::PathNotUtf8 { .. } | DataError::SizeOutOfRange { .. } => "metadata.encode",
        };
        Self::metadata_store(operation, error)
    }
}
