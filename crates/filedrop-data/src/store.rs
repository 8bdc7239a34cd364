//! Metadata store seam and its Postgres and disabled implementations.
//!
//! # Design
//! - The worker only depends on [`MetadataStore`]; an absent database is a
//!   [`NoopMetadataStore`], never a branch in the worker.
//! - Migrations run once when the Postgres store is constructed.
//! - One row per successful import. Duplicate content is allowed; rows are append-only.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use filedrop_core::FileDescriptor;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use tracing::{debug, info};

use crate::error::{DataError, Result};

const INSERT_IMPORTED_FILE: &str = r"
    INSERT INTO imported_files (name, path, size, modified_at, content_hash)
    VALUES ($1, $2, $3, $4, $5)
    RETURNING id
";

const SELECT_BY_HASH: &str = r"
    SELECT id, name, path, size, modified_at, content_hash, imported_at
    FROM imported_files
    WHERE content_hash = $1
    ORDER BY id
";

/// Records metadata for files the worker has accepted.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Whether writes reach a real backend.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Persist one row describing `descriptor`.
    async fn record(&self, descriptor: &FileDescriptor) -> Result<()>;
}

/// Store used when no database is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetadataStore;

#[async_trait]
impl MetadataStore for NoopMetadataStore {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn record(&self, _descriptor: &FileDescriptor) -> Result<()> {
        Ok(())
    }
}

/// Row projection of the `imported_files` table.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ImportedFileRow {
    /// Surrogate key.
    pub id: i64,
    /// File name at import time.
    pub name: String,
    /// Inbox path carried by the message.
    pub path: String,
    /// Size in bytes.
    pub size: i64,
    /// Modification time in epoch seconds.
    pub modified_at: f64,
    /// Lowercase hex SHA-256.
    pub content_hash: String,
    /// Insertion timestamp.
    pub imported_at: DateTime<Utc>,
}

/// Postgres-backed metadata store.
#[derive(Clone)]
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    /// Connect to `database_url` and apply pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable or migrations fail.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(|source| DataError::ConnectFailed { source })?;
        info!("connected to metadata store");
        Self::new(pool).await
    }

    /// Wrap an existing pool, applying pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail.
    pub async fn new(pool: PgPool) -> Result<Self> {
        let mut migrator = sqlx::migrate!("./migrations");
        migrator.set_ignore_missing(true);
        migrator
            .run(&pool)
            .await
            .map_err(|source| DataError::MigrationFailed { source })?;
        Ok(Self { pool })
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Rows recorded for a given content hash, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn find_by_hash(&self, content_hash: &str) -> Result<Vec<ImportedFileRow>> {
        sqlx::query_as::<_, ImportedFileRow>(SELECT_BY_HASH)
            .bind(content_hash)
            .fetch_all(&self.pool)
            .await
            .map_err(|source| DataError::QueryFailed {
                operation: "imported_files.select",
                source,
            })
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn record(&self, descriptor: &FileDescriptor) -> Result<()> {
        let path = descriptor
            .path()
            .to_str()
            .ok_or_else(|| DataError::PathNotUtf8 {
                field: "path",
                path: descriptor.absolute_path.clone(),
            })?;
        let size = i64::try_from(descriptor.size_bytes).map_err(|_| DataError::SizeOutOfRange {
            size_bytes: descriptor.size_bytes,
        })?;

        let id: i64 = sqlx::query_scalar(INSERT_IMPORTED_FILE)
            .bind(&descriptor.name)
            .bind(path)
            .bind(size)
            .bind(descriptor.modified_at)
            .bind(&descriptor.content_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(|source| DataError::QueryFailed {
                operation: "imported_files.insert",
                source,
            })?;
        debug!(id, name = %descriptor.name, "recorded imported file");
        Ok(())
    }
}
