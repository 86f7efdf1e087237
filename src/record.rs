use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs;

use crate::database::models::MetadataEntry;
use crate::errors::Error;
use crate::table::Table;

/// One row of the metadata log.
///
/// Records are immutable: the log only ever grows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MetadataRecord {
    /// Primary key of the record in database.
    pub id: i32,

    /// Upstream resource the record belongs to.
    pub resource: String,

    /// ETag observed during the run.
    pub etag: String,

    /// Base name of the data file.
    pub file_name: String,

    /// Path to the CSV data file.
    ///
    /// For a pseudo-file record this is the file of an earlier record.
    pub file_reference: PathBuf,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Whether the record reuses a file of a previous run.
    pub is_pseudo: bool,
}

impl From<MetadataEntry> for MetadataRecord {
    fn from(entry: MetadataEntry) -> Self {
        Self {
            id: entry.id,
            resource: entry.resource,
            etag: entry.etag,
            file_name: entry.file_name,
            file_reference: PathBuf::from(entry.file_path),
            created_at: entry.created,
            is_pseudo: entry.is_pseudo,
        }
    }
}

impl MetadataRecord {
    /// Path to the data file.
    pub fn path(&self) -> &Path {
        &self.file_reference
    }

    /// Whether the referenced data file is present on disk.
    pub async fn file_exists(&self) -> Result<bool, Error> {
        Ok(fs::try_exists(&self.file_reference).await?)
    }

    /// Load the referenced CSV file.
    pub async fn read_table(&self) -> Result<Table, Error> {
        Table::read_csv(&self.file_reference).await
    }
}

impl std::fmt::Display for MetadataRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "#{} {} {} etag={:?} {}{}",
            self.id,
            self.created_at.format("%Y-%m-%d %H:%M:%S"),
            self.resource,
            self.etag,
            self.file_reference.display(),
            if self.is_pseudo { " (pseudo)" } else { "" }
        )
    }
}
