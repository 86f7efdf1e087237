use chrono::{DateTime, Utc};
use diesel::sqlite::Sqlite;
use diesel::{Insertable, Queryable, Selectable};

use crate::database::schema;

#[derive(Queryable, Selectable)]
#[diesel(table_name = schema::metadata)]
#[diesel(check_for_backend(Sqlite))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetadataEntry {
    pub id: i32,
    pub resource: String,
    pub etag: String,
    pub file_name: String,
    pub file_path: String,
    pub created: DateTime<Utc>,
    pub is_pseudo: bool,
}

#[derive(Insertable)]
#[diesel(table_name = schema::metadata)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewMetadataEntry {
    pub resource: String,
    pub etag: String,
    pub file_name: String,
    pub file_path: String,
    pub created: DateTime<Utc>,
    pub is_pseudo: bool,
}

impl NewMetadataEntry {
    /// Entry owning a freshly written data file.
    ///
    /// `created` timestamp is set to current UTC.
    pub fn new(resource: &str, etag: &str, file_name: &str, file_path: &str) -> Self {
        Self {
            resource: resource.to_string(),
            etag: etag.to_string(),
            file_name: file_name.to_string(),
            file_path: file_path.to_string(),
            created: Utc::now(),
            is_pseudo: false,
        }
    }

    /// Pseudo-file entry pointing at the data file of `previous`.
    pub fn pseudo(previous: &MetadataEntry, etag: &str) -> Self {
        Self {
            resource: previous.resource.clone(),
            etag: etag.to_string(),
            file_name: previous.file_name.clone(),
            file_path: previous.file_path.clone(),
            created: Utc::now(),
            is_pseudo: true,
        }
    }
}
