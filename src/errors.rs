//! Error types.

#[doc(no_inline)]
pub use diesel::result::{ConnectionError, Error as DieselError};

/// Metadata database related errors.
#[derive(thiserror::Error, Debug)]
pub enum DatabaseError {
    #[error("connection failed")]
    ConnectionError(#[from] ConnectionError),

    #[error("migration failed: {0}")]
    MigrationError(String),

    #[error(transparent)]
    DieselError(#[from] DieselError),
}

impl DatabaseError {
    /// Whether the requested row does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(*self, DatabaseError::DieselError(DieselError::NotFound))
    }
}

/// Fetching from upstream API failed.
#[derive(thiserror::Error, Debug)]
pub enum NetworkError {
    #[error("request failed")]
    RequestError(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("invalid URL")]
    InvalidUrl(#[from] url::ParseError),

    #[error("malformed payload from {url}: {reason}")]
    MalformedPayload { url: String, reason: String },
}

/// Writing data files or metadata failed.
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("database error")]
    DatabaseError(#[from] DatabaseError),

    #[error("I/O error")]
    IoError(#[from] std::io::Error),

    #[error("CSV error")]
    CsvError(#[from] csv::Error),

    #[error("file already exists: {0}")]
    FileExists(String),

    #[error(transparent)]
    NonUtf8PathError(#[from] NonUtf8PathError),
}

/// Transforming downloaded records failed.
#[derive(thiserror::Error, Debug)]
pub enum TransformError {
    #[error("no such column: '{0}'")]
    MissingColumn(String),

    #[error("cannot parse date '{value}'")]
    BadDate {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Non UTF-8 symbol in path.
#[derive(thiserror::Error, Debug)]
#[error("non-UTF-8 symbol in path")]
pub struct NonUtf8PathError;

/// Etagsync error.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("network error")]
    NetworkError(#[from] NetworkError),

    #[error("storage error")]
    StorageError(#[from] StorageError),

    #[error("transform error")]
    TransformError(#[from] TransformError),

    #[error("metadata record {0} not found")]
    NotFound(i32),

    #[error("failed to build HTTP client")]
    ReqwestClientBuildError(#[source] reqwest::Error),
}

impl From<DatabaseError> for Error {
    fn from(value: DatabaseError) -> Self {
        Self::StorageError(value.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::StorageError(value.into())
    }
}

impl From<csv::Error> for Error {
    fn from(value: csv::Error) -> Self {
        Self::StorageError(value.into())
    }
}

impl From<NonUtf8PathError> for Error {
    fn from(value: NonUtf8PathError) -> Self {
        Self::StorageError(value.into())
    }
}

impl Error {
    /// Whether the run failed while talking to upstream.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::NetworkError(_))
    }

    /// Whether the run failed while writing files or metadata.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::StorageError(_))
    }
}
