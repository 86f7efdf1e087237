//! # etagsync
//!
//! Keeps CSV snapshots of an HTTP API resource. Every run appends one record per
//! resource to a metadata log. When the upstream ETag is unchanged the record
//! reuses the file of the previous run instead of downloading again.
//!
//! ## Example
//!
//! ```rust
//! # async fn test(database: &str, data_dir: &str, endpoint: etagsync::Url) {
//! use etagsync::{Profile, Synchronizer};
//!
//! let mut sync = Synchronizer::builder(database, data_dir, endpoint)
//!     .profile(Profile::Flat { resource: "people".to_string() })
//!     .build()
//!     .await
//!     .unwrap();
//!
//! // Download data or link the previous file if nothing changed
//! let report = sync.run().await.unwrap();
//! println!("{}", report);
//! # }
//! ```

mod database;
mod fetch;
mod record;
mod sync;
mod table;

pub mod errors;
pub mod transform;

pub use fetch::{Fetcher, Record};
pub use record::MetadataRecord;
pub use sync::{
    Profile, SyncOutcome, SyncReport, SyncState, Synchronizer, SynchronizerBuilder,
    DEFAULT_FILE_PREFIX, DEFAULT_TIMEOUT,
};
pub use table::{Table, COUNT_COLUMN, PAGE_SIZE};

// Re-exports of public API arguments from extern crates
#[doc(no_inline)]
pub use chrono::{DateTime, Utc};
#[doc(no_inline)]
pub use url::Url;
