diesel::table! {
    /// Download runs metadata.
    metadata (id) {
        /// Primary key.
        id -> Integer,

        /// Upstream resource name, e.g. `people`.
        resource -> VarChar,

        /// ETag observed during the run. Empty if upstream sent none.
        etag -> VarChar,

        /// Base name of the data file.
        file_name -> VarChar,

        /// Path to the CSV data file.
        file_path -> VarChar,

        /// Record creation timestamp.
        created -> TimestamptzSqlite,

        /// Whether the record reuses a file of a previous run.
        is_pseudo -> Bool,
    }
}
