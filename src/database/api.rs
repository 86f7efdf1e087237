//! Convenient API to interact with metadata database.
//!
//! Basically just fancy wrappers around transactions on [`Connection`].
//! There are no update or delete operations: metadata is an append-only log.

use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use tracing::trace;

use crate::database::models::{MetadataEntry, NewMetadataEntry};
use crate::database::schema::metadata::dsl;

use super::{Connection, DatabaseResult};

/// Append `new_entries` to the log in a single transaction.
///
/// Either all entries are inserted or none. Returns inserted entries with
/// their primary keys, in the given order.
pub async fn insert_all(
    connection: &mut Connection,
    new_entries: &[NewMetadataEntry],
) -> DatabaseResult<Vec<MetadataEntry>> {
    connection
        .immediate_transaction(|conn| {
            async move {
                let mut inserted = Vec::with_capacity(new_entries.len());
                for new_entry in new_entries {
                    trace!("INSERT {:?}", new_entry);
                    let entry = diesel::insert_into(dsl::metadata)
                        .values(new_entry)
                        .get_result::<MetadataEntry>(conn)
                        .await?;
                    inserted.push(entry);
                }
                Ok(inserted)
            }
            .scope_boxed()
        })
        .await
}

/// Get entry from database by primary key.
pub async fn get_entry(connection: &mut Connection, pk: i32) -> DatabaseResult<MetadataEntry> {
    connection
        .transaction(|conn| {
            async {
                trace!("SELECT pk={}", pk);
                dsl::metadata
                    .find(pk)
                    .select(MetadataEntry::as_select())
                    .first(conn)
                    .await
            }
            .scope_boxed()
        })
        .await
        .map_err(Into::into)
}

/// Most recent entry of `resource`, if any.
///
/// Entries sharing the same timestamp are ordered by primary key.
pub async fn latest(
    connection: &mut Connection,
    resource: &str,
) -> DatabaseResult<Option<MetadataEntry>> {
    connection
        .transaction(|conn| {
            async {
                trace!("SELECT latest resource={}", resource);
                dsl::metadata
                    .filter(dsl::resource.eq(resource))
                    .order((dsl::created.desc(), dsl::id.desc()))
                    .select(MetadataEntry::as_select())
                    .first(conn)
                    .await
                    .optional()
            }
            .scope_boxed()
        })
        .await
        .map_err(Into::into)
}

/// All entries of `resource` in insertion order.
pub async fn filter_by_resource(
    connection: &mut Connection,
    resource: &str,
) -> DatabaseResult<Vec<MetadataEntry>> {
    connection
        .transaction(|conn| {
            async {
                trace!("SELECT resource={}", resource);
                dsl::metadata
                    .filter(dsl::resource.eq(resource))
                    .order(dsl::id.asc())
                    .select(MetadataEntry::as_select())
                    .get_results(conn)
                    .await
            }
            .scope_boxed()
        })
        .await
        .map_err(Into::into)
}

/// Get all entries from database in insertion order.
pub async fn get_all(connection: &mut Connection) -> DatabaseResult<Vec<MetadataEntry>> {
    connection
        .transaction(|conn| {
            async {
                trace!("SELECT *");
                dsl::metadata
                    .order(dsl::id.asc())
                    .select(MetadataEntry::as_select())
                    .get_results(conn)
                    .await
            }
            .scope_boxed()
        })
        .await
        .map_err(Into::into)
}
