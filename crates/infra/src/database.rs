//! Embedded redb database shared by the durable stores.
//!
//! redb allows one open handle per file, so the domain store and the job store
//! share a single `Arc<Database>`. Write transactions are serialized by redb,
//! which is what makes each store operation atomic.

use std::path::Path;
use std::sync::Arc;

use redb::Database;

/// Open or create the database file at `path`.
pub fn open(path: impl AsRef<Path>) -> Result<Arc<Database>, redb::DatabaseError> {
    Ok(Arc::new(Database::create(path)?))
}

/// A database that lives only as long as the handle.
pub fn in_memory() -> Result<Arc<Database>, redb::DatabaseError> {
    let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
    Ok(Arc::new(db))
}

/// `From` impls turning every redb error into `$target::$variant(message)`.
macro_rules! from_redb_errors {
    ($target:ident, $variant:ident) => {
        $crate::database::from_redb_errors!(@each $target, $variant,
            redb::DatabaseError,
            redb::TransactionError,
            redb::TableError,
            redb::StorageError,
            redb::CommitError
        );
    };
    (@each $target:ident, $variant:ident, $($source:ty),+) => {
        $(
            impl From<$source> for $target {
                fn from(err: $source) -> Self {
                    $target::$variant(err.to_string())
                }
            }
        )+
    };
}

pub(crate) use from_redb_errors;
