pub use amora_domain::storage::StorageError;

use sea_orm::DbErr;

/// Bounded retries for compare-and-swap writes on the user row.
pub(crate) const MAX_CAS_ATTEMPTS: usize = 5;

pub(crate) fn db_error(err: DbErr) -> StorageError {
    StorageError::from_source(err)
}

pub(crate) fn conflict(what: impl Into<String>) -> StorageError {
    StorageError::Conflict(what.into())
}
