//! SeaORM-backed storage adapters that satisfy the domain storage traits while
//! keeping the database backend swappable (SQLite by default, PostgreSQL via
//! feature flag). Also hosts the HTTP client used to check uploaded objects.

mod builder;
mod commerce_store;
mod entitlement_store;
pub mod entity;
mod errors;
mod integrity_store;
mod migration;
mod object_store;
mod subscription_store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
mod webhook_store;

use std::sync::Arc;

use amora_domain::storage::StorageResult;
pub use builder::StorageBuilder;
use errors::StorageError;
use migration::run_migrations;
pub use object_store::{HttpObjectStore, ObjectStoreError};
use sea_orm::{Database, DatabaseConnection};

/// Shared storage handle used by the HTTP API and the sweeper.
#[derive(Clone)]
pub struct SeaOrmStorage {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmStorage {
    /// Connects to the provided database URL and ensures the schema is present.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        let db = Database::connect(database_url)
            .await
            .map_err(StorageError::from_source)?;
        run_migrations(&db).await?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn builder() -> StorageBuilder {
        StorageBuilder::new()
    }

    pub(crate) fn from_connection(db: DatabaseConnection) -> Self {
        Self { db: Arc::new(db) }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
