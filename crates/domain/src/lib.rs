//! Domain-level building blocks shared across the API, storage and sweeper
//! crates: configuration, telemetry, the data model, storage seams, webhook
//! reconciliation and integrity scanning.

pub mod config;
pub mod integrity;
pub mod model;
pub mod services;
pub mod storage;
pub mod webhook;

pub use config::{
    hydrate_env_file, ApiConfig, ConfigError, ObjectStorageConfig, SweeperConfig,
};
pub use services::{EventCache, InMemoryEventCache, NoopEventCache};
pub use storage::*;
