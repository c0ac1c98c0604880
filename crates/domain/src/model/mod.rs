//! Data structures shared across the API, storage and sweeper crates.

mod commerce;
mod entitlement;
mod integrity;
mod subscription;
mod webhook;

pub use commerce::*;
pub use entitlement::*;
pub use integrity::*;
pub use subscription::*;
pub use webhook::*;
