//! Shared service helpers such as the seen-event cache and telemetry wiring.

pub mod cache;
pub mod telemetry;

pub use cache::*;
pub use telemetry::*;
