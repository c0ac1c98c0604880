//! Cross-table consistency scans and their repairs.

pub mod scanner;
pub mod service;

pub use scanner::normalize_storage_path;
pub use service::{BatchSelection, IntegrityError, IntegrityService};
