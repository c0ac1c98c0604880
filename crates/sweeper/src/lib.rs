//! Library entrypoint for the integrity sweeper. The binary in `main.rs`
//! wires configuration and storage; tests and other binaries can drive
//! [`sweep_once`] directly.

pub mod worker;

pub use worker::{run_sweeper, sweep_once, SweepReport, SweeperError, FAILED_EVENT_LIMIT};
