//! Time-bounded synthetic CPU load generator.
//!
//! A [`StressController`] launches one duty-cycling worker thread per core,
//! tracks a shared iteration counter, and answers start/stop/status calls.
//! The [`server`] module exposes those calls over HTTP.

pub mod config;
pub mod controller;
pub mod error;
pub mod server;
pub mod status;
pub mod worker;

pub use controller::{ControllerConfig, RunConfig, StartReport, StressController};
pub use error::{Result, StressError};
pub use status::StatusSnapshot;
