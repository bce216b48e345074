//! Shared utilities for the Gradle tasks server
//!
//! Logging setup and structured operation events.

pub mod logging;

pub use logging::{init, operation_finished, operation_span, operation_started};
