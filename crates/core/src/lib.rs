//! Core domain types, errors, and constants for the Gradle tasks server.
//!
//! ## Key Components
//!
//! - **`errors`**: the `Error` enum, its caller-facing `ErrorKind`
//!   classification and the `Result` alias.
//! - **`cancellation`**: the one-shot `CancellationToken` handed to build tools.
//! - **`types`**: operation identity (`OperationKey`), completion state and the
//!   reply items streamed back to callers.
//! - **`constants`**: shared environment variable names and defaults.

pub mod cancellation;
pub mod constants;
pub mod errors;
pub mod types;

pub use self::{
    cancellation::CancellationToken,
    constants::*,
    errors::{Error, ErrorKind, Result},
    types::*,
};
