//! Configuration for the Gradle tasks server
//!
//! Defaults, `GRADLE_TASKS_*` environment overlay and validation.

pub mod config;

pub use config::*;
