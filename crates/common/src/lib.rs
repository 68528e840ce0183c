//! Adforge Common Utilities
//!
//! Shared infrastructure for all Adforge crates:
//! - Error taxonomy and result aliases
//! - Configuration loading
//! - Tracing/logging initialization
//! - Per-job isolated working directories

pub mod config;
pub mod error;
pub mod logging;
pub mod workspace;

pub use config::*;
pub use error::*;
pub use workspace::*;
