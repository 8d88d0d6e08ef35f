//! Framewatch Common Utilities
//!
//! Shared infrastructure for all Framewatch crates:
//! - Error types and result aliases
//! - Media clock and sample throttling
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
