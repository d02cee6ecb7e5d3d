//! oncolit-common — Shared error type and logging context used across all oncolit crates.

pub mod error;
pub mod logging;

pub use error::{OncolitError, Result};
pub use logging::{LoggingContext, LoggingError, LoggingSettings};
