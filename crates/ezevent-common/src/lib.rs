//! # EZEvent Common
//!
//! Logging configuration shared by the EZEvent worker crates.
//!
//! Every crate in the workspace logs through `tracing` macros; binaries call
//! [`init_logging`] once at startup to install a subscriber.

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat, LoggingError};
