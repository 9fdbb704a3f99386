//! Scriptor Telemetry - logging setup for the scriptor loader and CLI.
//!
//! Wraps `tracing-subscriber` with a small serializable config so the
//! `[logging]` table of `scriptor-config` can drive it directly.
//!
//! # Example
//!
//! ```rust,no_run
//! use scriptor_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), scriptor_telemetry::TelemetryError> {
//! let config = LogConfig::new("debug")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("scriptor_loader=trace");
//!
//! setup_logging(&config)?;
//! tracing::info!("scanning");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging};
