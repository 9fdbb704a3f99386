//! Configuration validation rules.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];
const FORMATS: &[&str] = &["pretty", "compact", "json", "full"];

/// Validate a fully merged configuration.
///
/// # Errors
///
/// Returns [`ConfigError::ValidationError`] naming the first offending field.
pub fn validate(config: &Config) -> ConfigResult<()> {
    let scan = &config.scan;

    if scan.directory.trim().is_empty() {
        return Err(invalid("scan.directory", "must not be empty"));
    }
    if scan.directory.contains("..") {
        return Err(invalid("scan.directory", "must stay inside the workspace"));
    }
    if scan.output_directory.trim().is_empty() || scan.output_directory.contains("..") {
        return Err(invalid(
            "scan.output_directory",
            "must be a non-empty path inside the scan directory",
        ));
    }
    if scan.dependency_directory.trim().is_empty() {
        return Err(invalid("scan.dependency_directory", "must not be empty"));
    }
    if let Some(i) = scan.markers.iter().position(|m| m.trim().is_empty()) {
        return Err(invalid(
            &format!("scan.markers[{i}]"),
            "an empty marker would make every file eligible",
        ));
    }

    if config.compiler.target.trim().is_empty() {
        return Err(invalid("compiler.target", "must not be empty"));
    }
    if config.compiler.emit_decorator_metadata && !config.compiler.experimental_decorators {
        return Err(invalid(
            "compiler.emit_decorator_metadata",
            "requires compiler.experimental_decorators",
        ));
    }

    if !LEVELS.contains(&config.logging.level.to_ascii_lowercase().as_str()) {
        return Err(invalid(
            "logging.level",
            &format!("expected one of {}", LEVELS.join(", ")),
        ));
    }
    if !FORMATS.contains(&config.logging.format.to_ascii_lowercase().as_str()) {
        return Err(invalid(
            "logging.format",
            &format!("expected one of {}", FORMATS.join(", ")),
        ));
    }

    Ok(())
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.to_owned(),
    }
}
