//! Bridge from `scriptor_config::Config` to loader and logging types.

use std::path::Path;

use scriptor_config::Config;
use scriptor_loader::{CompilerOptions, LoaderOptions};
use scriptor_telemetry::{LogConfig, LogFormat, TelemetryResult};

/// Logging settings from `[logging]`.
///
/// # Errors
///
/// Returns [`scriptor_telemetry::TelemetryError::ConfigError`] for an unknown `format`.
pub(crate) fn to_log_config(config: &Config) -> TelemetryResult<LogConfig> {
    let format: LogFormat = config.logging.format.parse()?;
    Ok(config
        .logging
        .directives
        .iter()
        .fold(LogConfig::new(&config.logging.level).with_format(format), |lc, d| {
            lc.with_directive(d)
        }))
}

/// Loader settings for `workspace_root` from `[scan]` and `[compiler]`.
pub(crate) fn to_loader_options(config: &Config, workspace_root: &Path) -> LoaderOptions {
    let scan_dir = workspace_root.join(&config.scan.directory);
    LoaderOptions {
        workspace_root: workspace_root.to_path_buf(),
        out_dir: scan_dir.join(&config.scan.output_directory),
        scan_dir,
        dependency_dir: config.scan.dependency_directory.clone(),
        markers: config.scan.markers.clone(),
        skip_dirs: config.scan.skip_directories.clone(),
        manifest: config.scan.manifest.clone(),
        compiler: CompilerOptions {
            target: config.compiler.target.clone(),
            experimental_decorators: config.compiler.experimental_decorators,
            emit_decorator_metadata: config.compiler.emit_decorator_metadata,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_loader_layout() {
        let config = Config::default();
        let ws = Path::new("/ws");
        let options = to_loader_options(&config, ws);
        let expected = LoaderOptions::for_workspace(ws);

        assert_eq!(options.scan_dir, expected.scan_dir);
        assert_eq!(options.out_dir, expected.out_dir);
        assert_eq!(options.dependency_dir, expected.dependency_dir);
        assert_eq!(options.markers, expected.markers);
        assert_eq!(options.skip_dirs, expected.skip_dirs);
        assert_eq!(options.manifest, expected.manifest);
        assert_eq!(options.compiler, expected.compiler);
    }

    #[test]
    fn log_config_carries_directives() {
        let mut config = Config::default();
        config.logging.format = "json".into();
        config.logging.directives = vec!["scriptor_loader=debug".into()];
        let lc = to_log_config(&config).unwrap();
        assert_eq!(lc.format, LogFormat::Json);
        assert_eq!(lc.directives, ["scriptor_loader=debug"]);
    }

    #[test]
    fn unknown_log_format_is_an_error() {
        let mut config = Config::default();
        config.logging.format = "fancy".into();
        let err = to_log_config(&config).unwrap_err();
        assert!(err.to_string().contains("fancy"), "{err}");
    }
}
