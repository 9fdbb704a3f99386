//! Config file discovery and layered loading.
//!
//! 1. Parse the embedded `defaults.toml`
//! 2. Merge `~/.scriptor/config.toml` (user)
//! 3. Merge `{workspace}/.scriptor/config.toml` (workspace)
//! 4. Fill `SCRIPTOR_*` environment fallbacks for fields no file set
//! 5. Deserialize and validate

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
pub(crate) const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Maximum allowed config file size (1 MiB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// Directory name used for both the user and workspace layers.
const CONFIG_DIR: &str = ".scriptor";

/// Environment variables consulted as fallbacks, mapped to their field path.
const ENV_FALLBACKS: &[(&str, &str, &str)] = &[
    ("SCRIPTOR_LOG_LEVEL", "logging", "level"),
    ("SCRIPTOR_LOG_FORMAT", "logging", "format"),
    ("SCRIPTOR_TARGET", "compiler", "target"),
];

/// Where a field's final value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigLayer {
    /// Embedded defaults.
    Defaults,
    /// `~/.scriptor/config.toml`.
    User,
    /// `{workspace}/.scriptor/config.toml`.
    Workspace,
    /// A `SCRIPTOR_*` environment variable.
    Env,
}

/// Dotted field path to the layer that set it.
pub type FieldSources = BTreeMap<String, ConfigLayer>;

/// A loaded configuration plus provenance.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The validated configuration.
    pub config: Config,
    /// Which layer set each leaf field.
    pub field_sources: FieldSources,
    /// Files that contributed, in merge order.
    pub loaded_files: Vec<PathBuf>,
}

/// Load the layered configuration.
///
/// `home_override` replaces the user's home directory for the user layer.
///
/// # Errors
///
/// Returns a [`ConfigError`] if a file is unreadable, malformed, too large,
/// or the merged result fails validation.
pub fn load(
    workspace_root: Option<&Path>,
    home_override: Option<&Path>,
) -> ConfigResult<ResolvedConfig> {
    let env: HashMap<String, String> = std::env::vars()
        .filter(|(k, _)| k.starts_with("SCRIPTOR_"))
        .collect();
    let home = match home_override {
        Some(h) => h.to_path_buf(),
        None => home_directory()?,
    };
    load_layers(workspace_root, &home, &env)
}

pub(crate) fn load_layers(
    workspace_root: Option<&Path>,
    home: &Path,
    env: &HashMap<String, String>,
) -> ConfigResult<ResolvedConfig> {
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;

    let mut sources = FieldSources::new();
    record_leaves(&merged, "", ConfigLayer::Defaults, &mut sources);
    let mut loaded_files = Vec::new();

    let mut layers = vec![(home.join(CONFIG_DIR).join("config.toml"), ConfigLayer::User)];
    if let Some(ws) = workspace_root {
        layers.push((ws.join(CONFIG_DIR).join("config.toml"), ConfigLayer::Workspace));
    }

    for (path, layer) in layers {
        if let Some(overlay) = try_load_file(&path)? {
            deep_merge(&mut merged, &overlay, "", layer, &mut sources);
            info!(path = %path.display(), ?layer, "loaded config layer");
            loaded_files.push(path);
        }
    }

    let mut applied = 0_usize;
    for (var, table, key) in ENV_FALLBACKS {
        let path = format!("{table}.{key}");
        if sources.get(&path) != Some(&ConfigLayer::Defaults) {
            continue;
        }
        let Some(value) = env.get(*var) else {
            continue;
        };
        if let Some(t) = merged.get_mut(*table).and_then(toml::Value::as_table_mut) {
            t.insert((*key).to_owned(), toml::Value::String(value.clone()));
            sources.insert(path, ConfigLayer::Env);
            applied = applied.saturating_add(1);
        }
    }
    if applied > 0 {
        debug!(count = applied, "applied environment fallbacks");
    }

    let config: Config = merged
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: "<merged config>".to_owned(),
            source: e,
        })?;

    validate::validate(&config)?;

    Ok(ResolvedConfig {
        config,
        field_sources: sources,
        loaded_files,
    })
}

/// Load a single file with no layering.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file is missing, malformed or invalid.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let content = read_capped(path)?;
    let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;
    validate::validate(&config)?;
    Ok(config)
}

/// A missing file is `None`; anything else unreadable is an error.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match read_capped(path) {
        Ok(c) => c,
        Err(ConfigError::ReadError { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => return Err(e),
    };

    toml::from_str(&content)
        .map(Some)
        .map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            source: e,
        })
}

fn read_capped(path: &Path) -> ConfigResult<String> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    if content.len() as u64 > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit",
                content.len()
            ),
        });
    }
    Ok(content)
}

/// Tables merge per key; scalars and arrays from the overlay replace.
fn deep_merge(
    base: &mut toml::Value,
    overlay: &toml::Value,
    prefix: &str,
    layer: ConfigLayer,
    sources: &mut FieldSources,
) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                let path = join_path(prefix, key);
                let both_tables =
                    value.is_table() && base_table.get(key).is_some_and(toml::Value::is_table);
                if both_tables && let Some(existing) = base_table.get_mut(key) {
                    deep_merge(existing, value, &path, layer, sources);
                } else {
                    base_table.insert(key.clone(), value.clone());
                    record_leaves(value, &path, layer, sources);
                }
            }
        },
        (base, overlay) => {
            *base = overlay.clone();
            sources.insert(prefix.to_owned(), layer);
        },
    }
}

fn record_leaves(value: &toml::Value, prefix: &str, layer: ConfigLayer, sources: &mut FieldSources) {
    if let toml::Value::Table(table) = value {
        for (key, child) in table {
            record_leaves(child, &join_path(prefix, key), layer, sources);
        }
    } else {
        sources.insert(prefix.to_owned(), layer);
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_owned()
    } else {
        format!("{prefix}.{key}")
    }
}

fn home_directory() -> ConfigResult<PathBuf> {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .ok_or(ConfigError::NoHomeDir)
}
