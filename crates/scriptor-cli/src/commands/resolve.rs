//! `scriptor resolve`: show where a specifier lands.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde_json::json;

use scriptor_config::Config;
use scriptor_loader::{HostModule, Resolved, SpecifierKind, classify, resolve};

use crate::config_bridge;
use crate::formatter::OutputFormat;
use crate::theme::Theme;

pub(crate) fn run(
    config: &Config,
    workspace_root: &Path,
    specifier: &str,
    from: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let options = config_bridge::to_loader_options(config, workspace_root);
    let roots = options.search_roots();
    let from_dir = match from {
        Some(file) => file
            .parent()
            .map_or_else(|| options.scan_dir.clone(), Path::to_path_buf),
        None => options.scan_dir.clone(),
    };
    let kind = kind_name(&classify(specifier));
    let resolved = resolve(specifier, &from_dir, &roots)?;

    let target = match &resolved {
        Resolved::Host(module) => host_name(module),
        Resolved::File(path) => path.display().to_string(),
    };

    if format.is_json() {
        return OutputFormat::print_json(&json!({
            "specifier": specifier,
            "kind": kind,
            "resolved": target,
            "roots": roots.to_strings(),
        }));
    }

    println!("{}", Theme::kv("Kind", kind));
    println!("{}", Theme::success(&target));
    for root in roots.iter() {
        println!("{}", Theme::dimmed(&format!("  root {}", root.display())));
    }
    Ok(())
}

fn kind_name(kind: &SpecifierKind) -> &'static str {
    match kind {
        SpecifierKind::Host(HostModule::Api) => "host-api",
        SpecifierKind::Host(HostModule::Platform(_)) => "platform",
        SpecifierKind::Host(HostModule::Helper(_)) => "helper",
        SpecifierKind::Relative => "relative",
        SpecifierKind::Package => "package",
    }
}

fn host_name(module: &HostModule) -> String {
    match module {
        HostModule::Api => "<host api>".to_owned(),
        HostModule::Platform(name) => format!("<platform {name}>"),
        HostModule::Helper(name) => format!("<helper {name}>"),
    }
}
