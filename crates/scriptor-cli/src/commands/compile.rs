//! `scriptor compile`: compile one entry without running it.

use std::path::Path;

use anyhow::Result;
use serde_json::json;

use scriptor_config::Config;
use scriptor_loader::CompilerHost;

use crate::config_bridge;
use crate::formatter::OutputFormat;
use crate::theme::Theme;

pub(crate) fn run(
    config: &Config,
    workspace_root: &Path,
    file: &Path,
    format: OutputFormat,
) -> Result<()> {
    let options = config_bridge::to_loader_options(config, workspace_root);
    let entry = if file.is_absolute() {
        file.to_path_buf()
    } else {
        std::env::current_dir()?.join(file)
    };
    let mut host = CompilerHost::new(options.compiler.clone(), &options.scan_dir);
    let units = host.compile(&[entry], &options.search_roots(), &options.out_dir);
    let Some(unit) = units.into_iter().next() else {
        anyhow::bail!("compiler produced no result for {}", file.display());
    };

    if format.is_json() {
        OutputFormat::print_json(&json!({
            "source": unit.source,
            "output": unit.output,
            "success": unit.success,
            "diagnostics": unit.diagnostics,
        }))?;
    } else if unit.success {
        println!("{}", Theme::success(&format!("{}", unit.output.display())));
    } else {
        for diagnostic in &unit.diagnostics {
            println!("{}", Theme::error(&diagnostic.to_string()));
        }
    }

    if unit.success {
        Ok(())
    } else {
        anyhow::bail!(
            "{} error(s) compiling {}",
            unit.diagnostics.len(),
            file.display()
        )
    }
}
