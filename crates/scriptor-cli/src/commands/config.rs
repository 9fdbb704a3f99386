//! `scriptor config show`.

use anyhow::Result;
use serde_json::json;

use scriptor_config::{ConfigLayer, ResolvedConfig};

use crate::formatter::OutputFormat;
use crate::theme::Theme;

pub(crate) fn show(resolved: &ResolvedConfig, sources: bool, format: OutputFormat) -> Result<()> {
    if format.is_json() {
        let mut value = json!({
            "config": resolved.config,
            "loaded_files": resolved.loaded_files,
        });
        if sources {
            value["sources"] = serde_json::to_value(&resolved.field_sources)?;
        }
        return OutputFormat::print_json(&value);
    }

    if resolved.loaded_files.is_empty() {
        println!("{}", Theme::dimmed("# no config files found, showing defaults"));
    }
    for path in &resolved.loaded_files {
        println!("{}", Theme::dimmed(&format!("# loaded {}", path.display())));
    }
    print!("{}", resolved.config.to_toml()?);

    if sources {
        println!();
        println!("{}", Theme::header("Sources"));
        println!("{}", Theme::separator());
        for (field, layer) in &resolved.field_sources {
            println!("{}", Theme::kv(field, layer_name(*layer)));
        }
    }
    Ok(())
}

fn layer_name(layer: ConfigLayer) -> &'static str {
    match layer {
        ConfigLayer::Defaults => "defaults",
        ConfigLayer::User => "user",
        ConfigLayer::Workspace => "workspace",
        ConfigLayer::Env => "env",
    }
}
