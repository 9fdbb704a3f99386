//! `scriptor scan`: run discovery and registration once.

use std::path::Path;

use anyhow::Result;
use serde_json::json;

use scriptor_config::Config;
use scriptor_loader::{InMemoryRegistry, Orchestrator, ScanReport};

use crate::config_bridge;
use crate::formatter::OutputFormat;
use crate::theme::Theme;

pub(crate) async fn run(config: &Config, workspace_root: &Path, format: OutputFormat) -> Result<()> {
    let options = config_bridge::to_loader_options(config, workspace_root);
    let scan_dir = options.scan_dir.clone();
    let mut orchestrator = Orchestrator::new(InMemoryRegistry::new(), options)?;
    let report = orchestrator.scan_and_load(&scan_dir).await?;
    let registry = orchestrator.registry();

    if format.is_json() {
        return OutputFormat::print_json(&json!({
            "report": report,
            "capabilities": registry.list(),
        }));
    }

    println!("{}", Theme::header("Scan"));
    println!("{}", Theme::separator());
    println!("{}", Theme::kv("Directory", &scan_dir.display().to_string()));
    print_counts(&report);

    for capability in registry.list() {
        println!(
            "{}",
            Theme::success(&format!("{} ({})", capability.id, capability.members.join(", ")))
        );
    }
    for path in &report.skipped_no_default {
        println!(
            "{}",
            Theme::warning(&format!("{}: no default export", relative(&scan_dir, path)))
        );
    }
    for (path, message) in &report.failed {
        println!("{}", Theme::error(&format!("{}: {message}", relative(&scan_dir, path))));
    }

    if report.failed.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("{} file(s) failed to load", report.failed.len())
    }
}

fn print_counts(report: &ScanReport) {
    println!(
        "{}",
        Theme::info(&format!(
            "{} discovered, {} eligible, {} loaded",
            report.discovered,
            report.eligible,
            report.loaded.len()
        ))
    );
    println!();
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}
