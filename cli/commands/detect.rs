use crate::cli_args::DetectArgs;
use crate::load_project;
use crate::output;
use anyhow::{Context, Result};
use colored::*;
use llmprep_core::limits::format_size;
use llmprep_core::ops::{self, DetectionReport};

pub fn handle_detect_command(args: DetectArgs) -> Result<()> {
    let (project_root, _limits) = load_project(&args.project_config)?;
    let report = ops::detect_project_type(&project_root).context("Failed to analyze project")?;
    output::print_data_or_text(&report, &args.format_output, |report| {
        print_detection_text(report);
        Ok(())
    })
}

fn print_detection_text(report: &DetectionReport) {
    let analysis = &report.analysis;
    output::heading("Project Analysis");
    output::field("Detected type", analysis.project_type);

    let found: Vec<String> = analysis
        .indicators
        .iter()
        .filter(|(_, present)| **present)
        .map(|(name, _)| name.clone())
        .collect();
    output::field(
        "Indicators",
        if found.is_empty() { "(none)".to_string() } else { found.join(", ") },
    );
    if !analysis.build_tools.is_empty() {
        output::field("Build tools", analysis.build_tools.join(", "));
    }
    if !analysis.compiled_present.is_empty() {
        output::field("Compiled files", analysis.compiled_present.join(", "));
    }
    if !analysis.large_directories.is_empty() {
        println!("{}", "Large directories:".bold());
        for dir in &analysis.large_directories {
            println!("  - {} ({})", dir.name.yellow(), format_size(dir.bytes));
        }
    }
    println!();
    output::heading("Suggested Patterns");
    let suggestions = &report.suggested_patterns;
    output::field("Critical", suggestions.critical.join(" | "));
    output::field("Recommended", suggestions.recommended.join(" | "));
    output::field("Optional", suggestions.optional.join(" | "));
}
