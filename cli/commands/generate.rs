use crate::cli_args::GenerateArgs;
use crate::load_project;
use crate::output;
use anyhow::{Context, Result};
use colored::*;
use llmprep_core::limits::format_size;
use llmprep_core::ops::{self, GenerateReport, GenerateRequest};
use std::fs;

/// Starts from the optional JSON request file and appends command-line selections.
fn build_request(args: &GenerateArgs) -> Result<GenerateRequest> {
    let mut request = match &args.request {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Failed to read request file {}", path.display()))?;
            serde_json::from_str::<GenerateRequest>(&raw)
                .with_context(|| format!("Failed to parse request file {}", path.display()))?
        }
        None => GenerateRequest::default(),
    };
    request.files.extend(args.files.iter().cloned());
    request.dumps.extend(args.dumps.iter().cloned());
    request.notes.extend(args.notes.iter().cloned());
    request.note_files.extend(args.note_files.iter().cloned());
    if args.output.is_some() {
        request.output_name = args.output.clone();
    }
    if !args.ignore.is_empty() {
        request.ignore_override = Some(args.ignore.clone());
    }
    if args.depth.is_some() {
        request.tree_max_depth = args.depth;
    }
    request.dry_run |= args.dry_run;
    Ok(request)
}

pub fn handle_generate_command(args: GenerateArgs, quiet: bool) -> Result<()> {
    let (project_root, limits) = load_project(&args.project_config)?;
    let request = build_request(&args)?;
    log::debug!("Generate request: {:?}", request);

    let report = ops::generate_document(&project_root, &request, &limits)
        .context("Failed to generate context document")?;

    output::print_data_or_text(&report, &args.format_output, |report| {
        print_report_text(report, quiet);
        Ok(())
    })
}

fn print_report_text(report: &GenerateReport, quiet: bool) {
    output::warnings(&report.warnings);
    for err in &report.errors {
        eprintln!("{} {}", "Skipped:".yellow(), err);
    }
    match &report.document {
        Some(document) => output::success(
            &format!(
                "Context document saved to: {}",
                document.path.display().to_string().blue()
            ),
            quiet,
        ),
        None => println!(
            "{} would write {}",
            "DRY RUN:".yellow().bold(),
            report.output_path.display()
        ),
    }
    if quiet {
        return;
    }
    output::field("Size", format_size(report.stats.bytes));
    output::field("Lines", report.stats.lines);
    output::field("Words", report.stats.words);
    output::field("Tree depth", report.tree_max_depth);
    output::field("Ignore patterns", &report.ignore_patterns);
    output::bullet_list("Files in focus:", &report.files);
    output::bullet_list("Context dumps:", &report.dumps);
    output::bullet_list("General note files:", &report.note_files);
}
