use crate::cli_args::ChunkArgs;
use crate::load_project;
use crate::output;
use anyhow::{Context, Result};
use colored::*;
use llmprep_core::ops::{self, ChunkReport, ChunkRequest};

pub fn handle_chunk_command(args: ChunkArgs, quiet: bool) -> Result<()> {
    let (project_root, limits) = load_project(&args.project_config)?;
    let request = ChunkRequest {
        path: args.path.clone(),
        line_limit: args.line_limit,
        output_dir: args.output_dir.clone(),
        output_base: args.base.clone(),
        ignore: args.ignore.clone(),
        tree_max_depth: args.depth,
        dry_run: args.dry_run,
    };
    let report = ops::chunk_directory(&project_root, &request, &limits)
        .with_context(|| format!("Failed to chunk '{}'", args.path))?;

    output::print_data_or_text(&report, &args.format_output, |report| {
        print_report_text(report, quiet);
        Ok(())
    })
}

fn print_report_text(report: &ChunkReport, quiet: bool) {
    output::warnings(&report.warnings);
    for err in &report.errors {
        eprintln!("{} {}", "Skipped:".yellow(), err);
    }
    if report.dry_run {
        println!(
            "{} chunk plan for {} ({} lines per chunk)",
            "DRY RUN:".yellow().bold(),
            report.target,
            report.line_limit
        );
    } else {
        output::success(
            &format!("Created {} chunk(s) from {}", report.chunks.len(), report.target),
            quiet,
        );
    }
    if quiet && !report.dry_run {
        return;
    }
    output::field("Output directory", &report.output_dir);
    if let Some(manifest) = &report.manifest_path {
        output::field("Manifest", manifest);
    }
    let rows = report
        .chunks
        .iter()
        .map(|chunk| {
            let lines = if chunk.oversized {
                format!("{} (oversized)", chunk.line_count)
            } else {
                chunk.line_count.to_string()
            };
            vec![
                chunk.chunk_index.to_string(),
                chunk.output_path.clone(),
                lines,
                chunk.files.join("\n"),
            ]
        })
        .collect();
    println!("{}", output::table(&["#", "Output", "Lines", "Files"], rows));
}
