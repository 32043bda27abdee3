use crate::cli_args::{ReportsAction, ReportsArgs};
use crate::load_project;
use crate::output;
use anyhow::{Context, Result};
use colored::*;
use llmprep_core::limits::format_size;
use llmprep_core::ops;

pub fn handle_reports_command(args: ReportsArgs, quiet: bool) -> Result<()> {
    let (project_root, _limits) = load_project(&args.project_config)?;

    match args.action {
        ReportsAction::Compact { before, glob, dry_run } => {
            let report = ops::save_tokens(&project_root, &before, glob.as_deref(), dry_run)
                .context("Failed to compact reports")?;
            output::print_data_or_text(&report, &args.format_output, |report| {
                output::warnings(&report.warnings);
                for err in &report.errors {
                    eprintln!("{} {}", "Skipped:".yellow(), err);
                }
                let verb = if report.dry_run { "Would compact" } else { "Compacted" };
                output::success(
                    &format!(
                        "{} {} of {} report(s) in {}, saving {}",
                        verb,
                        report.changed.len(),
                        report.scanned,
                        report.reports_dir,
                        format_size(report.bytes_saved)
                    ),
                    quiet && !report.dry_run,
                );
                if !quiet || report.dry_run {
                    for path in &report.changed {
                        println!("  - {}", path);
                    }
                }
                Ok(())
            })
        }
    }
}
