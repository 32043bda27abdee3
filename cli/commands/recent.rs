use crate::cli_args::RecentArgs;
use crate::load_project;
use crate::output;
use anyhow::{Context, Result};
use colored::*;
use llmprep_core::limits::format_size;
use llmprep_core::ops;

pub fn handle_recent_command(args: RecentArgs) -> Result<()> {
    let (project_root, _limits) = load_project(&args.project_config)?;
    let listing = ops::list_recent(&project_root, args.limit).context("Failed to list recent documents")?;

    output::print_data_or_text(&listing, &args.format_output, |listing| {
        output::warnings(&listing.warnings);
        let recent = &listing.documents;
        if recent.is_empty() {
            println!("{}", "No recent context documents found.".dimmed());
            return Ok(());
        }
        let rows = recent
            .iter()
            .enumerate()
            .map(|(i, ctx)| {
                vec![
                    (i + 1).to_string(),
                    ctx.path.clone(),
                    ctx.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                    format_size(ctx.size),
                ]
            })
            .collect();
        println!("{}", output::table(&["#", "Document", "Created", "Size"], rows));
        Ok(())
    })
}
