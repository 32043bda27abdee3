use crate::cli_args::{NoteAction, NoteArgs};
use crate::load_project;
use crate::output;
use anyhow::{Context, Result};
use llmprep_core::ops;
use std::io;

pub fn handle_note_command(args: NoteArgs, quiet: bool) -> Result<()> {
    let (project_root, _limits) = load_project(&args.project_config)?;

    match args.action {
        NoteAction::Create {
            filename,
            content,
            subfolder,
        } => {
            let content = match content {
                Some(text) => text,
                None => io::read_to_string(io::stdin()).context("Failed to read note content from stdin")?,
            };
            let note = ops::create_note(&project_root, &filename, &content, subfolder.as_deref())
                .context("Failed to create note")?;
            output::print_data_or_text(&note, &args.format_output, |note| {
                output::success(&format!("Created notes file: {}", note.relative_path), quiet);
                Ok(())
            })
        }
        NoteAction::Clean { older_than } => {
            let report = ops::clean_notes(&project_root, older_than.as_deref())
                .context("Failed to clean notes")?;
            output::print_data_or_text(&report, &args.format_output, |report| {
                output::success(
                    &format!("Cleaned up {} old note files ({} kept)", report.deleted.len(), report.kept),
                    quiet,
                );
                if !quiet {
                    for path in &report.deleted {
                        println!("  - {}", path);
                    }
                }
                Ok(())
            })
        }
    }
}
