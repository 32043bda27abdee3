use crate::cli_args::{IgnoreAction, IgnoreArgs, PatternAction};
use crate::load_project;
use crate::output;
use anyhow::{Context, Result};
use colored::*;
use llmprep_core::config::{self, HistoryEntry, UpdateOutcome};
use llmprep_core::ops::{self, IgnoreListing, IgnoreUpdateRequest};
use llmprep_core::UpdateAction;
use llmprep_core::pattern::Provenance;

impl From<PatternAction> for UpdateAction {
    fn from(action: PatternAction) -> Self {
        match action {
            PatternAction::Set => UpdateAction::Set,
            PatternAction::Add => UpdateAction::Add,
            PatternAction::Remove => UpdateAction::Remove,
            PatternAction::Auto => UpdateAction::Auto,
        }
    }
}

pub fn handle_ignore_command(args: IgnoreArgs, quiet: bool) -> Result<()> {
    let (project_root, _limits) = load_project(&args.project_config)?;

    match args.action {
        IgnoreAction::List => {
            let listing = ops::list_ignore_patterns(&project_root)
                .context("Failed to list ignore patterns")?;
            output::print_data_or_text(&listing, &args.format_output, |listing| {
                print_listing_text(listing);
                Ok(())
            })
        }
        IgnoreAction::Update {
            action,
            patterns,
            reason,
            auto_detect,
        } => {
            let request = IgnoreUpdateRequest {
                action: action.into(),
                patterns,
                auto_detect,
                reason,
            };
            let outcome = ops::update_ignore_patterns(&project_root, &request)
                .context("Failed to update ignore patterns")?;
            output::print_data_or_text(&outcome, &args.format_output, |outcome| {
                print_outcome_text(outcome, quiet);
                Ok(())
            })
        }
        IgnoreAction::History { limit } => {
            let config = config::load(&project_root).context("Failed to load project configuration")?;
            let skip = config.history.len().saturating_sub(limit);
            let entries: Vec<HistoryEntry> = config.history.into_iter().skip(skip).collect();
            output::print_data_or_text(&entries, &args.format_output, |entries| {
                let rows = entries
                    .iter()
                    .rev()
                    .map(|h| {
                        vec![
                            h.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                            format!("{:?}", h.action).to_lowercase(),
                            h.reason.clone(),
                            h.patterns.clone(),
                        ]
                    })
                    .collect();
                println!("{}", output::table(&["When", "Action", "Reason", "Patterns"], rows));
                Ok(())
            })
        }
    }
}

fn print_listing_text(listing: &IgnoreListing) {
    output::field("Detected project type", listing.project_type);
    println!();
    let rows = listing
        .rules
        .iter()
        .map(|rule| {
            let source = match rule.provenance {
                Provenance::Manual => "manual",
                Provenance::AutoDetected => "auto-detected",
            };
            vec![rule.pattern.clone(), source.to_string()]
        })
        .collect();
    println!("{}", output::table(&["Pattern", "Source"], rows));
    output::bullet_list("Suggested additions (critical + recommended):", &listing.suggested_additions);
    output::warnings(&listing.warnings);
}

fn print_outcome_text(outcome: &UpdateOutcome, quiet: bool) {
    output::success("Ignore patterns updated", quiet);
    output::warnings(&outcome.warnings);
    if quiet {
        return;
    }
    for p in &outcome.added {
        println!("  {} {}", "+".green(), p);
    }
    for p in &outcome.removed {
        println!("  {} {}", "-".red(), p);
    }
    output::field("Active patterns", outcome.config.joined_patterns());
}
