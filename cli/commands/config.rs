use crate::cli_args::{ConfigAction, ConfigArgs, ConfigSetArgs};
use crate::load_project;
use crate::output;
use anyhow::{Context, Result, bail};
use colored::*;
use llmprep_core::config::{self, RecentRetention};
use llmprep_core::ops::{self, LimitsReport};
use llmprep_core::{EngineLimits, ProjectConfig, ProjectSettings};

fn settings_from_args(args: &ConfigSetArgs) -> ProjectSettings {
    let default_dumps = if args.clear_dumps {
        Some(Vec::new())
    } else if !args.dumps.is_empty() {
        Some(args.dumps.clone())
    } else {
        None
    };
    ProjectSettings {
        output_dir: args.output_dir.clone(),
        default_dumps,
        tree_max_depth: args.depth,
        respect_gitignore: args.respect_gitignore,
        recent_retention: args.recent_max.map(|max_entries| RecentRetention {
            max_entries,
            max_age: args.recent_max_age.clone(),
        }),
    }
}

pub fn handle_config_command(args: ConfigArgs, quiet: bool) -> Result<()> {
    // Listing templates and limits needs no project root.
    match &args.action {
        ConfigAction::Templates => {
            let templates = ops::list_templates();
            return output::print_data_or_text(&templates, &args.format_output, |templates| {
                let rows = templates
                    .iter()
                    .map(|(name, t)| {
                        let dumps: Vec<String> = t.default_dumps.iter().map(|d| d.file.clone()).collect();
                        vec![
                            name.clone(),
                            t.description.clone(),
                            t.output_dir.display().to_string(),
                            dumps.join("\n"),
                        ]
                    })
                    .collect();
                println!("{}", output::table(&["Name", "Description", "Output dir", "Default dumps"], rows));
                Ok(())
            });
        }
        ConfigAction::Limits => {
            let limits = EngineLimits::from_env().context("Invalid engine limits in environment")?;
            let report = ops::show_limits(&limits);
            return output::print_data_or_text(&report, &args.format_output, |report| {
                print_limits_text(report);
                Ok(())
            });
        }
        _ => {}
    }

    let (project_root, _limits) = load_project(&args.project_config)?;
    let config = match &args.action {
        ConfigAction::Show => {
            let loaded = config::load_checked(&project_root).context("Failed to load project configuration")?;
            output::warnings(&loaded.warnings());
            loaded.config
        }
        ConfigAction::Set(set_args) => {
            let settings = settings_from_args(set_args);
            if settings == ProjectSettings::default() {
                bail!("Nothing to change; pass at least one setting (see 'config set --help')");
            }
            let config = ops::set_project_config(&project_root, &settings)
                .context("Failed to update project configuration")?;
            output::success(&format!("Updated configuration for {}", project_root.display()), quiet);
            config
        }
        ConfigAction::Template { name } => {
            let config = ops::apply_template(&project_root, name)
                .with_context(|| format!("Failed to apply template '{}'", name))?;
            output::success(&format!("Applied template '{}'", name), quiet);
            config
        }
        ConfigAction::Templates | ConfigAction::Limits => return Ok(()),
    };

    output::print_data_or_text(&config, &args.format_output, |config| {
        if !quiet {
            print_config_text(config);
        }
        Ok(())
    })
}

fn print_config_text(config: &ProjectConfig) {
    output::heading("Project Configuration");
    output::field(
        "Project type",
        config
            .project_type
            .map(|t| t.to_string())
            .unwrap_or_else(|| "(not detected)".to_string()),
    );
    output::field("Output dir", config.output_dir.display());
    output::field("Tree max depth", config.tree_max_depth);
    output::field("Respect .gitignore", config.respect_gitignore);
    output::field("Ignore patterns", config.joined_patterns());
    output::field("History entries", config.history.len());
    output::field("Recent documents", config.recent_contexts.len());
    let dumps: Vec<String> = config
        .default_dumps
        .iter()
        .map(|d| format!("{} ({})", d.file, d.display_title()))
        .collect();
    output::bullet_list("Default context dumps:", &dumps);
}

fn print_limits_text(report: &LimitsReport) {
    output::heading("Engine Limits");
    output::field("Max file size", &report.max_file_size_display);
    output::field("Max context size", &report.max_context_size_display);
    output::field(
        "Workspace dir",
        report
            .limits
            .workspace_dir
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(unrestricted)".dimmed().to_string()),
    );
    let extensions: Vec<&str> = report.limits.allowed_extensions.iter().map(String::as_str).collect();
    output::field("Allowed extensions", extensions.join(" "));
}
