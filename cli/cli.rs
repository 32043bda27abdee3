mod cli_args;
mod commands;
mod output;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use colored::*;
use std::path::PathBuf;
use std::process;

use cli_args::{Cli, Commands, ProjectConfigOpts};
use llmprep_core::{AppError, EngineLimits};

fn main() {
    let cli_args = Cli::parse();

    setup_logging(cli_args.quiet, cli_args.verbose);

    let quiet = cli_args.quiet;

    log::debug!("CLI args parsed: {:?}", cli_args);

    let exit_code = match run_app(cli_args, quiet) {
        Ok(_) => {
            log::info!("Application finished successfully.");
            0
        }
        Err(e) => {
            let exit_code = exit_code_for(e.downcast_ref::<AppError>());
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            exit_code
        }
    };
    log::debug!("Exiting with code {}", exit_code);
    process::exit(exit_code);
}

/// 1 configuration or argument, 2 filesystem, 3 size or chunking, 4 pattern.
fn exit_code_for(err: Option<&AppError>) -> i32 {
    match err {
        Some(AppError::ConfigCorrupt { .. })
        | Some(AppError::JsonSerialize(_))
        | Some(AppError::YamlError(_))
        | Some(AppError::DataLoading(_))
        | Some(AppError::InvalidArgument(_))
        | Some(AppError::DurationParse(_))
        | Some(AppError::InvalidRoot { .. })
        | Some(AppError::PathEscape { .. }) => 1,
        Some(AppError::Io(_))
        | Some(AppError::FileRead { .. })
        | Some(AppError::FileWrite { .. })
        | Some(AppError::DirCreation { .. })
        | Some(AppError::Lock { .. }) => 2,
        Some(AppError::DocumentTooLarge { .. }) => 3,
        Some(AppError::MalformedPattern { .. }) | Some(AppError::PatternRejected(_)) => 4,
        Some(_) => 1,
        None => 1,
    }
}

fn setup_logging(quiet: bool, verbose: u8) {
    let log_level = if quiet {
        log::LevelFilter::Error
    } else {
        match verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();
    log::trace!("Logger initialized with level: {:?}", log_level);
}

/// Reads the engine limits and resolves the project root for a command.
pub fn load_project(opts: &ProjectConfigOpts) -> Result<(PathBuf, EngineLimits)> {
    let limits = EngineLimits::from_env().context("Invalid engine limits in environment")?;
    let root = llmprep_core::determine_project_root(opts.project_root.as_deref(), &limits)
        .context("Failed to determine project root")?;
    log::info!("Project root determined: {}", root.display());
    Ok((root, limits))
}

fn run_app(cli: Cli, quiet: bool) -> Result<()> {
    match cli.command {
        None => {
            Cli::command().print_help()?;
        }
        Some(command) => match command {
            Commands::Generate(args) => {
                log::debug!("Executing 'generate' command...");
                commands::generate::handle_generate_command(args, quiet)?;
            }
            Commands::Ignore(args) => {
                log::debug!("Executing 'ignore' command...");
                commands::ignore::handle_ignore_command(args, quiet)?;
            }
            Commands::Detect(args) => {
                log::debug!("Executing 'detect' command...");
                commands::detect::handle_detect_command(args)?;
            }
            Commands::Note(args) => {
                log::debug!("Executing 'note' command...");
                commands::note::handle_note_command(args, quiet)?;
            }
            Commands::Recent(args) => {
                log::debug!("Executing 'recent' command...");
                commands::recent::handle_recent_command(args)?;
            }
            Commands::Chunk(args) => {
                log::debug!("Executing 'chunk' command...");
                commands::chunk::handle_chunk_command(args, quiet)?;
            }
            Commands::Config(args) => {
                log::debug!("Executing 'config' command...");
                commands::config::handle_config_command(args, quiet)?;
            }
            Commands::Tree(args) => {
                log::debug!("Executing 'tree' command...");
                commands::tree::handle_tree_command(args)?;
            }
            Commands::Reports(args) => {
                log::debug!("Executing 'reports' command...");
                commands::reports::handle_reports_command(args, quiet)?;
            }
            Commands::Completion(args) => {
                log::debug!("Executing 'completion' command...");
                commands::completion::handle_completion_command(&args)?;
            }
        },
    }
    Ok(())
}
