use anyhow::Result;
use clap::CommandFactory;
use clap_complete::generate;
use std::io;

use crate::cli_args::{Cli, CompletionArgs};

/// Writes the completion script for the requested shell to stdout.
pub fn handle_completion_command(args: &CompletionArgs) -> Result<()> {
    let mut command = Cli::command();
    let bin_name = command.get_name().to_string();
    log::debug!("Generating {} completions for {}", args.shell, bin_name);
    generate(args.shell, &mut command, bin_name, &mut io::stdout());
    Ok(())
}
