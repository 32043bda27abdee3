use crate::cli_args::TreeArgs;
use crate::load_project;
use crate::output;
use anyhow::{Context, Result};
use llmprep_core::ops;

pub fn handle_tree_command(args: TreeArgs) -> Result<()> {
    let (project_root, _limits) = load_project(&args.project_config)?;
    let rendered =
        ops::project_tree(&project_root, &args.ignore, args.depth).context("Failed to render tree")?;
    output::warnings(&rendered.warnings);
    output::write_to_stdout(&rendered.tree)
}
