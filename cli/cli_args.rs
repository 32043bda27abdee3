use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use llmprep_core::{DumpSpec, FileSelection};
use std::path::PathBuf;

#[derive(Args, Debug, Clone, Default)]
pub struct ProjectConfigOpts {
    #[arg(
        long,
        help = "Specify the target project directory (default: $LLMPREP_PROJECT_ROOT or current dir).",
        help_heading = "Project Setup",
        value_name = "PATH"
    )]
    pub project_root: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

#[derive(Args, Debug, Clone, Default)]
pub struct FormatOutputOpts {
    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Set the report format.",
        help_heading = "Output Formatting"
    )]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Assemble bounded, line-numbered context documents for LLMs.",
    long_about = "llmprep renders a project tree, selected files with line numbers, notes and \nmarkdown dumps into one markdown document, honouring per-project ignore patterns \nand size ceilings. Large selections can be split into line-bounded chunks.",
    help_template = "{about-section}\nUsage: {usage}\n\n{all-args}{after-help}",
    after_help = "EXAMPLES:\n  llmprep generate --file src/main.py::'entry point' --note 'crash on start'\n  llmprep ignore update add dist --reason 'js build output'\n  llmprep chunk src --line-limit 2000 --dry-run\n  llmprep detect -f json",
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true, help = "Increase message verbosity (-v, -vv).")]
    pub verbose: u8,

    #[arg(
        short,
        long,
        global = true,
        help = "Silence informational messages and warnings."
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    #[command(
        visible_alias = "g",
        visible_alias = "gen",
        about = "Generate a context document."
    )]
    Generate(GenerateArgs),

    #[command(visible_alias = "i", about = "List or update the project's ignore patterns.")]
    Ignore(IgnoreArgs),

    #[command(about = "Detect the project type and suggest ignore patterns.")]
    Detect(DetectArgs),

    #[command(visible_alias = "n", about = "Create or clean markdown notes.")]
    Note(NoteArgs),

    #[command(visible_alias = "r", about = "List recently generated documents.")]
    Recent(RecentArgs),

    #[command(
        visible_alias = "c",
        about = "Split a directory or glob into line-bounded documents."
    )]
    Chunk(ChunkArgs),

    #[command(about = "Show or change project configuration.")]
    Config(ConfigArgs),

    #[command(visible_alias = "t", about = "Print the project tree.")]
    Tree(TreeArgs),

    #[command(about = "Maintain generated reports.")]
    Reports(ReportsArgs),

    #[command(about = "Print a shell completion script.")]
    Completion(CompletionArgs),
}

fn split_spec(raw: &str) -> (String, Option<String>) {
    match raw.split_once("::") {
        Some((path, extra)) if !extra.trim().is_empty() => {
            (path.trim().to_string(), Some(extra.trim().to_string()))
        }
        Some((path, _)) => (path.trim().to_string(), None),
        None => (raw.trim().to_string(), None),
    }
}

/// `PATH` or `PATH::NOTE`.
pub fn parse_file_selection(raw: &str) -> Result<FileSelection, String> {
    let (path, note) = split_spec(raw);
    if path.is_empty() {
        return Err("file path is empty".to_string());
    }
    Ok(FileSelection { path, note })
}

/// `FILE` or `FILE::TITLE`.
pub fn parse_dump_spec(raw: &str) -> Result<DumpSpec, String> {
    let (file, title) = split_spec(raw);
    if file.is_empty() {
        return Err("dump file is empty".to_string());
    }
    Ok(DumpSpec { file, title })
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    #[clap(flatten)]
    pub project_config: ProjectConfigOpts,
    #[clap(flatten)]
    pub format_output: FormatOutputOpts,

    #[arg(
        long = "file",
        value_name = "PATH[::NOTE]",
        value_parser = parse_file_selection,
        help = "File to include in focus, optionally with a note (repeatable).",
        help_heading = "Selection"
    )]
    pub files: Vec<FileSelection>,

    #[arg(
        long = "dump",
        value_name = "FILE[::TITLE]",
        value_parser = parse_dump_spec,
        help = "Markdown file inserted verbatim under a title (repeatable).",
        help_heading = "Selection"
    )]
    pub dumps: Vec<DumpSpec>,

    #[arg(
        long = "note",
        value_name = "TEXT",
        help = "General note appended at the end (repeatable).",
        help_heading = "Selection"
    )]
    pub notes: Vec<String>,

    #[arg(
        long = "note-file",
        value_name = "PATH",
        help = "Markdown file appended as a general note (repeatable).",
        help_heading = "Selection"
    )]
    pub note_files: Vec<String>,

    #[arg(
        long,
        value_name = "FILE",
        help = "JSON request file; command-line selections are added to it.",
        help_heading = "Selection"
    )]
    pub request: Option<PathBuf>,

    #[arg(
        short = 'o',
        long,
        value_name = "NAME",
        help = "Output file name inside the output directory [default: context_<timestamp>.md].",
        help_heading = "Output Control"
    )]
    pub output: Option<String>,

    #[arg(
        long,
        value_name = "PATTERNS",
        help = "Ignore patterns for this call only, replacing the configured set (repeatable, '|' separated).",
        help_heading = "Output Control"
    )]
    pub ignore: Vec<String>,

    #[arg(
        long,
        value_name = "N",
        help = "Tree depth [default: project setting].",
        help_heading = "Output Control"
    )]
    pub depth: Option<usize>,

    #[arg(
        long,
        help = "Show what would be included without writing anything.",
        help_heading = "Output Control"
    )]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct IgnoreArgs {
    #[clap(flatten)]
    pub project_config: ProjectConfigOpts,
    #[clap(flatten)]
    pub format_output: FormatOutputOpts,
    #[command(subcommand)]
    pub action: IgnoreAction,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternAction {
    Set,
    Add,
    Remove,
    Auto,
}

#[derive(Subcommand, Debug, Clone)]
pub enum IgnoreAction {
    #[command(about = "Show current patterns and suggested additions.")]
    List,
    #[command(about = "Set, add, remove or auto-detect patterns.")]
    Update {
        #[arg(value_enum)]
        action: PatternAction,
        #[arg(value_name = "PATTERNS", help = "Patterns ('|' or ',' separated, or several arguments).")]
        patterns: Vec<String>,
        #[arg(long, help = "Reason recorded in the history entry.")]
        reason: Option<String>,
        #[arg(long, help = "Run project detection and merge its patterns (same as 'auto').")]
        auto_detect: bool,
    },
    #[command(about = "Show the pattern change history.")]
    History {
        #[arg(long, default_value_t = 10, help = "Number of newest entries to show.")]
        limit: usize,
    },
}

#[derive(Args, Debug, Clone)]
pub struct DetectArgs {
    #[clap(flatten)]
    pub project_config: ProjectConfigOpts,
    #[clap(flatten)]
    pub format_output: FormatOutputOpts,
}

#[derive(Args, Debug, Clone)]
pub struct NoteArgs {
    #[clap(flatten)]
    pub project_config: ProjectConfigOpts,
    #[clap(flatten)]
    pub format_output: FormatOutputOpts,
    #[command(subcommand)]
    pub action: NoteAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum NoteAction {
    #[command(about = "Write a markdown note (content from argument or stdin).")]
    Create {
        #[arg(help = "Note file name; '.md' is appended if missing.")]
        filename: String,
        #[arg(help = "Note content [default: read from stdin].")]
        content: Option<String>,
        #[arg(long, value_name = "DIR", help = "Folder inside the project [default: .llm_prep_notes].")]
        subfolder: Option<String>,
    },
    #[command(about = "Delete notes older than a duration.")]
    Clean {
        #[arg(long, value_name = "DURATION", help = "Age threshold such as '7d' or '12h' [default: 7d].")]
        older_than: Option<String>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RecentArgs {
    #[clap(flatten)]
    pub project_config: ProjectConfigOpts,
    #[clap(flatten)]
    pub format_output: FormatOutputOpts,
    #[arg(long, short = 'n', default_value_t = 10, help = "Number of entries to show.")]
    pub limit: usize,
}

#[derive(Args, Debug, Clone)]
pub struct ChunkArgs {
    #[clap(flatten)]
    pub project_config: ProjectConfigOpts,
    #[clap(flatten)]
    pub format_output: FormatOutputOpts,

    #[arg(required = true, help = "Directory, file or glob (e.g., 'src', 'src/**/*.py').")]
    pub path: String,

    #[arg(long, short = 'l', value_name = "LINES", help = "Maximum lines per chunk [default: 3300].")]
    pub line_limit: Option<usize>,

    #[arg(long, value_name = "DIR", help = "Output directory inside the project [default: project setting].")]
    pub output_dir: Option<PathBuf>,

    #[arg(long, value_name = "NAME", help = "Output base name [default: <last segment>_summary].")]
    pub base: Option<String>,

    #[arg(long, value_name = "PATTERNS", help = "Extra ignore patterns merged with the configured set (repeatable).")]
    pub ignore: Vec<String>,

    #[arg(long, value_name = "N", help = "Tree depth [default: project setting].")]
    pub depth: Option<usize>,

    #[arg(long, help = "Print the chunk plan without writing anything.")]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    #[clap(flatten)]
    pub project_config: ProjectConfigOpts,
    #[clap(flatten)]
    pub format_output: FormatOutputOpts,
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    #[command(about = "Show the stored project configuration.")]
    Show,
    #[command(about = "Change output, dump and tree settings.")]
    Set(ConfigSetArgs),
    #[command(about = "Apply a named configuration template.")]
    Template {
        #[arg(help = "Template name (see 'config templates').")]
        name: String,
    },
    #[command(about = "List the available configuration templates.")]
    Templates,
    #[command(about = "Show the effective engine limits.")]
    Limits,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ConfigSetArgs {
    #[arg(long, value_name = "DIR", help = "Reports directory inside the project.")]
    pub output_dir: Option<PathBuf>,

    #[arg(
        long = "dump",
        value_name = "FILE[::TITLE]",
        value_parser = parse_dump_spec,
        help = "Default context dump (repeatable); replaces the stored list."
    )]
    pub dumps: Vec<DumpSpec>,

    #[arg(long, conflicts_with = "dumps", help = "Remove all default context dumps.")]
    pub clear_dumps: bool,

    #[arg(long, value_name = "N", help = "Default tree depth.")]
    pub depth: Option<usize>,

    #[arg(long, value_name = "BOOL", help = "Skip files ignored by .gitignore when chunking.")]
    pub respect_gitignore: Option<bool>,

    #[arg(long, value_name = "N", help = "Number of recent documents to keep.")]
    pub recent_max: Option<usize>,

    #[arg(long, value_name = "DURATION", requires = "recent_max", help = "Drop recent documents older than this (e.g. '30d').")]
    pub recent_max_age: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct CompletionArgs {
    #[arg(value_enum, default_value_t = Shell::Fish, help = "Shell to generate completions for.")]
    pub shell: Shell,
}

#[derive(Args, Debug, Clone)]
pub struct TreeArgs {
    #[clap(flatten)]
    pub project_config: ProjectConfigOpts,
    #[arg(long, value_name = "N", help = "Tree depth [default: project setting].")]
    pub depth: Option<usize>,
    #[arg(long, value_name = "PATTERNS", help = "Ignore patterns replacing the configured set (repeatable).")]
    pub ignore: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ReportsArgs {
    #[clap(flatten)]
    pub project_config: ProjectConfigOpts,
    #[clap(flatten)]
    pub format_output: FormatOutputOpts,
    #[command(subcommand)]
    pub action: ReportsAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ReportsAction {
    #[command(about = "Strip line-number padding from reports older than a cutoff.")]
    Compact {
        #[arg(long, value_name = "DATE|DURATION", help = "Only touch reports modified before this ('2024-05-01' or '30d').")]
        before: String,
        #[arg(long, value_name = "GLOB", help = "Report files to consider, relative to the reports directory [default: *.md].")]
        glob: Option<String>,
        #[arg(long, help = "Report what would change without writing.")]
        dry_run: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn file_and_dump_specs_split_on_double_colon() {
        let file = parse_file_selection("src/a.py::entry point").unwrap();
        assert_eq!(file.path, "src/a.py");
        assert_eq!(file.note.as_deref(), Some("entry point"));
        assert_eq!(parse_file_selection("b.rs").unwrap().note, None);
        assert!(parse_file_selection("::note").is_err());

        let dump = parse_dump_spec("docs/x.md::Design").unwrap();
        assert_eq!(dump.title.as_deref(), Some("Design"));
    }

    #[test]
    fn generate_flags_parse() {
        let cli = Cli::try_parse_from([
            "llmprep", "-vv", "generate", "--file", "a.py::n", "--file", "b.py", "--note", "hi",
            "--dry-run", "-f", "json",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Some(Commands::Generate(args)) => {
                assert_eq!(args.files.len(), 2);
                assert!(args.dry_run);
                assert_eq!(args.format_output.format, OutputFormat::Json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn reports_compact_requires_a_cutoff() {
        assert!(Cli::try_parse_from(["llmprep", "reports", "compact"]).is_err());
        let cli = Cli::try_parse_from([
            "llmprep", "reports", "compact", "--before", "2024-05-01", "--glob", "**/*.md", "--dry-run",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Reports(ReportsArgs {
                action: ReportsAction::Compact { before, glob, dry_run },
                ..
            })) => {
                assert_eq!(before, "2024-05-01");
                assert_eq!(glob.as_deref(), Some("**/*.md"));
                assert!(dry_run);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
