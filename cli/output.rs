use anyhow::{Context, Result};
use colored::*;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL};
use serde::Serialize;
use std::io::{self, Write};

use crate::cli_args::{FormatOutputOpts, OutputFormat};

// --- Public Output Functions ---

/// Prints `data` as JSON/YAML, or runs `print_text` for the text format.
pub fn print_data_or_text<T, F>(data: &T, format_opts: &FormatOutputOpts, print_text: F) -> Result<()>
where
    T: Serialize,
    F: FnOnce(&T) -> Result<()>,
{
    match format_opts.format {
        OutputFormat::Text => print_text(data),
        OutputFormat::Json => {
            let content = serde_json::to_string_pretty(data).context("Failed to serialize JSON output")?;
            write_to_stdout(&content)
        }
        OutputFormat::Yaml => {
            let content = serde_yml::to_string(data).context("Failed to serialize YAML output")?;
            write_to_stdout(&content)
        }
    }
}

pub fn success(message: &str, quiet: bool) {
    if !quiet {
        println!("{} {}", "✅".green(), message);
    }
}

pub fn heading(title: &str) {
    println!("{}", format!(" {} ", title).green().bold().underline());
}

pub fn field(label: &str, value: impl std::fmt::Display) {
    println!("{:<22} {}", format!("{}:", label).green(), value.to_string().cyan());
}

pub fn bullet_list(title: &str, items: &[String]) {
    println!("{}", title.bold());
    if items.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for item in items {
        println!("  - {}", item);
    }
}

pub fn warnings(messages: &[String]) {
    for message in messages {
        eprintln!("{} {}", "Warning:".yellow().bold(), message);
    }
}

/// A UTF-8 table with a green header row.
pub fn table(headers: &[&str], rows: Vec<Vec<String>>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(
        headers
            .iter()
            .map(|h| Cell::new(h).fg(Color::Green))
            .collect::<Vec<_>>(),
    );
    for row in rows {
        table.add_row(row);
    }
    table
}

pub fn write_to_stdout(content: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(content.as_bytes())
        .context("Failed to write to stdout")?;
    if !content.ends_with('\n') {
        handle
            .write_all(b"\n")
            .context("Failed to write newline to stdout")?;
    }
    handle.flush().context("Failed to flush stdout")?;
    Ok(())
}
