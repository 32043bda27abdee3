use crate::collect::{DumpSection, FileSection, count_lines};
use crate::config::{self, RecentContext};
use crate::error::{AppError, Result};
use crate::fsio::{ensure_dir, relative_display, write_atomic};
use crate::tree::FOCUS_MARKER;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const DOCUMENT_TITLE: &str = "# LLM Context Document";
pub const DEFAULT_NAME_FORMAT: &str = "context_%Y%m%d_%H%M%S.md";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const FILE_RULE_WIDTH: usize = 60;

/// The parts of one generated document, rendered in a fixed order.
#[derive(Debug, Clone, Serialize)]
pub struct ContextDocument {
    pub generated: DateTime<Local>,
    pub project_root: String,
    pub tree: String,
    pub dumps: Vec<DumpSection>,
    pub files: Vec<FileSection>,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DocumentStats {
    pub bytes: u64,
    pub lines: usize,
    pub words: usize,
}

impl DocumentStats {
    pub fn of(text: &str) -> Self {
        Self {
            bytes: text.len() as u64,
            lines: count_lines(text),
            words: text.split_whitespace().count(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishedDocument {
    pub path: PathBuf,
    /// Root-relative path as recorded in the recent list.
    pub relative_path: String,
    pub stats: DocumentStats,
    /// Raised while updating the recent list, e.g. a corrupt config.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

fn table_cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\r', '\n'], " ")
}

impl ContextDocument {
    pub fn new(project_root: &Path, tree: String) -> Self {
        Self {
            generated: Local::now(),
            project_root: project_root.display().to_string(),
            tree,
            dumps: Vec::new(),
            files: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn with_generated(mut self, generated: DateTime<Local>) -> Self {
        self.generated = generated;
        self
    }

    pub fn add_files(&mut self, files: Vec<FileSection>) {
        log::trace!("Adding {} file sections", files.len());
        self.files.extend(files);
    }

    pub fn add_dumps(&mut self, dumps: Vec<DumpSection>) {
        log::trace!("Adding {} dump sections", dumps.len());
        self.dumps.extend(dumps);
    }

    pub fn add_notes<I: IntoIterator<Item = String>>(&mut self, notes: I) {
        self.notes.extend(notes);
    }

    fn push_file_section(sections: &mut Vec<String>, file: &FileSection) {
        sections.push(format!("### File: {} {}", file.path, FOCUS_MARKER));
        if let Some(note) = &file.note {
            sections.push(format!("**Note:** {}", note));
        }
        sections.push("=".repeat(FILE_RULE_WIDTH));
        sections.push(file.numbered_content.clone());
        sections.push(String::new());
    }

    /// Renders header, summary, tree, dumps, file contents and notes, then the footer.
    pub fn render(&self) -> String {
        let stamp = self.generated.format(TIMESTAMP_FORMAT).to_string();
        let mut sections: Vec<String> = Vec::new();

        sections.push(DOCUMENT_TITLE.to_string());
        sections.push(format!("Generated: {}", stamp));
        sections.push(format!("Project Root: {}", self.project_root));
        sections.push(String::new());

        sections.push("## Summary".to_string());
        sections.push(format!("- Files in focus: {}", self.files.len()));
        sections.push(format!("- Context dumps: {}", self.dumps.len()));
        sections.push(format!("- General notes: {}", self.notes.len()));
        sections.push(String::new());

        if !self.files.is_empty() {
            sections.push("## Files in Focus".to_string());
            sections.push(String::new());
            sections.push("| File | Note |".to_string());
            sections.push("|------|------|".to_string());
            for file in &self.files {
                let note = file.note.as_deref().map(table_cell).unwrap_or_else(|| "-".to_string());
                sections.push(format!("| `{}` | {} |", file.path, note));
            }
            sections.push(String::new());
        }

        sections.push("## Project Structure".to_string());
        sections.push("```".to_string());
        sections.push(self.tree.trim_end_matches('\n').to_string());
        sections.push("```".to_string());
        sections.push(String::new());

        if !self.dumps.is_empty() {
            sections.push("## Context & Analysis Documents".to_string());
            sections.push(String::new());
            for dump in &self.dumps {
                sections.push(format!("### 📄 {}", dump.title));
                sections.push(String::new());
                sections.push(dump.content.clone());
                sections.push(String::new());
                sections.push("---".to_string());
                sections.push(String::new());
            }
        }

        if !self.files.is_empty() {
            sections.push("## File Contents".to_string());
            sections.push(String::new());
            for file in &self.files {
                Self::push_file_section(&mut sections, file);
            }
        }

        if !self.notes.is_empty() {
            sections.push("## General Context & Notes".to_string());
            sections.push(String::new());
            for (i, note) in self.notes.iter().enumerate() {
                sections.push(format!("**Note {}:**", i + 1));
                sections.push(String::new());
                sections.push(note.clone());
                sections.push(String::new());
            }
        }

        sections.push("---".to_string());
        sections.push(String::new());
        sections.push(format!("*Document generated by llmprep on {}*", stamp));
        sections.push(String::new());
        sections.join("\n")
    }
}

/// Renders the document and enforces the size ceiling. Never truncates.
pub fn assemble(document: &ContextDocument, ceiling: u64) -> Result<String> {
    let text = document.render();
    let size = text.len() as u64;
    if size > ceiling {
        log::warn!(
            "Assembled document is {} bytes, over the ceiling of {} bytes",
            size,
            ceiling
        );
        return Err(AppError::DocumentTooLarge {
            size,
            limit: ceiling,
        });
    }
    log::debug!("Assembled document of {} bytes", size);
    Ok(text)
}

pub fn default_document_name(now: DateTime<Local>) -> String {
    now.format(DEFAULT_NAME_FORMAT).to_string()
}

/// Writes a rendered document via temp file and rename.
pub fn write_document(path: &Path, text: &str) -> Result<DocumentStats> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    write_atomic(path, text.as_bytes())?;
    log::info!("Wrote {}", path.display());
    Ok(DocumentStats::of(text))
}

/// Writes the document and records it in the project's recent list.
pub fn publish(root: &Path, path: &Path, text: &str) -> Result<PublishedDocument> {
    let stats = write_document(path, text)?;
    let relative_path = relative_display(path, root);
    let warnings = config::record_recent(
        root,
        RecentContext {
            path: relative_path.clone(),
            timestamp: Utc::now(),
            size: stats.bytes,
        },
    )?;
    Ok(PublishedDocument {
        path: path.to_path_buf(),
        relative_path,
        stats,
        warnings,
    })
}
