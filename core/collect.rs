use crate::config::DumpSpec;
use crate::error::ItemError;
use crate::fsio::{relative_display, resolve_within_root};
use crate::limits::EngineLimits;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Only this many leading bytes are inspected for a null byte.
pub const BINARY_SNIFF_LEN: usize = 8192;
pub const LINE_NUMBER_SEPARATOR: char = '|';

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSelection {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl FileSelection {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            note: None,
        }
    }

    pub fn with_note(path: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            note: Some(note.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSection {
    /// Root-relative, `/`-separated.
    pub path: String,
    pub note: Option<String>,
    pub numbered_content: String,
    pub line_count: usize,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DumpSection {
    pub title: String,
    pub source: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteFileSection {
    pub source: String,
    pub content: String,
}

/// Successes and per-item failures of one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collected<T> {
    pub items: Vec<T>,
    pub errors: Vec<ItemError>,
}

impl<T> Collected<T> {
    fn from_results(results: Vec<std::result::Result<T, ItemError>>) -> Self {
        let mut items = Vec::new();
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(item) => items.push(item),
                Err(e) => {
                    log::warn!("{}", e);
                    errors.push(e);
                }
            }
        }
        Self { items, errors }
    }
}

/// Reads a text file. The error string explains why the file is not text.
pub fn read_text(path: &Path) -> std::result::Result<String, String> {
    let bytes = fs::read(path).map_err(|e| e.to_string())?;
    let sniff = &bytes[..bytes.len().min(BINARY_SNIFF_LEN)];
    if sniff.contains(&0) {
        return Err("binary content (null byte)".to_string());
    }
    String::from_utf8(bytes).map_err(|e| format!("invalid UTF-8: {}", e.utf8_error()))
}

/// Counts lines the way numbering does: a trailing newline does not start a new line.
pub fn count_lines(content: &str) -> usize {
    content.split_inclusive('\n').count()
}

/// Prefixes each line with `N|`, keeping line terminators verbatim.
pub fn number_lines(content: &str) -> String {
    let mut out = String::with_capacity(content.len() + content.len() / 8);
    for (i, line) in content.split_inclusive('\n').enumerate() {
        out.push_str(&(i + 1).to_string());
        out.push(LINE_NUMBER_SEPARATOR);
        out.push_str(line);
    }
    out
}

/// Inverse of [`number_lines`].
pub fn strip_line_numbers(numbered: &str) -> String {
    numbered
        .split_inclusive('\n')
        .map(|line| match line.split_once(LINE_NUMBER_SEPARATOR) {
            Some((num, rest)) if !num.is_empty() && num.bytes().all(|b| b.is_ascii_digit()) => rest,
            _ => line,
        })
        .collect()
}

fn collect_one(root: &Path, selection: &FileSelection, limits: &EngineLimits) -> std::result::Result<FileSection, ItemError> {
    let resolved = resolve_within_root(root, &selection.path).ok_or_else(|| ItemError::PathEscape {
        path: selection.path.clone(),
    })?;
    let display = relative_display(&resolved, root);
    let metadata = fs::metadata(&resolved).map_err(|e| ItemError::UnreadableFile {
        path: display.clone(),
        reason: e.to_string(),
    })?;
    if !metadata.is_file() {
        return Err(ItemError::UnreadableFile {
            path: display,
            reason: "not a regular file".to_string(),
        });
    }
    if !limits.is_file_allowed(&resolved) {
        return Err(ItemError::DisallowedType { path: display });
    }
    if metadata.len() > limits.max_file_size {
        return Err(ItemError::OversizeFile {
            path: display,
            size: metadata.len(),
            limit: limits.max_file_size,
        });
    }
    let content = read_text(&resolved).map_err(|reason| ItemError::UnreadableFile {
        path: display.clone(),
        reason,
    })?;
    log::trace!("Collected {} ({} bytes)", display, content.len());
    Ok(FileSection {
        path: display,
        note: selection.note.clone(),
        line_count: count_lines(&content),
        size: metadata.len(),
        numbered_content: number_lines(&content),
    })
}

/// Reads every selection in parallel. Output order follows selection order.
pub fn collect(root: &Path, selections: &[FileSelection], limits: &EngineLimits) -> Collected<FileSection> {
    log::debug!("Collecting {} selected files", selections.len());
    let results: Vec<_> = selections
        .par_iter()
        .map(|selection| collect_one(root, selection, limits))
        .collect();
    let collected = Collected::from_results(results);
    log::info!(
        "Collected {} files ({} rejected)",
        collected.items.len(),
        collected.errors.len()
    );
    collected
}

fn read_supporting(
    root: &Path,
    raw: &str,
    limits: &EngineLimits,
    missing: impl Fn(String) -> ItemError,
) -> std::result::Result<(String, String), ItemError> {
    let resolved = resolve_within_root(root, raw).ok_or_else(|| ItemError::PathEscape {
        path: raw.to_string(),
    })?;
    let display = relative_display(&resolved, root);
    if !resolved.is_file() {
        return Err(missing(display));
    }
    let size = fs::metadata(&resolved).map(|m| m.len()).unwrap_or(0);
    if size > limits.max_file_size {
        return Err(ItemError::OversizeFile {
            path: display,
            size,
            limit: limits.max_file_size,
        });
    }
    let content = read_text(&resolved).map_err(|reason| ItemError::UnreadableFile {
        path: display.clone(),
        reason,
    })?;
    Ok((display, content))
}

/// Context dumps are inserted verbatim under their title.
pub fn collect_dumps(root: &Path, dumps: &[DumpSpec], limits: &EngineLimits) -> Collected<DumpSection> {
    let results: Vec<_> = dumps
        .par_iter()
        .map(|dump| -> std::result::Result<DumpSection, ItemError> {
            let (source, content) =
                read_supporting(root, &dump.file, limits, |path| ItemError::MissingDump { path })?;
            Ok(DumpSection {
                title: dump.display_title(),
                source,
                content,
            })
        })
        .collect();
    Collected::from_results(results)
}

/// Note files become general notes headed by their file name.
pub fn collect_note_files(root: &Path, paths: &[String], limits: &EngineLimits) -> Collected<NoteFileSection> {
    let results: Vec<_> = paths
        .par_iter()
        .map(|raw| -> std::result::Result<NoteFileSection, ItemError> {
            let (source, content) =
                read_supporting(root, raw, limits, |path| ItemError::MissingNote { path })?;
            Ok(NoteFileSection { source, content })
        })
        .collect();
    Collected::from_results(results)
}

impl NoteFileSection {
    pub fn as_note(&self) -> String {
        let name = Path::new(&self.source)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.clone());
        format!("### {}\n\n{}", name, self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn project() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/main.py"), "import os\n\nprint(os.name)\n").unwrap();
        fs::write(root.join("notes.md"), "remember this").unwrap();
        (dir, root)
    }

    #[test]
    fn numbering_round_trips_exactly() {
        for content in ["", "one", "one\n", "a\r\nb\r\n", "a\n\n\nb", "3|looks numbered\n"] {
            assert_eq!(strip_line_numbers(&number_lines(content)), content);
        }
        assert_eq!(number_lines("a\nb"), "1|a\n2|b");
        assert_eq!(count_lines("a\nb\n"), 2);
        assert_eq!(count_lines(""), 0);
    }

    #[test]
    fn collects_in_selection_order_with_notes() {
        let (_dir, root) = project();
        let selections = vec![
            FileSelection::with_note("notes.md", "context"),
            FileSelection::new("src/main.py"),
        ];
        let out = collect(&root, &selections, &EngineLimits::default());
        assert!(out.errors.is_empty());
        assert_eq!(out.items[0].path, "notes.md");
        assert_eq!(out.items[0].note.as_deref(), Some("context"));
        assert_eq!(out.items[1].path, "src/main.py");
        assert_eq!(out.items[1].line_count, 3);
        assert!(out.items[1].numbered_content.starts_with("1|import os\n2|\n3|"));
    }

    #[test]
    fn escape_is_a_per_item_error() {
        let (_dir, root) = project();
        let selections = vec![
            FileSelection::new("../outside.txt"),
            FileSelection::new("src/main.py"),
        ];
        let out = collect(&root, &selections, &EngineLimits::default());
        assert_eq!(out.items.len(), 1);
        assert_eq!(
            out.errors,
            vec![ItemError::PathEscape {
                path: "../outside.txt".to_string()
            }]
        );
    }

    #[test]
    fn binary_oversize_and_disallowed_files_are_rejected() {
        let (_dir, root) = project();
        fs::write(root.join("blob.txt"), b"abc\0def").unwrap();
        fs::write(root.join("latin1.txt"), [0x66, 0x6f, 0xe9]).unwrap();
        fs::write(root.join("big.txt"), "x".repeat(64)).unwrap();
        fs::write(root.join("image.png"), "png").unwrap();
        let limits = EngineLimits {
            max_file_size: 32,
            ..EngineLimits::default()
        };
        let selections: Vec<_> = ["blob.txt", "latin1.txt", "big.txt", "image.png", "missing.py"]
            .into_iter()
            .map(FileSelection::new)
            .collect();
        let out = collect(&root, &selections, &limits);
        assert!(out.items.is_empty());
        let kinds: Vec<_> = out.errors.iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                "unreadable_file",
                "unreadable_file",
                "oversize_file",
                "disallowed_type",
                "unreadable_file"
            ]
        );
        assert!(matches!(
            &out.errors[2],
            ItemError::OversizeFile { size: 64, limit: 32, .. }
        ));
    }

    #[test]
    fn dumps_and_note_files_report_missing_items() {
        let (_dir, root) = project();
        let dumps = vec![
            DumpSpec {
                file: "notes.md".to_string(),
                title: None,
            },
            DumpSpec {
                file: "gone.md".to_string(),
                title: Some("Gone".to_string()),
            },
        ];
        let out = collect_dumps(&root, &dumps, &EngineLimits::default());
        assert_eq!(out.items.len(), 1);
        assert_eq!(out.items[0].title, "Context from notes.md");
        assert_eq!(out.items[0].content, "remember this");
        assert_eq!(out.errors[0].kind(), "missing_dump");

        let notes = collect_note_files(
            &root,
            &["notes.md".to_string(), "nope.md".to_string()],
            &EngineLimits::default(),
        );
        assert_eq!(notes.items[0].as_note(), "### notes.md\n\nremember this");
        assert_eq!(notes.errors[0].kind(), "missing_note");
    }
}
