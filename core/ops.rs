//! Boundary operations: one function per externally callable capability.
//!
//! Every operation takes a canonical project root (see
//! [`crate::fsio::prepare_root`]) and returns a serializable report.

use crate::assemble::{self, ContextDocument, DocumentStats, PublishedDocument};
use crate::chunking::{self, ChunkManifest, ChunkTarget};
use crate::collect::{self, FileSelection};
use crate::config::{
    self, ConfigTemplate, DumpSpec, PatternUpdate, ProjectConfig, ProjectSettings, RecentContext,
    UpdateAction, UpdateOutcome,
};
use crate::detect::{self, PatternSuggestions, ProjectAnalysis, ProjectType};
use crate::error::{AppError, ItemError, Result};
use crate::fsio::{ensure_dir, relative_display, resolve_within_root, write_atomic};
use crate::limits::{EngineLimits, format_size};
use crate::pattern::{self, IgnoreRule};
use crate::tree::{self, TreeOptions};
use chrono::{Local, NaiveDate, TimeZone};
use globset::GlobBuilder;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

pub use crate::config::NOTES_DIR;
pub const DEFAULT_NOTE_MAX_AGE: &str = "7d";
const NOTE_EXTENSION: &str = "md";

fn split_all(raw: &[String]) -> Vec<String> {
    raw.iter().flat_map(|p| pattern::split_patterns(p)).collect()
}

fn output_dir_within(root: &Path, dir: &Path) -> Result<PathBuf> {
    resolve_within_root(root, &dir.to_string_lossy()).ok_or_else(|| AppError::PathEscape {
        path: dir.to_path_buf(),
        root: root.to_path_buf(),
    })
}

// --- generate-document ---

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GenerateRequest {
    pub files: Vec<FileSelection>,
    pub dumps: Vec<DumpSpec>,
    pub notes: Vec<String>,
    pub note_files: Vec<String>,
    pub output_name: Option<String>,
    /// Replaces the configured ignore patterns for this call only.
    pub ignore_override: Option<Vec<String>>,
    pub tree_max_depth: Option<usize>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateReport {
    pub dry_run: bool,
    /// Set when the document was written.
    pub document: Option<PublishedDocument>,
    /// Where the document would go on a dry run.
    pub output_path: PathBuf,
    pub stats: DocumentStats,
    pub files: Vec<String>,
    pub dumps: Vec<String>,
    pub note_files: Vec<String>,
    pub tree_max_depth: usize,
    pub ignore_patterns: String,
    pub errors: Vec<ItemError>,
    pub warnings: Vec<String>,
}

/// Requested dumps first, then configured defaults not already requested.
fn merged_dumps(requested: &[DumpSpec], defaults: &[DumpSpec]) -> Vec<DumpSpec> {
    let mut dumps = requested.to_vec();
    for dump in defaults {
        if !requested.iter().any(|d| d.file == dump.file) {
            dumps.push(dump.clone());
        }
    }
    dumps
}

pub fn generate_document(root: &Path, request: &GenerateRequest, limits: &EngineLimits) -> Result<GenerateReport> {
    let loaded = config::load_checked(root)?;
    let mut warnings = loaded.warnings();
    let config = loaded.config;

    let patterns = match &request.ignore_override {
        Some(raw) => split_all(raw),
        None => config.patterns(),
    };
    let matcher = config.project_matcher(root, &patterns)?;
    let depth = request.tree_max_depth.unwrap_or(config.tree_max_depth);

    let output_dir = output_dir_within(root, &config.output_dir)?;
    let name = request
        .output_name
        .clone()
        .unwrap_or_else(|| assemble::default_document_name(Local::now()));
    let output_path = resolve_within_root(&output_dir, &name)
        .filter(|p| p != &output_dir)
        .ok_or_else(|| AppError::PathEscape {
            path: PathBuf::from(&name),
            root: output_dir.clone(),
        })?;

    log::debug!(
        "Generating document for {} ({} files, depth {})",
        root.display(),
        request.files.len(),
        depth
    );
    let files = collect::collect(root, &request.files, limits);
    let dumps = collect::collect_dumps(root, &merged_dumps(&request.dumps, &config.default_dumps), limits);
    let note_files = collect::collect_note_files(root, &request.note_files, limits);

    let focus: BTreeSet<String> = files.items.iter().map(|f| f.path.clone()).collect();
    let tree_root = tree::build_tree(root, root, &matcher, &TreeOptions::with_depth(depth), &focus)?;

    let mut errors = files.errors;
    errors.extend(dumps.errors);
    errors.extend(note_files.errors);

    let file_paths: Vec<String> = files.items.iter().map(|f| f.path.clone()).collect();
    let dump_paths: Vec<String> = dumps.items.iter().map(|d| d.source.clone()).collect();
    let note_paths: Vec<String> = note_files.items.iter().map(|n| n.source.clone()).collect();

    let mut document = ContextDocument::new(root, tree::render_tree(&tree_root));
    document.add_dumps(dumps.items);
    document.add_files(files.items);
    document.add_notes(request.notes.iter().cloned());
    document.add_notes(note_files.items.iter().map(|n| n.as_note()));
    let text = assemble::assemble(&document, limits.max_context_size)?;

    let (published, stats) = if request.dry_run {
        log::info!("Dry run, not writing {}", output_path.display());
        (None, DocumentStats::of(&text))
    } else {
        let published = assemble::publish(root, &output_path, &text)?;
        for warning in &published.warnings {
            if !warnings.contains(warning) {
                warnings.push(warning.clone());
            }
        }
        let stats = published.stats;
        (Some(published), stats)
    };
    if !errors.is_empty() {
        warnings.push(format!("{} items could not be included", errors.len()));
    }

    Ok(GenerateReport {
        dry_run: request.dry_run,
        document: published,
        output_path,
        stats,
        files: file_paths,
        dumps: dump_paths,
        note_files: note_paths,
        tree_max_depth: depth,
        ignore_patterns: pattern::join_patterns(&patterns),
        errors,
        warnings,
    })
}

// --- ignore patterns ---

#[derive(Debug, Clone, Serialize)]
pub struct IgnoreListing {
    pub project_type: ProjectType,
    pub patterns: String,
    pub rules: Vec<IgnoreRule>,
    /// Critical and recommended suggestions not yet in the active set.
    pub suggested_additions: Vec<String>,
    pub warnings: Vec<String>,
}

pub fn list_ignore_patterns(root: &Path) -> Result<IgnoreListing> {
    let loaded = config::load_checked(root)?;
    let mut warnings = loaded.warnings();
    let config = loaded.config;
    let (analysis, suggestions) = detect::suggest_patterns(root)?;
    let suggested_additions = suggestions
        .auto_patterns()
        .into_iter()
        .filter(|p| !config.ignore_patterns.contains(p))
        .collect();
    // Defaults nobody chose are not worth a source-root warning.
    let defaults = ProjectConfig::default().ignore_patterns;
    let chosen: Vec<&String> = config
        .ignore_patterns
        .iter()
        .filter(|p| !defaults.contains(*p))
        .collect();
    warnings.extend(pattern::validate_patterns(&chosen).warnings);
    warnings.extend(pattern::length_warning(&config.patterns()));
    Ok(IgnoreListing {
        project_type: analysis.project_type,
        patterns: config.joined_patterns(),
        rules: config.rules(),
        suggested_additions,
        warnings,
    })
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IgnoreUpdateRequest {
    pub action: UpdateAction,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub auto_detect: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

/// `auto_detect` forces the `auto` action.
pub fn update_ignore_patterns(root: &Path, request: &IgnoreUpdateRequest) -> Result<UpdateOutcome> {
    let action = if request.auto_detect {
        UpdateAction::Auto
    } else {
        request.action
    };
    config::update(
        root,
        &PatternUpdate {
            action,
            patterns: request.patterns.clone(),
            reason: request.reason.clone(),
        },
    )
}

// --- detection ---

#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    pub analysis: ProjectAnalysis,
    pub suggested_patterns: PatternSuggestions,
}

pub fn detect_project_type(root: &Path) -> Result<DetectionReport> {
    let (analysis, suggested_patterns) = detect::suggest_patterns(root)?;
    Ok(DetectionReport {
        analysis,
        suggested_patterns,
    })
}

// --- tree ---

#[derive(Debug, Clone, Serialize)]
pub struct ProjectTree {
    pub tree: String,
    pub warnings: Vec<String>,
}

/// Renders the project tree with the configured patterns, or `ignore_override`
/// when it is non-empty. Engine files stay hidden either way.
pub fn project_tree(root: &Path, ignore_override: &[String], depth: Option<usize>) -> Result<ProjectTree> {
    let loaded = config::load_checked(root)?;
    let warnings = loaded.warnings();
    let config = loaded.config;
    let patterns = if ignore_override.is_empty() {
        config.patterns()
    } else {
        split_all(ignore_override)
    };
    let matcher = config.project_matcher(root, &patterns)?;
    let options = TreeOptions::with_depth(depth.unwrap_or(config.tree_max_depth));
    let tree_root = tree::build_tree(root, root, &matcher, &options, &BTreeSet::new())?;
    Ok(ProjectTree {
        tree: tree::render_tree(&tree_root),
        warnings,
    })
}

// --- notes ---

#[derive(Debug, Clone, Serialize)]
pub struct CreatedNote {
    pub path: PathBuf,
    pub relative_path: String,
}

fn note_body(content: &str) -> String {
    format!(
        "---\ncreated: {}\ntype: debug_notes\n---\n\n{}\n",
        Local::now().to_rfc3339(),
        content
    )
}

/// Writes a markdown note under `subfolder` (default `.llm_prep_notes`).
pub fn create_note(root: &Path, filename: &str, content: &str, subfolder: Option<&str>) -> Result<CreatedNote> {
    let filename = filename.trim();
    if filename.is_empty() {
        return Err(AppError::InvalidArgument("Note filename is empty".to_string()));
    }
    let subfolder = subfolder.unwrap_or(NOTES_DIR);
    let dir = resolve_within_root(root, subfolder).ok_or_else(|| AppError::PathEscape {
        path: PathBuf::from(subfolder),
        root: root.to_path_buf(),
    })?;
    let filename = if filename.ends_with(".md") {
        filename.to_string()
    } else {
        format!("{}.md", filename)
    };
    let path = resolve_within_root(&dir, &filename)
        .filter(|p| p != &dir)
        .ok_or_else(|| AppError::PathEscape {
            path: PathBuf::from(&filename),
            root: dir.clone(),
        })?;
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    write_atomic(&path, note_body(content).as_bytes())?;
    let relative_path = relative_display(&path, root);
    log::info!("Created note {}", relative_path);
    Ok(CreatedNote { path, relative_path })
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanReport {
    pub deleted: Vec<String>,
    pub kept: usize,
}

/// Deletes `.md` notes in the notes directory last modified before the cutoff.
pub fn clean_notes(root: &Path, older_than: Option<&str>) -> Result<CleanReport> {
    let age = parse_duration::parse(older_than.unwrap_or(DEFAULT_NOTE_MAX_AGE))?;
    let dir = root.join(NOTES_DIR);
    if !dir.is_dir() {
        log::debug!("No notes directory at {}", dir.display());
        return Ok(CleanReport::default());
    }
    let cutoff = SystemTime::now()
        .checked_sub(age)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut report = CleanReport::default();
    let entries = fs::read_dir(&dir).map_err(|e| AppError::FileRead {
        path: dir.clone(),
        source: e,
    })?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == NOTE_EXTENSION))
        .collect();
    paths.sort();
    for path in paths {
        let modified = match path.metadata().and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                log::warn!("Cannot read modification time of {}: {}", path.display(), e);
                continue;
            }
        };
        if modified < cutoff {
            fs::remove_file(&path).map_err(|e| AppError::FileWrite {
                path: path.clone(),
                source: e,
            })?;
            log::trace!("Deleted note {}", path.display());
            report.deleted.push(relative_display(&path, root));
        } else {
            report.kept += 1;
        }
    }
    log::info!("Cleaned {} notes", report.deleted.len());
    Ok(report)
}

// --- recent ---

#[derive(Debug, Clone, Serialize)]
pub struct RecentListing {
    pub documents: Vec<RecentContext>,
    pub warnings: Vec<String>,
}

pub fn list_recent(root: &Path, limit: usize) -> Result<RecentListing> {
    let loaded = config::load_checked(root)?;
    let warnings = loaded.warnings();
    Ok(RecentListing {
        documents: loaded.config.recent_contexts.into_iter().take(limit).collect(),
        warnings,
    })
}

// --- report compaction ---

pub const DEFAULT_REPORT_GLOB: &str = "*.md";

/// Padded line numbers (`   12| `) as written by older report generators.
/// Only blanks are consumed around the number, never a line break.
const PADDED_NUMBER: &str = r"(?m)^[ \t]{0,6}(\d+)\|[ \t]";

fn padded_number_regex() -> Result<Regex> {
    Regex::new(PADDED_NUMBER)
        .map_err(|e| AppError::DataLoading(format!("Invalid line number pattern: {}", e)))
}

/// Rewrites padded `N| ` line numbers to the compact `N|` form.
pub fn compact_line_numbers(text: &str) -> Result<String> {
    Ok(compact_with(&padded_number_regex()?, text))
}

fn compact_with(re: &Regex, text: &str) -> String {
    re.replace_all(text, "${1}|").into_owned()
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SaveTokensReport {
    pub dry_run: bool,
    pub reports_dir: String,
    /// Files matching the glob, whatever their age.
    pub scanned: usize,
    /// Files rewritten, or that would be on a dry run.
    pub changed: Vec<String>,
    pub bytes_saved: u64,
    pub errors: Vec<ItemError>,
    pub warnings: Vec<String>,
}

/// `YYYY-MM-DD` is local midnight of that day; anything else is read as a
/// duration before now, such as `30d`.
fn parse_cutoff(before: &str) -> Result<SystemTime> {
    let before = before.trim();
    if let Ok(date) = NaiveDate::parse_from_str(before, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(|| {
            AppError::InvalidArgument(format!("Invalid cutoff date '{}'", before))
        })?;
        let local = Local
            .from_local_datetime(&midnight)
            .earliest()
            .ok_or_else(|| AppError::InvalidArgument(format!("Cutoff '{}' does not exist locally", before)))?;
        return Ok(SystemTime::from(local));
    }
    let age = parse_duration::parse(before)?;
    Ok(SystemTime::now().checked_sub(age).unwrap_or(SystemTime::UNIX_EPOCH))
}

/// Compacts line numbering in reports under the output directory that match
/// `glob` (relative to that directory) and were last modified before `before`.
pub fn save_tokens(root: &Path, before: &str, glob: Option<&str>, dry_run: bool) -> Result<SaveTokensReport> {
    let cutoff = parse_cutoff(before)?;
    let padded = padded_number_regex()?;
    let glob_text = glob.unwrap_or(DEFAULT_REPORT_GLOB);
    let glob = GlobBuilder::new(glob_text)
        .literal_separator(true)
        .build()
        .map_err(|e| AppError::MalformedPattern {
            pattern: glob_text.to_string(),
            message: e.kind().to_string(),
        })?
        .compile_matcher();

    let loaded = config::load_checked(root)?;
    let mut report = SaveTokensReport {
        dry_run,
        warnings: loaded.warnings(),
        ..SaveTokensReport::default()
    };
    let reports_dir = output_dir_within(root, &loaded.config.output_dir)?;
    report.reports_dir = relative_display(&reports_dir, root);
    if !reports_dir.is_dir() {
        report
            .warnings
            .push(format!("No reports directory at {}", report.reports_dir));
        return Ok(report);
    }

    let mut paths: Vec<PathBuf> = WalkDir::new(&reports_dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("Error walking reports: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| glob.is_match(relative_display(path, &reports_dir)))
        .collect();
    paths.sort();

    for path in paths {
        report.scanned += 1;
        let rel = relative_display(&path, root);
        let modified = match path.metadata().and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                report.errors.push(ItemError::UnreadableFile {
                    path: rel,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        if modified >= cutoff {
            log::trace!("Keeping recent report {}", rel);
            continue;
        }
        let original = match collect::read_text(&path) {
            Ok(text) => text,
            Err(reason) => {
                report.errors.push(ItemError::UnreadableFile { path: rel, reason });
                continue;
            }
        };
        let compacted = compact_with(&padded, &original);
        if compacted == original {
            continue;
        }
        report.bytes_saved += (original.len() - compacted.len()) as u64;
        if !dry_run {
            write_atomic(&path, compacted.as_bytes())?;
        }
        log::debug!("Compacted {}", rel);
        report.changed.push(rel);
    }
    log::info!(
        "Compacted {} of {} reports, {} bytes saved{}",
        report.changed.len(),
        report.scanned,
        report.bytes_saved,
        if dry_run { " (dry run)" } else { "" }
    );
    Ok(report)
}

// --- chunking ---

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ChunkRequest {
    pub path: String,
    pub line_limit: Option<usize>,
    pub output_dir: Option<PathBuf>,
    pub output_base: Option<String>,
    /// Merged with the configured patterns.
    pub ignore: Vec<String>,
    pub tree_max_depth: Option<usize>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkReport {
    pub dry_run: bool,
    pub target: String,
    pub line_limit: usize,
    pub output_dir: String,
    pub chunks: Vec<ChunkManifest>,
    /// Written manifest, absent on a dry run.
    pub manifest_path: Option<String>,
    pub errors: Vec<ItemError>,
    pub warnings: Vec<String>,
}

pub fn chunk_directory(root: &Path, request: &ChunkRequest, limits: &EngineLimits) -> Result<ChunkReport> {
    let line_limit = request.line_limit.unwrap_or(chunking::DEFAULT_LINE_LIMIT);
    if line_limit == 0 {
        return Err(AppError::InvalidArgument(
            "Line limit must be greater than 0".to_string(),
        ));
    }
    if request.path.trim().is_empty() {
        return Err(AppError::InvalidArgument("Chunk path is empty".to_string()));
    }
    let loaded = config::load_checked(root)?;
    let warnings = loaded.warnings();
    let config = loaded.config;

    let mut patterns = config.patterns();
    for p in split_all(&request.ignore) {
        if !patterns.contains(&p) {
            patterns.push(p);
        }
    }
    let out_dir = output_dir_within(root, request.output_dir.as_deref().unwrap_or(&config.output_dir))?;
    let out_rel = relative_display(&out_dir, root);
    let matcher = config
        .project_matcher(root, &patterns)?
        .with_exclusions([out_rel.clone()]);
    let depth = request.tree_max_depth.unwrap_or(config.tree_max_depth);

    let ChunkTarget {
        tree_base,
        label,
        candidates,
        errors,
    } = chunking::expand_target(root, &request.path, &matcher, limits, config.respect_gitignore)?;
    let base = match &request.output_base {
        Some(base) => base.clone(),
        None => chunking::default_output_base(&label),
    };
    chunking::validate_output_base(&base)?;

    let planned = chunking::pack_chunks(candidates, line_limit)?;
    let manifest = chunking::build_manifest(&planned, &out_rel, &base);

    let mut report = ChunkReport {
        dry_run: request.dry_run,
        target: request.path.clone(),
        line_limit,
        output_dir: out_rel,
        chunks: manifest,
        manifest_path: None,
        errors,
        warnings,
    };
    if request.dry_run {
        log::info!("Dry run, planned {} chunks", report.chunks.len());
        return Ok(report);
    }

    // Every chunk must fit the ceiling before anything is written.
    let options = TreeOptions::with_depth(depth);
    let mut rendered: Vec<(PathBuf, String)> = Vec::with_capacity(report.chunks.len());
    for entry in &report.chunks {
        let selections: Vec<FileSelection> = entry.files.iter().map(FileSelection::new).collect();
        let collected = collect::collect(root, &selections, limits);
        let focus: BTreeSet<String> = collected.items.iter().map(|f| f.path.clone()).collect();
        let tree_root = tree::build_tree(root, &tree_base, &matcher, &options, &focus)?;

        let mut document = ContextDocument::new(&tree_base, tree::render_tree(&tree_root));
        document.add_files(collected.items);
        let text = assemble::assemble(&document, limits.max_context_size)?;
        rendered.push((out_dir.join(chunking::chunk_file_name(&base, entry.chunk_index)), text));
        report.errors.extend(collected.errors);
    }
    for (path, text) in &rendered {
        assemble::write_document(path, text)?;
    }

    let manifest_path = out_dir.join(chunking::manifest_file_name(&base));
    let json = serde_json::to_string_pretty(&report.chunks)?;
    write_atomic(&manifest_path, json.as_bytes())?;
    report.manifest_path = Some(relative_display(&manifest_path, root));
    log::info!(
        "Wrote {} chunks to {}",
        report.chunks.len(),
        report.output_dir
    );
    Ok(report)
}

// --- configuration ---

pub fn set_project_config(root: &Path, settings: &ProjectSettings) -> Result<ProjectConfig> {
    config::set_project_settings(root, settings)
}

pub fn apply_template(root: &Path, name: &str) -> Result<ProjectConfig> {
    config::apply_template(root, name)
}

pub fn list_templates() -> Vec<(String, ConfigTemplate)> {
    config::get_config_templates()
        .iter()
        .map(|(name, template)| (name.clone(), template.clone()))
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct LimitsReport {
    pub limits: EngineLimits,
    pub max_file_size_display: String,
    pub max_context_size_display: String,
}

pub fn show_limits(limits: &EngineLimits) -> LimitsReport {
    LimitsReport {
        limits: limits.clone(),
        max_file_size_display: format_size(limits.max_file_size),
        max_context_size_display: format_size(limits.max_context_size),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::strip_line_numbers;
    use std::time::Duration;
    use tempfile::TempDir;

    fn lines(n: usize) -> String {
        (1..=n).map(|i| format!("value_{} = {}\n", i, i)).collect()
    }

    fn project() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        for (rel, content) in [
            ("requirements.txt", "requests\n".to_string()),
            ("app/main.py", lines(3)),
            ("app/util.py", lines(2)),
            ("docs/notes.md", "design notes\n".to_string()),
            ("app/__pycache__/main.pyc", "x".to_string()),
        ] {
            let path = root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        (dir, root)
    }

    #[test]
    fn generate_writes_document_and_records_it() {
        let (_dir, root) = project();
        let request = GenerateRequest {
            files: vec![
                FileSelection::with_note("app/main.py", "entry"),
                FileSelection::new("../outside.txt"),
            ],
            dumps: vec![DumpSpec {
                file: "docs/notes.md".to_string(),
                title: Some("Design".to_string()),
            }],
            notes: vec!["look at the loop".to_string()],
            output_name: Some("ctx.md".to_string()),
            ..GenerateRequest::default()
        };
        let report = generate_document(&root, &request, &EngineLimits::default()).unwrap();
        let written = report.document.as_ref().unwrap();
        assert_eq!(written.relative_path, "context_reports/ctx.md");
        assert_eq!(report.files, vec!["app/main.py"]);
        assert_eq!(report.dumps, vec!["docs/notes.md"]);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind(), "path_escape");

        let text = fs::read_to_string(&written.path).unwrap();
        assert!(text.contains("### 📄 Design"));
        assert!(text.contains("├── main.py [IN FOCUS]"));
        assert!(!text.contains("__pycache__"));
        assert!(text.contains("**Note:** entry"));
        assert_eq!(list_recent(&root, 5).unwrap().documents[0].path, "context_reports/ctx.md");
    }

    #[test]
    fn dry_run_writes_nothing() {
        let (_dir, root) = project();
        let request = GenerateRequest {
            files: vec![FileSelection::new("app/util.py")],
            dry_run: true,
            ..GenerateRequest::default()
        };
        let report = generate_document(&root, &request, &EngineLimits::default()).unwrap();
        assert!(report.document.is_none());
        assert!(report.stats.bytes > 0);
        assert!(!root.join("context_reports").exists());
        assert!(list_recent(&root, 5).unwrap().documents.is_empty());
    }

    #[test]
    fn output_name_cannot_escape() {
        let (_dir, root) = project();
        let request = GenerateRequest {
            output_name: Some("../../evil.md".to_string()),
            ..GenerateRequest::default()
        };
        assert!(matches!(
            generate_document(&root, &request, &EngineLimits::default()),
            Err(AppError::PathEscape { .. })
        ));
    }

    #[test]
    fn oversize_document_is_rejected() {
        let (_dir, root) = project();
        let limits = EngineLimits {
            max_context_size: 64,
            ..EngineLimits::default()
        };
        let request = GenerateRequest {
            files: vec![FileSelection::new("app/main.py")],
            ..GenerateRequest::default()
        };
        assert!(matches!(
            generate_document(&root, &request, &limits),
            Err(AppError::DocumentTooLarge { limit: 64, .. })
        ));
        assert!(!root.join("context_reports").exists());
    }

    #[test]
    fn default_dumps_are_added_once() {
        let defaults = vec![
            DumpSpec {
                file: "a.md".to_string(),
                title: None,
            },
            DumpSpec {
                file: "b.md".to_string(),
                title: None,
            },
        ];
        let requested = vec![DumpSpec {
            file: "b.md".to_string(),
            title: Some("B".to_string()),
        }];
        let merged = merged_dumps(&requested, &defaults);
        let files: Vec<_> = merged.iter().map(|d| d.file.as_str()).collect();
        assert_eq!(files, vec!["b.md", "a.md"]);
        assert_eq!(merged[0].title.as_deref(), Some("B"));
    }

    #[test]
    fn listing_reports_suggestions_not_yet_active() {
        let (_dir, root) = project();
        let listing = list_ignore_patterns(&root).unwrap();
        assert_eq!(listing.project_type, ProjectType::Python);
        assert!(listing.rules.iter().any(|r| r.pattern == "__pycache__"));
        assert!(!listing.suggested_additions.contains(&"__pycache__".to_string()));
    }

    #[test]
    fn auto_detect_flag_forces_auto() {
        let (_dir, root) = project();
        let outcome = update_ignore_patterns(
            &root,
            &IgnoreUpdateRequest {
                action: UpdateAction::Set,
                patterns: vec![],
                auto_detect: true,
                reason: None,
            },
        )
        .unwrap();
        assert_eq!(outcome.config.history.last().unwrap().action, UpdateAction::Auto);
        assert_eq!(outcome.config.project_type, Some(ProjectType::Python));
    }

    #[test]
    fn notes_get_front_matter_and_stay_inside() {
        let (_dir, root) = project();
        let note = create_note(&root, "crash", "stack trace here", None).unwrap();
        assert_eq!(note.relative_path, ".llm_prep_notes/crash.md");
        let text = fs::read_to_string(&note.path).unwrap();
        assert!(text.starts_with("---\ncreated: "));
        assert!(text.contains("type: debug_notes\n---\n\nstack trace here\n"));

        assert!(matches!(
            create_note(&root, "../../escape", "x", None),
            Err(AppError::PathEscape { .. })
        ));
        assert!(matches!(
            create_note(&root, "n", "x", Some("../elsewhere")),
            Err(AppError::PathEscape { .. })
        ));
    }

    #[test]
    fn clean_notes_respects_age() {
        let (_dir, root) = project();
        create_note(&root, "fresh", "x", None).unwrap();
        let kept = clean_notes(&root, None).unwrap();
        assert!(kept.deleted.is_empty());
        assert_eq!(kept.kept, 1);

        std::thread::sleep(Duration::from_millis(20));
        let report = clean_notes(&root, Some("1ms")).unwrap();
        assert_eq!(report.deleted, vec![".llm_prep_notes/fresh.md"]);
        assert!(matches!(
            clean_notes(&root, Some("soon")),
            Err(AppError::DurationParse(_))
        ));
    }

    #[test]
    fn chunking_writes_documents_and_manifest() {
        let (_dir, root) = project();
        let request = ChunkRequest {
            path: "app".to_string(),
            line_limit: Some(3),
            ..ChunkRequest::default()
        };
        let report = chunk_directory(&root, &request, &EngineLimits::default()).unwrap();
        assert_eq!(report.chunks.len(), 2);
        assert_eq!(report.chunks[0].files, vec!["app/main.py"]);
        assert_eq!(report.chunks[1].files, vec!["app/util.py"]);
        assert_eq!(report.manifest_path.as_deref(), Some("context_reports/app_summary_manifest.json"));

        let first = fs::read_to_string(root.join("context_reports/app_summary_1.md")).unwrap();
        assert!(first.contains("### File: app/main.py [IN FOCUS]"));
        assert!(first.contains("app/\n"));
        let body = first.split("=".repeat(60).as_str()).nth(1).unwrap();
        assert!(strip_line_numbers(body).contains(&lines(3)));
    }

    #[test]
    fn chunk_dry_run_and_bad_limits() {
        let (_dir, root) = project();
        let request = ChunkRequest {
            path: "app".to_string(),
            dry_run: true,
            ..ChunkRequest::default()
        };
        let report = chunk_directory(&root, &request, &EngineLimits::default()).unwrap();
        assert_eq!(report.chunks.len(), 1);
        assert!(report.manifest_path.is_none());
        assert!(!root.join("context_reports").exists());

        let zero = ChunkRequest {
            line_limit: Some(0),
            ..request
        };
        assert!(matches!(
            chunk_directory(&root, &zero, &EngineLimits::default()),
            Err(AppError::InvalidArgument(_))
        ));
    }

    fn structure_section(text: &str) -> &str {
        let after = text.split("## Project Structure").nth(1).unwrap();
        after.split("\n## ").next().unwrap()
    }

    #[test]
    fn repeated_generation_renders_the_same_tree() {
        let (_dir, root) = project();
        create_note(&root, "scratch", "x", None).unwrap();
        let named = |name: &str| GenerateRequest {
            output_name: Some(name.to_string()),
            ..GenerateRequest::default()
        };
        let first = generate_document(&root, &named("one.md"), &EngineLimits::default()).unwrap();
        let second = generate_document(&root, &named("two.md"), &EngineLimits::default()).unwrap();
        let first = fs::read_to_string(&first.document.unwrap().path).unwrap();
        let second = fs::read_to_string(&second.document.unwrap().path).unwrap();

        assert_eq!(structure_section(&first), structure_section(&second));
        let tree = structure_section(&second);
        assert!(!tree.contains("context_reports"));
        assert!(!tree.contains(".llm_prep"));
        assert!(tree.contains("requirements.txt"));

        let shown = project_tree(&root, &[], None).unwrap();
        assert!(!shown.tree.contains("context_reports"));
        assert!(!shown.tree.contains(".llm_prep_config.json"));
    }

    #[test]
    fn chunking_the_root_skips_engine_files() {
        let (_dir, root) = project();
        let request = GenerateRequest {
            output_name: Some("ctx.md".to_string()),
            ..GenerateRequest::default()
        };
        generate_document(&root, &request, &EngineLimits::default()).unwrap();
        assert!(root.join(crate::config::CONFIG_FILENAME).is_file());

        let plan = ChunkRequest {
            path: ".".to_string(),
            dry_run: true,
            ..ChunkRequest::default()
        };
        let report = chunk_directory(&root, &plan, &EngineLimits::default()).unwrap();
        let files: Vec<&str> = report
            .chunks
            .iter()
            .flat_map(|c| c.files.iter().map(String::as_str))
            .collect();
        assert_eq!(files, vec!["app/main.py", "app/util.py", "docs/notes.md", "requirements.txt"]);
    }

    #[test]
    fn chunk_reports_rejected_files_and_config_warnings() {
        let (_dir, root) = project();
        fs::write(root.join("app/broken.py"), [0xff, 0xfe, b'x', b'\n']).unwrap();
        fs::write(root.join(crate::config::CONFIG_FILENAME), "{ not json").unwrap();
        let request = ChunkRequest {
            path: "app".to_string(),
            dry_run: true,
            ..ChunkRequest::default()
        };
        let report = chunk_directory(&root, &request, &EngineLimits::default()).unwrap();
        assert_eq!(report.chunks[0].files, vec!["app/main.py", "app/util.py"]);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind(), "unreadable_file");
        assert!(report.errors[0].to_string().contains("app/broken.py"));
        assert!(report.warnings[0].starts_with("Corrupt configuration at"));

        let listing = list_recent(&root, 5).unwrap();
        assert!(listing.warnings[0].starts_with("Corrupt configuration at"));
    }

    #[test]
    fn oversize_chunk_aborts_before_any_chunk_is_written() {
        let (_dir, root) = project();
        fs::create_dir_all(root.join("big")).unwrap();
        fs::write(root.join("big/a.py"), lines(1)).unwrap();
        fs::write(root.join("big/b.py"), lines(2000)).unwrap();
        let limits = EngineLimits {
            max_context_size: 10_000,
            ..EngineLimits::default()
        };
        let request = ChunkRequest {
            path: "big".to_string(),
            line_limit: Some(100),
            ..ChunkRequest::default()
        };
        assert!(matches!(
            chunk_directory(&root, &request, &limits),
            Err(AppError::DocumentTooLarge { .. })
        ));
        assert!(!root.join("context_reports/big_summary_1.md").exists());
        assert!(!root.join("context_reports/big_summary_manifest.json").exists());
    }

    #[test]
    fn padded_line_numbers_are_compacted() {
        assert_eq!(compact_line_numbers("   1| a\n  2| b\n").unwrap(), "1|a\n2|b\n");
        assert_eq!(compact_line_numbers("12|  keep indent\n").unwrap(), "12| keep indent\n");
        assert_eq!(compact_line_numbers("1|a\nplain | text\n").unwrap(), "1|a\nplain | text\n");
        assert_eq!(compact_line_numbers("1|\n2| b\n").unwrap(), "1|\n2|b\n");
    }

    #[test]
    fn save_tokens_rewrites_only_reports_older_than_the_cutoff() {
        let (_dir, root) = project();
        let reports = root.join("context_reports");
        fs::create_dir_all(reports.join("nested")).unwrap();
        fs::write(reports.join("old.md"), "   1| a\n  2| b\n").unwrap();
        fs::write(reports.join("clean.md"), "1|a\n").unwrap();
        fs::write(reports.join("data.json"), "   1| a\n").unwrap();
        fs::write(reports.join("nested/deep.md"), "   1| a\n").unwrap();

        let fresh = save_tokens(&root, "1d", None, false).unwrap();
        assert_eq!(fresh.scanned, 2);
        assert!(fresh.changed.is_empty());

        let preview = save_tokens(&root, "2999-01-01", None, true).unwrap();
        assert_eq!(preview.changed, vec!["context_reports/old.md"]);
        assert_eq!(preview.bytes_saved, 7);
        assert_eq!(fs::read_to_string(reports.join("old.md")).unwrap(), "   1| a\n  2| b\n");

        let report = save_tokens(&root, "2999-01-01", None, false).unwrap();
        assert_eq!(report.changed, vec!["context_reports/old.md"]);
        assert_eq!(fs::read_to_string(reports.join("old.md")).unwrap(), "1|a\n2|b\n");
        assert_eq!(fs::read_to_string(reports.join("data.json")).unwrap(), "   1| a\n");

        let nested = save_tokens(&root, "2999-01-01", Some("**/*.md"), false).unwrap();
        assert_eq!(nested.changed, vec!["context_reports/nested/deep.md"]);
    }

    #[test]
    fn save_tokens_handles_missing_reports_and_bad_cutoffs() {
        let (_dir, root) = project();
        let report = save_tokens(&root, "30d", None, false).unwrap();
        assert_eq!(report.scanned, 0);
        assert!(report.warnings[0].starts_with("No reports directory at"));

        assert!(matches!(
            save_tokens(&root, "yesterday-ish", None, false),
            Err(AppError::DurationParse(_))
        ));
        assert!(matches!(
            save_tokens(&root, "1d", Some("[oops"), false),
            Err(AppError::MalformedPattern { .. })
        ));
    }

    #[test]
    fn limits_report_is_human_readable() {
        let report = show_limits(&EngineLimits::default());
        assert!(report.max_file_size_display.ends_with("MiB"));
        assert_eq!(report.limits.max_file_size, 10 * 1024 * 1024);
    }
}
