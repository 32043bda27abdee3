use crate::collect::{count_lines, read_text};
use crate::error::{AppError, ItemError, Result};
use crate::fsio::{relative_display, resolve_within_root};
use crate::limits::EngineLimits;
use crate::pattern::PatternMatcher;
use crate::tree::tree_order;
use globset::GlobBuilder;
use ignore::{WalkBuilder, WalkState};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc;

pub const DEFAULT_LINE_LIMIT: usize = 3300;
const GLOB_META: [char; 3] = ['*', '?', '['];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkCandidate {
    /// Root-relative, `/`-separated.
    pub path: String,
    pub line_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedChunk {
    pub files: Vec<String>,
    pub line_count: usize,
    pub oversized: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkManifest {
    pub chunk_index: usize,
    pub files: Vec<String>,
    pub line_count: usize,
    pub output_path: String,
    pub oversized: bool,
}

/// Expanded chunk input: the directory the trees are rendered from, the
/// label used for default output names, the ordered candidate files and the
/// matched files that could not become candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkTarget {
    pub tree_base: PathBuf,
    pub label: String,
    pub candidates: Vec<ChunkCandidate>,
    pub errors: Vec<ItemError>,
}

pub fn is_glob(path: &str) -> bool {
    path.contains(GLOB_META)
}

/// Greedily packs whole files in order. A file over the limit gets a chunk
/// of its own, flagged oversized.
pub fn pack_chunks(candidates: Vec<ChunkCandidate>, line_limit: usize) -> Result<Vec<PlannedChunk>> {
    if line_limit == 0 {
        return Err(AppError::InvalidArgument(
            "Line limit must be greater than 0".to_string(),
        ));
    }

    let mut chunks: Vec<PlannedChunk> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_lines: usize = 0;

    for candidate in candidates {
        if candidate.line_count > line_limit {
            log::trace!(
                "File {} ({} lines) exceeds the line limit ({}), putting it in its own chunk.",
                candidate.path,
                candidate.line_count,
                line_limit
            );
            if !current.is_empty() {
                chunks.push(PlannedChunk {
                    files: std::mem::take(&mut current),
                    line_count: current_lines,
                    oversized: false,
                });
                current_lines = 0;
            }
            chunks.push(PlannedChunk {
                files: vec![candidate.path],
                line_count: candidate.line_count,
                oversized: true,
            });
            continue;
        }

        if !current.is_empty() && current_lines.saturating_add(candidate.line_count) > line_limit {
            chunks.push(PlannedChunk {
                files: std::mem::take(&mut current),
                line_count: current_lines,
                oversized: false,
            });
            current_lines = 0;
        }
        current_lines += candidate.line_count;
        current.push(candidate.path);
    }

    if !current.is_empty() {
        chunks.push(PlannedChunk {
            files: current,
            line_count: current_lines,
            oversized: false,
        });
    }
    log::info!("Planned {} chunks at {} lines each", chunks.len(), line_limit);
    Ok(chunks)
}

/// Output base name without directories.
pub fn validate_output_base(base: &str) -> Result<()> {
    let valid = !base.is_empty()
        && Path::new(base)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        && !base.contains(['/', '\\']);
    if valid {
        Ok(())
    } else {
        Err(AppError::InvalidArgument(format!(
            "Output base name must be a plain file name: '{}'",
            base
        )))
    }
}

pub fn default_output_base(label: &str) -> String {
    let trimmed = label.trim_end_matches(['/', '\\']);
    if trimmed.is_empty() || trimmed == "." {
        "chunk_summary".to_string()
    } else {
        format!("{}_summary", trimmed)
    }
}

pub fn chunk_file_name(base: &str, index: usize) -> String {
    format!("{}_{}.md", base, index)
}

pub fn manifest_file_name(base: &str) -> String {
    format!("{}_manifest.json", base)
}

/// `output_dir` is root-relative; output paths in the manifest are too.
pub fn build_manifest(chunks: &[PlannedChunk], output_dir: &str, base: &str) -> Vec<ChunkManifest> {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let name = chunk_file_name(base, i + 1);
            let output_path = if output_dir.is_empty() || output_dir == "." {
                name
            } else {
                format!("{}/{}", output_dir.trim_end_matches('/'), name)
            };
            ChunkManifest {
                chunk_index: i + 1,
                files: chunk.files.clone(),
                line_count: chunk.line_count,
                output_path,
                oversized: chunk.oversized,
            }
        })
        .collect()
}

/// Parallel walk of `start`, pruning ignored entries. Symlinks are followed
/// like the tree renderer does. Paths are absolute.
fn walk_files(root: &Path, start: &Path, matcher: &PatternMatcher, respect_gitignore: bool) -> Vec<PathBuf> {
    let mut builder = WalkBuilder::new(start);
    builder.threads(rayon::current_num_threads().min(12));
    builder.hidden(false);
    builder.ignore(false);
    builder.parents(respect_gitignore);
    builder.git_ignore(respect_gitignore);
    builder.git_exclude(respect_gitignore);
    builder.git_global(false);
    builder.require_git(false);
    builder.follow_links(true);

    let filter_root = root.to_path_buf();
    let filter_matcher = matcher.clone();
    builder.filter_entry(move |entry| {
        if entry.depth() == 0 {
            return true;
        }
        let rel = entry.path().strip_prefix(&filter_root).unwrap_or(entry.path());
        !filter_matcher.matches(rel)
    });
    log::debug!(
        "Walking {} (gitignore: {})",
        start.display(),
        respect_gitignore
    );

    let (tx, rx) = mpsc::channel::<PathBuf>();
    builder.build_parallel().run(|| {
        let tx_thread = tx.clone();
        Box::new(move |entry_result| {
            match entry_result {
                Ok(entry) => {
                    if entry.file_type().is_some_and(|ft| ft.is_file())
                        && tx_thread.send(entry.into_path()).is_err()
                    {
                        log::error!("Receiver dropped for walked paths, stopping walk early.");
                        return WalkState::Quit;
                    }
                }
                Err(e) => log::warn!("Error walking directory: {}", e),
            }
            WalkState::Continue
        })
    });
    drop(tx);
    rx.into_iter().collect()
}

/// Leading components free of glob metacharacters.
fn literal_prefix(glob: &str) -> String {
    glob.split('/')
        .take_while(|segment| !segment.contains(GLOB_META) && !segment.contains('{'))
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Expands a path or glob into ordered chunk candidates.
///
/// A file reached twice through symlinks is kept at its first path in tree
/// order. Matched files that cannot be chunked are returned as item errors.
pub fn expand_target(
    root: &Path,
    path_or_glob: &str,
    matcher: &PatternMatcher,
    limits: &EngineLimits,
    respect_gitignore: bool,
) -> Result<ChunkTarget> {
    let (tree_base, label, files) = if is_glob(path_or_glob) {
        let pattern = path_or_glob.trim_start_matches("./").trim_start_matches('/');
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .backslash_escape(true)
            .build()
            .map_err(|e| AppError::MalformedPattern {
                pattern: path_or_glob.to_string(),
                message: e.kind().to_string(),
            })?
            .compile_matcher();
        let prefix = literal_prefix(pattern);
        let tree_base = resolve_within_root(root, &prefix)
            .filter(|p| p.is_dir())
            .unwrap_or_else(|| root.to_path_buf());
        let label = Path::new(&prefix)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let files: Vec<PathBuf> = walk_files(root, &tree_base, matcher, respect_gitignore)
            .into_iter()
            .filter(|path| {
                let rel = relative_display(path, root);
                let mut prefix = String::new();
                rel.split('/').any(|segment| {
                    if !prefix.is_empty() {
                        prefix.push('/');
                    }
                    prefix.push_str(segment);
                    glob.is_match(prefix.as_str())
                })
            })
            .collect();
        (tree_base, label, files)
    } else {
        let resolved = resolve_within_root(root, path_or_glob).ok_or_else(|| AppError::PathEscape {
            path: PathBuf::from(path_or_glob),
            root: root.to_path_buf(),
        })?;
        let label = Path::new(path_or_glob)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if resolved.is_dir() {
            let files = walk_files(root, &resolved, matcher, respect_gitignore);
            (resolved, label, files)
        } else if resolved.is_file() {
            let rel = resolved.strip_prefix(root).unwrap_or(&resolved).to_path_buf();
            let files = if matcher.matches(&rel) {
                log::debug!("Target file {} is ignored", rel.display());
                Vec::new()
            } else {
                vec![resolved.clone()]
            };
            let base = resolved
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| root.to_path_buf());
            (base, label, files)
        } else {
            return Err(AppError::InvalidArgument(format!(
                "Path not found: {}",
                path_or_glob
            )));
        }
    };

    let mut relative: Vec<(String, PathBuf)> = files
        .into_iter()
        .map(|path| (relative_display(&path, root), path))
        .collect();
    relative.par_sort_unstable_by(|a, b| tree_order(&a.0, &b.0));
    relative.dedup_by(|a, b| a.0 == b.0);

    let mut seen: HashSet<PathBuf> = HashSet::new();
    relative.retain(|(rel, path)| {
        let real = path.canonicalize().unwrap_or_else(|_| path.clone());
        let first = seen.insert(real);
        if !first {
            log::trace!("Skipping {} reached again through a symlink", rel);
        }
        first
    });

    let checked: Vec<std::result::Result<ChunkCandidate, ItemError>> = relative
        .into_par_iter()
        .map(|(rel, path)| check_candidate(root, rel, &path, limits))
        .collect();
    let mut candidates = Vec::with_capacity(checked.len());
    let mut errors = Vec::new();
    for result in checked {
        match result {
            Ok(candidate) => candidates.push(candidate),
            Err(e) => {
                log::debug!("Not chunking: {}", e);
                errors.push(e);
            }
        }
    }

    log::info!(
        "Expanded '{}' to {} candidate files ({} rejected)",
        path_or_glob,
        candidates.len(),
        errors.len()
    );
    Ok(ChunkTarget {
        tree_base,
        label,
        candidates,
        errors,
    })
}

fn check_candidate(
    root: &Path,
    rel: String,
    path: &Path,
    limits: &EngineLimits,
) -> std::result::Result<ChunkCandidate, ItemError> {
    if resolve_within_root(root, &rel).is_none() {
        return Err(ItemError::PathEscape { path: rel });
    }
    if !limits.is_file_allowed(path) {
        return Err(ItemError::DisallowedType { path: rel });
    }
    let size = path
        .metadata()
        .map_err(|e| ItemError::UnreadableFile {
            path: rel.clone(),
            reason: e.to_string(),
        })?
        .len();
    if size > limits.max_file_size {
        return Err(ItemError::OversizeFile {
            path: rel,
            size,
            limit: limits.max_file_size,
        });
    }
    let content = read_text(path).map_err(|reason| ItemError::UnreadableFile {
        path: rel.clone(),
        reason,
    })?;
    Ok(ChunkCandidate {
        line_count: count_lines(&content),
        path: rel,
    })
}
