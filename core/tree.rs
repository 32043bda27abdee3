use crate::error::{AppError, Result};
use crate::fsio::relative_display;
use crate::limits::format_size;
use crate::pattern::PatternMatcher;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

pub const DEFAULT_MAX_ENTRIES_PER_DIR: usize = 200;
pub const DEFAULT_MAX_DIR_BYTES: u64 = 64 * 1024 * 1024;
pub const ELIDED_MARKER: &str = "...";
pub const FOCUS_MARKER: &str = "[IN FOCUS]";

const BRANCH: &str = "├── ";
const LAST_BRANCH: &str = "└── ";
const PIPE: &str = "│   ";
const SPACE: &str = "    ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeOptions {
    pub max_depth: usize,
    pub max_entries_per_dir: usize,
    pub max_dir_bytes: u64,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            max_depth: crate::config::DEFAULT_TREE_MAX_DEPTH,
            max_entries_per_dir: DEFAULT_MAX_ENTRIES_PER_DIR,
            max_dir_bytes: DEFAULT_MAX_DIR_BYTES,
        }
    }
}

impl TreeOptions {
    pub fn with_depth(max_depth: usize) -> Self {
        Self {
            max_depth,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Directory,
    File,
    Elided,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    fn new(name: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            name: name.into(),
            node_type,
            annotation: None,
            children: Vec::new(),
        }
    }

    fn annotated(mut self, annotation: impl Into<String>) -> Self {
        self.annotation = Some(annotation.into());
        self
    }

    fn label(&self) -> String {
        let base = match self.node_type {
            NodeType::Directory => format!("{}/", self.name),
            NodeType::File => self.name.clone(),
            NodeType::Elided => ELIDED_MARKER.to_string(),
        };
        match &self.annotation {
            Some(note) => format!("{} {}", base, note),
            None => base,
        }
    }
}

/// Orders root-relative file paths the way the tree lists them: at each
/// level directories come before files, then names compare bytewise.
pub fn tree_order(a: &str, b: &str) -> Ordering {
    let a_parts: Vec<&str> = a.split('/').collect();
    let b_parts: Vec<&str> = b.split('/').collect();
    for (i, (x, y)) in a_parts.iter().zip(b_parts.iter()).enumerate() {
        if x == y {
            continue;
        }
        let x_is_dir = i + 1 < a_parts.len();
        let y_is_dir = i + 1 < b_parts.len();
        return y_is_dir.cmp(&x_is_dir).then_with(|| x.cmp(y));
    }
    a_parts.len().cmp(&b_parts.len())
}

fn is_dir_like(entry: &DirEntry) -> bool {
    entry.file_type().is_dir() || (entry.path_is_symlink() && entry.path().is_dir())
}

fn entry_order(a: &DirEntry, b: &DirEntry) -> Ordering {
    is_dir_like(b)
        .cmp(&is_dir_like(a))
        .then_with(|| a.file_name().cmp(b.file_name()))
}

fn components_of(rel: &Path) -> Vec<String> {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

/// Walkdir yields parents before children and siblings in order, so each
/// node is appended to an already present parent.
fn insert_node(level: &mut Vec<TreeNode>, components: &[String], node: TreeNode) {
    let Some((first, rest)) = components.split_first() else {
        return;
    };
    if rest.is_empty() {
        level.push(node);
        return;
    }
    let idx = match level
        .iter()
        .position(|n| n.name == *first && n.node_type == NodeType::Directory)
    {
        Some(idx) => idx,
        None => {
            level.push(TreeNode::new(first.clone(), NodeType::Directory));
            level.len() - 1
        }
    };
    insert_node(&mut level[idx].children, rest, node);
}

struct DirStats {
    entries: usize,
    file_bytes: u64,
}

fn dir_stats(dir: &Path) -> DirStats {
    let mut stats = DirStats {
        entries: 0,
        file_bytes: 0,
    };
    if let Ok(read) = fs::read_dir(dir) {
        for entry in read.flatten() {
            stats.entries += 1;
            if let Ok(meta) = entry.metadata() {
                if meta.is_file() {
                    stats.file_bytes += meta.len();
                }
            }
        }
    }
    stats
}

fn has_visible_children(dir: &Path, project_root: &Path, matcher: &PatternMatcher) -> bool {
    let Ok(read) = fs::read_dir(dir) else {
        return false;
    };
    read.flatten().any(|child| {
        let path = child.path();
        let rel = path.strip_prefix(project_root).unwrap_or(&path);
        !matcher.matches(rel)
    })
}

/// Builds the tree of `base`, a directory at or below `project_root`.
/// Patterns and focus paths are relative to `project_root`.
///
/// Subdirectories over the entry or byte limits collapse into one annotated
/// node. `base` itself is never collapsed: it lists at most
/// `max_entries_per_dir` visible entries followed by one elided node
/// counting the rest.
pub fn build_tree(
    project_root: &Path,
    base: &Path,
    matcher: &PatternMatcher,
    options: &TreeOptions,
    focus: &BTreeSet<String>,
) -> Result<TreeNode> {
    if options.max_depth == 0 {
        return Err(AppError::InvalidArgument(
            "Tree depth must be at least 1".to_string(),
        ));
    }
    if !base.is_dir() {
        return Err(AppError::InvalidArgument(format!(
            "Tree root is not a directory: {}",
            base.display()
        )));
    }
    log::debug!(
        "Building tree for {} (depth {})",
        base.display(),
        options.max_depth
    );

    let root_name = base
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| ".".to_string());
    let mut root = TreeNode::new(root_name, NodeType::Directory);

    let mut shown_at_base = 0usize;
    let mut omitted = DirStats {
        entries: 0,
        file_bytes: 0,
    };

    let mut visited: HashSet<PathBuf> = HashSet::new();
    if let Ok(canonical) = base.canonicalize() {
        visited.insert(canonical);
    }

    let mut walker = WalkDir::new(base)
        .min_depth(1)
        .max_depth(options.max_depth)
        .follow_links(true)
        .sort_by(entry_order)
        .into_iter();

    while let Some(entry_result) = walker.next() {
        let entry = match entry_result {
            Ok(entry) => entry,
            Err(e) => {
                if let (Some(_), Some(path)) = (e.loop_ancestor(), e.path()) {
                    let rel = path.strip_prefix(base).unwrap_or(path);
                    let components = components_of(rel);
                    if let Some(name) = components.last() {
                        log::debug!("Symlink loop at {}", path.display());
                        insert_node(
                            &mut root.children,
                            &components,
                            TreeNode::new(name.clone(), NodeType::Directory).annotated("[link loop]"),
                        );
                    }
                } else {
                    log::warn!("Error walking tree: {}", e);
                }
                continue;
            }
        };

        let path = entry.path();
        let rel_to_root = path.strip_prefix(project_root).unwrap_or(path);
        if matcher.matches(rel_to_root) {
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            continue;
        }
        if entry.depth() == 1 {
            if shown_at_base >= options.max_entries_per_dir {
                omitted.entries += 1;
                if entry.file_type().is_dir() {
                    walker.skip_current_dir();
                } else if let Ok(meta) = entry.metadata() {
                    omitted.file_bytes += meta.len();
                }
                continue;
            }
            shown_at_base += 1;
        }
        let rel_to_base = path.strip_prefix(base).unwrap_or(path);
        let components = components_of(rel_to_base);
        let name = entry.file_name().to_string_lossy().into_owned();

        if !entry.file_type().is_dir() {
            let mut node = TreeNode::new(name, NodeType::File);
            if focus.contains(&relative_display(path, project_root)) {
                node = node.annotated(FOCUS_MARKER);
            }
            insert_node(&mut root.children, &components, node);
            continue;
        }

        if let Ok(canonical) = path.canonicalize() {
            if !visited.insert(canonical) {
                log::trace!("Directory already shown: {}", path.display());
                insert_node(
                    &mut root.children,
                    &components,
                    TreeNode::new(name, NodeType::Directory).annotated("[already shown]"),
                );
                walker.skip_current_dir();
                continue;
            }
        }

        let stats = dir_stats(path);
        if stats.entries > options.max_entries_per_dir || stats.file_bytes > options.max_dir_bytes {
            log::debug!(
                "Summarizing large directory {} ({} entries, {} bytes)",
                path.display(),
                stats.entries,
                stats.file_bytes
            );
            let summary = format!(
                "[{} entries, {}]",
                stats.entries,
                format_size(stats.file_bytes)
            );
            insert_node(
                &mut root.children,
                &components,
                TreeNode::new(name, NodeType::Directory).annotated(summary),
            );
            walker.skip_current_dir();
            continue;
        }

        let mut node = TreeNode::new(name, NodeType::Directory);
        if entry.depth() >= options.max_depth && has_visible_children(path, project_root, matcher) {
            node.children.push(TreeNode::new(ELIDED_MARKER, NodeType::Elided));
        }
        insert_node(&mut root.children, &components, node);
    }

    if omitted.entries > 0 {
        log::debug!(
            "Summarized {} entries of {} past the first {}",
            omitted.entries,
            base.display(),
            options.max_entries_per_dir
        );
        root.children.push(
            TreeNode::new(ELIDED_MARKER, NodeType::Elided).annotated(format!(
                "[{} more entries, {}]",
                omitted.entries,
                format_size(omitted.file_bytes)
            )),
        );
    }
    Ok(root)
}

pub fn render_tree(root: &TreeNode) -> String {
    let mut out = format!("{}\n", root.label());
    render_children(&root.children, "", &mut out);
    out
}

fn render_children(nodes: &[TreeNode], prefix: &str, out: &mut String) {
    for (i, node) in nodes.iter().enumerate() {
        let last = i + 1 == nodes.len();
        out.push_str(prefix);
        out.push_str(if last { LAST_BRANCH } else { BRANCH });
        out.push_str(&node.label());
        out.push('\n');
        if !node.children.is_empty() {
            let child_prefix = format!("{}{}", prefix, if last { SPACE } else { PIPE });
            render_children(&node.children, &child_prefix, out);
        }
    }
}

/// Renders the whole project tree with the given patterns and no focus marks.
pub fn render<S: AsRef<str>>(root: &Path, max_depth: usize, patterns: &[S]) -> Result<String> {
    let matcher = PatternMatcher::new(patterns)?;
    let tree = build_tree(
        root,
        root,
        &matcher,
        &TreeOptions::with_depth(max_depth),
        &BTreeSet::new(),
    )?;
    Ok(render_tree(&tree))
}
