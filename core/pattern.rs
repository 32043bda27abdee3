use crate::error::{AppError, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

/// File names that stay visible no matter which patterns are active.
pub const PROTECTED_FILES: [&str; 9] = [
    "README",
    "README.md",
    "package.json",
    "requirements.txt",
    "pyproject.toml",
    "setup.py",
    "Pipfile",
    "go.mod",
    "Cargo.toml",
];

/// Names that usually hold source code; ignoring them is allowed but warned about.
pub const SOURCE_ROOT_NAMES: [&str; 3] = ["src", "lib", "app"];

const MAX_JOINED_LEN: usize = 4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Manual,
    AutoDetected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IgnoreRule {
    pub pattern: String,
    pub provenance: Provenance,
}

pub fn is_protected(file_name: &str) -> bool {
    PROTECTED_FILES.contains(&file_name)
}

/// Compiled ignore patterns.
///
/// Patterns without a `/` are tested against every component of a relative
/// path; patterns with a `/` are tested against the path and each of its
/// ancestors. Protected file names never match.
///
/// Exclusions are literal root-relative paths hidden together with
/// everything below them. They are not patterns and are never persisted.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    component_set: GlobSet,
    path_set: GlobSet,
    patterns: Vec<String>,
    exclusions: Vec<String>,
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::empty()
    }
}

impl PatternMatcher {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut component_builder = GlobSetBuilder::new();
        let mut path_builder = GlobSetBuilder::new();
        let mut kept = Vec::new();

        for raw in patterns {
            let trimmed = raw.as_ref().trim();
            if trimmed.is_empty() {
                continue;
            }
            check_brackets(trimmed)?;
            let unprefixed = trimmed.trim_start_matches("./");
            // A leading `/` anchors the pattern at the project root.
            let anchored = unprefixed.starts_with('/');
            let processed = unprefixed.trim_matches('/');
            if processed.is_empty() {
                continue;
            }
            let glob = GlobBuilder::new(processed)
                .literal_separator(true)
                .backslash_escape(true)
                .build()
                .map_err(|e| AppError::MalformedPattern {
                    pattern: trimmed.to_string(),
                    message: e.kind().to_string(),
                })?;
            log::trace!(
                "Adding ignore pattern: {} (processed as {})",
                trimmed,
                processed
            );
            if anchored || processed.contains('/') {
                path_builder.add(glob);
            } else {
                component_builder.add(glob);
            }
            kept.push(trimmed.to_string());
        }

        Ok(Self {
            component_set: component_builder.build()?,
            path_set: path_builder.build()?,
            patterns: kept,
            exclusions: Vec::new(),
        })
    }

    pub fn with_exclusions<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for path in paths {
            let path: String = path.into();
            let path = path.trim_matches('/').to_string();
            if !path.is_empty() && path != "." && !self.exclusions.contains(&path) {
                self.exclusions.push(path);
            }
        }
        self
    }

    pub fn exclusions(&self) -> &[String] {
        &self.exclusions
    }

    pub fn empty() -> Self {
        Self {
            component_set: GlobSet::empty(),
            path_set: GlobSet::empty(),
            patterns: Vec::new(),
            exclusions: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// `relative_path` is relative to the project root.
    pub fn matches(&self, relative_path: &Path) -> bool {
        if self.is_excluded(relative_path) {
            log::trace!("Engine path hidden: {}", relative_path.display());
            return true;
        }
        if self.is_empty() {
            return false;
        }
        if relative_path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(is_protected)
        {
            log::trace!("Protected path stays visible: {}", relative_path.display());
            return false;
        }

        let mut prefix = String::new();
        for component in relative_path.components() {
            let Component::Normal(name) = component else {
                continue;
            };
            let name = name.to_string_lossy();
            if self.component_set.is_match(name.as_ref()) {
                log::trace!(
                    "Path excluded by component '{}': {}",
                    name,
                    relative_path.display()
                );
                return true;
            }
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(&name);
            if self.path_set.is_match(prefix.as_str()) {
                log::trace!(
                    "Path excluded by path prefix '{}': {}",
                    prefix,
                    relative_path.display()
                );
                return true;
            }
        }
        false
    }

    fn is_excluded(&self, relative_path: &Path) -> bool {
        if self.exclusions.is_empty() {
            return false;
        }
        let rel: Vec<String> = relative_path
            .components()
            .filter_map(|c| match c {
                Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        let rel = rel.join("/");
        self.exclusions.iter().any(|excluded| {
            rel == *excluded
                || rel
                    .strip_prefix(excluded.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

/// One-shot form of [`PatternMatcher::matches`].
pub fn matches<S: AsRef<str>>(relative_path: &Path, patterns: &[S]) -> Result<bool> {
    Ok(PatternMatcher::new(patterns)?.matches(relative_path))
}

fn check_brackets(pattern: &str) -> Result<()> {
    let mut chars = pattern.chars();
    let mut in_class = false;
    let mut class_start = false;
    while let Some(c) = chars.next() {
        if in_class {
            match c {
                '!' | '^' if class_start => continue,
                // A `]` right after the opening bracket is a literal member.
                ']' if !class_start => in_class = false,
                _ => {}
            }
            class_start = false;
            continue;
        }
        match c {
            '\\' => {
                chars.next();
            }
            '[' => {
                in_class = true;
                class_start = true;
            }
            ']' => {
                return Err(AppError::MalformedPattern {
                    pattern: pattern.to_string(),
                    message: "unmatched ']'".to_string(),
                });
            }
            _ => {}
        }
    }
    if in_class {
        return Err(AppError::MalformedPattern {
            pattern: pattern.to_string(),
            message: "unclosed character class; missing ']'".to_string(),
        });
    }
    Ok(())
}

/// Splits the external form (`a|b|c`, newlines or commas) into trimmed patterns.
/// Commas inside `{...}` alternations are kept.
pub fn split_patterns(external: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut brace_depth = 0usize;
    for c in external.chars() {
        match c {
            '{' => {
                brace_depth += 1;
                current.push(c);
            }
            '}' => {
                brace_depth = brace_depth.saturating_sub(1);
                current.push(c);
            }
            '|' | '\n' => push_trimmed(&mut out, &mut current),
            ',' if brace_depth == 0 => push_trimmed(&mut out, &mut current),
            _ => current.push(c),
        }
    }
    push_trimmed(&mut out, &mut current);
    out
}

fn push_trimmed(out: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
    current.clear();
}

/// Pipe-joins patterns, keeping the first occurrence of duplicates.
pub fn join_patterns<S: AsRef<str>>(patterns: &[S]) -> String {
    let mut seen = Vec::<&str>::new();
    for p in patterns {
        let p = p.as_ref().trim();
        if !p.is_empty() && !seen.contains(&p) {
            seen.push(p);
        }
    }
    seen.join("|")
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatternReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl PatternReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Checks patterns a caller is about to add or set.
pub fn validate_patterns<S: AsRef<str>>(patterns: &[S]) -> PatternReport {
    let mut report = PatternReport::default();
    for p in patterns {
        let p = p.as_ref().trim();
        if is_protected(p) {
            report
                .errors
                .push(format!("Pattern '{}' is critical and cannot be ignored.", p));
        }
        if SOURCE_ROOT_NAMES.contains(&p.trim_end_matches('/')) {
            report.warnings.push(format!(
                "Pattern '{}' looks like a source directory; consider removing.",
                p
            ));
        }
    }
    report
}

/// Warns when the whole active set grows past the joined-length budget.
pub fn length_warning<S: AsRef<str>>(patterns: &[S]) -> Option<String> {
    (join_patterns(patterns).len() > MAX_JOINED_LEN).then(|| {
        "Pattern list is very long; consider trimming to avoid performance issues.".to_string()
    })
}
