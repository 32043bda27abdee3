use crate::error::{AppError, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use walkdir::WalkDir;

pub mod presets;

pub use presets::PresetGroup;

/// Top-level directories of at least this many bytes are suggested as critical ignores.
pub const LARGE_DIR_THRESHOLD: u64 = 100_000_000;
const DIR_SIZE_DEPTH: usize = 2;

pub const COMPILED_GLOBS: [&str; 7] = ["*.pyc", "*.class", "*.o", "*.so", "*.dll", "*.dylib", "*.test"];
const BUILD_TOOL_GLOB: &str = "webpack.config.*";
const SCAN_SKIP_DIRS: [&str; 4] = [".git", "node_modules", ".venv", "venv"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    Python,
    Javascript,
    Rust,
    Go,
    Java,
    Dotnet,
    Ruby,
    Php,
    #[serde(alias = "general")]
    Generic,
}

impl ProjectType {
    /// Detection order; the first type whose marker is present wins.
    pub const DETECTION_ORDER: [ProjectType; 8] = [
        ProjectType::Python,
        ProjectType::Javascript,
        ProjectType::Rust,
        ProjectType::Go,
        ProjectType::Java,
        ProjectType::Dotnet,
        ProjectType::Ruby,
        ProjectType::Php,
    ];

    pub fn key(self) -> &'static str {
        match self {
            ProjectType::Python => "python",
            ProjectType::Javascript => "javascript",
            ProjectType::Rust => "rust",
            ProjectType::Go => "go",
            ProjectType::Java => "java",
            ProjectType::Dotnet => "dotnet",
            ProjectType::Ruby => "ruby",
            ProjectType::Php => "php",
            ProjectType::Generic => "generic",
        }
    }

    fn markers(self) -> &'static [Marker] {
        match self {
            ProjectType::Python => &[
                Marker::File("requirements.txt"),
                Marker::File("setup.py"),
                Marker::File("pyproject.toml"),
                Marker::File("Pipfile"),
            ],
            ProjectType::Javascript => &[
                Marker::File("package.json"),
                Marker::File("yarn.lock"),
                Marker::File("package-lock.json"),
            ],
            ProjectType::Rust => &[Marker::File("Cargo.toml")],
            ProjectType::Go => &[Marker::File("go.mod")],
            ProjectType::Java => &[Marker::File("pom.xml"), Marker::File("build.gradle")],
            ProjectType::Dotnet => &[Marker::Extension("csproj"), Marker::Extension("sln")],
            ProjectType::Ruby => &[Marker::File("Gemfile")],
            ProjectType::Php => &[Marker::File("composer.json")],
            ProjectType::Generic => &[],
        }
    }

    /// Pure predicate over the names of the root's top-level entries.
    pub fn is_indicated_by<S: AsRef<str>>(self, entry_names: &[S]) -> bool {
        self.markers().iter().any(|marker| {
            entry_names
                .iter()
                .any(|name| marker.matches(name.as_ref()))
        })
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ProjectType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_lowercase();
        if lowered == "general" || lowered == "generic" {
            return Ok(ProjectType::Generic);
        }
        ProjectType::DETECTION_ORDER
            .into_iter()
            .find(|t| t.key() == lowered)
            .ok_or_else(|| AppError::InvalidArgument(format!("Unknown project type: {}", s)))
    }
}

#[derive(Debug, Clone, Copy)]
enum Marker {
    File(&'static str),
    Extension(&'static str),
}

impl Marker {
    fn matches(&self, name: &str) -> bool {
        match self {
            Marker::File(file) => name == *file,
            Marker::Extension(ext) => Path::new(name)
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == *ext),
        }
    }
}

pub fn detect_from_entries<S: AsRef<str>>(entry_names: &[S]) -> ProjectType {
    ProjectType::DETECTION_ORDER
        .into_iter()
        .find(|t| t.is_indicated_by(entry_names))
        .unwrap_or(ProjectType::Generic)
}

/// Every type with a marker present, in detection order.
pub fn indicated_types<S: AsRef<str>>(entry_names: &[S]) -> Vec<ProjectType> {
    ProjectType::DETECTION_ORDER
        .into_iter()
        .filter(|t| t.is_indicated_by(entry_names))
        .collect()
}

fn top_level_names(root: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(root).map_err(|e| AppError::FileRead {
        path: root.to_path_buf(),
        source: e,
    })?;
    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    Ok(names)
}

pub fn detect_project_type(root: &Path) -> Result<ProjectType> {
    let names = top_level_names(root)?;
    let detected = detect_from_entries(&names);
    log::debug!("Detected project type '{}' in {}", detected, root.display());
    Ok(detected)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LargeDirectory {
    pub name: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectAnalysis {
    pub project_type: ProjectType,
    pub indicators: BTreeMap<String, bool>,
    pub build_tools: Vec<String>,
    pub large_directories: Vec<LargeDirectory>,
    pub compiled_present: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PatternSuggestions {
    pub critical: Vec<String>,
    pub recommended: Vec<String>,
    pub optional: Vec<String>,
}

impl PatternSuggestions {
    /// Critical and recommended patterns, the set `auto` applies.
    pub fn auto_patterns(&self) -> Vec<String> {
        let mut out = self.critical.clone();
        for p in &self.recommended {
            if !out.contains(p) {
                out.push(p.clone());
            }
        }
        out
    }
}

/// Shallow size: files up to two levels below `dir`.
pub fn dir_size(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .max_depth(DIR_SIZE_DEPTH)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

fn build_glob_set(patterns: &[&str]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

pub fn analyze_project(root: &Path) -> Result<ProjectAnalysis> {
    analyze_with_threshold(root, LARGE_DIR_THRESHOLD)
}

pub(crate) fn analyze_with_threshold(root: &Path, large_dir_threshold: u64) -> Result<ProjectAnalysis> {
    log::debug!("Analyzing project structure in {}", root.display());
    let names = top_level_names(root)?;
    let indicated = indicated_types(&names);
    let indicators = ProjectType::DETECTION_ORDER
        .into_iter()
        .map(|t| (t.key().to_string(), indicated.contains(&t)))
        .collect();

    let mut large_directories = Vec::new();
    for name in &names {
        let path = root.join(name);
        if !path.is_dir() || [".git", ".venv", "venv"].contains(&name.as_str()) {
            continue;
        }
        let bytes = dir_size(&path);
        if bytes >= large_dir_threshold {
            log::trace!("Large directory '{}' ({} bytes)", name, bytes);
            large_directories.push(LargeDirectory {
                name: name.clone(),
                bytes,
            });
        }
    }

    let compiled_set = build_glob_set(&COMPILED_GLOBS)?;
    let build_tool_set = build_glob_set(&[BUILD_TOOL_GLOB])?;
    let mut compiled_hits = [false; COMPILED_GLOBS.len()];
    let mut build_tools: Vec<String> = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            e.depth() == 0 || !e.file_type().is_dir() || !SCAN_SKIP_DIRS.contains(&&*name)
        });
    for entry_result in walker {
        let entry = match entry_result {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Error accessing path during analysis: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        for idx in compiled_set.matches(&*name) {
            compiled_hits[idx] = true;
        }
        if build_tool_set.is_match(&*name) && !build_tools.iter().any(|b| b.as_str() == &*name) {
            build_tools.push(name.into_owned());
        }
    }
    build_tools.sort();

    let compiled_present = COMPILED_GLOBS
        .iter()
        .zip(compiled_hits)
        .filter(|(_, hit)| *hit)
        .map(|(glob, _)| glob.to_string())
        .collect();

    Ok(ProjectAnalysis {
        project_type: detect_from_entries(&names),
        indicators,
        build_tools,
        large_directories,
        compiled_present,
    })
}

/// Groups ignore suggestions by importance for every indicated type.
pub fn suggest_from_analysis(analysis: &ProjectAnalysis) -> PatternSuggestions {
    let mut suggestions = PatternSuggestions::default();
    for ty in ProjectType::DETECTION_ORDER {
        if !analysis.indicators.get(ty.key()).copied().unwrap_or(false) {
            continue;
        }
        let group = presets::preset_for(ty);
        push_unique(&mut suggestions.critical, group.critical);
        push_unique(&mut suggestions.recommended, group.recommended);
        push_unique(&mut suggestions.optional, group.optional);
    }

    let general = presets::general_preset();
    for g in general.recommended {
        if !suggestions.critical.contains(&g) && !suggestions.recommended.contains(&g) {
            suggestions.recommended.push(g);
        }
    }
    push_unique(&mut suggestions.optional, general.optional);

    for dir in &analysis.large_directories {
        if !suggestions.critical.contains(&dir.name) {
            suggestions.critical.push(dir.name.clone());
        }
    }
    suggestions
}

pub fn suggest_patterns(root: &Path) -> Result<(ProjectAnalysis, PatternSuggestions)> {
    let analysis = analyze_project(root)?;
    let suggestions = suggest_from_analysis(&analysis);
    log::info!(
        "Suggested {} critical, {} recommended, {} optional ignore patterns",
        suggestions.critical.len(),
        suggestions.recommended.len(),
        suggestions.optional.len()
    );
    Ok((analysis, suggestions))
}

fn push_unique(target: &mut Vec<String>, items: Vec<String>) {
    for item in items {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}
