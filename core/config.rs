use crate::detect::{self, ProjectType};
use crate::error::{AppError, Result};
use crate::fsio;
use crate::pattern::{self, IgnoreRule, PatternMatcher, Provenance};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use indexmap::{IndexMap, IndexSet};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const CONFIG_FILENAME: &str = ".llm_prep_config.json";
pub const LOCK_FILENAME: &str = ".llm_prep_config.json.lock";
pub const CORRUPT_BACKUP_FILENAME: &str = ".llm_prep_config.json.corrupt";
pub const NOTES_DIR: &str = ".llm_prep_notes";
pub const DEFAULT_IGNORE_PATTERNS: &str =
    "bin|lib|*.log|logs|__pycache__|*.csv|*.pyc|.git|.env|*.db|node_modules|.venv|venv";
pub const DEFAULT_OUTPUT_DIR: &str = "context_reports";
pub const DEFAULT_TREE_MAX_DEPTH: usize = 3;
pub const MAX_HISTORY_ENTRIES: usize = 50;
pub const DEFAULT_RECENT_ENTRIES: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpSpec {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl DumpSpec {
    pub fn display_title(&self) -> String {
        self.title.clone().unwrap_or_else(|| {
            let name = Path::new(&self.file)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.file.clone());
            format!("Context from {}", name)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateAction {
    Set,
    Add,
    Remove,
    Auto,
    Template,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub patterns: String,
    pub action: UpdateAction,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentContext {
    pub path: String,
    pub timestamp: DateTime<Utc>,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecentRetention {
    pub max_entries: usize,
    /// Duration string such as `30d`; entries older than this are pruned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age: Option<String>,
}

impl Default for RecentRetention {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_RECENT_ENTRIES,
            max_age: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    #[serde(rename = "tree_ignore", with = "pipe_patterns")]
    pub ignore_patterns: IndexSet<String>,
    pub output_dir: PathBuf,
    #[serde(rename = "default_context_dumps")]
    pub default_dumps: Vec<DumpSpec>,
    pub project_type: Option<ProjectType>,
    pub auto_detected_patterns: IndexSet<String>,
    #[serde(rename = "tree_ignore_history")]
    pub history: Vec<HistoryEntry>,
    pub recent_contexts: Vec<RecentContext>,
    pub tree_max_depth: usize,
    pub respect_gitignore: bool,
    pub recent_retention: RecentRetention,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            ignore_patterns: pattern::split_patterns(DEFAULT_IGNORE_PATTERNS)
                .into_iter()
                .collect(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            default_dumps: Vec::new(),
            project_type: None,
            auto_detected_patterns: IndexSet::new(),
            history: Vec::new(),
            recent_contexts: Vec::new(),
            tree_max_depth: DEFAULT_TREE_MAX_DEPTH,
            respect_gitignore: false,
            recent_retention: RecentRetention::default(),
        }
    }
}

impl ProjectConfig {
    pub fn patterns(&self) -> Vec<String> {
        self.ignore_patterns.iter().cloned().collect()
    }

    pub fn joined_patterns(&self) -> String {
        pattern::join_patterns(&self.patterns())
    }

    /// Root-relative paths the engine writes itself: the config file and its
    /// sidecars, the notes directory and the output directory. Trees and
    /// chunk walks hide them on top of the user's patterns.
    pub fn engine_exclusions(&self, root: &Path) -> Vec<String> {
        let mut paths: Vec<String> = [CONFIG_FILENAME, LOCK_FILENAME, CORRUPT_BACKUP_FILENAME, NOTES_DIR]
            .iter()
            .map(|p| p.to_string())
            .collect();
        if let Some(dir) = fsio::resolve_within_root(root, &self.output_dir.to_string_lossy()) {
            let rel = fsio::relative_display(&dir, root);
            if rel != "." {
                paths.push(rel);
            }
        }
        paths
    }

    /// Matcher over the active patterns plus [`Self::engine_exclusions`].
    pub fn project_matcher<S: AsRef<str>>(&self, root: &Path, patterns: &[S]) -> Result<PatternMatcher> {
        Ok(PatternMatcher::new(patterns)?.with_exclusions(self.engine_exclusions(root)))
    }

    pub fn rules(&self) -> Vec<IgnoreRule> {
        self.ignore_patterns
            .iter()
            .map(|p| IgnoreRule {
                pattern: p.clone(),
                provenance: if self.auto_detected_patterns.contains(p) {
                    Provenance::AutoDetected
                } else {
                    Provenance::Manual
                },
            })
            .collect()
    }

    fn push_history(&mut self, action: UpdateAction, reason: Option<&str>) {
        self.history.push(HistoryEntry {
            timestamp: Utc::now(),
            patterns: self.joined_patterns(),
            action,
            reason: reason.unwrap_or_default().to_string(),
        });
        if self.history.len() > MAX_HISTORY_ENTRIES {
            let excess = self.history.len() - MAX_HISTORY_ENTRIES;
            self.history.drain(..excess);
        }
    }
}

/// External form of the pattern set is one pipe-joined string.
/// A JSON list is accepted on read as well.
mod pipe_patterns {
    use crate::pattern::{join_patterns, split_patterns};
    use indexmap::IndexSet;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        set: &IndexSet<String>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        let items: Vec<&String> = set.iter().collect();
        serializer.serialize_str(&join_patterns(&items))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<IndexSet<String>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Form {
            Joined(String),
            List(Vec<String>),
        }
        let parts = match Form::deserialize(deserializer)? {
            Form::Joined(joined) => split_patterns(&joined),
            Form::List(list) => list
                .into_iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        };
        Ok(parts.into_iter().collect())
    }
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILENAME)
}

/// A configuration read from disk. `corrupt` is set when the file existed
/// but could not be parsed and defaults were substituted.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: ProjectConfig,
    pub corrupt: Option<AppError>,
}

impl LoadedConfig {
    pub fn warnings(&self) -> Vec<String> {
        self.corrupt.iter().map(|e| e.to_string()).collect()
    }
}

pub fn load_checked(root: &Path) -> Result<LoadedConfig> {
    let path = config_path(root);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(LoadedConfig {
                config: ProjectConfig::default(),
                corrupt: None,
            });
        }
        Err(e) => return Err(AppError::FileRead { path, source: e }),
    };
    match serde_json::from_str::<ProjectConfig>(&content) {
        Ok(config) => {
            log::debug!("Loaded config from {}", path.display());
            Ok(LoadedConfig {
                config,
                corrupt: None,
            })
        }
        Err(e) => {
            let err = AppError::ConfigCorrupt {
                path: path.clone(),
                message: e.to_string(),
            };
            log::warn!("{}", err);
            Ok(LoadedConfig {
                config: ProjectConfig::default(),
                corrupt: Some(err),
            })
        }
    }
}

/// Loads the project config, substituting defaults for a corrupt file.
pub fn load(root: &Path) -> Result<ProjectConfig> {
    Ok(load_checked(root)?.config)
}

pub fn save(root: &Path, config: &ProjectConfig) -> Result<()> {
    let _lock = ConfigLock::acquire(root)?;
    write_config(root, config)
}

fn write_config(root: &Path, config: &ProjectConfig) -> Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    fsio::write_atomic(&config_path(root), json.as_bytes())?;
    log::debug!("Saved config to {}", config_path(root).display());
    Ok(())
}

/// Exclusive advisory lock on the sidecar lock file, released on drop.
struct ConfigLock {
    file: File,
    path: PathBuf,
}

impl ConfigLock {
    fn acquire(root: &Path) -> Result<Self> {
        let path = root.join(LOCK_FILENAME);
        let lock_err = |source| AppError::Lock {
            path: path.clone(),
            source,
        };
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(lock_err)?;
        FileExt::lock_exclusive(&file).map_err(lock_err)?;
        log::trace!("Acquired config lock {}", path.display());
        Ok(Self { file, path })
    }
}

impl Drop for ConfigLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            log::warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}

/// Outcome of [`modify`]. `warnings` carries the corrupt-config fallback
/// and backup notices raised while loading.
#[derive(Debug)]
pub struct Modified<T> {
    pub config: ProjectConfig,
    pub value: T,
    pub warnings: Vec<String>,
}

/// Locked read-modify-write. A corrupt file is copied aside before the
/// rewrite replaces it.
pub fn modify<T, F>(root: &Path, mutate: F) -> Result<Modified<T>>
where
    F: FnOnce(&mut ProjectConfig) -> Result<T>,
{
    let _lock = ConfigLock::acquire(root)?;
    let loaded = load_checked(root)?;
    let mut warnings = loaded.warnings();
    if loaded.corrupt.is_some() {
        let backup = root.join(CORRUPT_BACKUP_FILENAME);
        fs::copy(config_path(root), &backup).map_err(|e| AppError::FileWrite {
            path: backup.clone(),
            source: e,
        })?;
        log::warn!("Preserved corrupt config as {}", backup.display());
        warnings.push(format!(
            "The unreadable configuration was preserved as {}",
            CORRUPT_BACKUP_FILENAME
        ));
    }
    let mut config = loaded.config;
    let value = mutate(&mut config)?;
    write_config(root, &config)?;
    Ok(Modified {
        config,
        value,
        warnings,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternUpdate {
    pub action: UpdateAction,
    pub patterns: Vec<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateOutcome {
    pub config: ProjectConfig,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub warnings: Vec<String>,
}

fn check_incoming(patterns: &[String]) -> Result<()> {
    let report = pattern::validate_patterns(patterns);
    if !report.is_ok() {
        return Err(AppError::PatternRejected(report.errors.join(" ")));
    }
    PatternMatcher::new(patterns)?;
    Ok(())
}

/// Applies one pattern mutation and appends one history entry.
pub fn update(root: &Path, request: &PatternUpdate) -> Result<UpdateOutcome> {
    let incoming: Vec<String> = request
        .patterns
        .iter()
        .flat_map(|p| pattern::split_patterns(p))
        .collect();

    let suggested = match request.action {
        UpdateAction::Auto => {
            let (analysis, suggestions) = detect::suggest_patterns(root)?;
            Some((analysis.project_type, suggestions.auto_patterns()))
        }
        UpdateAction::Set | UpdateAction::Add => {
            check_incoming(&incoming)?;
            None
        }
        UpdateAction::Remove => None,
        UpdateAction::Template => {
            return Err(AppError::InvalidArgument(
                "Templates are applied with apply_template".to_string(),
            ));
        }
    };

    let modified = modify(root, |config| {
        let before = config.ignore_patterns.clone();
        match request.action {
            UpdateAction::Set => {
                config.ignore_patterns = incoming.iter().cloned().collect();
            }
            UpdateAction::Add => {
                config.ignore_patterns.extend(incoming.iter().cloned());
            }
            UpdateAction::Remove => {
                for p in &incoming {
                    config.ignore_patterns.shift_remove(p);
                }
            }
            UpdateAction::Auto => {
                if let Some((project_type, patterns)) = &suggested {
                    config.project_type = Some(*project_type);
                    config.auto_detected_patterns.extend(patterns.iter().cloned());
                    config.ignore_patterns.extend(patterns.iter().cloned());
                }
            }
            UpdateAction::Template => {}
        }
        config.push_history(request.action, request.reason.as_deref());
        let added = config
            .ignore_patterns
            .iter()
            .filter(|p| !before.contains(*p))
            .cloned()
            .collect::<Vec<_>>();
        let removed = before
            .iter()
            .filter(|p| !config.ignore_patterns.contains(*p))
            .cloned()
            .collect::<Vec<_>>();
        Ok((added, removed))
    })?;

    let Modified {
        config,
        value: (added, removed),
        mut warnings,
    } = modified;
    // Only patterns named by this call are checked against source roots.
    let checked = match request.action {
        UpdateAction::Set | UpdateAction::Add => &incoming,
        _ => &added,
    };
    warnings.extend(pattern::validate_patterns(checked).warnings);
    warnings.extend(pattern::length_warning(&config.patterns()));
    log::info!(
        "Ignore patterns updated ({:?}): +{} -{}",
        request.action,
        added.len(),
        removed.len()
    );
    Ok(UpdateOutcome {
        config,
        added,
        removed,
        warnings,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProjectSettings {
    pub output_dir: Option<PathBuf>,
    pub default_dumps: Option<Vec<DumpSpec>>,
    pub tree_max_depth: Option<usize>,
    pub respect_gitignore: Option<bool>,
    pub recent_retention: Option<RecentRetention>,
}

/// Edits non-pattern settings. Patterns are untouched, so no history entry.
pub fn set_project_settings(root: &Path, settings: &ProjectSettings) -> Result<ProjectConfig> {
    if settings.tree_max_depth == Some(0) {
        return Err(AppError::InvalidArgument(
            "tree_max_depth must be at least 1".to_string(),
        ));
    }
    if let Some(dir) = &settings.output_dir {
        if fsio::resolve_within_root(root, &dir.to_string_lossy()).is_none() {
            return Err(AppError::PathEscape {
                path: dir.clone(),
                root: root.to_path_buf(),
            });
        }
    }
    if let Some(retention) = &settings.recent_retention {
        if let Some(age) = &retention.max_age {
            parse_duration::parse(age)?;
        }
    }
    let modified = modify(root, |config| {
        if let Some(dir) = &settings.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(dumps) = &settings.default_dumps {
            config.default_dumps = dumps.clone();
        }
        if let Some(depth) = settings.tree_max_depth {
            config.tree_max_depth = depth;
        }
        if let Some(respect) = settings.respect_gitignore {
            config.respect_gitignore = respect;
        }
        if let Some(retention) = &settings.recent_retention {
            config.recent_retention = retention.clone();
            prune_recent(&mut config.recent_contexts, retention, Utc::now())?;
        }
        Ok(())
    })?;
    Ok(modified.config)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigTemplate {
    pub description: String,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub default_dumps: Vec<DumpSpec>,
}

fn parse_templates(yaml: &str) -> Result<IndexMap<String, ConfigTemplate>> {
    serde_yml::from_str(yaml)
        .map_err(|e| AppError::DataLoading(format!("Failed to parse config templates: {}", e)))
}

static CONFIG_TEMPLATES: Lazy<IndexMap<String, ConfigTemplate>> = Lazy::new(|| {
    let yaml_content = include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../data/config_templates.yaml"
    ));
    parse_templates(yaml_content).unwrap_or_else(|e| {
        log::error!("{}", e);
        IndexMap::new()
    })
});

pub fn get_config_templates() -> &'static IndexMap<String, ConfigTemplate> {
    &CONFIG_TEMPLATES
}

/// Sets output dir and default dumps from a named template and seeds the
/// pattern set from detection suggestions.
pub fn apply_template(root: &Path, name: &str) -> Result<ProjectConfig> {
    let template = get_config_templates().get(name).ok_or_else(|| {
        let known: Vec<&str> = get_config_templates().keys().map(String::as_str).collect();
        AppError::InvalidArgument(format!(
            "Unknown template '{}'. Available: {}",
            name,
            known.join(", ")
        ))
    })?;
    let (analysis, suggestions) = detect::suggest_patterns(root)?;
    let seeded = suggestions.auto_patterns();
    let modified = modify(root, |config| {
        config.output_dir = template.output_dir.clone();
        config.default_dumps = template.default_dumps.clone();
        config.project_type = Some(analysis.project_type);
        config.ignore_patterns = seeded.iter().cloned().collect();
        config.auto_detected_patterns = seeded.iter().cloned().collect();
        config.push_history(UpdateAction::Template, Some(name));
        Ok(())
    })?;
    log::info!("Applied template '{}'", name);
    Ok(modified.config)
}

fn prune_recent(
    recents: &mut Vec<RecentContext>,
    retention: &RecentRetention,
    now: DateTime<Utc>,
) -> Result<()> {
    if let Some(age) = &retention.max_age {
        let max_age = parse_duration::parse(age)?;
        let max_age = chrono::Duration::from_std(max_age)
            .map_err(|e| AppError::DurationParse(format!("'{}': {}", age, e)))?;
        recents.retain(|r| now.signed_duration_since(r.timestamp) <= max_age);
    }
    recents.truncate(retention.max_entries);
    Ok(())
}

/// Prepends a generated document to the recent list and applies retention.
/// Returns the load warnings.
pub fn record_recent(root: &Path, entry: RecentContext) -> Result<Vec<String>> {
    let modified = modify(root, |config| {
        log::trace!("Recording recent context {}", entry.path);
        config.recent_contexts.insert(0, entry);
        let retention = config.recent_retention.clone();
        prune_recent(&mut config.recent_contexts, &retention, Utc::now())
    })?;
    Ok(modified.warnings)
}
