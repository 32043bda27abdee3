use crate::error::{AppError, Result};
use byte_unit::{Byte, UnitType};
use serde::Serialize;
use std::collections::BTreeSet;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const ENV_MAX_FILE_SIZE: &str = "LLMPREP_MAX_FILE_SIZE";
pub const ENV_MAX_CONTEXT_SIZE: &str = "LLMPREP_MAX_CONTEXT_SIZE";
pub const ENV_WORKSPACE_DIR: &str = "LLMPREP_WORKSPACE_DIR";
pub const ENV_ALLOWED_EXTENSIONS: &str = "LLMPREP_ALLOWED_EXTENSIONS";

pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
pub const DEFAULT_MAX_CONTEXT_SIZE: u64 = 50 * 1024 * 1024;

const DEFAULT_ALLOWED_EXTENSIONS: &str = ".py,.js,.ts,.jsx,.tsx,.java,.c,.cpp,.cs,.go,.rs,.rb,.php,.swift,.kt,.scala,.r,.m,.h,.hpp,.sh,.bash,.zsh,.fish,.md,.txt,.json,.yaml,.yml,.toml,.xml,.html,.css,.scss,.sass,.less,.sql,.graphql,.proto,.dockerfile,.makefile,.cmake,.gradle,.maven";

/// Extension-less file names that are always accepted.
const ALLOWED_BASENAMES: [&str; 5] = ["dockerfile", "makefile", "license", "readme", "readme.md"];

/// Limits enforced inside the engine, read from the environment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineLimits {
    pub max_file_size: u64,
    pub max_context_size: u64,
    pub workspace_dir: Option<PathBuf>,
    pub allowed_extensions: BTreeSet<String>,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_context_size: DEFAULT_MAX_CONTEXT_SIZE,
            workspace_dir: None,
            allowed_extensions: parse_extension_list(DEFAULT_ALLOWED_EXTENSIONS),
        }
    }
}

impl EngineLimits {
    pub fn from_env() -> Result<Self> {
        let mut limits = Self::default();
        if let Some(raw) = non_empty_var(ENV_MAX_FILE_SIZE) {
            limits.max_file_size = parse_size(ENV_MAX_FILE_SIZE, &raw)?;
        }
        if let Some(raw) = non_empty_var(ENV_MAX_CONTEXT_SIZE) {
            limits.max_context_size = parse_size(ENV_MAX_CONTEXT_SIZE, &raw)?;
        }
        if let Some(raw) = non_empty_var(ENV_WORKSPACE_DIR) {
            limits.workspace_dir = Some(PathBuf::from(shellexpand::tilde(&raw).as_ref()));
        }
        if let Some(raw) = non_empty_var(ENV_ALLOWED_EXTENSIONS) {
            limits.allowed_extensions = parse_extension_list(&raw);
        }
        log::debug!("Engine limits: {:?}", limits);
        Ok(limits)
    }

    pub fn is_file_allowed(&self, path: &Path) -> bool {
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_lowercase(),
            None => return false,
        };
        if ALLOWED_BASENAMES.contains(&name.as_str()) {
            return true;
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{}", ext.to_lowercase()))
            .is_some_and(|ext| self.allowed_extensions.contains(&ext))
    }

    /// Project roots must stay inside the workspace when one is configured.
    pub fn check_root(&self, root: &Path) -> Result<()> {
        let Some(workspace) = &self.workspace_dir else {
            return Ok(());
        };
        let workspace = workspace
            .canonicalize()
            .map_err(|e| AppError::InvalidRoot {
                path: workspace.clone(),
                reason: format!("workspace directory is not accessible: {}", e),
            })?;
        if root.starts_with(&workspace) {
            Ok(())
        } else {
            Err(AppError::PathEscape {
                path: root.to_path_buf(),
                root: workspace,
            })
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|s| !s.trim().is_empty())
}

/// Accepts plain byte counts as well as unit strings such as `10MB` or `512 KiB`.
pub fn parse_size(name: &str, raw: &str) -> Result<u64> {
    let byte = Byte::from_str(raw.trim()).map_err(|e| {
        AppError::InvalidArgument(format!(
            "Invalid size '{}' for {}: {}. Use a byte count or units like KB, MB.",
            raw, name, e
        ))
    })?;
    Ok(byte.as_u64())
}

/// Human-readable binary size such as `64.0 MiB`.
pub fn format_size(bytes: u64) -> String {
    let adjusted = Byte::from_u64(bytes).get_appropriate_unit(UnitType::Binary);
    format!("{:.1}", adjusted)
}

fn parse_extension_list(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(|e| e.trim().to_lowercase())
        .filter(|e| e.starts_with('.') && e.len() > 1)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_extensions_accept_source_and_known_basenames() {
        let limits = EngineLimits::default();
        assert!(limits.is_file_allowed(Path::new("src/main.rs")));
        assert!(limits.is_file_allowed(Path::new("Notes.MD")));
        assert!(limits.is_file_allowed(Path::new("Makefile")));
        assert!(!limits.is_file_allowed(Path::new("image.png")));
        assert!(!limits.is_file_allowed(Path::new("no_extension")));
    }

    #[test]
    fn extension_list_drops_entries_without_leading_dot() {
        let set = parse_extension_list(".rs, py ,.TOML,,.");
        assert_eq!(
            set.into_iter().collect::<Vec<_>>(),
            vec![".rs".to_string(), ".toml".to_string()]
        );
    }

    #[test]
    fn sizes_accept_counts_and_units() {
        assert_eq!(parse_size("X", "1024").unwrap(), 1024);
        assert_eq!(parse_size("X", "2 KiB").unwrap(), 2048);
        assert!(parse_size("X", "lots").is_err());
    }

    #[test]
    fn sizes_format_with_binary_units() {
        let formatted = format_size(64 * 1024 * 1024);
        assert!(formatted.starts_with("64.0"), "{}", formatted);
        assert!(formatted.ends_with("MiB"), "{}", formatted);
        assert!(format_size(1536).starts_with("1.5"));
    }

    #[test]
    fn root_check_is_noop_without_workspace() {
        let limits = EngineLimits::default();
        assert!(limits.check_root(Path::new("/anywhere")).is_ok());
    }

    #[test]
    fn root_outside_workspace_is_rejected() {
        let workspace = tempfile::TempDir::new().unwrap();
        let other = tempfile::TempDir::new().unwrap();
        let limits = EngineLimits {
            workspace_dir: Some(workspace.path().to_path_buf()),
            ..EngineLimits::default()
        };
        let inside = workspace.path().canonicalize().unwrap().join("proj");
        assert!(limits.check_root(&inside).is_ok());
        let outside = other.path().canonicalize().unwrap();
        assert!(matches!(
            limits.check_root(&outside),
            Err(AppError::PathEscape { .. })
        ));
    }
}
