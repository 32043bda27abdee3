use crate::error::{AppError, Result};
use crate::limits::EngineLimits;
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tempfile::NamedTempFile;

pub const ENV_PROJECT_ROOT: &str = "LLMPREP_PROJECT_ROOT";

/// Picks the project root from the caller, the environment, or the current
/// directory, then canonicalizes it and checks it against the workspace.
pub fn determine_project_root(cli_root: Option<&Path>, limits: &EngineLimits) -> Result<PathBuf> {
    let path_str_opt = cli_root
        .map(|p| p.to_string_lossy().to_string())
        .or_else(|| env::var(ENV_PROJECT_ROOT).ok().filter(|s| !s.is_empty()));

    let path_to_resolve = match path_str_opt {
        Some(p_str) => PathBuf::from(shellexpand::tilde(&p_str).as_ref()),
        None => env::current_dir().map_err(AppError::Io)?,
    };
    prepare_root(&path_to_resolve, limits)
}

pub fn prepare_root(root: &Path, limits: &EngineLimits) -> Result<PathBuf> {
    let canonical = root.canonicalize().map_err(|e| AppError::InvalidRoot {
        path: root.to_path_buf(),
        reason: e.to_string(),
    })?;
    if !canonical.is_dir() {
        return Err(AppError::InvalidRoot {
            path: canonical,
            reason: "not a directory".to_string(),
        });
    }
    limits.check_root(&canonical)?;
    Ok(canonical)
}

/// Resolves `raw` against a canonical `root`.
///
/// Returns `None` when the path escapes the root, either lexically through
/// `..` or through a symlink. Paths that do not exist yet are returned in
/// their normalized form.
pub fn resolve_within_root(root: &Path, raw: &str) -> Option<PathBuf> {
    let raw_path = Path::new(raw);
    let joined = if raw_path.is_absolute() {
        if raw_path.starts_with(root) {
            raw_path.to_path_buf()
        } else {
            let retry = root.join(raw.trim_start_matches(['/', '\\']));
            if !retry.exists() {
                return None;
            }
            log::warn!(
                "Adjusted absolute path '{}' to project-relative '{}'",
                raw,
                retry.display()
            );
            retry
        }
    } else {
        root.join(raw_path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    return None;
                }
            }
            Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }
    if !normalized.starts_with(root) {
        return None;
    }

    match normalized.canonicalize() {
        Ok(real) if real.starts_with(root) => Some(real),
        Ok(real) => {
            log::debug!(
                "Symlink '{}' points outside the root: {}",
                normalized.display(),
                real.display()
            );
            None
        }
        Err(_) => Some(normalized),
    }
}

/// Root-relative form with `/` separators.
pub fn relative_display(path: &Path, root: &Path) -> String {
    let rel = pathdiff::diff_paths(path, root).unwrap_or_else(|| path.to_path_buf());
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| AppError::DirCreation {
        path: dir.to_path_buf(),
        source: e,
    })
}

/// Writes through a temp file in the destination directory and renames it
/// into place, so `dest` is either the old file or the complete new one.
pub fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<()> {
    let parent = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    ensure_dir(parent)?;
    let write_err = |source| AppError::FileWrite {
        path: dest.to_path_buf(),
        source,
    };
    let mut tmp = NamedTempFile::new_in(parent).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(dest).map_err(|e| write_err(e.error))?;
    log::trace!("Wrote {} bytes to {}", bytes.len(), dest.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn canonical_root() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        (dir, root)
    }

    #[test]
    fn relative_paths_resolve_inside_root() {
        let (_dir, root) = canonical_root();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/main.rs"), "fn main() {}\n").unwrap();
        assert_eq!(
            resolve_within_root(&root, "src/../src/main.rs"),
            Some(root.join("src/main.rs"))
        );
        assert_eq!(
            resolve_within_root(&root, "./missing.txt"),
            Some(root.join("missing.txt"))
        );
    }

    #[test]
    fn traversal_out_of_root_is_rejected() {
        let (_dir, root) = canonical_root();
        assert_eq!(resolve_within_root(&root, "../outside.txt"), None);
        assert_eq!(resolve_within_root(&root, "a/../../outside.txt"), None);
        assert_eq!(resolve_within_root(&root, "/etc/definitely-not-here-xyz"), None);
    }

    #[test]
    fn absolute_paths_under_root_are_kept() {
        let (_dir, root) = canonical_root();
        fs::write(root.join("a.txt"), "a").unwrap();
        let abs = root.join("a.txt");
        assert_eq!(
            resolve_within_root(&root, abs.to_str().unwrap()),
            Some(abs.clone())
        );
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_pointing_outside_are_rejected() {
        let (_dir, root) = canonical_root();
        let (_other, outside) = canonical_root();
        fs::write(outside.join("secret.txt"), "s").unwrap();
        std::os::unix::fs::symlink(outside.join("secret.txt"), root.join("link.txt")).unwrap();
        assert_eq!(resolve_within_root(&root, "link.txt"), None);
    }

    #[test]
    fn relative_display_uses_forward_slashes() {
        let root = Path::new("/proj");
        assert_eq!(relative_display(Path::new("/proj/a/b.rs"), root), "a/b.rs");
        assert_eq!(relative_display(Path::new("/proj"), root), ".");
    }

    #[test]
    fn atomic_write_replaces_content() {
        let (_dir, root) = canonical_root();
        let dest = root.join("out/doc.md");
        write_atomic(&dest, b"first").unwrap();
        write_atomic(&dest, b"second").unwrap();
        assert_eq!(fs::read_to_string(&dest).unwrap(), "second");
        let leftovers: Vec<_> = fs::read_dir(root.join("out")).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn prepare_root_rejects_files_and_missing_paths() {
        let (_dir, root) = canonical_root();
        fs::write(root.join("file"), "x").unwrap();
        let limits = EngineLimits::default();
        assert!(prepare_root(&root, &limits).is_ok());
        assert!(matches!(
            prepare_root(&root.join("file"), &limits),
            Err(AppError::InvalidRoot { .. })
        ));
        assert!(matches!(
            prepare_root(&root.join("nope"), &limits),
            Err(AppError::InvalidRoot { .. })
        ));
    }
}
