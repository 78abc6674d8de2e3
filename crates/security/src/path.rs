//! Path confinement: every file tool resolves its path through here.
//!
//! A requested path is joined to the project root, normalized lexically,
//! and then checked again after resolving symlinks on the deepest existing
//! ancestor. Anything that lands outside the root is rejected before a
//! single byte is read or written.

use std::path::{Component, Path, PathBuf};

/// Error returned when path validation fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path is empty")]
    Empty,

    #[error("Path '{path}' is outside the project root")]
    OutsideRoot { path: String },

    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },

    #[error("Failed to canonicalize path '{path}': {reason}")]
    CanonicalizeFailed { path: String, reason: String },
}

/// Resolve `requested` against `root` and confirm it stays inside.
///
/// Relative paths are taken relative to `root`; absolute paths are accepted
/// only if they already point inside it. The target need not exist (writes
/// create files). Returns an absolute path under the canonical root.
pub fn resolve_in_root(root: &Path, requested: &str) -> Result<PathBuf, PathValidationError> {
    if requested.trim().is_empty() {
        return Err(PathValidationError::Empty);
    }

    let canonical_root = root
        .canonicalize()
        .map_err(|e| PathValidationError::CanonicalizeFailed {
            path: root.display().to_string(),
            reason: e.to_string(),
        })?;

    let requested_path = Path::new(requested);
    let joined = if requested_path.is_absolute() {
        requested_path.to_path_buf()
    } else {
        canonical_root.join(requested_path)
    };

    let normalized = normalize(&joined).ok_or_else(|| PathValidationError::PathTraversal {
        path: requested.into(),
    })?;

    if !normalized.starts_with(&canonical_root) {
        return Err(if has_parent_component(requested_path) {
            PathValidationError::PathTraversal {
                path: requested.into(),
            }
        } else {
            PathValidationError::OutsideRoot {
                path: requested.into(),
            }
        });
    }

    // Symlinks inside the root may still point out of it.
    let (existing, rest) = split_existing(&normalized);
    let resolved_ancestor =
        existing
            .canonicalize()
            .map_err(|e| PathValidationError::CanonicalizeFailed {
                path: requested.into(),
                reason: e.to_string(),
            })?;
    if !resolved_ancestor.starts_with(&canonical_root) {
        return Err(PathValidationError::OutsideRoot {
            path: requested.into(),
        });
    }

    Ok(rest
        .iter()
        .fold(resolved_ancestor, |path, part| path.join(part)))
}

/// The path relative to `root`, with `/` separators, for reporting.
pub fn relative_to(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

/// Lexical normalization. `None` if `..` climbs above the filesystem root.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    Some(out)
}

fn has_parent_component(path: &Path) -> bool {
    path.components().any(|c| matches!(c, Component::ParentDir))
}

/// Split into the deepest ancestor that exists and the missing tail.
fn split_existing(path: &Path) -> (PathBuf, Vec<std::ffi::OsString>) {
    let mut existing = path.to_path_buf();
    let mut rest = Vec::new();
    while !existing.exists() {
        match existing.file_name() {
            Some(name) => rest.push(name.to_os_string()),
            None => break,
        }
        if !existing.pop() {
            break;
        }
    }
    rest.reverse();
    (existing, rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("memories/tasks")).unwrap();
        std::fs::write(dir.path().join("memories/tasks/t1.md"), "x").unwrap();
        dir
    }

    #[test]
    fn relative_path_inside_root() {
        let dir = project();
        let resolved = resolve_in_root(dir.path(), "memories/tasks/t1.md").unwrap();
        let root = dir.path().canonicalize().unwrap();
        assert_eq!(resolved, root.join("memories/tasks/t1.md"));
        assert_eq!(
            relative_to(&root, &resolved).as_deref(),
            Some("memories/tasks/t1.md")
        );
    }

    #[test]
    fn missing_target_is_allowed() {
        let dir = project();
        let resolved = resolve_in_root(dir.path(), "memories/new/deep/t2.md").unwrap();
        assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));
        assert!(resolved.ends_with("memories/new/deep/t2.md"));
    }

    #[test]
    fn inner_dotdot_that_stays_inside_is_allowed() {
        let dir = project();
        let resolved = resolve_in_root(dir.path(), "memories/../memories/tasks/t1.md").unwrap();
        assert!(resolved.ends_with("memories/tasks/t1.md"));
    }

    #[test]
    fn path_traversal_blocked() {
        let dir = project();
        let err = resolve_in_root(dir.path(), "../../../etc/passwd").unwrap_err();
        assert!(matches!(err, PathValidationError::PathTraversal { .. }));
    }

    #[test]
    fn absolute_outside_root_blocked() {
        let dir = project();
        let err = resolve_in_root(dir.path(), "/etc/passwd").unwrap_err();
        assert!(matches!(err, PathValidationError::OutsideRoot { .. }));
    }

    #[test]
    fn absolute_inside_root_allowed() {
        let dir = project();
        let root = dir.path().canonicalize().unwrap();
        let abs = root.join("memories/tasks/t1.md");
        assert!(resolve_in_root(dir.path(), abs.to_str().unwrap()).is_ok());
    }

    #[test]
    fn empty_path_rejected() {
        let dir = project();
        assert_eq!(
            resolve_in_root(dir.path(), "  ").unwrap_err(),
            PathValidationError::Empty
        );
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_blocked() {
        let dir = project();
        let outside = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("escape")).unwrap();
        let err = resolve_in_root(dir.path(), "escape/secret.txt").unwrap_err();
        assert!(matches!(err, PathValidationError::OutsideRoot { .. }));
    }
}
