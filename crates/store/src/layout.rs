//! Project layout: where records and skills live under the project root.

use std::path::{Path, PathBuf};

use tasktier_core::entity::EntityId;
use tasktier_core::error::StoreError;
use tasktier_security::{relative_to, resolve_in_root};

/// Resolved directories of one project. All paths are absolute and under the
/// canonical root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
    records_dir: PathBuf,
    skills_dir: PathBuf,
}

impl Layout {
    /// Resolve `records_dir` and `skills_dir` (root-relative) against `root`.
    /// The root must exist; the two directories need not.
    pub fn new(root: &Path, records_dir: &str, skills_dir: &str) -> Result<Self, StoreError> {
        let resolve = |dir: &str| {
            resolve_in_root(root, dir).map_err(|e| StoreError::Io {
                path: dir.to_string(),
                reason: e.to_string(),
            })
        };
        let records_dir = resolve(records_dir)?;
        let skills_dir = resolve(skills_dir)?;
        let root = root.canonicalize().map_err(|e| StoreError::Io {
            path: root.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            root,
            records_dir,
            skills_dir,
        })
    }

    /// Layout with the default `memories/tasks` and `skills` directories.
    pub fn with_defaults(root: &Path) -> Result<Self, StoreError> {
        Self::new(root, "memories/tasks", "skills")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn records_dir(&self) -> &Path {
        &self.records_dir
    }

    pub fn skills_dir(&self) -> &Path {
        &self.skills_dir
    }

    pub fn entity_path(&self, id: &EntityId) -> PathBuf {
        self.records_dir.join(id.file_name())
    }

    /// Root-relative `/`-separated form of an absolute path under the root.
    pub fn relative(&self, path: &Path) -> String {
        relative_to(&self.root, path).unwrap_or_else(|| path.display().to_string())
    }

    /// The entity id a path stands for, if it names `<records_dir>/<id>.md`.
    pub fn record_id_for(&self, path: &Path) -> Option<EntityId> {
        if path.parent()? != self.records_dir {
            return None;
        }
        EntityId::from_file_name(path.file_name()?.to_str()?)
    }

    pub fn is_record_path(&self, path: &Path) -> bool {
        path.starts_with(&self.records_dir)
    }

    pub fn is_skill_path(&self, path: &Path) -> bool {
        path.starts_with(&self.skills_dir)
    }
}
