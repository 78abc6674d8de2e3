//! Skill discovery: list procedures without loading them.
//!
//! A skill is a directory `skills/<name>/` holding a `SKILL.md` whose
//! frontmatter (between `---` lines) carries `name`, `description` and an
//! optional `version`. Only the frontmatter is read; bodies stay on disk
//! until the model reads them explicitly.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::layout::Layout;

pub const SKILL_FILE: &str = "SKILL.md";

const FRONTMATTER_DELIMITER: &str = "---";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillDescriptor {
    pub name: String,
    pub description: String,
    /// Root-relative skill directory
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// All skills, ordered by directory name. A missing skills directory yields
/// an empty list; unreadable skills are skipped with a warning; skills
/// without frontmatter are skipped.
pub async fn discover_skills(layout: &Layout) -> Vec<SkillDescriptor> {
    let skills_dir = layout.skills_dir();
    let mut entries = match tokio::fs::read_dir(skills_dir).await {
        Ok(entries) => entries,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(dir = %skills_dir.display(), error = %e, "Failed to read skills directory");
            }
            return Vec::new();
        }
    };

    let mut dirs = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.file_type().await.is_ok_and(|t| t.is_dir()) {
            dirs.push(entry.path());
        }
    }
    dirs.sort();

    let mut skills = Vec::new();
    for dir in dirs {
        let skill_file = dir.join(SKILL_FILE);
        if !skill_file.is_file() {
            continue;
        }
        let fields = match read_frontmatter(&skill_file).await {
            Ok(Some(fields)) => fields,
            Ok(None) => {
                debug!(file = %skill_file.display(), "No frontmatter, skipping skill");
                continue;
            }
            Err(e) => {
                warn!(file = %skill_file.display(), error = %e, "Could not read skill");
                continue;
            }
        };

        let dir_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        skills.push(SkillDescriptor {
            name: fields.get("name").cloned().unwrap_or(dir_name),
            description: fields
                .get("description")
                .cloned()
                .unwrap_or_else(|| "No description available".into()),
            path: layout.relative(&dir),
            version: fields.get("version").cloned(),
        });
    }
    skills
}

/// Frontmatter fields, or `None` if the file does not open with a complete
/// `---` block. Reading stops at the closing delimiter.
async fn read_frontmatter(path: &Path) -> std::io::Result<Option<HashMap<String, String>>> {
    let file = tokio::fs::File::open(path).await?;
    let mut lines = BufReader::new(file).lines();

    match lines.next_line().await? {
        Some(first) if first.trim() == FRONTMATTER_DELIMITER => {}
        _ => return Ok(None),
    }

    let mut fields = HashMap::new();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line == FRONTMATTER_DELIMITER {
            return Ok(Some(fields));
        }
        if let Some((key, value)) = line.split_once(':') {
            fields.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    Ok(None)
}
