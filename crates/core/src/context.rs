//! Always-loaded context: the static preamble sent with every model call.
//!
//! Assembled once per session from a base prompt plus optional context files
//! under the project root. Missing files are skipped. The assembled prompt is
//! capped at `max_bytes` so its cost per call stays bounded.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default context file looked up in the project root.
pub const CONTEXT_FILE: &str = "CONTEXT.md";

/// Default cap on the assembled preamble.
pub const DEFAULT_MAX_BYTES: usize = 16 * 1024;

pub const BASE_PROMPT: &str = concat!(
    "You are a helpful task management assistant. ",
    "You help users organize, track, and complete their tasks effectively. ",
    "The system uses a three-tier memory architecture for efficient context management: ",
    "this preamble is always loaded, task records are found with the `search` tool and ",
    "opened with `read` only when needed, and procedures under `skills/` are listed with ",
    "`discover` and loaded on demand.",
);

/// Where the always-loaded context comes from.
#[derive(Debug, Clone)]
pub struct ContextSources {
    /// Project root; relative `files` resolve against it
    pub root: PathBuf,

    /// Context files, in prompt order
    pub files: Vec<PathBuf>,

    /// Replaces [`BASE_PROMPT`] when set
    pub base_prompt: Option<String>,

    pub max_bytes: usize,
}

impl ContextSources {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: vec![PathBuf::from(CONTEXT_FILE)],
            base_prompt: None,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

/// The assembled preamble.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticContext {
    pub system_prompt: String,

    /// Which context files were loaded (for diagnostics)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub loaded_files: Vec<String>,

    /// Whether the prompt was cut at `max_bytes`
    #[serde(default)]
    pub truncated: bool,
}

impl StaticContext {
    /// A preamble with no files, just the given prompt.
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: prompt.into(),
            loaded_files: vec![],
            truncated: false,
        }
    }

    /// Load the preamble. Never fails: unreadable files are skipped with a
    /// warning, missing ones silently.
    pub fn load(sources: &ContextSources) -> Self {
        let mut prompt = sources
            .base_prompt
            .clone()
            .unwrap_or_else(|| BASE_PROMPT.to_string());
        let mut loaded_files = Vec::new();

        for file in &sources.files {
            let path = if file.is_absolute() {
                file.clone()
            } else {
                sources.root.join(file)
            };
            let Some(content) = read_optional(&path) else {
                continue;
            };
            if content.trim().is_empty() {
                continue;
            }
            let heading = file
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("context")
                .to_lowercase();
            prompt.push_str(&format!("\n\n<{heading}>\n{}\n</{heading}>", content.trim()));
            debug!(file = %path.display(), "Loaded context file");
            loaded_files.push(file.display().to_string());
        }

        let truncated = truncate_at_boundary(&mut prompt, sources.max_bytes);
        if truncated {
            warn!(
                max_bytes = sources.max_bytes,
                "Always-loaded context exceeds its cap, truncated"
            );
        }

        Self {
            system_prompt: prompt,
            loaded_files,
            truncated,
        }
    }

    /// Rough estimate: 4 chars ≈ 1 token.
    pub fn estimated_tokens(&self) -> usize {
        self.system_prompt.len().div_ceil(4)
    }
}

fn read_optional(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!(file = %path.display(), error = %e, "Failed to read context file");
            None
        }
    }
}

/// Cut `text` to at most `max` bytes on a char boundary.
fn truncate_at_boundary(text: &mut String, max: usize) -> bool {
    if text.len() <= max {
        return false;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    true
}
