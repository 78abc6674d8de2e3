//! Three-tier loading policy.
//!
//! - **Always loaded**: the static preamble, sent with every model call.
//! - **Records**: entity files, promoted into the transcript only when a
//!   search matched them and they were read.
//! - **Procedures**: skill files, loaded only on explicit invocation.
//!
//! The policy is an explicit object so that what counts as which tier is
//! decided in one place rather than inferred from file I/O.

use serde::{Deserialize, Serialize};
use std::fmt;
use tasktier_core::entity::Entity;
use tasktier_core::error::StoreError;
use tasktier_core::tool::{ToolCall, ToolName};
use tasktier_security::resolve_in_root;

use crate::layout::Layout;
use crate::search::{SearchEngine, SearchQuery};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    AlwaysLoaded,
    Records,
    Procedures,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::AlwaysLoaded, Tier::Records, Tier::Procedures];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::AlwaysLoaded => "always_loaded",
            Tier::Records => "records",
            Tier::Procedures => "procedures",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct TierPolicy {
    layout: Layout,
}

impl TierPolicy {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// The tier whose content a tool call's result brings into the
    /// transcript. Only `read` loads tiered content; `None` means ordinary
    /// conversation content.
    pub fn classify_call(&self, call: &ToolCall) -> Option<Tier> {
        if ToolName::parse(&call.name)? != ToolName::Read {
            return None;
        }
        let requested = call.input.get("path")?.as_str()?;
        let path = resolve_in_root(self.layout.root(), requested).ok()?;
        if self.layout.is_record_path(&path) {
            Some(Tier::Records)
        } else if self.layout.is_skill_path(&path) {
            Some(Tier::Procedures)
        } else {
            None
        }
    }

    /// Load-on-match: run `query` against headers, then load the full
    /// content of the matches only. Entities that vanish or fail to parse
    /// between the two steps are left out.
    pub async fn promote_matches(
        &self,
        engine: &SearchEngine,
        query: &SearchQuery,
    ) -> Result<Vec<Entity>, StoreError> {
        let report = engine.search(query).await?;
        let mut loaded = Vec::with_capacity(report.ids.len());
        for id in &report.ids {
            match engine.store().get(id).await {
                Ok(entity) => loaded.push(entity),
                Err(e) => tracing::warn!(id = %id, error = %e, "Match could not be loaded"),
            }
        }
        Ok(loaded)
    }
}
