//! Progressive-disclosure search over the record store.
//!
//! Resolution happens in two steps. Every candidate's header is read and
//! checked against the header predicates. Only the survivors have their body
//! read, and only when a `text` predicate was given. Cost therefore scales
//! with entity count and header size, not with body size.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tasktier_core::entity::{EntityHeader, EntityId, Priority, Status};
use tasktier_core::error::StoreError;
use tasktier_core::store::RecordStore;
use tracing::{debug, warn};

/// Result ordering. Every key falls back to id, so ordering is total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Id,
    /// Due date, earliest first
    Date,
    /// Creation time, oldest first
    Created,
    /// Most urgent first; entities without a priority last
    Priority,
}

impl std::str::FromStr for SortKey {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "id" => Ok(Self::Id),
            "date" => Ok(Self::Date),
            "created" => Ok(Self::Created),
            "priority" => Ok(Self::Priority),
            other => Err(format!(
                "unknown sort key '{other}' (expected id, date, created or priority)"
            )),
        }
    }
}

/// Search predicates, combined with logical AND. Absent predicates match
/// everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchQuery {
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub priority: Option<Priority>,
    /// Inclusive lower bound on `date`
    #[serde(default, alias = "date-after")]
    pub date_after: Option<NaiveDate>,
    /// Inclusive upper bound on `date`
    #[serde(default, alias = "date-before")]
    pub date_before: Option<NaiveDate>,
    #[serde(default)]
    pub project: Option<String>,
    /// Case-insensitive substring of the body
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub sort: SortKey,
}

impl SearchQuery {
    pub fn matches_header(&self, header: &EntityHeader) -> bool {
        self.status.is_none_or(|s| header.status == s)
            && self.priority.is_none_or(|p| header.priority == Some(p))
            && self.date_after.is_none_or(|d| header.date >= d)
            && self.date_before.is_none_or(|d| header.date <= d)
            && self
                .project
                .as_deref()
                .is_none_or(|p| header.project.as_deref() == Some(p))
    }

    /// Lowercased needle, when a non-empty text predicate is present.
    fn needle(&self) -> Option<String> {
        self.text
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
    }
}

/// Matches plus what was skipped along the way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchReport {
    pub ids: Vec<EntityId>,
    /// One line per entity that could not be evaluated
    pub warnings: Vec<String>,
    pub headers_read: usize,
    pub bodies_read: usize,
}

pub struct SearchEngine {
    store: Arc<dyn RecordStore>,
}

impl SearchEngine {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Run a query. Only a failure to enumerate the store is an error; an
    /// unreadable or malformed entity becomes a warning and is skipped.
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchReport, StoreError> {
        let mut report = SearchReport::default();
        let needle = query.needle();
        let mut matched: Vec<EntityHeader> = Vec::new();

        for id in self.store.list_ids().await? {
            let header = match self.store.header(&id).await {
                Ok(header) => header,
                Err(e) => {
                    warn!(id = %id, error = %e, "Skipping unreadable entity header");
                    report.warnings.push(format!("{id}: {e}"));
                    continue;
                }
            };
            report.headers_read += 1;
            if !query.matches_header(&header) {
                continue;
            }

            if let Some(needle) = &needle {
                report.bodies_read += 1;
                match self.store.body(&id).await {
                    Ok(body) if body.to_lowercase().contains(needle) => {}
                    Ok(_) => continue,
                    Err(e) => {
                        warn!(id = %id, error = %e, "Skipping unreadable entity body");
                        report.warnings.push(format!("{id}: {e}"));
                        continue;
                    }
                }
            }
            matched.push(header);
        }

        sort_headers(&mut matched, query.sort);
        report.ids = matched.into_iter().map(|h| h.id).collect();

        debug!(
            matches = report.ids.len(),
            headers_read = report.headers_read,
            bodies_read = report.bodies_read,
            warnings = report.warnings.len(),
            "Search complete"
        );
        Ok(report)
    }

    /// Root-relative location of each match, as shown to the model.
    pub fn locations(&self, report: &SearchReport) -> Vec<String> {
        report.ids.iter().map(|id| self.store.location(id)).collect()
    }
}

fn sort_headers(headers: &mut [EntityHeader], key: SortKey) {
    headers.sort_by(|a, b| {
        let primary = match key {
            SortKey::Id => Ordering::Equal,
            SortKey::Date => a.date.cmp(&b.date),
            SortKey::Created => a.created.cmp(&b.created),
            SortKey::Priority => b.priority.cmp(&a.priority),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    });
}
