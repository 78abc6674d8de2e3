//! Entity records, one task per file.
//!
//! File format: a header block of `key: value` lines, a blank line, then the
//! free-text body.
//!
//! ```text
//! id: task-001
//! title: Ship the release
//! date: 2025-11-14
//! status: pending
//! created: 2025-11-10T09:00:00+00:00
//! priority: high
//! project: web-platform
//! tags: release, ops
//!
//! Body text...
//! ```
//!
//! `id`, `title`, `date`, `status` and `created` are required. Unknown keys
//! are preserved in order so a parse/serialize round-trip is byte-identical.

use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EntityError;

/// File extension of entity files.
pub const ENTITY_EXTENSION: &str = "md";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// An entity identifier; also the stem of the entity's file name.
///
/// Restricted to `[A-Za-z0-9][A-Za-z0-9_-]*`, so the derived file name can
/// never contain a separator or `..`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

impl EntityId {
    pub fn new(raw: impl Into<String>) -> Result<Self, EntityError> {
        let raw = raw.into();
        let mut chars = raw.chars();
        let valid = chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(raw))
        } else {
            Err(EntityError::InvalidValue {
                field: "id",
                value: raw,
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<id>.md`
    pub fn file_name(&self) -> String {
        format!("{}.{ENTITY_EXTENSION}", self.0)
    }

    /// Recover the id from a file name; `None` for anything that is not
    /// `<valid id>.md`.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(&format!(".{ENTITY_EXTENSION}"))?;
        Self::new(stem).ok()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for EntityId {
    type Error = EntityError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    InProgress,
    Completed,
    Blocked,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::InProgress => "in_progress",
            Status::Completed => "completed",
            Status::Blocked => "blocked",
        }
    }
}

impl FromStr for Status {
    type Err = EntityError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Status::Pending),
            "in_progress" => Ok(Status::InProgress),
            "completed" => Ok(Status::Completed),
            "blocked" => Ok(Status::Blocked),
            other => Err(EntityError::InvalidValue {
                field: "status",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl FromStr for Priority {
    type Err = EntityError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(EntityError::InvalidValue {
                field: "priority",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a `YYYY-MM-DD` calendar date. Relative expressions are rejected.
pub fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate, EntityError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| EntityError::InvalidValue {
        field,
        value: value.to_string(),
    })
}

/// Everything in an entity file except the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityHeader {
    pub id: EntityId,
    pub title: String,
    pub date: NaiveDate,
    pub status: Status,
    /// RFC 3339 with explicit offset
    pub created: DateTime<FixedOffset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Unrecognized header lines, in file order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<(String, String)>,
}

impl EntityHeader {
    /// Parse a header block (the text before the first blank line).
    pub fn parse(block: &str) -> Result<Self, EntityError> {
        let mut id = None;
        let mut title = None;
        let mut date = None;
        let mut status = None;
        let mut created = None;
        let mut priority = None;
        let mut project = None;
        let mut tags = None;
        let mut extra: Vec<(String, String)> = Vec::new();

        for (index, line) in block.lines().enumerate() {
            if is_header_separator(line) {
                break;
            }
            let (key, value) = line
                .split_once(':')
                .ok_or(EntityError::MalformedLine { line: index + 1 })?;
            let key = key.trim();
            let value = value.trim();

            let seen = match key {
                "id" => id.replace(EntityId::new(value)?).is_some(),
                "title" => title.replace(value.to_string()).is_some(),
                "date" => date.replace(parse_date("date", value)?).is_some(),
                "status" => status.replace(value.parse::<Status>()?).is_some(),
                "created" => created
                    .replace(DateTime::parse_from_rfc3339(value).map_err(|_| {
                        EntityError::InvalidValue {
                            field: "created",
                            value: value.to_string(),
                        }
                    })?)
                    .is_some(),
                "priority" => priority.replace(value.parse::<Priority>()?).is_some(),
                "project" => project.replace(value.to_string()).is_some(),
                "tags" => tags.replace(parse_tags(value)).is_some(),
                other => {
                    let duplicate = extra.iter().any(|(k, _)| k == other);
                    extra.push((other.to_string(), value.to_string()));
                    duplicate
                }
            };
            if seen {
                return Err(EntityError::DuplicateField(key.to_string()));
            }
        }

        Ok(Self {
            id: id.ok_or(EntityError::MissingField("id"))?,
            title: title
                .filter(|t| !t.is_empty())
                .ok_or(EntityError::MissingField("title"))?,
            date: date.ok_or(EntityError::MissingField("date"))?,
            status: status.ok_or(EntityError::MissingField("status"))?,
            created: created.ok_or(EntityError::MissingField("created"))?,
            priority,
            project: project.filter(|p| !p.is_empty()),
            tags: tags.unwrap_or_default(),
            extra,
        })
    }

    /// Header lines in canonical order, without the trailing blank line.
    pub fn to_block(&self) -> String {
        let mut lines = vec![
            format!("id: {}", self.id),
            format!("title: {}", self.title),
            format!("date: {}", self.date.format(DATE_FORMAT)),
            format!("status: {}", self.status),
            format!(
                "created: {}",
                self.created.to_rfc3339_opts(SecondsFormat::AutoSi, false)
            ),
        ];
        if let Some(priority) = self.priority {
            lines.push(format!("priority: {priority}"));
        }
        if let Some(project) = &self.project {
            lines.push(format!("project: {project}"));
        }
        if !self.tags.is_empty() {
            lines.push(format!("tags: {}", self.tags.join(", ")));
        }
        for (key, value) in &self.extra {
            lines.push(format!("{key}: {value}"));
        }
        lines.join("\n")
    }
}

fn parse_tags(value: &str) -> Vec<String> {
    let value = value
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .unwrap_or(value);
    value
        .split(',')
        .map(|t| t.trim().trim_matches(|c| c == '"' || c == '\''))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether a line ends the header block: empty or whitespace only,
/// including a bare `\r` left by CRLF endings.
pub fn is_header_separator(line: &str) -> bool {
    line.trim().is_empty()
}

/// Split a document into `(header block, body)` at the first separator
/// line. The separator itself belongs to neither part. A document with no
/// separator is all header.
pub fn split_document(text: &str) -> (&str, &str) {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if is_header_separator(line) {
            return (&text[..offset], &text[offset + line.len()..]);
        }
        offset += line.len();
    }
    (text, "")
}

/// A complete entity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(flatten)]
    pub header: EntityHeader,
    pub body: String,
}

impl Entity {
    pub fn id(&self) -> &EntityId {
        &self.header.id
    }

    /// Parse a whole entity file.
    pub fn parse(text: &str) -> Result<Self, EntityError> {
        let (header, body) = split_document(text);
        Ok(Self {
            header: EntityHeader::parse(header)?,
            body: body.to_string(),
        })
    }

    /// Serialize to the on-disk format.
    pub fn to_file_string(&self) -> String {
        format!("{}\n\n{}", self.header.to_block(), self.body)
    }
}
