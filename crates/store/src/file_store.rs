//! File-backed record store: one `<id>.md` file per entity.
//!
//! Storage location: `<project_root>/memories/tasks/` by default.
//!
//! Nothing is cached. Every read goes to disk so edits made outside the
//! agent are visible immediately. There is no locking: a single writer is
//! assumed, and concurrent external writers to the same id race.

use async_trait::async_trait;
use std::path::Path;
use tasktier_core::entity::{Entity, EntityHeader, EntityId, is_header_separator, split_document};
use tasktier_core::error::{EntityError, StoreError};
use tasktier_core::store::RecordStore;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::atomic::write_atomic;
use crate::layout::Layout;

pub struct FileRecordStore {
    layout: Layout,
}

impl FileRecordStore {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    fn io_error(&self, path: &Path, e: std::io::Error, id: &EntityId) -> StoreError {
        if e.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(id.to_string())
        } else {
            StoreError::Io {
                path: self.layout.relative(path),
                reason: e.to_string(),
            }
        }
    }

    fn check_identity(id: &EntityId, header: &EntityHeader) -> Result<(), StoreError> {
        if &header.id != id {
            return Err(StoreError::InvalidEntity {
                id: id.to_string(),
                source: EntityError::IdMismatch {
                    header: header.id.to_string(),
                    file: id.to_string(),
                },
            });
        }
        Ok(())
    }

    async fn read_full(&self, id: &EntityId) -> Result<String, StoreError> {
        let path = self.layout.entity_path(id);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| self.io_error(&path, e, id))
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn list_ids(&self) -> Result<Vec<EntityId>, StoreError> {
        let dir = self.layout.records_dir();
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(dir = %dir.display(), "Records directory absent, store is empty");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(StoreError::Io {
                    path: self.layout.relative(dir),
                    reason: e.to_string(),
                });
            }
        };

        let mut ids = Vec::new();
        loop {
            let entry = entries.next_entry().await.map_err(|e| StoreError::Io {
                path: self.layout.relative(dir),
                reason: e.to_string(),
            })?;
            let Some(entry) = entry else { break };
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            if let Some(id) = entry.file_name().to_str().and_then(EntityId::from_file_name) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Reads lines only up to the first separator line; the body is never touched.
    async fn header(&self, id: &EntityId) -> Result<EntityHeader, StoreError> {
        let path = self.layout.entity_path(id);
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| self.io_error(&path, e, id))?;

        let mut lines = BufReader::new(file).lines();
        let mut block = String::new();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| self.io_error(&path, e, id))?
        {
            if is_header_separator(&line) {
                break;
            }
            block.push_str(&line);
            block.push('\n');
        }

        let header = EntityHeader::parse(&block).map_err(|source| StoreError::InvalidEntity {
            id: id.to_string(),
            source,
        })?;
        Self::check_identity(id, &header)?;
        Ok(header)
    }

    async fn body(&self, id: &EntityId) -> Result<String, StoreError> {
        let text = self.read_full(id).await?;
        Ok(split_document(&text).1.to_string())
    }

    async fn get(&self, id: &EntityId) -> Result<Entity, StoreError> {
        let text = self.read_full(id).await?;
        let entity = Entity::parse(&text).map_err(|source| StoreError::InvalidEntity {
            id: id.to_string(),
            source,
        })?;
        Self::check_identity(id, &entity.header)?;
        Ok(entity)
    }

    async fn put_document(&self, id: &EntityId, text: &str) -> Result<(), StoreError> {
        let entity = Entity::parse(text).map_err(|source| StoreError::InvalidEntity {
            id: id.to_string(),
            source,
        })?;
        Self::check_identity(id, &entity.header)?;

        let path = self.layout.entity_path(id);
        write_atomic(&path, text.as_bytes())
            .await
            .map_err(|e| StoreError::Io {
                path: self.layout.relative(&path),
                reason: e.to_string(),
            })?;
        debug!(id = %id, bytes = text.len(), "Entity document stored");
        Ok(())
    }

    fn location(&self, id: &EntityId) -> String {
        self.layout.relative(&self.layout.entity_path(id))
    }
}
