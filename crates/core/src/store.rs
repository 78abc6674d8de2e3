//! RecordStore trait: the repository over entity records.
//!
//! Split into a cheap header read and a separate body read so a search can
//! filter on headers without loading full content.

use async_trait::async_trait;

use crate::entity::{Entity, EntityHeader, EntityId};
use crate::error::StoreError;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// A human-readable name for this backend.
    fn name(&self) -> &str;

    /// Every entity id in the store, sorted. Files that are not entity
    /// files are ignored; an absent store is empty.
    async fn list_ids(&self) -> Result<Vec<EntityId>, StoreError>;

    /// Read and validate only the header of one entity.
    async fn header(&self, id: &EntityId) -> Result<EntityHeader, StoreError>;

    /// Read only the body of one entity.
    async fn body(&self, id: &EntityId) -> Result<String, StoreError>;

    /// Read the full entity.
    async fn get(&self, id: &EntityId) -> Result<Entity, StoreError>;

    /// Persist a document exactly as given, replacing any existing record
    /// atomically. The text must parse as an entity whose id is `id`;
    /// nothing is written otherwise.
    async fn put_document(&self, id: &EntityId, text: &str) -> Result<(), StoreError>;

    /// Where an entity lives, as reported to the model (a project-relative
    /// path for file backends).
    fn location(&self, id: &EntityId) -> String;
}
