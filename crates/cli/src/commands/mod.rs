pub mod chat;
pub mod init;
pub mod search;
pub mod skills;

use std::path::Path;
use std::sync::Arc;

use tasktier_config::AppConfig;
use tasktier_core::store::RecordStore;
use tasktier_store::{FileRecordStore, Layout};

/// Configuration and storage for one project root.
pub struct Project {
    pub config: AppConfig,
    pub layout: Layout,
    pub store: Arc<dyn RecordStore>,
}

impl Project {
    pub fn open(root: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let config = AppConfig::load(root).map_err(|e| format!("Failed to load config: {e}"))?;
        let layout = Layout::new(root, &config.store.records_dir, &config.store.skills_dir)?;
        let store: Arc<dyn RecordStore> = Arc::new(FileRecordStore::new(layout.clone()));
        Ok(Self {
            config,
            layout,
            store,
        })
    }
}
