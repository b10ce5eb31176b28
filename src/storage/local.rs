//! Local filesystem checkpoint store.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{Category, HarvestState};
use crate::storage::CheckpointStore;

/// Checkpoint store backed by JSON files under a root directory.
#[derive(Clone)]
pub struct LocalCheckpointStore {
    root_dir: PathBuf,
    slot: Option<String>,
}

impl LocalCheckpointStore {
    /// Create a store rooted at the given directory, using the default slot.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            slot: None,
        }
    }

    /// Use a named slot so parallel runs on one category never share a file.
    pub fn with_slot(mut self, slot: impl Into<String>) -> Self {
        self.slot = Some(slot.into());
        self
    }

    /// Checkpoint file path for a category.
    pub fn path(&self, category: Category) -> PathBuf {
        let file_name = match &self.slot {
            Some(slot) => format!("{}-{slot}.json", category.as_str()),
            None => format!("{}.json", category.as_str()),
        };
        self.root_dir.join(file_name)
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, category: Category, bytes: &[u8]) -> Result<()> {
        let path = self.path(category);
        let display = path.display().to_string();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::storage(&display, e))?;
        }

        let tmp = path.with_extension("json.tmp");
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| AppError::storage(&display, e))?;
        file.write_all(bytes)
            .await
            .map_err(|e| AppError::storage(&display, e))?;
        file.flush()
            .await
            .map_err(|e| AppError::storage(&display, e))?;
        drop(file);

        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| AppError::storage(&display, e))?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for LocalCheckpointStore {
    async fn load(&self, category: Category) -> Result<HarvestState> {
        let path = self.path(category);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(HarvestState::empty());
            }
            Err(e) => return Err(AppError::storage(path.display().to_string(), e)),
        };
        serde_json::from_slice(&bytes)
            .map_err(|e| AppError::storage(path.display().to_string(), e))
    }

    async fn persist(&self, category: Category, state: &HarvestState) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| AppError::storage(self.path(category).display().to_string(), e))?;
        self.write_bytes(category, &bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::phone::normalize;
    use tempfile::TempDir;

    fn state_with(phones: &[&str]) -> HarvestState {
        let mut state = HarvestState::empty();
        state.phones = phones.iter().filter_map(|raw| normalize(raw)).collect();
        state.target_count = 10;
        state
    }

    #[tokio::test]
    async fn load_missing_returns_empty_state() {
        let tmp = TempDir::new().unwrap();
        let store = LocalCheckpointStore::new(tmp.path());

        let state = store.load(Category::Agent).await.unwrap();
        assert_eq!(state.count(), 0);
        assert!(state.cursors.is_empty());
    }

    #[tokio::test]
    async fn persist_then_load_round_trips() {
        let tmp = TempDir::new().unwrap();
        let store = LocalCheckpointStore::new(tmp.path());

        let mut state = state_with(&["571233844", "595111222"]);
        state.cursors.insert("/statements".into(), 12);
        store.persist(Category::Owner, &state).await.unwrap();

        let loaded = store.load(Category::Owner).await.unwrap();
        assert_eq!(loaded.phones, state.phones);
        assert_eq!(loaded.cursor("/statements"), 12);
        assert_eq!(loaded.target_count, 10);
    }

    #[tokio::test]
    async fn categories_use_separate_files() {
        let tmp = TempDir::new().unwrap();
        let store = LocalCheckpointStore::new(tmp.path());

        store
            .persist(Category::Agent, &state_with(&["571233844"]))
            .await
            .unwrap();
        let owners = store.load(Category::Owner).await.unwrap();
        assert_eq!(owners.count(), 0);

        let agents = store.load(Category::Agent).await.unwrap();
        assert_eq!(agents.count(), 1);
    }

    #[tokio::test]
    async fn slots_use_separate_files() {
        let tmp = TempDir::new().unwrap();
        let default_store = LocalCheckpointStore::new(tmp.path());
        let slot_store = LocalCheckpointStore::new(tmp.path()).with_slot("turbo");

        default_store
            .persist(Category::Owner, &state_with(&["571233844"]))
            .await
            .unwrap();
        slot_store
            .persist(Category::Owner, &state_with(&["595111222"]))
            .await
            .unwrap();

        assert_eq!(default_store.load(Category::Owner).await.unwrap().count(), 1);
        assert_ne!(
            default_store.load(Category::Owner).await.unwrap().phones,
            slot_store.load(Category::Owner).await.unwrap().phones
        );
    }

    #[tokio::test]
    async fn interrupted_persist_leaves_previous_state_intact() {
        let tmp = TempDir::new().unwrap();
        let store = LocalCheckpointStore::new(tmp.path());

        let state = state_with(&["571233844"]);
        store.persist(Category::Agent, &state).await.unwrap();

        // A crash between temp-write and rename leaves a stray temp file;
        // the checkpoint itself must still parse as the previous state.
        let tmp_path = store.path(Category::Agent).with_extension("json.tmp");
        tokio::fs::write(&tmp_path, b"{\"phones\": [\"truncat")
            .await
            .unwrap();

        let loaded = store.load(Category::Agent).await.unwrap();
        assert_eq!(loaded.phones, state.phones);
    }

    #[tokio::test]
    async fn persist_overwrites_fully() {
        let tmp = TempDir::new().unwrap();
        let store = LocalCheckpointStore::new(tmp.path());

        store
            .persist(Category::Agent, &state_with(&["571233844", "595111222"]))
            .await
            .unwrap();
        store
            .persist(Category::Agent, &state_with(&["558777999"]))
            .await
            .unwrap();

        let loaded = store.load(Category::Agent).await.unwrap();
        assert_eq!(loaded.count(), 1);
    }
}
