//! EntityStore (spec §4.4): a durable map `id -> T` backed by one JSON
//! document per entity under `<root>/<id>/entity.json`, with an in-memory
//! index for fast lookup. Internally single-threaded: all mutating
//! operations are serialized behind an async mutex so callers never race
//! each other on the same directory tree.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::{AppError, AppResult};

const ENTITY_FILE: &str = "entity.json";

/// Implemented by anything the store can persist: a stable string id plus
/// JSON (de)serializability.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn id(&self) -> &str;
}

pub struct EntityStore<T: Entity> {
    root: PathBuf,
    index: Mutex<HashMap<String, T>>,
    _marker: PhantomData<T>,
}

impl<T: Entity> EntityStore<T> {
    /// Walks `root`, decoding each `entity.json`. Malformed entries are
    /// logged and ignored — best-effort recovery across process restarts,
    /// the one place this layer swallows an error by design (spec §7).
    pub async fn open(root: impl Into<PathBuf>) -> AppResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;

        let mut index = HashMap::new();
        let mut entries = fs::read_dir(&root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let entity_path = entry.path().join(ENTITY_FILE);
            match fs::read(&entity_path).await {
                Ok(bytes) => match serde_json::from_slice::<T>(&bytes) {
                    Ok(entity) => {
                        index.insert(entity.id().to_string(), entity);
                    }
                    Err(e) => {
                        warn!(path = %entity_path.display(), error = %e, "ignoring malformed entity");
                    }
                },
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %entity_path.display(), error = %e, "ignoring unreadable entity");
                }
            }
        }

        Ok(Self {
            root,
            index: Mutex::new(index),
            _marker: PhantomData,
        })
    }

    pub async fn list(&self) -> Vec<T> {
        self.index.lock().await.values().cloned().collect()
    }

    pub async fn retrieve(&self, id: &str) -> Option<T> {
        self.index.lock().await.get(id).cloned()
    }

    fn entity_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    fn entity_path(&self, id: &str) -> PathBuf {
        self.entity_dir(id).join(ENTITY_FILE)
    }

    pub fn entity_dir_path(&self, id: &str) -> PathBuf {
        self.entity_dir(id)
    }

    /// Fails with `exists` if the metadata file is already present.
    pub async fn create(&self, entity: T) -> AppResult<()> {
        let mut index = self.index.lock().await;
        let id = entity.id().to_string();
        let path = self.entity_path(&id);
        if fs::try_exists(&path).await.unwrap_or(false) {
            return Err(AppError::exists(format!("entity {id} already exists")));
        }
        write_entity(&self.entity_dir(&id), &path, &entity).await?;
        index.insert(id, entity);
        Ok(())
    }

    /// Fails with `notFound` if the metadata file is missing.
    pub async fn update(&self, entity: T) -> AppResult<()> {
        let mut index = self.index.lock().await;
        let id = entity.id().to_string();
        let path = self.entity_path(&id);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(AppError::not_found(format!("entity {id} not found")));
        }
        write_entity(&self.entity_dir(&id), &path, &entity).await?;
        index.insert(id, entity);
        Ok(())
    }

    /// Writes unconditionally. Per spec §9's open question, this store
    /// creates the `<id>/` directory on demand rather than requiring a
    /// prior `create` — see DESIGN.md for the rationale.
    pub async fn upsert(&self, entity: T) -> AppResult<()> {
        let mut index = self.index.lock().await;
        let id = entity.id().to_string();
        let path = self.entity_path(&id);
        write_entity(&self.entity_dir(&id), &path, &entity).await?;
        index.insert(id, entity);
        Ok(())
    }

    /// Removes the entity's subdirectory recursively; fails with
    /// `notFound` if absent.
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        let mut index = self.index.lock().await;
        let dir = self.entity_dir(id);
        if !fs::try_exists(&dir).await.unwrap_or(false) {
            return Err(AppError::not_found(format!("entity {id} not found")));
        }
        fs::remove_dir_all(&dir).await?;
        index.remove(id);
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

async fn write_entity<T: Serialize>(dir: &Path, path: &Path, entity: &T) -> AppResult<()> {
    fs::create_dir_all(dir).await?;
    let bytes = serde_json::to_vec_pretty(entity)?;
    fs::write(path, bytes).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Widget {
        id: String,
        label: String,
    }

    impl Entity for Widget {
        fn id(&self) -> &str {
            &self.id
        }
    }

    fn widget(id: &str) -> Widget {
        Widget {
            id: id.to_string(),
            label: format!("label-{id}"),
        }
    }

    #[tokio::test]
    async fn create_retrieve_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::<Widget>::open(dir.path()).await.unwrap();

        store.create(widget("a")).await.unwrap();
        assert_eq!(store.retrieve("a").await, Some(widget("a")));

        let err = store.create(widget("a")).await.unwrap_err();
        assert_eq!(err.code, crate::error::AppErrorCode::Exists);

        store.delete("a").await.unwrap();
        assert_eq!(store.retrieve("a").await, None);
    }

    #[tokio::test]
    async fn update_missing_fails_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::<Widget>::open(dir.path()).await.unwrap();
        let err = store.update(widget("missing")).await.unwrap_err();
        assert_eq!(err.code, crate::error::AppErrorCode::NotFound);
    }

    #[tokio::test]
    async fn recovers_past_corrupt_siblings() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join("a")).await.unwrap();
        tokio::fs::write(
            dir.path().join("a").join("entity.json"),
            serde_json::to_vec(&widget("a")).unwrap(),
        )
        .await
        .unwrap();
        tokio::fs::create_dir_all(dir.path().join("b")).await.unwrap();
        tokio::fs::write(dir.path().join("b").join("entity.json"), b"{not json")
            .await
            .unwrap();

        let store = EntityStore::<Widget>::open(dir.path()).await.unwrap();
        let mut listed = store.list().await;
        listed.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(listed, vec![widget("a")]);

        // The corrupt sibling is not indexed, so creating "b" succeeds —
        // it just overwrites the unreadable file on disk.
        store.create(widget("b")).await.unwrap();
        assert_eq!(store.retrieve("b").await, Some(widget("b")));
    }
}
