//! Containers Service contract (spec §4.8): only the surface the core
//! depends on. `create`/`delete` here are minimal real implementations
//! backing that contract — the actual sandbox lifecycle (`logs`,
//! `handleContainerEvents`, the virtualization layer) is a Non-goal
//! collaborator (spec §1) and is not modeled.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mount {
    #[serde(rename = "type")]
    pub mount_type: String,
    pub source: String,
    pub destination: String,
    pub options: Vec<String>,
    pub volume_name: Option<String>,
    pub is_volume: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ContainerConfiguration {
    pub mounts: Vec<Mount>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Container {
    pub id: String,
    pub configuration: ContainerConfiguration,
}

#[derive(Default)]
pub struct ContainersService {
    containers: Arc<Mutex<HashMap<String, Container>>>,
}

impl ContainersService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn list(&self) -> Vec<Container> {
        self.containers.lock().await.values().cloned().collect()
    }

    pub async fn create(&self, container: Container) -> AppResult<()> {
        let mut containers = self.containers.lock().await;
        if containers.contains_key(&container.id) {
            return Err(AppError::exists(format!("container {} already exists", container.id)));
        }
        containers.insert(container.id.clone(), container);
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> AppResult<()> {
        let mut containers = self.containers.lock().await;
        if containers.remove(id).is_none() {
            return Err(AppError::not_found(format!("container {id} not found")));
        }
        Ok(())
    }

    /// Runs `body` against a snapshot of the container list while holding
    /// this service's exclusive lock (spec §4.8). This is the one
    /// documented cross-service critical section: Volumes' delete uses it
    /// to check "not in use" and perform its own delete atomically with
    /// respect to container creates. Containers itself must never call
    /// into another service from inside `body` — that direction is the
    /// one design note 9 forbids.
    pub async fn with_container_list<'a, F>(&'a self, body: F) -> AppResult<()>
    where
        F: FnOnce(Vec<Container>) -> BoxFuture<'a, AppResult<()>> + Send + 'a,
    {
        let containers = self.containers.lock().await;
        let snapshot = containers.values().cloned().collect();
        // The lock stays held (via `containers`) for the duration of
        // `body`'s future, which is the whole point of the critical section.
        let result = body(snapshot).await;
        drop(containers);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mount_for(volume: &str) -> Mount {
        Mount {
            mount_type: "volume".to_string(),
            source: volume.to_string(),
            destination: "/mnt".to_string(),
            options: vec![],
            volume_name: Some(volume.to_string()),
            is_volume: true,
        }
    }

    #[tokio::test]
    async fn create_delete_round_trip() {
        let service = ContainersService::new();
        service
            .create(Container { id: "c1".into(), configuration: ContainerConfiguration::default() })
            .await
            .unwrap();
        assert_eq!(service.list().await.len(), 1);
        service.delete("c1").await.unwrap();
        assert!(service.list().await.is_empty());
    }

    #[tokio::test]
    async fn with_container_list_sees_committed_mounts() {
        let service = ContainersService::new();
        service
            .create(Container {
                id: "c1".into(),
                configuration: ContainerConfiguration { mounts: vec![mount_for("data")] },
            })
            .await
            .unwrap();

        let found = service
            .with_container_list(|list| {
                Box::pin(async move {
                    let has_data = list.iter().any(|c| {
                        c.configuration.mounts.iter().any(|m| m.volume_name.as_deref() == Some("data"))
                    });
                    if has_data {
                        Err(AppError::volume_in_use("data"))
                    } else {
                        Ok(())
                    }
                })
            })
            .await;
        assert!(found.is_err());
    }
}
