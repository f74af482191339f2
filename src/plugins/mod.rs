//! Plugin Loader & Service (spec §4.6): discovers plugin bundles,
//! registers them with the host supervisor, and tracks the loaded map.

pub mod discovery;
pub mod supervisor;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{AppError, AppResult};
pub use discovery::Plugin;
use discovery::LayoutFactory;
use supervisor::HostSupervisor;

/// A fresh per-instance id for addressing a new instantiation of a plugin
/// (spec §4.6 "per-instance addressing").
pub fn new_instance_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub struct PluginsService {
    search_dirs: Vec<PathBuf>,
    factories: Vec<Box<dyn LayoutFactory>>,
    supervisor: Arc<dyn HostSupervisor>,
    loaded: Mutex<HashMap<String, Plugin>>,
}

impl PluginsService {
    pub fn new(search_dirs: Vec<PathBuf>, supervisor: Arc<dyn HostSupervisor>) -> Self {
        Self {
            search_dirs,
            factories: discovery::default_factories(),
            supervisor,
            loaded: Mutex::new(HashMap::new()),
        }
    }

    pub async fn find_plugins(&self) -> AppResult<Vec<Plugin>> {
        discovery::discover_all(&self.search_dirs, &self.factories).await
    }

    pub async fn find_plugin(&self, name: &str) -> AppResult<Option<Plugin>> {
        discovery::discover_one(&self.search_dirs, &self.factories, name).await
    }

    pub async fn list(&self) -> Vec<Plugin> {
        self.loaded.lock().await.values().cloned().collect()
    }

    pub async fn get(&self, name: &str) -> AppResult<Plugin> {
        self.loaded
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::plugin_not_loaded(name))
    }

    /// Loads `name`, optionally as a named instance (spec §4.6
    /// "per-instance addressing"). A repeat load of the same (name,
    /// instance) pair is a no-op.
    pub async fn load(&self, name: &str, instance_id: Option<&str>) -> AppResult<()> {
        let key = loaded_key(name, instance_id);
        if self.loaded.lock().await.contains_key(&key) {
            return Ok(());
        }

        let plugin = self
            .find_plugin(name)
            .await?
            .ok_or_else(|| AppError::plugin_not_found(name))?;

        let label = plugin.launchd_label(instance_id);
        let mach_services = plugin.mach_services(instance_id);
        let run_at_load = plugin
            .config
            .services_config
            .as_ref()
            .map(|sc| sc.run_at_load)
            .unwrap_or(false);

        self.supervisor.register(&label, mach_services, run_at_load).await?;
        self.loaded.lock().await.insert(key, plugin);
        Ok(())
    }

    pub async fn unload(&self, name: &str, instance_id: Option<&str>) -> AppResult<()> {
        let key = loaded_key(name, instance_id);
        let mut loaded = self.loaded.lock().await;
        let plugin = loaded
            .get(&key)
            .cloned()
            .ok_or_else(|| AppError::plugin_not_loaded(name))?;
        self.supervisor.deregister(&plugin.launchd_label(instance_id)).await?;
        loaded.remove(&key);
        Ok(())
    }

    pub async fn restart(&self, name: &str, instance_id: Option<&str>) -> AppResult<()> {
        let key = loaded_key(name, instance_id);
        let loaded = self.loaded.lock().await;
        let plugin = loaded
            .get(&key)
            .ok_or_else(|| AppError::plugin_not_loaded(name))?;
        self.supervisor.restart(&plugin.launchd_label(instance_id)).await
    }
}

fn loaded_key(name: &str, instance_id: Option<&str>) -> String {
    match instance_id {
        Some(id) => format!("{name}#{id}"),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::supervisor::InMemorySupervisor;
    use tokio::fs;

    async fn write_service_plugin(root: &std::path::Path, name: &str) {
        let dir = root.join(name);
        fs::create_dir_all(dir.join("bin")).await.unwrap();
        fs::write(dir.join("bin").join(name), b"#!/bin/sh\n").await.unwrap();
        let config = serde_json::json!({
            "abstract": "net plugin",
            "author": "test",
            "servicesConfig": {
                "loadAtBoot": false,
                "runAtLoad": true,
                "services": [{"type": "network"}],
                "defaultArguments": []
            }
        });
        fs::write(dir.join("config.json"), serde_json::to_vec(&config).unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn load_twice_is_a_no_op_then_get_and_unload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        write_service_plugin(dir.path(), "net").await;

        let service = PluginsService::new(vec![dir.path().to_path_buf()], InMemorySupervisor::new());

        service.load("net", None).await.unwrap();
        service.load("net", None).await.unwrap();

        let plugin = service.get("net").await.unwrap();
        assert_eq!(plugin.mach_services(None), vec!["com.apple.container.network.net".to_string()]);

        service.unload("net", None).await.unwrap();
        let err = service.get("net").await.unwrap_err();
        assert_eq!(err.code, crate::error::AppErrorCode::InvalidState);
    }

    #[tokio::test]
    async fn load_missing_plugin_fails_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let service = PluginsService::new(vec![dir.path().to_path_buf()], InMemorySupervisor::new());
        let err = service.load("ghost", None).await.unwrap_err();
        assert_eq!(err.code, crate::error::AppErrorCode::NotFound);
    }

    #[tokio::test]
    async fn unload_unloaded_fails_plugin_not_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let service = PluginsService::new(vec![dir.path().to_path_buf()], InMemorySupervisor::new());
        let err = service.unload("net", None).await.unwrap_err();
        assert_eq!(err.code, crate::error::AppErrorCode::InvalidState);
    }
}
