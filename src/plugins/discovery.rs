//! Plugin bundle discovery (spec §4.6): recognizes a directory as a
//! plugin by trying a fixed list of on-disk layouts in order.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::AppResult;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceDeclaration {
    #[serde(rename = "type")]
    pub service_type: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServicesConfig {
    pub load_at_boot: bool,
    pub run_at_load: bool,
    pub services: Vec<ServiceDeclaration>,
    #[serde(default)]
    pub default_arguments: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PluginConfig {
    #[serde(rename = "abstract")]
    pub abstract_: String,
    pub author: String,
    pub services_config: Option<ServicesConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Plugin {
    pub name: String,
    pub binary_url: String,
    pub config: PluginConfig,
}

impl Plugin {
    /// CLI-only iff `servicesConfig` is absent (spec §3).
    pub fn is_cli_only(&self) -> bool {
        self.config.services_config.is_none()
    }

    pub fn launchd_label(&self, instance_id: Option<&str>) -> String {
        match instance_id {
            Some(id) => format!("com.apple.container.{}.{}", self.name, id),
            None => format!("com.apple.container.{}", self.name),
        }
    }

    pub fn mach_service(&self, service_type: &str, instance_id: Option<&str>) -> String {
        match instance_id {
            Some(id) => format!("com.apple.container.{service_type}.{}.{id}", self.name),
            None => format!("com.apple.container.{service_type}.{}", self.name),
        }
    }

    /// `machServices()` over every declared service (spec §8 "Plugin mach labels").
    pub fn mach_services(&self, instance_id: Option<&str>) -> Vec<String> {
        self.config
            .services_config
            .as_ref()
            .map(|sc| {
                sc.services
                    .iter()
                    .map(|s| self.mach_service(&s.service_type, instance_id))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// A recognizer for one on-disk plugin layout. Returning `Ok(None)` means
/// "this directory is not a plugin under this layout"; an `Err` means the
/// recognizer itself failed and should propagate, per spec §4.6.
#[async_trait]
pub trait LayoutFactory: Send + Sync {
    async fn recognize(&self, entry: &Path) -> AppResult<Option<Plugin>>;
}

/// `<root>/<name>/config.json` + `<root>/<name>/bin/<name>`.
pub struct DefaultLayoutFactory;

#[async_trait]
impl LayoutFactory for DefaultLayoutFactory {
    async fn recognize(&self, entry: &Path) -> AppResult<Option<Plugin>> {
        let Some(name) = entry.file_name().and_then(|n| n.to_str()) else {
            return Ok(None);
        };
        let config_path = entry.join("config.json");
        let binary_path = entry.join("bin").join(name);
        load_if_present(name, &config_path, &binary_path).await
    }
}

/// `<root>/<name>.app/Contents/Resources/config.json` +
/// `<root>/<name>.app/Contents/MacOS/<name>`.
pub struct AppBundleLayoutFactory;

#[async_trait]
impl LayoutFactory for AppBundleLayoutFactory {
    async fn recognize(&self, entry: &Path) -> AppResult<Option<Plugin>> {
        let Some(file_name) = entry.file_name().and_then(|n| n.to_str()) else {
            return Ok(None);
        };
        let Some(name) = file_name.strip_suffix(".app") else {
            return Ok(None);
        };
        let config_path = entry.join("Contents").join("Resources").join("config.json");
        let binary_path = entry.join("Contents").join("MacOS").join(name);
        load_if_present(name, &config_path, &binary_path).await
    }
}

async fn load_if_present(name: &str, config_path: &Path, binary_path: &Path) -> AppResult<Option<Plugin>> {
    if !fs::try_exists(config_path).await.unwrap_or(false)
        || !fs::try_exists(binary_path).await.unwrap_or(false)
    {
        return Ok(None);
    }
    let bytes = fs::read(config_path).await?;
    let config: PluginConfig = serde_json::from_slice(&bytes)?;
    Ok(Some(Plugin {
        name: name.to_string(),
        binary_url: binary_path.to_string_lossy().into_owned(),
        config,
    }))
}

/// Tries every factory, in order, against every top-level entry of every
/// search directory; the first factory to recognize an entry wins.
pub async fn discover_all(
    dirs: &[PathBuf],
    factories: &[Box<dyn LayoutFactory>],
) -> AppResult<Vec<Plugin>> {
    let mut found = Vec::new();
    for dir in dirs {
        let mut entries = match fs::read_dir(dir).await {
            Ok(e) => e,
            Err(_) => continue,
        };
        while let Some(entry) = entries.next_entry().await? {
            if let Some(plugin) = recognize_entry(&entry.path(), factories).await? {
                found.push(plugin);
            }
        }
    }
    Ok(found)
}

pub async fn discover_one(
    dirs: &[PathBuf],
    factories: &[Box<dyn LayoutFactory>],
    name: &str,
) -> AppResult<Option<Plugin>> {
    for dir in dirs {
        let mut entries = match fs::read_dir(dir).await {
            Ok(e) => e,
            Err(_) => continue,
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let matches_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n == name || n == format!("{name}.app"))
                .unwrap_or(false);
            if !matches_name {
                continue;
            }
            if let Some(plugin) = recognize_entry(&path, factories).await? {
                return Ok(Some(plugin));
            }
        }
    }
    Ok(None)
}

async fn recognize_entry(
    path: &Path,
    factories: &[Box<dyn LayoutFactory>],
) -> AppResult<Option<Plugin>> {
    for factory in factories {
        if let Some(plugin) = factory.recognize(path).await? {
            return Ok(Some(plugin));
        }
    }
    Ok(None)
}

pub fn default_factories() -> Vec<Box<dyn LayoutFactory>> {
    vec![Box::new(DefaultLayoutFactory), Box::new(AppBundleLayoutFactory)]
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write_default_layout(root: &Path, name: &str, with_services: bool) {
        let dir = root.join(name);
        fs::create_dir_all(dir.join("bin")).await.unwrap();
        fs::write(dir.join("bin").join(name), b"#!/bin/sh\n").await.unwrap();
        let config = if with_services {
            serde_json::json!({
                "abstract": "a plugin",
                "author": "test",
                "servicesConfig": {
                    "loadAtBoot": false,
                    "runAtLoad": true,
                    "services": [{"type": "runtime"}],
                    "defaultArguments": []
                }
            })
        } else {
            serde_json::json!({"abstract": "a plugin", "author": "test"})
        };
        fs::write(dir.join("config.json"), serde_json::to_vec(&config).unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn discovers_cli_and_service_plugins_and_skips_incomplete_directories() {
        let dir = tempfile::tempdir().unwrap();
        write_default_layout(dir.path(), "cli", false).await;
        write_default_layout(dir.path(), "service", true).await;
        // "empty": no config.json and no bin/ -> not a plugin, not an error.
        fs::create_dir_all(dir.path().join("empty")).await.unwrap();

        let dirs = vec![dir.path().to_path_buf()];
        let factories = default_factories();
        let mut found = discover_all(&dirs, &factories).await.unwrap();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "cli");
        assert!(found[0].is_cli_only());
        assert_eq!(found[1].name, "service");
        assert!(!found[1].is_cli_only());
    }

    #[tokio::test]
    async fn discover_one_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let dirs = vec![dir.path().to_path_buf()];
        let factories = default_factories();
        assert!(discover_one(&dirs, &factories, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_config_propagates_as_error_not_a_missing_plugin() {
        let dir = tempfile::tempdir().unwrap();
        let plugin_dir = dir.path().join("broken");
        fs::create_dir_all(plugin_dir.join("bin")).await.unwrap();
        fs::write(plugin_dir.join("bin").join("broken"), b"#!/bin/sh\n").await.unwrap();
        // Both files are present, so the layout is recognized, but the
        // config body doesn't parse as `PluginConfig`.
        fs::write(plugin_dir.join("config.json"), b"{ not json").await.unwrap();

        let dirs = vec![dir.path().to_path_buf()];
        let factories = default_factories();

        assert!(discover_one(&dirs, &factories, "broken").await.is_err());
        assert!(discover_all(&dirs, &factories).await.is_err());
    }

    #[tokio::test]
    async fn mach_services_are_suffixed_by_instance() {
        let plugin = Plugin {
            name: "hydra".to_string(),
            binary_url: "/bin/hydra".to_string(),
            config: PluginConfig {
                abstract_: "x".into(),
                author: "y".into(),
                services_config: Some(ServicesConfig {
                    load_at_boot: false,
                    run_at_load: true,
                    services: vec![
                        ServiceDeclaration { service_type: "runtime".into(), description: None },
                        ServiceDeclaration { service_type: "network".into(), description: None },
                    ],
                    default_arguments: vec![],
                }),
            },
        };
        assert_eq!(
            plugin.mach_services(None),
            vec![
                "com.apple.container.runtime.hydra".to_string(),
                "com.apple.container.network.hydra".to_string(),
            ]
        );
        assert_eq!(
            plugin.mach_services(Some("1")),
            vec![
                "com.apple.container.runtime.hydra.1".to_string(),
                "com.apple.container.network.hydra.1".to_string(),
            ]
        );
    }
}
