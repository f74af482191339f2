//! Volumes Service (spec §4.7): creates, lists, inspects, and deletes
//! named volumes backed by an EXT4 block file, enforcing "not in use" on
//! delete via the Containers Service's critical section.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use crate::containers::ContainersService;
use crate::entity_store::{Entity, EntityStore};
use crate::error::{AppError, AppResult};

const DEFAULT_SIZE_BYTES: u64 = 512 * 1024 * 1024 * 1024;
const MIN_SIZE_BYTES: u64 = 1024 * 1024;
const VOLUME_IMAGE_NAME: &str = "volume.img";

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,254}$").unwrap());

pub fn is_valid_volume_name(name: &str) -> bool {
    NAME_PATTERN.is_match(name)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Volume {
    pub name: String,
    pub driver: String,
    pub format: String,
    pub source: PathBuf,
    pub labels: HashMap<String, String>,
    pub options: HashMap<String, String>,
}

impl Entity for Volume {
    fn id(&self) -> &str {
        &self.name
    }
}

/// The EXT4 formatter is a Non-goal collaborator (spec §1); this trait is
/// the seam, with a default implementation that shells out to
/// `mkfs.ext4`, the same way the rest of this codebase shells out to
/// external tools rather than reimplementing them.
#[async_trait]
pub trait BlockFormatter: Send + Sync {
    async fn format(&self, path: &std::path::Path, size_bytes: u64) -> AppResult<()>;
}

pub struct Mkfs;

#[async_trait]
impl BlockFormatter for Mkfs {
    async fn format(&self, path: &std::path::Path, size_bytes: u64) -> AppResult<()> {
        let file = tokio::fs::File::create(path).await?;
        file.set_len(size_bytes).await?;
        drop(file);

        let mkfs = which::which("mkfs.ext4")
            .map_err(|e| AppError::internal(format!("mkfs.ext4 not found on PATH: {e}")))?;

        let output = tokio::process::Command::new(mkfs)
            .arg("-F")
            .arg("-q")
            .arg(path)
            .output()
            .await
            .map_err(|e| AppError::internal(format!("failed to spawn mkfs.ext4: {e}")))?;

        if !output.status.success() {
            return Err(AppError::internal(format!(
                "mkfs.ext4 failed for {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }
}

/// Parses spec §3/§6's binary-unit size strings (`512M`, `2G`, …). Bare
/// digit strings are bytes.
pub fn parse_size(raw: &str) -> AppResult<u64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AppError::invalid_argument("empty size string"));
    }
    let (digits, multiplier) = match raw.chars().last().unwrap() {
        'K' | 'k' => (&raw[..raw.len() - 1], 1024u64),
        'M' | 'm' => (&raw[..raw.len() - 1], 1024u64.pow(2)),
        'G' | 'g' => (&raw[..raw.len() - 1], 1024u64.pow(3)),
        'T' | 't' => (&raw[..raw.len() - 1], 1024u64.pow(4)),
        _ => (raw, 1u64),
    };
    let value: u64 = digits
        .trim()
        .parse()
        .map_err(|_| AppError::invalid_argument(format!("invalid size {raw}")))?;
    let bytes = value
        .checked_mul(multiplier)
        .ok_or_else(|| AppError::invalid_argument(format!("size {raw} overflows")))?;
    if bytes < MIN_SIZE_BYTES {
        return Err(AppError::invalid_argument(format!(
            "size {raw} is below the 1 MiB minimum"
        )));
    }
    Ok(bytes)
}

pub struct VolumesService {
    root: PathBuf,
    store: EntityStore<Volume>,
    formatter: Arc<dyn BlockFormatter>,
    /// Guards mutating operations; `list`/`inspect` don't take it (spec §4.7).
    lock: Mutex<()>,
}

impl VolumesService {
    pub async fn open(root: impl Into<PathBuf>, formatter: Arc<dyn BlockFormatter>) -> AppResult<Self> {
        let root = root.into();
        let store = EntityStore::open(&root).await?;
        Ok(Self {
            root,
            store,
            formatter,
            lock: Mutex::new(()),
        })
    }

    pub async fn list(&self) -> Vec<Volume> {
        self.store.list().await
    }

    pub async fn inspect(&self, name: &str) -> AppResult<Volume> {
        if !is_valid_volume_name(name) {
            return Err(AppError::invalid_argument(format!("invalid volume name {name}")));
        }
        self.store
            .retrieve(name)
            .await
            .ok_or_else(|| AppError::not_found(format!("volume {name} not found")))
    }

    pub async fn create(
        &self,
        name: &str,
        driver: Option<&str>,
        driver_opts: HashMap<String, String>,
        labels: HashMap<String, String>,
    ) -> AppResult<Volume> {
        if !is_valid_volume_name(name) {
            return Err(AppError::invalid_argument(format!("invalid volume name {name}")));
        }
        let _guard = self.lock.lock().await;

        if self.store.retrieve(name).await.is_some() {
            return Err(AppError::exists(format!("volume {name} already exists")));
        }

        let size_bytes = match driver_opts.get("size") {
            Some(raw) => parse_size(raw)?,
            None => DEFAULT_SIZE_BYTES,
        };

        let source = self.store.entity_dir_path(name).join(VOLUME_IMAGE_NAME);
        self.formatter.format(&source, size_bytes).await?;

        let volume = Volume {
            name: name.to_string(),
            driver: driver.unwrap_or("local").to_string(),
            format: "ext4".to_string(),
            source,
            labels,
            options: driver_opts,
        };
        self.store.create(volume.clone()).await?;
        info!(name, size_bytes, "created volume");
        Ok(volume)
    }

    /// Deletes `name`, first checking — inside the Containers Service's
    /// critical section — that no container mounts it (spec §4.7). The
    /// check, the store delete, and the directory removal all happen
    /// while Containers still holds its lock.
    pub async fn delete(&self, name: &str, containers: &ContainersService) -> AppResult<()> {
        if !is_valid_volume_name(name) {
            return Err(AppError::invalid_argument(format!("invalid volume name {name}")));
        }
        let _guard = self.lock.lock().await;

        if self.store.retrieve(name).await.is_none() {
            return Err(AppError::not_found(format!("volume {name} not found")));
        }

        // The check, the store delete, and the directory removal all run
        // inside the Containers Service's critical section (spec §4.7):
        // they're atomic with respect to concurrent container creates.
        let store = &self.store;
        let dir = self.root.join(name);
        containers
            .with_container_list(move |list| {
                Box::pin(async move {
                    for container in list {
                        for mount in &container.configuration.mounts {
                            if mount.is_volume && mount.volume_name.as_deref() == Some(name) {
                                return Err(AppError::volume_in_use(name));
                            }
                        }
                    }
                    store.delete(name).await?;
                    if tokio::fs::try_exists(&dir).await.unwrap_or(false) {
                        tokio::fs::remove_dir_all(&dir).await?;
                    }
                    Ok(())
                })
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::containers::{Container, ContainerConfiguration, Mount};

    struct FakeFormatter;

    #[async_trait]
    impl BlockFormatter for FakeFormatter {
        async fn format(&self, path: &std::path::Path, size_bytes: u64) -> AppResult<()> {
            let file = tokio::fs::File::create(path).await?;
            file.set_len(size_bytes).await?;
            Ok(())
        }
    }

    #[test]
    fn name_validation_boundaries() {
        assert!(is_valid_volume_name("a"));
        assert!(is_valid_volume_name(&"a".repeat(255)));
        assert!(!is_valid_volume_name(&"a".repeat(256)));
        assert!(!is_valid_volume_name(""));
        assert!(!is_valid_volume_name("-leading-dash"));
        assert!(!is_valid_volume_name("caf\u{e9}"));
    }

    #[test]
    fn size_parsing_units() {
        assert_eq!(parse_size("1M").unwrap(), 1024 * 1024);
        assert_eq!(parse_size("2G").unwrap(), 2 * 1024 * 1024 * 1024);
        assert!(parse_size("100").is_err());
        assert!(parse_size("0K").is_err());
    }

    #[tokio::test]
    async fn lifecycle_create_list_inspect() {
        let dir = tempfile::tempdir().unwrap();
        let service = VolumesService::open(dir.path(), Arc::new(FakeFormatter)).await.unwrap();

        let volume = service.create("data", None, HashMap::new(), HashMap::new()).await.unwrap();
        assert_eq!(volume.format, "ext4");
        assert!(service.list().await.iter().any(|v| v.name == "data"));

        let err = service.create("data", None, HashMap::new(), HashMap::new()).await.unwrap_err();
        assert_eq!(err.code, crate::error::AppErrorCode::Exists);

        assert_eq!(service.inspect("data").await.unwrap().name, "data");
    }

    #[tokio::test]
    async fn delete_in_use_then_succeeds_after_container_removed() {
        let dir = tempfile::tempdir().unwrap();
        let service = VolumesService::open(dir.path(), Arc::new(FakeFormatter)).await.unwrap();
        service.create("data", None, HashMap::new(), HashMap::new()).await.unwrap();

        let containers = ContainersService::new();
        containers
            .create(Container {
                id: "c1".to_string(),
                configuration: ContainerConfiguration {
                    mounts: vec![Mount {
                        mount_type: "volume".to_string(),
                        source: "data".to_string(),
                        destination: "/mnt".to_string(),
                        options: vec![],
                        volume_name: Some("data".to_string()),
                        is_volume: true,
                    }],
                },
            })
            .await
            .unwrap();

        let err = service.delete("data", &containers).await.unwrap_err();
        assert_eq!(err.code, crate::error::AppErrorCode::InvalidState);

        containers.delete("c1").await.unwrap();
        service.delete("data", &containers).await.unwrap();
        assert!(service.inspect("data").await.is_err());
    }
}
