//! Host supervisor contract (spec §4.6 "registration"): the real system
//! registers plugins with launchd; here the supervisor is a trait so the
//! Plugins Service is testable without an actual process-control backend,
//! plus an in-memory implementation that tracks the same state a real
//! supervisor would surface (registered labels, their mach services, and
//! whether they're set to run at load).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisedService {
    pub mach_services: Vec<String>,
    pub run_at_load: bool,
}

#[async_trait]
pub trait HostSupervisor: Send + Sync {
    async fn register(&self, label: &str, mach_services: Vec<String>, run_at_load: bool) -> AppResult<()>;
    async fn deregister(&self, label: &str) -> AppResult<()>;
    /// Kicks the supervised service in place without deregistering it.
    async fn restart(&self, label: &str) -> AppResult<()>;
}

#[derive(Default)]
pub struct InMemorySupervisor {
    services: Mutex<HashMap<String, SupervisedService>>,
}

impl InMemorySupervisor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl HostSupervisor for InMemorySupervisor {
    async fn register(&self, label: &str, mach_services: Vec<String>, run_at_load: bool) -> AppResult<()> {
        info!(label, run_at_load, "registering plugin with host supervisor");
        self.services.lock().await.insert(
            label.to_string(),
            SupervisedService { mach_services, run_at_load },
        );
        Ok(())
    }

    async fn deregister(&self, label: &str) -> AppResult<()> {
        self.services.lock().await.remove(label);
        Ok(())
    }

    async fn restart(&self, label: &str) -> AppResult<()> {
        let services = self.services.lock().await;
        if !services.contains_key(label) {
            return Err(AppError::not_found(format!("{label} is not registered")));
        }
        info!(label, "restarting supervised service");
        Ok(())
    }
}
