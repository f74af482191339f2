//! Minimal network service (ambient addition, SPEC_FULL.md §0): backs the
//! DNS container-lookup leaf and the `network.*` harness routes with a
//! simple incrementing allocator over a private /24. The real container
//! networking stack is out of scope; this is just enough state for the
//! DNS resolver chain to have a network service to call into, per spec
//! §4.5's "asks the network service to resolve" requirement.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::{AppError, AppResult};

const SUBNET_PREFIX: &str = "10.88.0";
const SUBNET_CIDR: u8 = 24;
const FIRST_HOST_OCTET: u8 = 2;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IpAllocation {
    /// `"A.B.C.D/prefix"`, as spec §3 defines it.
    pub address: String,
}

impl IpAllocation {
    /// The DNS resolver chain strips the prefix to get the host address.
    pub fn host_address(&self) -> &str {
        self.address.split('/').next().unwrap_or(&self.address)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    Running,
    Disabled,
}

struct Inner {
    state: NetworkState,
    allocations: HashMap<String, IpAllocation>,
    next_octet: u8,
}

/// Singleton actor; state is protected by an async mutex so operations
/// serialize the way spec §5 requires of every service actor.
#[derive(Clone)]
pub struct NetworkService {
    inner: Arc<Mutex<Inner>>,
}

impl NetworkService {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: NetworkState::Running,
                allocations: HashMap::new(),
                next_octet: FIRST_HOST_OCTET,
            })),
        }
    }

    pub async fn state(&self) -> NetworkState {
        self.inner.lock().await.state
    }

    pub async fn disable_allocator(&self) {
        self.inner.lock().await.state = NetworkState::Disabled;
    }

    /// Assigns the next free address in the subnet to `name`, idempotently
    /// — a repeat allocate for an already-allocated name returns its
    /// existing address rather than consuming a fresh one.
    pub async fn allocate(&self, name: &str) -> AppResult<IpAllocation> {
        let mut inner = self.inner.lock().await;
        if inner.state == NetworkState::Disabled {
            return Err(AppError::invalid_state("network allocator is disabled"));
        }
        if let Some(existing) = inner.allocations.get(name) {
            return Ok(existing.clone());
        }
        if inner.next_octet == 255 {
            return Err(AppError::internal("network address space exhausted"));
        }
        let octet = inner.next_octet;
        inner.next_octet += 1;
        let allocation = IpAllocation {
            address: format!("{SUBNET_PREFIX}.{octet}/{SUBNET_CIDR}"),
        };
        info!(name, address = %allocation.address, "allocated container address");
        inner.allocations.insert(name.to_string(), allocation.clone());
        Ok(allocation)
    }

    pub async fn deallocate(&self, name: &str) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.allocations.remove(name).is_none() {
            return Err(AppError::not_found(format!("no allocation for {name}")));
        }
        Ok(())
    }

    /// Used by the DNS container-lookup leaf (spec §4.5): resolve a
    /// hostname to its current allocation, if any.
    pub async fn lookup(&self, name: &str) -> Option<IpAllocation> {
        self.inner.lock().await.allocations.get(name).cloned()
    }
}

impl Default for NetworkService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allocate_is_idempotent_per_name() {
        let net = NetworkService::new();
        let a = net.allocate("foo").await.unwrap();
        let b = net.allocate("foo").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn distinct_names_get_distinct_addresses() {
        let net = NetworkService::new();
        let a = net.allocate("foo").await.unwrap();
        let b = net.allocate("bar").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn disabled_allocator_rejects_new_allocations() {
        let net = NetworkService::new();
        net.disable_allocator().await;
        let err = net.allocate("foo").await.unwrap_err();
        assert_eq!(err.code, crate::error::AppErrorCode::InvalidState);
    }

    #[tokio::test]
    async fn lookup_after_allocate_round_trips() {
        let net = NetworkService::new();
        net.allocate("srv1").await.unwrap();
        let found = net.lookup("srv1").await.unwrap();
        assert_eq!(found.host_address(), "10.88.0.2");
    }
}
