//! Embedded DNS resolver (spec §4.5): a chain-of-responsibility stack
//! answering UDP queries for container hostnames, backed by the network
//! service.

pub mod composite;
pub mod container_lookup;
pub mod host_table;
pub mod message;
pub mod nxdomain;
pub mod server;
pub mod validator;

use async_trait::async_trait;
use message::DnsMessage;

/// A node in the resolver chain. `None` means "not mine, try the next
/// handler"; terminal leaves never return `None`.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn answer(&self, query: &DnsMessage) -> Option<DnsMessage>;
}

pub use server::DnsServer;
