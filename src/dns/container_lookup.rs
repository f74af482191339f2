use async_trait::async_trait;

use super::message::{DnsMessage, RecordType, ResourceRecord, ReturnCode};
use super::Handler;
use crate::network::NetworkService;

/// The only network-aware leaf in the chain (spec §4.5 step 3): resolves
/// `question.name` against the network service's current allocations.
pub struct ContainerLookup {
    network: NetworkService,
    ttl: u32,
}

impl ContainerLookup {
    pub fn new(network: NetworkService) -> Self {
        Self { network, ttl: 5 }
    }

    pub fn with_ttl(network: NetworkService, ttl: u32) -> Self {
        Self { network, ttl }
    }
}

#[async_trait]
impl Handler for ContainerLookup {
    async fn answer(&self, query: &DnsMessage) -> Option<DnsMessage> {
        let question = query.questions.first()?;
        match question.qtype {
            RecordType::Host => {
                let allocation = self.network.lookup(&question.name).await?;
                let addr: std::net::Ipv4Addr = allocation.host_address().parse().ok()?;
                let record = ResourceRecord::host(question.name.clone(), self.ttl, addr);
                Some(query.response_with_answers(vec![record]))
            }
            ref t if t.is_known_unsupported() => Some(query.response_to(ReturnCode::NotImplemented)),
            _ => Some(query.response_to(ReturnCode::FormatError)),
        }
    }
}
