use std::collections::HashMap;
use std::net::Ipv4Addr;

use async_trait::async_trait;

use super::message::{DnsMessage, RecordType, ResourceRecord, ReturnCode};
use super::Handler;

/// Optional leaf backed by a static `name -> IPv4` map (spec §4.5 step 4).
/// Same shape as `ContainerLookup` but with no suspension point.
pub struct HostTableResolver {
    entries: HashMap<String, Ipv4Addr>,
    ttl: u32,
}

impl HostTableResolver {
    pub fn new(entries: HashMap<String, Ipv4Addr>) -> Self {
        Self { entries, ttl: 300 }
    }

    pub fn with_ttl(entries: HashMap<String, Ipv4Addr>, ttl: u32) -> Self {
        Self { entries, ttl }
    }
}

#[async_trait]
impl Handler for HostTableResolver {
    async fn answer(&self, query: &DnsMessage) -> Option<DnsMessage> {
        let question = query.questions.first()?;
        match question.qtype {
            RecordType::Host => {
                let addr = *self.entries.get(&question.name)?;
                let record = ResourceRecord::host(question.name.clone(), self.ttl, addr);
                Some(query.response_with_answers(vec![record]))
            }
            ref t if t.is_known_unsupported() => Some(query.response_to(ReturnCode::NotImplemented)),
            _ => Some(query.response_to(ReturnCode::FormatError)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::message::Question;

    #[tokio::test]
    async fn resolves_static_entry() {
        let mut entries = HashMap::new();
        entries.insert("admin".to_string(), Ipv4Addr::new(10, 0, 0, 1));
        let table = HostTableResolver::new(entries);

        let query = DnsMessage::query(1, Question { name: "admin".into(), qtype: RecordType::Host });
        let reply = table.answer(&query).await.unwrap();
        assert_eq!(reply.answers[0].rdata, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(reply.answers[0].ttl, 300);
    }
}
