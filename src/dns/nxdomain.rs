use async_trait::async_trait;

use super::message::{DnsMessage, RecordType, ReturnCode};
use super::Handler;

/// Terminal leaf (spec §4.5 step 5): always answers, never falls through.
#[derive(Default)]
pub struct NxDomainResolver;

#[async_trait]
impl Handler for NxDomainResolver {
    async fn answer(&self, query: &DnsMessage) -> Option<DnsMessage> {
        let question = query.questions.first()?;
        let code = match question.qtype {
            RecordType::Host => ReturnCode::NonExistentDomain,
            ref t if t.is_known_unsupported() => ReturnCode::NotImplemented,
            _ => ReturnCode::FormatError,
        };
        Some(query.response_to(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::message::Question;

    #[tokio::test]
    async fn host_query_is_nxdomain() {
        let resolver = NxDomainResolver::default();
        let query = DnsMessage::query(1, Question { name: "ghost".into(), qtype: RecordType::Host });
        let reply = resolver.answer(&query).await.unwrap();
        assert_eq!(reply.return_code, ReturnCode::NonExistentDomain);
    }

    #[tokio::test]
    async fn known_unsupported_type_is_not_implemented() {
        let resolver = NxDomainResolver::default();
        let query = DnsMessage::query(1, Question { name: "ghost".into(), qtype: RecordType::Aaaa });
        let reply = resolver.answer(&query).await.unwrap();
        assert_eq!(reply.return_code, ReturnCode::NotImplemented);
    }

    #[tokio::test]
    async fn unknown_type_is_format_error() {
        let resolver = NxDomainResolver::default();
        let query = DnsMessage::query(1, Question { name: "ghost".into(), qtype: RecordType::Unknown(999) });
        let reply = resolver.answer(&query).await.unwrap();
        assert_eq!(reply.return_code, ReturnCode::FormatError);
    }
}
