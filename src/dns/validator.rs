use async_trait::async_trait;

use super::message::{DnsMessage, MessageType, OperationCode, ReturnCode};
use super::Handler;

/// Root of the chain (spec §4.5 step 1): rejects shapes no inner handler
/// should have to think about, then forwards.
pub struct StandardQueryValidator<H> {
    inner: H,
}

impl<H: Handler> StandardQueryValidator<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<H: Handler> Handler for StandardQueryValidator<H> {
    async fn answer(&self, query: &DnsMessage) -> Option<DnsMessage> {
        if query.message_type == MessageType::Response {
            return Some(query.response_to(ReturnCode::FormatError));
        }
        if query.operation_code != OperationCode::Query {
            return Some(query.response_to(ReturnCode::NotImplemented));
        }
        if query.questions.len() != 1 {
            return Some(query.response_to(ReturnCode::FormatError));
        }
        self.inner.answer(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::message::{Question, RecordType};
    use crate::dns::nxdomain::NxDomainResolver;

    #[tokio::test]
    async fn response_type_query_is_format_error() {
        let validator = StandardQueryValidator::new(NxDomainResolver::default());
        let mut query = DnsMessage::query(1, Question { name: "x".into(), qtype: RecordType::Host });
        query.message_type = MessageType::Response;
        let reply = validator.answer(&query).await.unwrap();
        assert_eq!(reply.return_code, ReturnCode::FormatError);
    }

    #[tokio::test]
    async fn two_questions_is_format_error() {
        let validator = StandardQueryValidator::new(NxDomainResolver::default());
        let q = Question { name: "x".into(), qtype: RecordType::Host };
        let mut query = DnsMessage::query(1, q.clone());
        query.questions.push(q);
        let reply = validator.answer(&query).await.unwrap();
        assert_eq!(reply.return_code, ReturnCode::FormatError);
    }

    #[tokio::test]
    async fn non_query_opcode_is_not_implemented() {
        let validator = StandardQueryValidator::new(NxDomainResolver::default());
        let mut query = DnsMessage::query(1, Question { name: "x".into(), qtype: RecordType::Host });
        query.operation_code = OperationCode::Other(4);
        let reply = validator.answer(&query).await.unwrap();
        assert_eq!(reply.return_code, ReturnCode::NotImplemented);
    }
}
