//! Wire-level DNS message model (spec §3, §4.5). Only the shapes the
//! resolver chain needs: one question, A-record answers, a handful of
//! return codes. Not a general-purpose DNS library.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    Query,
    Response,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationCode {
    Query,
    Other(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnCode {
    NoError,
    FormatError,
    NotImplemented,
    NonExistentDomain,
}

/// The well-known record types this resolver recognizes by name, even
/// though only `Host` is actually answerable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordType {
    Host,
    Aaaa,
    Ns,
    Cname,
    Soa,
    Ptr,
    Mx,
    Txt,
    Srv,
    Any,
    Axfr,
    Ixfr,
    /// A numeric type code with no recognized meaning.
    Unknown(u16),
}

impl RecordType {
    /// The fixed set of well-known-but-unsupported types from spec §4.5,
    /// distinct from `Host` (which is answerable) and `Unknown` (which is
    /// not even recognized).
    pub fn is_known_unsupported(&self) -> bool {
        matches!(
            self,
            RecordType::Aaaa
                | RecordType::Ns
                | RecordType::Cname
                | RecordType::Soa
                | RecordType::Ptr
                | RecordType::Mx
                | RecordType::Txt
                | RecordType::Srv
                | RecordType::Any
                | RecordType::Axfr
                | RecordType::Ixfr
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub name: String,
    #[serde(rename = "type")]
    pub qtype: RecordType,
}

/// `rdata` is narrowed to the one supported shape: an IPv4 host address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub name: String,
    pub ttl: u32,
    pub rdata: std::net::Ipv4Addr,
}

impl ResourceRecord {
    pub fn host(name: impl Into<String>, ttl: u32, addr: std::net::Ipv4Addr) -> Self {
        Self {
            name: name.into(),
            ttl,
            rdata: addr,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsMessage {
    pub id: u16,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub operation_code: OperationCode,
    pub return_code: ReturnCode,
    pub questions: Vec<Question>,
    pub answers: Vec<ResourceRecord>,
}

impl DnsMessage {
    pub fn query(id: u16, question: Question) -> Self {
        Self {
            id,
            message_type: MessageType::Query,
            operation_code: OperationCode::Query,
            return_code: ReturnCode::NoError,
            questions: vec![question],
            answers: Vec::new(),
        }
    }

    /// Builds the response echoing this query's id and (per the server's
    /// error path) its original question.
    pub fn response_to(&self, return_code: ReturnCode) -> Self {
        Self {
            id: self.id,
            message_type: MessageType::Response,
            operation_code: self.operation_code,
            return_code,
            questions: self.questions.clone(),
            answers: Vec::new(),
        }
    }

    pub fn response_with_answers(&self, answers: Vec<ResourceRecord>) -> Self {
        Self {
            id: self.id,
            message_type: MessageType::Response,
            operation_code: self.operation_code,
            return_code: ReturnCode::NoError,
            questions: self.questions.clone(),
            answers,
        }
    }

    pub fn to_wire(&self) -> crate::error::AppResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_wire(bytes: &[u8]) -> crate::error::AppResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
