//! The UDP packet loop (spec §4.5): read a datagram, decode, delegate to
//! the root handler, always send a response.

use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{error, warn};

use super::message::{DnsMessage, ReturnCode};
use super::Handler;

const MAX_DATAGRAM: usize = 4096;

pub struct DnsServer {
    root: Arc<dyn Handler>,
}

impl DnsServer {
    pub fn new(root: Arc<dyn Handler>) -> Self {
        Self { root }
    }

    /// Binds `listen` and serves until `shutdown` fires.
    pub async fn serve(
        self,
        listen: &str,
        mut shutdown: watch::Receiver<bool>,
    ) -> crate::error::AppResult<()> {
        let socket = UdpSocket::bind(listen)
            .await
            .map_err(|e| crate::error::AppError::internal(format!("failed to bind dns socket {listen}: {e}")))?;
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                received = socket.recv_from(&mut buf) => {
                    let (len, peer) = match received {
                        Ok(v) => v,
                        Err(e) => {
                            error!("dns socket read error: {e}");
                            continue;
                        }
                    };
                    let response = self.handle_datagram(&buf[..len]).await;
                    if let Ok(bytes) = response.to_wire() {
                        if let Err(e) = socket.send_to(&bytes, peer).await {
                            warn!("dns socket write error: {e}");
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Decodes, delegates, and applies the response-always and
    /// empty-answers-rewrite rules. Exposed separately from `serve` so
    /// tests can drive it without a real socket.
    pub async fn handle_datagram(&self, bytes: &[u8]) -> DnsMessage {
        let query = match DnsMessage::from_wire(bytes) {
            Ok(q) => q,
            Err(e) => {
                warn!(error = %e, "failed to decode dns query");
                // No question to echo: synthesize an empty-question shell
                // purely so the wire format stays well-formed.
                return DnsMessage {
                    id: 0,
                    message_type: super::message::MessageType::Response,
                    operation_code: super::message::OperationCode::Query,
                    return_code: ReturnCode::NotImplemented,
                    questions: Vec::new(),
                    answers: Vec::new(),
                };
            }
        };

        let mut response = match self.root.answer(&query).await {
            Some(r) => r,
            None => query.response_to(ReturnCode::NotImplemented),
        };

        if response.return_code == ReturnCode::NoError && response.answers.is_empty() {
            response.return_code = ReturnCode::NonExistentDomain;
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::composite::Composite;
    use crate::dns::container_lookup::ContainerLookup;
    use crate::dns::host_table::HostTableResolver;
    use crate::dns::message::{Question, RecordType};
    use crate::dns::nxdomain::NxDomainResolver;
    use crate::dns::validator::StandardQueryValidator;
    use crate::network::NetworkService;
    use std::collections::HashMap;
    use std::net::Ipv4Addr;

    fn build_chain(net: NetworkService) -> Arc<dyn Handler> {
        let mut table = HashMap::new();
        table.insert("admin".to_string(), Ipv4Addr::new(10, 0, 0, 1));
        let composite = Composite::new(vec![
            Box::new(ContainerLookup::new(net)),
            Box::new(HostTableResolver::new(table)),
            Box::new(NxDomainResolver::default()),
        ]);
        Arc::new(StandardQueryValidator::new(composite))
    }

    #[tokio::test]
    async fn end_to_end_chain_scenarios() {
        let net = NetworkService::new();
        net.allocate("srv1").await.unwrap();
        let server = DnsServer::new(build_chain(net));

        let admin_query = DnsMessage::query(1, Question { name: "admin".into(), qtype: RecordType::Host });
        let reply = server.handle_datagram(&admin_query.to_wire().unwrap()).await;
        assert_eq!(reply.return_code, ReturnCode::NoError);
        assert_eq!(reply.answers[0].rdata, Ipv4Addr::new(10, 0, 0, 1));

        let srv_query = DnsMessage::query(2, Question { name: "srv1".into(), qtype: RecordType::Host });
        let reply = server.handle_datagram(&srv_query.to_wire().unwrap()).await;
        assert_eq!(reply.answers[0].ttl, 5);

        let ghost_query = DnsMessage::query(3, Question { name: "ghost".into(), qtype: RecordType::Host });
        let reply = server.handle_datagram(&ghost_query.to_wire().unwrap()).await;
        assert_eq!(reply.return_code, ReturnCode::NonExistentDomain);

        let ghost_aaaa = DnsMessage::query(4, Question { name: "ghost".into(), qtype: RecordType::Aaaa });
        let reply = server.handle_datagram(&ghost_aaaa.to_wire().unwrap()).await;
        assert_eq!(reply.return_code, ReturnCode::NotImplemented);
    }

    #[tokio::test]
    async fn malformed_datagram_yields_not_implemented() {
        let net = NetworkService::new();
        let server = DnsServer::new(build_chain(net));
        let reply = server.handle_datagram(b"not json").await;
        assert_eq!(reply.return_code, ReturnCode::NotImplemented);
    }
}
