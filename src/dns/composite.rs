use async_trait::async_trait;

use super::message::DnsMessage;
use super::Handler;

/// Tries each inner handler in order; the first non-`None` response wins
/// (spec §4.5 step 2).
pub struct Composite {
    handlers: Vec<Box<dyn Handler>>,
}

impl Composite {
    pub fn new(handlers: Vec<Box<dyn Handler>>) -> Self {
        Self { handlers }
    }
}

#[async_trait]
impl Handler for Composite {
    async fn answer(&self, query: &DnsMessage) -> Option<DnsMessage> {
        for handler in &self.handlers {
            if let Some(response) = handler.answer(query).await {
                return Some(response);
            }
        }
        None
    }
}
