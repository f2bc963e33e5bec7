use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, error};

use crate::error::DeliveryError;
use crate::models::ChatId;

/// Outbound side of the chat platform.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), DeliveryError>;
}

#[derive(Clone)]
pub struct Notifier {
    transport: Arc<dyn ChatTransport>,
}

impl Notifier {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self { transport }
    }

    /// Delivers one message; failures are logged and swallowed.
    pub async fn send(&self, chat_id: &str, text: &str) -> bool {
        match self.transport.send_text(chat_id, text).await {
            Ok(()) => {
                debug!(chat_id, "Message delivered");
                true
            }
            Err(e) => {
                error!(chat_id, "Failed to send message: {}", e);
                false
            }
        }
    }

    /// Sends `text` to every recipient and returns how many got it.
    pub async fn broadcast(&self, recipients: &[ChatId], text: &str) -> usize {
        let deliveries = recipients.iter().map(|chat_id| self.send(chat_id, text));
        join_all(deliveries).await.into_iter().filter(|&ok| ok).count()
    }
}
