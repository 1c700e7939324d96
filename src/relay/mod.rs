/// Outbound path for user text.
///
/// - `whatsapp` - posts a WhatsApp Business webhook envelope to the chatbot
pub mod whatsapp;

pub use whatsapp::{WebhookProfile, WhatsAppRelay};

use crate::error::RelayError;
use async_trait::async_trait;

/// Whatever the relay answered; opaque to the chat view.
#[derive(Clone, Debug, PartialEq)]
pub struct RelayReceipt {
    pub data: serde_json::Value,
}

#[async_trait]
pub trait OutboundRelay: Send + Sync {
    async fn send_outbound(&self, body: &str) -> Result<RelayReceipt, RelayError>;
}
