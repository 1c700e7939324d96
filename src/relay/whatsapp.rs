use super::{OutboundRelay, RelayReceipt};
use crate::error::RelayError;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, warn};

/// The business account the simulated inbound message is addressed to.
#[derive(Clone, Debug, PartialEq)]
pub struct WebhookProfile {
    pub business_account_id: u64,
    pub display_phone_number: String,
    pub phone_number_id: String,
    pub contact_name: String,
}

impl Default for WebhookProfile {
    fn default() -> Self {
        Self {
            business_account_id: 1_234_567_890,
            display_phone_number: "255712345678".to_string(),
            phone_number_id: "9876543210".to_string(),
            contact_name: "John Doe".to_string(),
        }
    }
}

/// Delivers user text to the chatbot by replaying it as a WhatsApp Business
/// webhook, the same shape Meta would post for an inbound message.
pub struct WhatsAppRelay {
    client: Client,
    callback_url: Url,
    wa_id: String,
    profile: WebhookProfile,
}

impl WhatsAppRelay {
    pub fn new(callback_url: Url, wa_id: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            callback_url,
            wa_id: wa_id.into(),
            profile: WebhookProfile::default(),
        }
    }

    pub fn envelope<'a>(&'a self, body: &'a str, now: OffsetDateTime) -> WebhookEnvelope<'a> {
        build_envelope(&self.profile, &self.wa_id, body, now)
    }
}

#[derive(Serialize)]
pub struct WebhookEnvelope<'a> {
    object: &'static str,
    entry: [Entry<'a>; 1],
}

#[derive(Serialize)]
struct Entry<'a> {
    id: u64,
    changes: [Change<'a>; 1],
}

#[derive(Serialize)]
struct Change<'a> {
    value: ChangeValue<'a>,
    field: &'static str,
}

#[derive(Serialize)]
struct ChangeValue<'a> {
    messaging_product: &'static str,
    metadata: Metadata<'a>,
    contacts: [Contact<'a>; 1],
    messages: [InboundMessage<'a>; 1],
}

#[derive(Serialize)]
struct Metadata<'a> {
    display_phone_number: &'a str,
    phone_number_id: &'a str,
}

#[derive(Serialize)]
struct Contact<'a> {
    profile: ContactProfile<'a>,
    wa_id: &'a str,
}

#[derive(Serialize)]
struct ContactProfile<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct InboundMessage<'a> {
    from: &'a str,
    id: String,
    timestamp: i64,
    text: TextBody<'a>,
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct TextBody<'a> {
    body: &'a str,
}

pub fn build_envelope<'a>(
    profile: &'a WebhookProfile,
    wa_id: &'a str,
    body: &'a str,
    now: OffsetDateTime,
) -> WebhookEnvelope<'a> {
    let millis = now.unix_timestamp_nanos() / 1_000_000;
    WebhookEnvelope {
        object: "whatsapp_business_account",
        entry: [Entry {
            id: profile.business_account_id,
            changes: [Change {
                value: ChangeValue {
                    messaging_product: "whatsapp",
                    metadata: Metadata {
                        display_phone_number: &profile.display_phone_number,
                        phone_number_id: &profile.phone_number_id,
                    },
                    contacts: [Contact {
                        profile: ContactProfile {
                            name: &profile.contact_name,
                        },
                        wa_id,
                    }],
                    messages: [InboundMessage {
                        from: wa_id,
                        id: format!("wamid.{millis}"),
                        timestamp: now.unix_timestamp(),
                        text: TextBody { body },
                        kind: "text",
                    }],
                },
                field: "messages",
            }],
        }],
    }
}

#[async_trait]
impl OutboundRelay for WhatsAppRelay {
    async fn send_outbound(&self, body: &str) -> Result<RelayReceipt, RelayError> {
        let envelope = self.envelope(body, OffsetDateTime::now_utc());
        let response = self
            .client
            .post(self.callback_url.clone())
            .json(&envelope)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        debug!(%status, "chatbot webhook responded");

        if !status.is_success() {
            warn!(%status, body = %text, "chatbot webhook rejected message");
            return Err(RelayError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }

        // Some deployments answer 200 with an empty or plain-text body.
        let data = if text.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text))
        };
        Ok(RelayReceipt { data })
    }
}
