use async_trait::async_trait;
use serde_json::json;

use crate::{
    config::MessagingConfig,
    error::{AppError, Result},
    integrations::{Integration, NotificationEvent},
};

/// Forwards payment notifications to the chat service, which turns them
/// into a conversation message and a realtime notification.
pub struct MessengerIntegration {
    http: reqwest::Client,
    base_url: String,
    enabled: bool,
}

impl MessengerIntegration {
    pub fn new(http: reqwest::Client, config: &MessagingConfig) -> Option<Self> {
        match (&config.chat_service_url, config.enabled) {
            (Some(url), true) => Some(Self {
                http,
                base_url: url.trim_end_matches('/').to_string(),
                enabled: true,
            }),
            _ => None,
        }
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<()> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Chat service unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Internal(format!(
                "Chat service returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Integration for MessengerIntegration {
    fn name(&self) -> &str {
        "Messenger"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn health_check(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(AppError::Internal("Chat service URL not configured".to_string()));
        }
        Ok(())
    }

    async fn handle_event(&self, event: &NotificationEvent) -> Result<()> {
        match event {
            NotificationEvent::TipReceived {
                transaction_id,
                performer_id,
                user_id,
                amount,
                message,
            } => {
                self.post(
                    "/notifications/tip",
                    json!({
                        "transactionId": transaction_id,
                        "performerId": performer_id,
                        "userId": user_id,
                        "amount": amount.to_string(),
                    }),
                )
                .await?;

                let text = if message.trim().is_empty() {
                    format!("I sent you a ${:.2} tip", amount)
                } else {
                    format!("I sent you a ${:.2} tip: {}", amount, message)
                };
                self.post(
                    "/messages/private",
                    json!({
                        "senderId": user_id,
                        "recipientId": performer_id,
                        "type": "tip",
                        "text": text,
                    }),
                )
                .await
            }
            NotificationEvent::WelcomeMessage {
                performer_id,
                user_id,
                message,
            } => {
                self.post(
                    "/messages/private",
                    json!({
                        "senderId": performer_id,
                        "recipientId": user_id,
                        "type": "welcome",
                        "text": message.text,
                        "mediaType": message.media_type,
                        "mediaId": message.media_id,
                    }),
                )
                .await
            }
        }
    }
}
