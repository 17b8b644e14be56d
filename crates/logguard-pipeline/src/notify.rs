// Notification channels for anomaly alerts
// WebhookNotifier posts a chat-webhook payload (text + attachments)

use crate::alerting::AlertMessage;
use crate::config::NotificationConfig;
use crate::error::AlertDispatchError;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

// Notifier trait - anything that can forward an alert outside the process
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    /// Forward `message`; `attachment` carries the alert log tail when enabled.
    async fn send(
        &self,
        message: &AlertMessage,
        attachment: Option<&str>,
    ) -> Result<(), AlertDispatchError>;
}

#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    webhook_url: String,
    recipient: String,
}

#[derive(Serialize)]
struct WebhookMessage {
    text: String,
    attachments: Vec<WebhookAttachment>,
}

// colored sidebar block with details
#[derive(Serialize)]
struct WebhookAttachment {
    color: String,
    title: String,
    text: String,
    fields: Vec<WebhookField>,
    footer: String,
    ts: i64,
}

#[derive(Serialize)]
struct WebhookField {
    title: String,
    value: String,
    short: bool,
}

impl WebhookNotifier {
    pub fn new(webhook_url: impl Into<String>, recipient: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            webhook_url: webhook_url.into(),
            recipient: recipient.into(),
        }
    }

    fn build_message(&self, message: &AlertMessage, attachment: Option<&str>) -> WebhookMessage {
        let mut attachments = vec![WebhookAttachment {
            color: "danger".to_string(),
            title: message.subject.clone(),
            text: message.body.clone(),
            fields: vec![
                WebhookField {
                    title: "Recipient".to_string(),
                    value: self.recipient.clone(),
                    short: true,
                },
                WebhookField {
                    title: "Anomalies".to_string(),
                    value: format!("{} of {}", message.anomaly_count, message.total_samples),
                    short: true,
                },
            ],
            footer: "LogGuard anomaly detection".to_string(),
            ts: Utc::now().timestamp(),
        }];

        if let Some(tail) = attachment {
            attachments.push(WebhookAttachment {
                color: "warning".to_string(),
                title: "Alert log (latest rows)".to_string(),
                text: format!("```\n{}\n```", tail),
                fields: Vec::new(),
                footer: String::new(),
                ts: Utc::now().timestamp(),
            });
        }

        WebhookMessage {
            text: format!(":rotating_light: {}", message.subject),
            attachments,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(
        &self,
        message: &AlertMessage,
        attachment: Option<&str>,
    ) -> Result<(), AlertDispatchError> {
        let payload = self.build_message(message, attachment);

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(recipient = %self.recipient, "Alert forwarded to webhook");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(AlertDispatchError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// Build the configured notifier. Disabled or incomplete settings yield `None`.
pub fn notifier_from_config(config: &NotificationConfig) -> Option<Arc<dyn Notifier>> {
    if !config.enabled {
        return None;
    }
    if !config.is_complete() {
        warn!("Notification enabled but webhook_url or recipient is missing, alerts stay local");
        return None;
    }
    Some(Arc::new(WebhookNotifier::new(
        config.webhook_url.clone(),
        config.recipient.clone(),
    )))
}
