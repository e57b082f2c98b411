use anyhow::Result;
use async_trait::async_trait;
use grcmon_common::types::{Alert, DeliveryChannel};
use serde_json::Value;
use std::time::Duration;

use crate::error::NotifyError;
use crate::AlertDispatcher;

const SEND_ATTEMPTS: u32 = 3;
const MAX_BODY_LENGTH: usize = 512;

/// Posts alerts as JSON to a fixed URL.
pub struct WebhookDispatcher {
    url: String,
    client: reqwest::Client,
}

impl WebhookDispatcher {
    pub fn new(url: &str) -> std::result::Result<Self, NotifyError> {
        Self::with_client(url, reqwest::Client::new())
    }

    pub fn with_client(url: &str, client: reqwest::Client) -> std::result::Result<Self, NotifyError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(NotifyError::InvalidConfig(format!(
                "webhook url must be http(s): {url}"
            )));
        }
        Ok(Self {
            url: url.to_string(),
            client,
        })
    }

    pub fn payload(alert: &Alert) -> Value {
        serde_json::json!({
            "alert_id": alert.id,
            "alert_number": alert.alert_number,
            "tenant_id": alert.tenant_id,
            "title": alert.title,
            "message": alert.message,
            "severity": alert.severity.as_str(),
            "status": alert.status.as_str(),
            "test_id": alert.test_id,
            "control_id": alert.control_id,
            "assigned_to": alert.assigned_to,
            "sla_deadline": alert.sla_deadline.map(|d| d.to_rfc3339()),
            "created_at": alert.created_at.to_rfc3339(),
        })
    }

    async fn post_once(&self, body: &Value) -> std::result::Result<(), NotifyError> {
        let resp = self.client.post(&self.url).json(body).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let text = resp
            .text()
            .await
            .unwrap_or_else(|e| format!("[Failed to read response body: {e}]"));
        Err(NotifyError::ApiError {
            service: "webhook".to_string(),
            status: status.as_u16(),
            body: text.chars().take(MAX_BODY_LENGTH).collect(),
        })
    }
}

#[async_trait]
impl AlertDispatcher for WebhookDispatcher {
    fn channel(&self) -> DeliveryChannel {
        DeliveryChannel::Webhook
    }

    async fn dispatch(&self, alert: &Alert) -> Result<()> {
        let body = Self::payload(alert);
        let mut last_err = None;
        for attempt in 0..SEND_ATTEMPTS {
            match self.post_once(&body).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        alert_id = %alert.id,
                        error = %e,
                        "Webhook send failed, retrying"
                    );
                    last_err = Some(e);
                }
            }
            if attempt + 1 < SEND_ATTEMPTS {
                tokio::time::sleep(Duration::from_millis(100 * 2u64.pow(attempt))).await;
            }
        }
        match last_err {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}
