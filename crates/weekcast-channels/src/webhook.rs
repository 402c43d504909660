//! Webhook publisher — POSTs each delivery to the tenant's configured URL.
//!
//! Useful for bridging into chat platforms, Zapier/n8n flows, or custom APIs.

use std::sync::Arc;

use async_trait::async_trait;

use weekcast_core::error::{Result, WeekcastError};
use weekcast_core::settings::KEY_WEBHOOK;
use weekcast_core::traits::{PublishOutcome, Publisher, SettingsStore};
use weekcast_core::types::TenantId;

pub struct WebhookPublisher {
    settings: Arc<dyn SettingsStore>,
    client: reqwest::Client,
}

impl WebhookPublisher {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self { settings, client: reqwest::Client::new() }
    }

    fn payload(tenant: TenantId, url: &str) -> serde_json::Value {
        serde_json::json!({
            "tenant_id": tenant,
            "content_url": url,
        })
    }
}

#[async_trait]
impl Publisher for WebhookPublisher {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn publish(&self, tenant: TenantId, url: &str) -> Result<PublishOutcome> {
        let Some(destination) = self.settings.get(tenant, KEY_WEBHOOK).await? else {
            tracing::warn!(%tenant, "No webhook is set, skipping delivery");
            return Ok(PublishOutcome::Skipped);
        };

        let response = self
            .client
            .post(&destination)
            .json(&Self::payload(tenant, url))
            .send()
            .await
            .map_err(|e| WeekcastError::channel(format!("Webhook send failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(WeekcastError::channel(format!("Webhook {status}: {text}")));
        }

        tracing::info!(%tenant, url, "Delivered via webhook");
        Ok(PublishOutcome::Delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weekcast_store::SqliteStore;

    #[test]
    fn test_payload_shape() {
        let payload = WebhookPublisher::payload(TenantId(7), "https://x/y.jpg");
        assert_eq!(payload["tenant_id"], 7);
        assert_eq!(payload["content_url"], "https://x/y.jpg");
    }

    #[tokio::test]
    async fn test_unconfigured_tenant_is_skipped() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let publisher = WebhookPublisher::new(store);
        let outcome = publisher.publish(TenantId(1), "https://x").await.unwrap();
        assert_eq!(outcome, PublishOutcome::Skipped);
    }
}
