//! Console publisher — logs deliveries instead of sending them.
//! Used by CLI test posts and local dry runs.

use async_trait::async_trait;

use weekcast_core::error::Result;
use weekcast_core::traits::{PublishOutcome, Publisher};
use weekcast_core::types::TenantId;

#[derive(Debug, Default)]
pub struct ConsolePublisher;

#[async_trait]
impl Publisher for ConsolePublisher {
    fn name(&self) -> &str {
        "console"
    }

    async fn publish(&self, tenant: TenantId, url: &str) -> Result<PublishOutcome> {
        tracing::info!(%tenant, url, "Delivery (console)");
        println!("[tenant {tenant}] {url}");
        Ok(PublishOutcome::Delivered)
    }
}
