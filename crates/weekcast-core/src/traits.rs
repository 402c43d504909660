//! Collaborator traits: settings persistence, content pools, and publishing.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{SharedContentRecord, TenantContentRecord, TenantId};

/// Durable per-tenant key/value settings.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Get a setting; `None` when the tenant never set the key.
    async fn get(&self, tenant: TenantId, key: &str) -> Result<Option<String>>;

    /// Persist a setting. Recognized keys are validated and malformed
    /// values rejected here, before anything is stored.
    async fn set(&self, tenant: TenantId, key: &str, value: &str) -> Result<()>;

    /// Every tenant with at least one stored setting. Drives the
    /// startup rebuild of the in-memory schedule.
    async fn tenants(&self) -> Result<Vec<TenantId>>;
}

/// Two-tier content pools: per-tenant submissions falling back to a shared
/// approved pool. A `(tenant, url)` pair is never duplicated.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Random unused record from the tenant's own pool.
    async fn select_tenant_content(&self, tenant: TenantId) -> Result<Option<String>>;

    /// Random approved shared record this tenant has not yet used.
    async fn select_shared_content(&self, tenant: TenantId) -> Result<Option<String>>;

    /// Upsert the tenant record with `last_used = now`. For a shared URL this
    /// creates the tenant record, excluding it for this tenant only.
    async fn mark_used(&self, tenant: TenantId, url: &str) -> Result<()>;

    /// Insert an unused tenant record; `DuplicateContent` if the pair exists.
    async fn add_tenant_content(
        &self,
        tenant: TenantId,
        url: &str,
        submitter: Option<i64>,
    ) -> Result<()>;

    /// Insert into the shared pool; `DuplicateContent` if the URL exists.
    async fn add_shared_content(&self, url: &str, approved: bool, submitter: Option<i64>)
    -> Result<()>;

    /// Fetch one tenant record.
    async fn get_tenant_content(
        &self,
        tenant: TenantId,
        url: &str,
    ) -> Result<Option<TenantContentRecord>>;

    /// Fetch one shared record.
    async fn get_shared_content(&self, url: &str) -> Result<Option<SharedContentRecord>>;

    /// Count of unused records in the tenant's own pool.
    async fn queue_depth(&self, tenant: TenantId) -> Result<u64>;

    /// Count of approved shared records not yet marked used by this tenant.
    async fn shared_queue_depth(&self, tenant: TenantId) -> Result<u64>;
}

/// What a publish attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Content went out on the tenant's channel.
    Delivered,
    /// The tenant has no destination configured; nothing was sent.
    Skipped,
}

/// Outbound messaging collaborator. Owns transport; the core never
/// talks to a platform API directly.
#[async_trait]
pub trait Publisher: Send + Sync {
    fn name(&self) -> &str;

    async fn publish(&self, tenant: TenantId, url: &str) -> Result<PublishOutcome>;
}
