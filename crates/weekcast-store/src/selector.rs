//! Two-tier, non-repeating content selection.
//!
//! Tenant pool first, then the shared approved pool, then a fixed fallback
//! URL. Exhaustion is not an error; the fallback keeps deliveries flowing.

use std::sync::Arc;

use weekcast_core::error::Result;
use weekcast_core::traits::ContentStore;
use weekcast_core::types::TenantId;

/// Which tier a selection came from. Fallback content is never marked used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSource {
    TenantPool,
    SharedPool,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct Selection {
    pub url: String,
    pub source: SelectionSource,
}

pub struct ContentSelector {
    store: Arc<dyn ContentStore>,
    fallback_url: String,
}

impl ContentSelector {
    pub fn new(store: Arc<dyn ContentStore>, fallback_url: impl Into<String>) -> Self {
        Self { store, fallback_url: fallback_url.into() }
    }

    /// Pick content for one delivery. Never returns a URL already marked used
    /// for this tenant while an unused alternative exists in either tier.
    pub async fn select_content(&self, tenant: TenantId) -> Result<Selection> {
        if let Some(url) = self.store.select_tenant_content(tenant).await? {
            return Ok(Selection { url, source: SelectionSource::TenantPool });
        }
        if let Some(url) = self.store.select_shared_content(tenant).await? {
            return Ok(Selection { url, source: SelectionSource::SharedPool });
        }
        tracing::info!(%tenant, "Content pools exhausted, using fallback");
        Ok(Selection { url: self.fallback_url.clone(), source: SelectionSource::Fallback })
    }

    /// Record consumption; excludes the URL from future selection for this tenant.
    pub async fn mark_used(&self, tenant: TenantId, url: &str) -> Result<()> {
        self.store.mark_used(tenant, url).await
    }
}
