//! Tenant and content record types.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of an independent tenant (community/customer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub i64);

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for TenantId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Content submitted for a single tenant. `last_used` unset means queued/unused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantContentRecord {
    pub tenant_id: TenantId,
    pub url: String,
    pub last_used: Option<DateTime<Utc>>,
    pub submitter: Option<i64>,
}

/// Content in the shared pool, visible to all tenants once approved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedContentRecord {
    pub url: String,
    pub approved: bool,
    pub submitter: Option<i64>,
}

/// A tenant's weekly delivery slot, derived from its settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliverySchedule {
    /// IANA zone name, e.g. `America/New_York`.
    pub timezone: String,
    /// Local wall-clock time of the delivery.
    pub time_of_day: NaiveTime,
}
