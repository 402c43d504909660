//! # Weekcast Delivery
//!
//! The delivery callback and its wiring: select content, publish it, record
//! consumption, and re-register next week's occurrence. The scheduler never
//! self-requeues; each delivery plants the next one.
//!
//! On startup nothing is pending — [`rebuild`] re-derives every tenant's next
//! occurrence from persisted settings. That is the system's only recovery
//! mechanism after a restart.

use std::sync::Arc;

use chrono::{DateTime, Utc, Weekday};

use weekcast_core::error::Result;
use weekcast_core::settings::{KEY_TIME, KEY_TIMEZONE, schedule_from};
use weekcast_core::traits::{PublishOutcome, Publisher, SettingsStore};
use weekcast_core::types::{DeliverySchedule, TenantId};
use weekcast_scheduler::occurrence::next_occurrence;
use weekcast_scheduler::{Job, SchedulerHandle};
use weekcast_store::{ContentSelector, SelectionSource};

/// Deliveries land on Wednesday unless a future setting says otherwise.
pub const DEFAULT_WEEKDAY: Weekday = Weekday::Wed;

/// Everything one delivery needs, shared by every tenant's job.
pub struct DeliveryContext {
    pub settings: Arc<dyn SettingsStore>,
    pub selector: ContentSelector,
    pub publisher: Arc<dyn Publisher>,
    pub scheduler: SchedulerHandle<TenantId>,
}

/// The job registered with the scheduler for each tenant.
pub fn delivery_job(ctx: Arc<DeliveryContext>) -> Job<TenantId> {
    Arc::new(move |tenant| {
        let ctx = Arc::clone(&ctx);
        Box::pin(async move { deliver(ctx, tenant).await })
    })
}

/// One delivery: select, publish, mark used, re-register next week.
///
/// A `Skipped` publish (no destination configured) consumes nothing but still
/// plants next week's task. An error propagates to the tick loop, which drops
/// the task; re-delivery then requires an explicit reschedule.
pub async fn deliver(ctx: Arc<DeliveryContext>, tenant: TenantId) -> anyhow::Result<()> {
    let selection = ctx.selector.select_content(tenant).await?;
    let outcome = ctx.publisher.publish(tenant, &selection.url).await?;

    if outcome == PublishOutcome::Delivered && selection.source != SelectionSource::Fallback {
        ctx.selector.mark_used(tenant, &selection.url).await?;
    }

    reschedule(&ctx, tenant, Utc::now()).await?;
    Ok(())
}

/// A tenant's weekly slot from its stored settings, with defaults applied.
pub async fn load_schedule(settings: &dyn SettingsStore, tenant: TenantId) -> Result<DeliverySchedule> {
    let timezone = settings.get(tenant, KEY_TIMEZONE).await?;
    let time = settings.get(tenant, KEY_TIME).await?;
    Ok(schedule_from(timezone, time))
}

/// Compute the tenant's next occurrence at or after `from` and make it the
/// tenant's only pending task: cancel anything stale, then insert fresh.
pub async fn reschedule(
    ctx: &Arc<DeliveryContext>,
    tenant: TenantId,
    from: DateTime<Utc>,
) -> Result<()> {
    let schedule = load_schedule(ctx.settings.as_ref(), tenant).await?;
    let at = next_occurrence(&schedule.timezone, schedule.time_of_day, DEFAULT_WEEKDAY, from);
    tracing::info!(%tenant, %at, tz = %schedule.timezone, "Scheduling delivery");

    ctx.scheduler.cancel_matching(move |subject: &TenantId| *subject == tenant);
    ctx.scheduler.schedule(at, delivery_job(Arc::clone(ctx)), tenant);
    Ok(())
}

/// Rebuild the in-memory schedule from persisted settings. `resume_from`
/// replays occurrences missed while the process was down.
pub async fn rebuild(
    ctx: &Arc<DeliveryContext>,
    resume_from: Option<DateTime<Utc>>,
) -> Result<usize> {
    let from = resume_from.unwrap_or_else(Utc::now);
    let tenants = ctx.settings.tenants().await?;
    for &tenant in &tenants {
        reschedule(ctx, tenant, from).await?;
    }
    tracing::info!(tenants = tenants.len(), %from, "Schedule rebuilt");
    Ok(tenants.len())
}
