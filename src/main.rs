//! # Weekcast CLI
//!
//! Per-tenant weekly content delivery.
//!
//! Usage:
//!   weekcast run                          # Rebuild schedules and run the loop
//!   weekcast post --tenant 1              # Deliver once, right now
//!   weekcast submit --tenant 1 --url URL  # Queue content for a tenant
//!   weekcast submit-shared --url URL      # Queue content in the shared pool
//!   weekcast settings set --tenant 1 time 18:30
//!   weekcast queue --tenant 1             # Show pool depths
//!   weekcast next --tenant 1              # Show the next occurrence

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use weekcast_channels::{ConsolePublisher, WebhookPublisher};
use weekcast_core::WeekcastConfig;
use weekcast_core::settings::KEY_WEBHOOK;
use weekcast_core::traits::{ContentStore, Publisher, SettingsStore};
use weekcast_core::types::TenantId;
use weekcast_delivery::{DEFAULT_WEEKDAY, DeliveryContext, deliver, load_schedule, rebuild};
use weekcast_scheduler::Scheduler;
use weekcast_scheduler::occurrence::next_occurrence;
use weekcast_store::{ContentSelector, SqliteStore};

#[derive(Parser)]
#[command(
    name = "weekcast",
    version,
    about = "Weekcast — weekly, time-zone-aware content delivery per tenant"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild per-tenant schedules and run the delivery loop
    Run {
        /// Replay occurrences missed since this RFC3339 instant
        #[arg(long)]
        resume_from: Option<String>,

        /// Print deliveries to the console instead of posting webhooks
        #[arg(long)]
        console: bool,
    },

    /// Deliver to one tenant immediately (test post)
    Post {
        #[arg(short, long)]
        tenant: i64,

        /// Print instead of posting the webhook
        #[arg(long)]
        console: bool,
    },

    /// Queue content for a tenant's own pool
    Submit {
        #[arg(short, long)]
        tenant: i64,

        #[arg(short, long)]
        url: String,

        #[arg(short, long)]
        submitter: Option<i64>,
    },

    /// Queue content in the shared pool
    SubmitShared {
        #[arg(short, long)]
        url: String,

        /// Make it selectable right away
        #[arg(long)]
        approved: bool,

        #[arg(short, long)]
        submitter: Option<i64>,
    },

    /// Per-tenant settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Show a tenant's pool depths
    Queue {
        #[arg(short, long)]
        tenant: i64,
    },

    /// Show a tenant's next delivery occurrence
    Next {
        #[arg(short, long)]
        tenant: i64,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Show a tenant's effective schedule settings
    Show {
        #[arg(short, long)]
        tenant: i64,
    },
    /// Set a setting (recognized keys are validated before storing)
    Set {
        #[arg(short, long)]
        tenant: i64,
        key: String,
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "weekcast=debug,weekcast_scheduler=debug,weekcast_store=debug,weekcast_delivery=debug"
    } else {
        "weekcast=info,weekcast_scheduler=info,weekcast_delivery=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = WeekcastConfig::load(cli.config.as_deref())?;
    let store = Arc::new(SqliteStore::open(&config.database_file())?);

    match cli.command {
        Commands::Run { resume_from, console } => {
            let resume_from = resume_from.map(|s| parse_instant(&s)).transpose()?;
            run_loop(&config, store, resume_from, console).await?;
        }

        Commands::Post { tenant, console } => {
            let scheduler: Scheduler<TenantId> =
                Scheduler::new(std::time::Duration::from_secs(config.tick_interval_secs));
            let ctx = Arc::new(DeliveryContext {
                settings: Arc::clone(&store) as Arc<dyn SettingsStore>,
                selector: ContentSelector::new(
                    Arc::clone(&store) as Arc<dyn ContentStore>,
                    config.fallback_url.clone(),
                ),
                publisher: make_publisher(console, &store),
                scheduler: scheduler.handle(),
            });
            deliver(ctx, TenantId(tenant)).await?;
        }

        Commands::Submit { tenant, url, submitter } => {
            match store.add_tenant_content(TenantId(tenant), &url, submitter).await {
                Ok(()) => println!("Queued for tenant {tenant}: {url}"),
                Err(e) if e.is_duplicate() => println!("Already known: {url}"),
                Err(e) => return Err(e.into()),
            }
        }

        Commands::SubmitShared { url, approved, submitter } => {
            match store.add_shared_content(&url, approved, submitter).await {
                Ok(()) => println!("Queued in shared pool: {url}"),
                Err(e) if e.is_duplicate() => println!("Already known: {url}"),
                Err(e) => return Err(e.into()),
            }
        }

        Commands::Settings { action } => match action {
            SettingsAction::Show { tenant } => {
                let schedule = load_schedule(store.as_ref(), TenantId(tenant)).await?;
                println!("timezone  {}", schedule.timezone);
                println!("time      {}", schedule.time_of_day.format("%H:%M"));
                let webhook = store.get(TenantId(tenant), KEY_WEBHOOK).await?;
                println!("webhook   {}", webhook.as_deref().unwrap_or("(not set)"));
            }
            SettingsAction::Set { tenant, key, value } => {
                store.set(TenantId(tenant), &key, &value).await?;
                println!("Set {key} for tenant {tenant}");
            }
        },

        Commands::Queue { tenant } => {
            let tenant = TenantId(tenant);
            println!("tenant pool  {}", store.queue_depth(tenant).await?);
            println!("shared pool  {}", store.shared_queue_depth(tenant).await?);
        }

        Commands::Next { tenant } => {
            let schedule = load_schedule(store.as_ref(), TenantId(tenant)).await?;
            let at = next_occurrence(
                &schedule.timezone,
                schedule.time_of_day,
                DEFAULT_WEEKDAY,
                Utc::now(),
            );
            println!("{at}");
        }
    }

    Ok(())
}

/// Rebuild every tenant's pending task from settings, then tick forever.
async fn run_loop(
    config: &WeekcastConfig,
    store: Arc<SqliteStore>,
    resume_from: Option<DateTime<Utc>>,
    console: bool,
) -> Result<()> {
    let scheduler: Scheduler<TenantId> =
        Scheduler::new(std::time::Duration::from_secs(config.tick_interval_secs));
    let ctx = Arc::new(DeliveryContext {
        settings: Arc::clone(&store) as Arc<dyn SettingsStore>,
        selector: ContentSelector::new(
            Arc::clone(&store) as Arc<dyn ContentStore>,
            config.fallback_url.clone(),
        ),
        publisher: make_publisher(console, &store),
        scheduler: scheduler.handle(),
    });

    let count = rebuild(&ctx, resume_from).await?;
    tracing::info!(tenants = count, "Starting delivery loop");

    scheduler.run().await;
    Ok(())
}

fn make_publisher(console: bool, store: &Arc<SqliteStore>) -> Arc<dyn Publisher> {
    if console {
        Arc::new(ConsolePublisher)
    } else {
        Arc::new(WebhookPublisher::new(Arc::clone(store) as Arc<dyn SettingsStore>))
    }
}

fn parse_instant(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .map_err(|e| anyhow::anyhow!("--resume-from must be RFC3339: {e}"))?
        .with_timezone(&Utc))
}
