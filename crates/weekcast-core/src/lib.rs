//! # Weekcast Core
//! Shared types, errors, collaborator traits, and configuration.

pub mod config;
pub mod error;
pub mod settings;
pub mod traits;
pub mod types;

pub use config::WeekcastConfig;
pub use error::{Result, WeekcastError};
pub use traits::{ContentStore, PublishOutcome, Publisher, SettingsStore};
pub use types::{DeliverySchedule, SharedContentRecord, TenantContentRecord, TenantId};
