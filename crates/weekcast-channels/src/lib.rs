//! # Weekcast Channels
//! `Publisher` implementations. Transport lives here; the scheduler and
//! delivery core never talk to a platform API directly.

pub mod console;
pub mod webhook;

pub use console::ConsolePublisher;
pub use webhook::WebhookPublisher;
