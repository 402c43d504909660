//! # Weekcast Store
//! Durable settings and two-tier content pools (SQLite), plus the
//! non-repeating selection policy.

pub mod selector;
pub mod sqlite;

pub use selector::{ContentSelector, Selection, SelectionSource};
pub use sqlite::SqliteStore;
