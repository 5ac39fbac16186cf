//! Durable alert-book storage.
//!
//! One SQLite database owns every chat's alert book. All cross-chat
//! mutation (the sweep's match-and-trigger) and the per-chat capacity
//! check happen inside single SQL statements, so the store stays
//! consistent under concurrent sweeps and interactive commands.

pub mod store;

pub use store::{AlertStore, OpenCount, StoreError, TriggeredAlert};
