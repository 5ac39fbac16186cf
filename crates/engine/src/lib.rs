//! Alert lifecycle engine.
//!
//! Owns the rules for registering, matching, and firing price alerts:
//! the command-facing operations (set/list/remove) and the periodic sweep
//! that fetches each watched coin once, triggers matching alerts through
//! the store, and hands trigger events to the notifier.

pub mod engine;
pub mod notify;

pub use engine::{AlertEngine, EngineError, SweepSummary};
pub use notify::{DeliveryError, Notifier};
