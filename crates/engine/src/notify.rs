//! Outbound notification seam.

use async_trait::async_trait;
use thiserror::Error;
use trendora_core::TriggerEvent;

#[derive(Error, Debug)]
#[error("delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// Delivers trigger events to the owning chat.
///
/// The engine logs delivery failures and moves on; it never retries and
/// never inspects the outcome beyond that.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, event: &TriggerEvent) -> Result<(), DeliveryError>;
}
