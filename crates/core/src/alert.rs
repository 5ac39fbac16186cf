//! Alert records and trigger events.

use crate::{AlertCode, Price};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum open (non-triggered) alerts a single chat may hold.
pub const MAX_OPEN_ALERTS: u32 = 3;

/// Chat identifier, the unique key of a user's alert book.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A single price alert inside a chat's book.
///
/// Lifecycle: created open, flipped to triggered exactly once by the
/// matching sweep, removable by code at any point. A triggered alert is
/// never matched again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Provider-recognized coin identifier (e.g. "bitcoin").
    pub coin_id: CompactString,
    /// Target price the user wants reached or crossed.
    pub target_price: Price,
    /// User-facing removal key.
    pub code: AlertCode,
    /// Whether the target has been reached.
    pub triggered: bool,
    /// Epoch seconds of the matching sweep; set only when triggered.
    pub trigger_date: Option<i64>,
}

impl Alert {
    /// Whether this alert still participates in sweeps.
    pub fn is_open(&self) -> bool {
        !self.triggered
    }
}

/// Ephemeral value emitted by a sweep for each newly triggered alert.
/// Consumed once by the notifier; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerEvent {
    /// Chat owning the triggered alert.
    pub chat_id: ChatId,
    /// Coin the alert was set on.
    pub coin_id: CompactString,
    /// The alert's original target price.
    pub target_price: Price,
    /// The observed price that caused the match.
    pub observed_price: Price,
}
