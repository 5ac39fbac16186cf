//! Alert registration and the periodic matching sweep.

use crate::Notifier;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use trendora_core::{Alert, AlertCode, ChatId, Price, TriggerEvent, MAX_OPEN_ALERTS};
use trendora_market::{PriceError, PriceSource};
use trendora_store::{AlertStore, StoreError};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("alert book already holds {MAX_OPEN_ALERTS} open alerts")]
    CapacityExceeded,
    #[error("unknown coin id: {0}")]
    InvalidCoin(String),
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Price(PriceError),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::CapacityExceeded => Self::CapacityExceeded,
            other => Self::Store(other),
        }
    }
}

/// Per-sweep counters, for logging and health checks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    /// Coin ids with at least one open alert at sweep start.
    pub coins_checked: u32,
    /// Coin ids skipped because the price fetch failed.
    pub fetch_failures: u32,
    /// Alerts flipped to triggered.
    pub alerts_triggered: u32,
    /// Trigger events the notifier failed to deliver.
    pub delivery_failures: u32,
}

/// Orchestrates alert registration and the matching sweep.
///
/// Holds no alert state of its own; everything it knows between sweeps
/// lives in the store.
pub struct AlertEngine {
    store: AlertStore,
    prices: Arc<dyn PriceSource>,
    notifier: Arc<dyn Notifier>,
}

impl AlertEngine {
    pub fn new(store: AlertStore, prices: Arc<dyn PriceSource>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            prices,
            notifier,
        }
    }

    /// Register an alert for a chat. The coin id is validated against the
    /// price source first, so a book slot is never spent on an unknown id.
    pub async fn set_alert(
        &self,
        chat_id: ChatId,
        coin_id: &str,
        target_price: Price,
    ) -> Result<AlertCode, EngineError> {
        if let Err(err) = self.prices.current_price(coin_id).await {
            return Err(match err {
                PriceError::NotFound(id) => EngineError::InvalidCoin(id),
                other => EngineError::Price(other),
            });
        }

        let code = AlertCode::generate();
        self.store
            .insert(chat_id, coin_id, target_price, &code)
            .await?;

        info!(chat_id = %chat_id, coin_id, target = %target_price, code = %code, "alert set");
        Ok(code)
    }

    /// Full ordered list of a chat's alerts, open and triggered.
    pub async fn list_alerts(&self, chat_id: ChatId) -> Result<Vec<Alert>, EngineError> {
        Ok(self.store.list(chat_id).await?)
    }

    /// Remove an alert (open or triggered) by its code.
    /// Returns whether anything was removed.
    pub async fn remove_alert(
        &self,
        chat_id: ChatId,
        code: &AlertCode,
    ) -> Result<bool, EngineError> {
        let removed = self.store.remove_by_code(chat_id, code).await?;
        if removed {
            info!(chat_id = %chat_id, code = %code, "alert removed");
        }
        Ok(removed)
    }

    /// Remaining open-alert capacity for a chat.
    pub async fn open_slots(&self, chat_id: ChatId) -> Result<u32, EngineError> {
        let count = self.store.count_open(chat_id).await?;
        Ok(MAX_OPEN_ALERTS.saturating_sub(count.open))
    }

    /// One matching pass over every coin id with open alerts.
    ///
    /// Each id is fetched at most once. A failed fetch skips that id only;
    /// a store failure aborts the remainder of the sweep, leaving the
    /// per-record mutations already applied intact.
    pub async fn sweep(&self) -> Result<SweepSummary, EngineError> {
        let coin_ids = self.store.distinct_open_coin_ids().await?;
        let mut summary = SweepSummary {
            coins_checked: coin_ids.len() as u32,
            ..Default::default()
        };
        if coin_ids.is_empty() {
            debug!("sweep: no open alerts");
            return Ok(summary);
        }

        for coin_id in coin_ids {
            let observed = match self.prices.current_price(&coin_id).await {
                Ok(price) => price,
                Err(err) => {
                    warn!(coin_id = %coin_id, error = %err, "price fetch failed, skipping coin");
                    summary.fetch_failures += 1;
                    continue;
                }
            };

            let hits = self.store.match_and_trigger(&coin_id, observed).await?;
            for hit in hits {
                let event = TriggerEvent {
                    chat_id: hit.chat_id,
                    coin_id: coin_id.clone(),
                    target_price: hit.target_price,
                    observed_price: observed,
                };
                summary.alerts_triggered += 1;
                if let Err(err) = self.notifier.deliver(&event).await {
                    error!(chat_id = %event.chat_id, error = %err, "trigger delivery failed");
                    summary.delivery_failures += 1;
                }
            }
        }

        info!(
            coins = summary.coins_checked,
            fetch_failures = summary.fetch_failures,
            triggered = summary.alerts_triggered,
            "sweep complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeliveryError;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct StaticPrices {
        prices: HashMap<String, f64>,
        calls: AtomicU32,
        down: bool,
    }

    impl StaticPrices {
        fn new(prices: &[(&str, f64)]) -> Arc<Self> {
            Arc::new(Self {
                prices: prices.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
                calls: AtomicU32::new(0),
                down: false,
            })
        }

        fn down() -> Arc<Self> {
            Arc::new(Self {
                prices: HashMap::new(),
                calls: AtomicU32::new(0),
                down: true,
            })
        }
    }

    #[async_trait]
    impl PriceSource for StaticPrices {
        async fn current_price(&self, coin_id: &str) -> Result<Price, PriceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.down {
                return Err(PriceError::Unavailable("connection refused".into()));
            }
            self.prices
                .get(coin_id)
                .map(|p| Price::from_f64(*p))
                .ok_or_else(|| PriceError::NotFound(coin_id.to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        events: Mutex<Vec<TriggerEvent>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn deliver(&self, event: &TriggerEvent) -> Result<(), DeliveryError> {
            self.events.lock().unwrap().push(event.clone());
            if self.fail {
                return Err(DeliveryError("chat blocked the bot".into()));
            }
            Ok(())
        }
    }

    async fn engine_with(
        prices: Arc<StaticPrices>,
        notifier: Arc<RecordingNotifier>,
    ) -> AlertEngine {
        let store = AlertStore::connect("sqlite::memory:").await.unwrap();
        AlertEngine::new(store, prices, notifier)
    }

    #[tokio::test]
    async fn test_set_alert_on_fresh_chat() {
        let engine = engine_with(
            StaticPrices::new(&[("bitcoin", 48000.0)]),
            Arc::new(RecordingNotifier::default()),
        )
        .await;
        let chat = ChatId(1);

        let code = engine
            .set_alert(chat, "bitcoin", Price::from_f64(50000.0))
            .await
            .unwrap();
        assert_eq!(code.as_str().len(), 5);

        let alerts = engine.list_alerts(chat).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].is_open());
        assert_eq!(engine.open_slots(chat).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_set_alert_rejects_unknown_coin() {
        let engine = engine_with(
            StaticPrices::new(&[("bitcoin", 48000.0)]),
            Arc::new(RecordingNotifier::default()),
        )
        .await;
        let chat = ChatId(2);

        let err = engine
            .set_alert(chat, "bitcorn", Price::from_f64(1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidCoin(id) if id == "bitcorn"));
        assert!(engine.list_alerts(chat).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_alert_surfaces_transient_source_failure() {
        let engine =
            engine_with(StaticPrices::down(), Arc::new(RecordingNotifier::default())).await;

        let err = engine
            .set_alert(ChatId(3), "bitcoin", Price::from_f64(50000.0))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Price(PriceError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_set_alert_enforces_capacity() {
        let engine = engine_with(
            StaticPrices::new(&[("bitcoin", 48000.0)]),
            Arc::new(RecordingNotifier::default()),
        )
        .await;
        let chat = ChatId(4);

        for _ in 0..3 {
            engine
                .set_alert(chat, "bitcoin", Price::from_f64(50000.0))
                .await
                .unwrap();
        }
        let err = engine
            .set_alert(chat, "bitcoin", Price::from_f64(60000.0))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::CapacityExceeded));
        assert_eq!(engine.list_alerts(chat).await.unwrap().len(), 3);
        assert_eq!(engine.open_slots(chat).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sweep_triggers_and_notifies_once() {
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = engine_with(
            StaticPrices::new(&[("bitcoin", 50300.0)]),
            Arc::clone(&notifier),
        )
        .await;

        let inside = ChatId(5);
        let outside = ChatId(6);
        engine
            .set_alert(inside, "bitcoin", Price::from_f64(50000.0))
            .await
            .unwrap();
        engine
            .set_alert(outside, "bitcoin", Price::from_f64(45000.0))
            .await
            .unwrap();

        let summary = engine.sweep().await.unwrap();
        assert_eq!(
            summary,
            SweepSummary {
                coins_checked: 1,
                fetch_failures: 0,
                alerts_triggered: 1,
                delivery_failures: 0,
            }
        );

        let events = notifier.events.lock().unwrap().clone();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].chat_id, inside);
        assert_eq!(events[0].coin_id, "bitcoin");
        assert_eq!(events[0].target_price, Price::from_f64(50000.0));
        assert_eq!(events[0].observed_price, Price::from_f64(50300.0));

        assert!(engine.list_alerts(inside).await.unwrap()[0].triggered);
        assert!(engine.list_alerts(outside).await.unwrap()[0].is_open());
    }

    #[tokio::test]
    async fn test_sweep_is_noop_without_open_alerts() {
        let prices = StaticPrices::new(&[("bitcoin", 50300.0)]);
        let engine = engine_with(Arc::clone(&prices), Arc::new(RecordingNotifier::default())).await;

        let summary = engine.sweep().await.unwrap();
        assert_eq!(summary, SweepSummary::default());
        assert_eq!(prices.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_sweep_fetches_each_coin_once_and_skips_failures() {
        // Two chats watch bitcoin, one chat watches a coin the provider
        // no longer recognizes.
        let prices = StaticPrices::new(&[("bitcoin", 50300.0)]);
        let notifier = Arc::new(RecordingNotifier::default());
        let store = AlertStore::connect("sqlite::memory:").await.unwrap();
        let engine = AlertEngine::new(store.clone(), prices.clone(), notifier);

        store
            .insert(ChatId(7), "bitcoin", Price::from_f64(50000.0), &AlertCode::generate())
            .await
            .unwrap();
        store
            .insert(ChatId(8), "bitcoin", Price::from_f64(50100.0), &AlertCode::generate())
            .await
            .unwrap();
        store
            .insert(ChatId(9), "delisted", Price::from_f64(1.0), &AlertCode::generate())
            .await
            .unwrap();

        let summary = engine.sweep().await.unwrap();
        assert_eq!(summary.coins_checked, 2);
        assert_eq!(summary.fetch_failures, 1);
        assert_eq!(summary.alerts_triggered, 2);
        // One fetch per distinct coin id, never per alert.
        assert_eq!(prices.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_sweep_rerun_triggers_nothing_new() {
        let engine = engine_with(
            StaticPrices::new(&[("bitcoin", 50300.0)]),
            Arc::new(RecordingNotifier::default()),
        )
        .await;
        engine
            .set_alert(ChatId(10), "bitcoin", Price::from_f64(50000.0))
            .await
            .unwrap();

        assert_eq!(engine.sweep().await.unwrap().alerts_triggered, 1);
        let rerun = engine.sweep().await.unwrap();
        assert_eq!(rerun.alerts_triggered, 0);
        // The triggered alert no longer keeps its coin in the sweep set.
        assert_eq!(rerun.coins_checked, 0);
    }

    #[tokio::test]
    async fn test_delivery_failure_does_not_abort_sweep() {
        let notifier = Arc::new(RecordingNotifier {
            events: Mutex::new(Vec::new()),
            fail: true,
        });
        let engine = engine_with(
            StaticPrices::new(&[("bitcoin", 50300.0)]),
            Arc::clone(&notifier),
        )
        .await;
        let chat = ChatId(11);
        engine
            .set_alert(chat, "bitcoin", Price::from_f64(50000.0))
            .await
            .unwrap();

        let summary = engine.sweep().await.unwrap();
        assert_eq!(summary.alerts_triggered, 1);
        assert_eq!(summary.delivery_failures, 1);
        // The record is triggered regardless; delivery is fire-and-forget.
        assert!(engine.list_alerts(chat).await.unwrap()[0].triggered);
    }

    #[tokio::test]
    async fn test_remove_alert_round_trip() {
        let engine = engine_with(
            StaticPrices::new(&[("bitcoin", 48000.0)]),
            Arc::new(RecordingNotifier::default()),
        )
        .await;
        let chat = ChatId(12);
        let code = engine
            .set_alert(chat, "bitcoin", Price::from_f64(50000.0))
            .await
            .unwrap();

        assert!(engine.remove_alert(chat, &code).await.unwrap());
        assert!(!engine.remove_alert(chat, &code).await.unwrap());
        assert!(engine.list_alerts(chat).await.unwrap().is_empty());
    }
}
