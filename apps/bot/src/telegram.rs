//! Telegram command handlers and trigger delivery.

use async_trait::async_trait;
use chrono::DateTime;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::command::BotCommands;
use trendora_core::{Alert, AlertCode, ChatId as OwnerId, Price, TriggerEvent, MAX_OPEN_ALERTS};
use trendora_engine::{AlertEngine, DeliveryError, EngineError, Notifier};
use trendora_market::{CoinGecko, PriceError};

/// Bot commands.
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "Start the bot")]
    Start,
    #[command(description = "Show help")]
    Help,
    #[command(description = "Current price for a coin id. Usage: /price bitcoin")]
    Price(String),
    #[command(description = "Look up the coin id for a name. Usage: /find dogecoin")]
    Find(String),
    #[command(
        parse_with = "split",
        description = "Set a price alert. Usage: /setalert bitcoin 120000"
    )]
    SetAlert { coin_id: String, price: String },
    #[command(description = "List your alerts")]
    ListAlert,
    #[command(description = "Remove an alert by its code. Usage: /removealert AB12C")]
    RemoveAlert(String),
}

/// Telegram bot wrapper around the alert engine.
pub struct TrendoraBot {
    bot: Bot,
    engine: Arc<AlertEngine>,
    market: CoinGecko,
}

impl TrendoraBot {
    pub fn new(bot: Bot, engine: Arc<AlertEngine>, market: CoinGecko) -> Self {
        Self {
            bot,
            engine,
            market,
        }
    }

    /// Run the bot command handler.
    pub async fn run(self: Arc<Self>) {
        let bot = self.bot.clone();
        let handler = Update::filter_message().filter_command::<Command>().endpoint(
            move |bot: Bot, msg: Message, cmd: Command| {
                let this = Arc::clone(&self);
                async move { this.handle_command(bot, msg, cmd).await }
            },
        );

        Dispatcher::builder(bot, handler)
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;
    }

    async fn handle_command(&self, bot: Bot, msg: Message, cmd: Command) -> ResponseResult<()> {
        let owner = OwnerId(msg.chat.id.0);

        match cmd {
            Command::Start => {
                let text = "Welcome! I'm <b>Trendora</b>, your cryptocurrency assistant.\n\n\
                     I can look up live prices and watch the market for you:\n\
                     \u{2022} /price &lt;coin-id&gt; - current price\n\
                     \u{2022} /find &lt;name&gt; - look up a coin id\n\
                     \u{2022} /setalert &lt;coin-id&gt; &lt;price&gt; - get notified when the price reaches your target\n\
                     \u{2022} /listalert - your alerts\n\
                     \u{2022} /removealert &lt;code&gt; - remove an alert\n\n\
                     Use /help for details.";
                bot.send_message(msg.chat.id, text)
                    .parse_mode(ParseMode::Html)
                    .await?;
            }

            Command::Help => {
                bot.send_message(msg.chat.id, Command::descriptions().to_string())
                    .await?;
            }

            Command::Price(coin_id) => {
                let coin_id = coin_id.trim().to_lowercase();
                if coin_id.is_empty() {
                    bot.send_message(msg.chat.id, "Usage: /price <coin-id>\nExample: /price bitcoin")
                        .await?;
                    return Ok(());
                }

                let text = match self.market.coin_summary(&coin_id).await {
                    Ok(coin) => format!(
                        "<b><u>Coin Data</u></b>\n\
                         Name: <b>{}</b>\n\
                         Ticker: <b>{}</b>\n\
                         Price: <b>{}</b>\n\
                         Market cap rank: <b>{}</b>",
                        coin.name,
                        coin.symbol,
                        format_usd(coin.price_usd),
                        coin.market_cap_rank
                            .map(|r| r.to_string())
                            .unwrap_or_else(|| "N/A".to_string()),
                    ),
                    Err(PriceError::NotFound(_)) => {
                        "Coin not found. Use the /find command to look up a valid coin id."
                            .to_string()
                    }
                    Err(PriceError::Unavailable(_)) => {
                        "Market data cannot be retrieved right now, please try again later."
                            .to_string()
                    }
                };
                bot.send_message(msg.chat.id, text)
                    .parse_mode(ParseMode::Html)
                    .await?;
            }

            Command::Find(query) => {
                let query = query.trim();
                if query.is_empty() {
                    bot.send_message(msg.chat.id, "Usage: /find <name>\nExample: /find dogecoin")
                        .await?;
                    return Ok(());
                }

                let text = match self.market.search(query).await {
                    Ok(matches) if matches.is_empty() => "No matching coins found.".to_string(),
                    Ok(matches) => {
                        let body = matches
                            .iter()
                            .take(5)
                            .enumerate()
                            .map(|(i, m)| {
                                format!(
                                    "{}. id: <b>{}</b>\n    name: {}\n    ticker: {}\n    market cap rank: {}",
                                    i + 1,
                                    m.id,
                                    m.name,
                                    m.symbol,
                                    m.market_cap_rank
                                        .map(|r| r.to_string())
                                        .unwrap_or_else(|| "N/A".to_string()),
                                )
                            })
                            .collect::<Vec<_>>()
                            .join("\n\n");
                        format!(
                            "<b><u>Top Matching Results</u></b>\n\n{body}\n\n\
                             Use the id with /price and /setalert."
                        )
                    }
                    Err(_) => {
                        "Market data cannot be retrieved right now, please try again later."
                            .to_string()
                    }
                };
                bot.send_message(msg.chat.id, text)
                    .parse_mode(ParseMode::Html)
                    .await?;
            }

            Command::SetAlert { coin_id, price } => {
                let coin_id = coin_id.trim().to_lowercase();
                let target: Price = match price.parse() {
                    Ok(p) => p,
                    Err(err) => {
                        bot.send_message(msg.chat.id, format!("Invalid price: {err}."))
                            .await?;
                        return Ok(());
                    }
                };

                let text = match self.engine.set_alert(owner, &coin_id, target).await {
                    Ok(code) => {
                        let slots = self.engine.open_slots(owner).await.unwrap_or(0);
                        format!(
                            "<b><u>Alert</u></b>\n\
                             Alert set for <b>{}</b> at <b>{}</b>.\n\n\
                             Alert code: <b>{}</b>\n\
                             Open alert slots left: <b>{}</b>",
                            coin_id,
                            format_usd(target),
                            code,
                            slots,
                        )
                    }
                    Err(err) => describe_engine_error(&err),
                };
                bot.send_message(msg.chat.id, text)
                    .parse_mode(ParseMode::Html)
                    .await?;
            }

            Command::ListAlert => {
                let text = match self.engine.list_alerts(owner).await {
                    Ok(alerts) if alerts.is_empty() => {
                        "There are no alert items available.".to_string()
                    }
                    Ok(alerts) => {
                        let body = alerts
                            .iter()
                            .enumerate()
                            .map(|(i, alert)| format_alert_entry(i + 1, alert))
                            .collect::<Vec<_>>()
                            .join("\n\n");
                        format!("<b><u>Alert(s)</u></b>\n\n{body}")
                    }
                    Err(err) => describe_engine_error(&err),
                };
                bot.send_message(msg.chat.id, text)
                    .parse_mode(ParseMode::Html)
                    .await?;
            }

            Command::RemoveAlert(code) => {
                let code: AlertCode = match code.parse() {
                    Ok(code) => code,
                    Err(err) => {
                        bot.send_message(msg.chat.id, format!("Invalid alert code: {err}."))
                            .await?;
                        return Ok(());
                    }
                };

                let text = match self.engine.remove_alert(owner, &code).await {
                    Ok(true) => {
                        let slots = self.engine.open_slots(owner).await.unwrap_or(0);
                        format!(
                            "Alert <b>{code}</b> has been removed.\n\
                             Open alert slots left: <b>{slots}</b>"
                        )
                    }
                    Ok(false) => {
                        "No alert with that code was found.\n\
                         Use /listalert and try again."
                            .to_string()
                    }
                    Err(err) => describe_engine_error(&err),
                };
                bot.send_message(msg.chat.id, text)
                    .parse_mode(ParseMode::Html)
                    .await?;
            }
        }

        Ok(())
    }
}

/// Telegram-backed trigger delivery: one message per trigger event.
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn deliver(&self, event: &TriggerEvent) -> Result<(), DeliveryError> {
        self.bot
            .send_message(ChatId(event.chat_id.0), format_trigger_message(event))
            .parse_mode(ParseMode::Html)
            .await
            .map_err(|e| DeliveryError(e.to_string()))?;
        Ok(())
    }
}

/// Map engine errors to user-facing phrasing. Transient failures read as
/// "try later" so a storage or provider hiccup never surfaces as a crash.
fn describe_engine_error(err: &EngineError) -> String {
    match err {
        EngineError::CapacityExceeded => format!(
            "Your alert list cannot exceed {MAX_OPEN_ALERTS} open alerts.\n\
             You can remove older alerts with /removealert."
        ),
        EngineError::InvalidCoin(id) => format!(
            "Unknown coin id '{id}'.\n\
             Use the /find command to look up a valid coin id."
        ),
        EngineError::Store(_) => {
            "Alerts cannot be accessed right now, please try again later.".to_string()
        }
        EngineError::Price(_) => {
            "Market data cannot be retrieved right now, please try again later.".to_string()
        }
    }
}

fn format_alert_entry(position: usize, alert: &Alert) -> String {
    let mut entry = format!(
        "{}. Alert code: <b>{}</b>\n    \
         Crypto ID: <b>{}</b>\n    \
         Target price: <b>{}</b>\n    \
         Target reached: <b>{}</b>",
        position,
        alert.code,
        alert.coin_id,
        format_usd(alert.target_price),
        if alert.triggered { "Yes" } else { "No" },
    );
    if let Some(secs) = alert.trigger_date {
        entry.push_str(&format!(
            "\n    Triggered (UTC): <b>{}</b>",
            format_trigger_date(secs)
        ));
    }
    entry
}

/// Format a trigger event as a notification message.
fn format_trigger_message(event: &TriggerEvent) -> String {
    format!(
        "\u{1F514} <b><u>Alert Notification</u></b>\n\n\
         Your price alert for <b>{}</b> just triggered.\n\n\
         - Target price: <b>{}</b>\n\
         - Current price: <b>{}</b>\n\n\
         Triggered alerts stop being monitored. You can remove this one \
         with /removealert and set a new alert.",
        event.coin_id,
        format_usd(event.target_price),
        format_usd(event.observed_price),
    )
}

/// Format a price with precision appropriate to its magnitude.
fn format_usd(price: Price) -> String {
    let value = price.to_f64();
    if value >= 1000.0 {
        format!("${value:.2}")
    } else if value >= 1.0 {
        format!("${value:.4}")
    } else {
        format!("${value:.6}")
    }
}

fn format_trigger_date(epoch_secs: i64) -> String {
    DateTime::from_timestamp(epoch_secs, 0)
        .map(|dt| dt.format("%b %d, %Y %H:%M UTC").to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_setalert_command_splits_arguments() {
        let cmd = Command::parse("/setalert bitcoin 120000", "trendora").unwrap();
        match cmd {
            Command::SetAlert { coin_id, price } => {
                assert_eq!(coin_id, "bitcoin");
                assert_eq!(price, "120000");
            }
            _ => panic!("parsed into the wrong command"),
        }
    }

    #[test]
    fn test_format_usd_tiers() {
        assert_eq!(format_usd(Price::from_f64(50000.0)), "$50000.00");
        assert_eq!(format_usd(Price::from_f64(3.5)), "$3.5000");
        assert_eq!(format_usd(Price::from_f64(0.512312)), "$0.512312");
    }

    #[test]
    fn test_trigger_message_carries_both_prices() {
        let event = TriggerEvent {
            chat_id: OwnerId(42),
            coin_id: "bitcoin".into(),
            target_price: Price::from_f64(50000.0),
            observed_price: Price::from_f64(50300.0),
        };
        let text = format_trigger_message(&event);
        assert!(text.contains("bitcoin"));
        assert!(text.contains("$50000.00"));
        assert!(text.contains("$50300.00"));
    }

    #[test]
    fn test_alert_entry_shows_trigger_date_only_when_triggered() {
        let open = Alert {
            coin_id: "bitcoin".into(),
            target_price: Price::from_f64(50000.0),
            code: AlertCode::new_unchecked("AB12C"),
            triggered: false,
            trigger_date: None,
        };
        assert!(!format_alert_entry(1, &open).contains("Triggered (UTC)"));

        let triggered = Alert {
            triggered: true,
            trigger_date: Some(1_700_000_000),
            ..open
        };
        let entry = format_alert_entry(1, &triggered);
        assert!(entry.contains("Target reached: <b>Yes</b>"));
        assert!(entry.contains("Triggered (UTC)"));
    }

    #[test]
    fn test_trigger_date_formatting() {
        assert_eq!(format_trigger_date(0), "Jan 01, 1970 00:00 UTC");
    }
}
