//! SQLite-backed alert store.

use compact_str::CompactString;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;
use trendora_core::{Alert, AlertCode, ChatId, Price, MAX_OPEN_ALERTS};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
    #[error("alert book already holds {MAX_OPEN_ALERTS} open alerts")]
    CapacityExceeded,
}

/// Count of open alerts for a chat, plus whether the chat has a book at
/// all. "No book" and "book with zero alerts" are distinct states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenCount {
    pub open: u32,
    pub book_exists: bool,
}

/// An alert flipped to triggered by [`AlertStore::match_and_trigger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggeredAlert {
    pub chat_id: ChatId,
    pub target_price: Price,
}

/// Database handle for alert books.
#[derive(Clone)]
pub struct AlertStore {
    pool: SqlitePool,
}

impl AlertStore {
    /// Connect to the SQLite database at the given URL and bootstrap the
    /// schema.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        // Book rows are created lazily on first insert and never deleted,
        // so an emptied book is still distinguishable from no book.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS books (
                chat_id INTEGER PRIMARY KEY,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alerts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id INTEGER NOT NULL,
                coin_id TEXT NOT NULL,
                target_price INTEGER NOT NULL,
                alert_code TEXT NOT NULL,
                triggered INTEGER NOT NULL DEFAULT 0,
                trigger_date INTEGER,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_open_alerts
            ON alerts(coin_id, triggered, target_price)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chat_alerts ON alerts(chat_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Health check against the underlying database.
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Append an alert to a chat's book, creating the book if absent.
    ///
    /// The capacity check and the append are one statement, so two
    /// concurrent inserts for the same chat can never push the book past
    /// [`MAX_OPEN_ALERTS`] open alerts.
    pub async fn insert(
        &self,
        chat_id: ChatId,
        coin_id: &str,
        target_price: Price,
        code: &AlertCode,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT OR IGNORE INTO books (chat_id) VALUES (?)")
            .bind(chat_id.0)
            .execute(&self.pool)
            .await?;

        let result = sqlx::query(
            r#"
            INSERT INTO alerts (chat_id, coin_id, target_price, alert_code)
            SELECT ?, ?, ?, ?
            WHERE (SELECT COUNT(*) FROM alerts WHERE chat_id = ? AND triggered = 0) < ?
            "#,
        )
        .bind(chat_id.0)
        .bind(coin_id)
        .bind(target_price.micros() as i64)
        .bind(code.as_str())
        .bind(chat_id.0)
        .bind(MAX_OPEN_ALERTS)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::CapacityExceeded);
        }

        debug!(chat_id = %chat_id, coin_id, code = %code, "alert inserted");
        Ok(())
    }

    /// Full ordered list of a chat's alerts, open and triggered.
    /// Insertion order is display order. Empty if the chat has no book.
    pub async fn list(&self, chat_id: ChatId) -> Result<Vec<Alert>, StoreError> {
        let rows = sqlx::query_as::<_, (String, i64, String, bool, Option<i64>)>(
            r#"
            SELECT coin_id, target_price, alert_code, triggered, trigger_date
            FROM alerts WHERE chat_id = ? ORDER BY id
            "#,
        )
        .bind(chat_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(coin_id, target, code, triggered, trigger_date)| Alert {
                coin_id: coin_id.into(),
                target_price: Price::from_micros(target as u64),
                code: AlertCode::new_unchecked(code),
                triggered,
                trigger_date,
            })
            .collect())
    }

    /// Count of open alerts for a chat and whether any book exists.
    pub async fn count_open(&self, chat_id: ChatId) -> Result<OpenCount, StoreError> {
        let (open, book_exists) = sqlx::query_as::<_, (u32, bool)>(
            r#"
            SELECT (SELECT COUNT(*) FROM alerts WHERE chat_id = ? AND triggered = 0),
                   EXISTS(SELECT 1 FROM books WHERE chat_id = ?)
            "#,
        )
        .bind(chat_id.0)
        .bind(chat_id.0)
        .fetch_one(&self.pool)
        .await?;

        Ok(OpenCount { open, book_exists })
    }

    /// Delete the first alert (open or triggered) matching the code within
    /// the chat's book. Returns whether a row was removed; at most one row
    /// is ever removed even if the code collides within the book.
    pub async fn remove_by_code(
        &self,
        chat_id: ChatId,
        code: &AlertCode,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM alerts
            WHERE id = (SELECT MIN(id) FROM alerts WHERE chat_id = ? AND alert_code = ?)
            "#,
        )
        .bind(chat_id.0)
        .bind(code.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deduplicated coin ids referenced by at least one open alert across
    /// all books.
    pub async fn distinct_open_coin_ids(&self) -> Result<Vec<CompactString>, StoreError> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT DISTINCT coin_id FROM alerts WHERE triggered = 0",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id.into()).collect())
    }

    /// Flip every open alert on `coin_id` whose target lies inside the ±1%
    /// band of `observed_price` to triggered, stamping the trigger time,
    /// and return the affected (chat, target) pairs.
    ///
    /// One conditional UPDATE, so a record is never reported triggered by
    /// two overlapping sweeps and an already-triggered record never
    /// matches again.
    pub async fn match_and_trigger(
        &self,
        coin_id: &str,
        observed_price: Price,
    ) -> Result<Vec<TriggeredAlert>, StoreError> {
        let band = observed_price.tolerance_band();
        let now = chrono::Utc::now().timestamp();

        let rows = sqlx::query_as::<_, (i64, i64)>(
            r#"
            UPDATE alerts
            SET triggered = 1, trigger_date = ?
            WHERE coin_id = ? AND triggered = 0
              AND target_price >= ? AND target_price <= ?
            RETURNING chat_id, target_price
            "#,
        )
        .bind(now)
        .bind(coin_id)
        .bind(band.lower.micros() as i64)
        .bind(band.upper.micros() as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(chat_id, target)| TriggeredAlert {
                chat_id: ChatId(chat_id),
                target_price: Price::from_micros(target as u64),
            })
            .collect())
    }
}
