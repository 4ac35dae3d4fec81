//! SQLite trade journal.
//!
//! Every closed leg (partial bookings included) is appended to `closed_trades`.
//! The engine only writes; the `report` command reads.

use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::models::{ClosedTrade, Direction, ExitReason, Symbol};
use crate::trading::TradeJournal;

/// Database connection pool holding the trade journal.
pub struct Database {
    pool: SqlitePool,
}

/// Stored closed trade record.
///
/// Prices are kept as decimal strings; `return_pct` and `pnl` are denormalized
/// as REAL for ad-hoc SQL.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredTrade {
    pub id: i64,
    pub symbol: String,
    pub direction: String,
    pub quantity: i64,
    pub entry_price: String,
    pub exit_price: String,
    pub entry_time: String,
    pub exit_time: String,
    pub reason: String,
    pub partial: bool,
    pub return_pct: f64,
    pub pnl: f64,
}

impl TryFrom<StoredTrade> for ClosedTrade {
    type Error = anyhow::Error;

    fn try_from(row: StoredTrade) -> Result<Self> {
        Ok(ClosedTrade {
            symbol: Symbol::from_str(&row.symbol).map_err(|e| anyhow!(e))?,
            direction: Direction::from_str(&row.direction).map_err(|e| anyhow!(e))?,
            quantity: u32::try_from(row.quantity)
                .with_context(|| format!("Invalid quantity in trade {}", row.id))?,
            entry_price: Decimal::from_str(&row.entry_price)
                .with_context(|| format!("Invalid entry price in trade {}", row.id))?,
            exit_price: Decimal::from_str(&row.exit_price)
                .with_context(|| format!("Invalid exit price in trade {}", row.id))?,
            entry_time: parse_time(&row.entry_time)?,
            exit_time: parse_time(&row.exit_time)?,
            reason: ExitReason::from_str(&row.reason).map_err(|e| anyhow!(e))?,
            partial: row.partial,
        })
    }
}

/// Fixed-width UTC timestamps so that string comparison in SQL is chronological.
fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp '{}'", raw))
}

impl Database {
    /// Create a new database connection.
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::connect(database_url, 5).await
    }

    async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS closed_trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                direction TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                entry_price TEXT NOT NULL,
                exit_price TEXT NOT NULL,
                entry_time TEXT NOT NULL,
                exit_time TEXT NOT NULL,
                reason TEXT NOT NULL,
                partial INTEGER NOT NULL DEFAULT 0,
                return_pct REAL NOT NULL,
                pnl REAL NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create closed_trades table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_closed_trades_exit ON closed_trades(exit_time)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_closed_trades_symbol ON closed_trades(symbol)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ==================== Closed Trades ====================

    /// Append one closed leg. Returns the row id.
    pub async fn insert_closed_trade(&self, trade: &ClosedTrade) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO closed_trades
                (symbol, direction, quantity, entry_price, exit_price, entry_time, exit_time,
                 reason, partial, return_pct, pnl)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(trade.symbol.to_string())
        .bind(trade.direction.as_str())
        .bind(i64::from(trade.quantity))
        .bind(trade.entry_price.to_string())
        .bind(trade.exit_price.to_string())
        .bind(format_time(trade.entry_time))
        .bind(format_time(trade.exit_time))
        .bind(trade.reason.as_str())
        .bind(trade.partial)
        .bind(trade.return_pct().to_f64().unwrap_or(0.0))
        .bind(trade.pnl().to_f64().unwrap_or(0.0))
        .execute(&self.pool)
        .await
        .context("Failed to insert closed trade")?;

        Ok(result.last_insert_rowid())
    }

    /// Closed legs with `exit_time >= since`, oldest first.
    pub async fn closed_trades_since(&self, since: DateTime<Utc>) -> Result<Vec<ClosedTrade>> {
        let rows = sqlx::query_as::<_, StoredTrade>(
            r#"
            SELECT id, symbol, direction, quantity, entry_price, exit_price, entry_time,
                   exit_time, reason, partial, return_pct, pnl
            FROM closed_trades
            WHERE exit_time >= ?
            ORDER BY exit_time ASC, id ASC
            "#,
        )
        .bind(format_time(since))
        .fetch_all(&self.pool)
        .await
        .context("Failed to read closed trades")?;

        rows.into_iter().map(ClosedTrade::try_from).collect()
    }

    /// Number of journaled legs.
    pub async fn trade_count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM closed_trades")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl TradeJournal for Database {
    async fn record(&self, trade: &ClosedTrade) -> Result<()> {
        self.insert_closed_trade(trade).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    // A single connection keeps every query on the same in-memory database
    async fn memory_db() -> Database {
        Database::connect("sqlite::memory:", 1).await.unwrap()
    }

    fn trade(exit_time: DateTime<Utc>, reason: ExitReason, partial: bool) -> ClosedTrade {
        ClosedTrade {
            symbol: Symbol::new("NSE", "SBIN"),
            direction: Direction::Short,
            quantity: 5,
            entry_price: dec!(812.35),
            exit_price: dec!(808.10),
            entry_time: exit_time - Duration::minutes(40),
            exit_time,
            reason,
            partial,
        }
    }

    #[tokio::test]
    async fn test_record_and_read_back() {
        let db = memory_db().await;
        let original = trade(Utc::now(), ExitReason::TrailingStop, false);

        tokio_test::assert_ok!(db.record(&original).await);

        let stored = db.closed_trades_since(Utc::now() - Duration::days(1)).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].symbol, original.symbol);
        assert_eq!(stored[0].direction, Direction::Short);
        assert_eq!(stored[0].exit_price, dec!(808.10));
        assert_eq!(stored[0].reason, ExitReason::TrailingStop);
        assert_eq!(stored[0].exit_time.timestamp(), original.exit_time.timestamp());
    }

    #[tokio::test]
    async fn test_since_filters_and_orders() {
        let db = memory_db().await;
        let now = Utc::now();

        db.record(&trade(now - Duration::days(10), ExitReason::StopLoss, false)).await.unwrap();
        db.record(&trade(now - Duration::hours(2), ExitReason::Target, false)).await.unwrap();
        db.record(&trade(now - Duration::hours(3), ExitReason::PartialBooking, true)).await.unwrap();

        assert_eq!(db.trade_count().await.unwrap(), 3);

        let recent = db.closed_trades_since(now - Duration::days(1)).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].partial);
        assert_eq!(recent[1].reason, ExitReason::Target);
    }
}
