#![allow(async_fn_in_trait)]

use sqlx::SqlitePool;

use cardbridge_core::CardId;

use crate::error::{StorageError, StorageResult};
use crate::models::{NewPayment, NewReading, PaymentRecord, Reading};

/// Append-only log of device readings and payment outcomes.
pub trait ReadingLogRepository: Send + Sync {
    /// Store a reading, returning its row id.
    async fn record_reading(&self, reading: &NewReading) -> StorageResult<i64>;

    /// Store a payment outcome, returning its row id.
    async fn record_payment(&self, payment: &NewPayment) -> StorageResult<i64>;

    /// Most recent readings first.
    async fn recent_readings(&self, limit: i64) -> StorageResult<Vec<Reading>>;

    /// Most recent readings for one card first.
    async fn readings_for_card(&self, card_id: &CardId, limit: i64) -> StorageResult<Vec<Reading>>;

    /// Most recent payment outcomes first.
    async fn recent_payments(&self, limit: i64) -> StorageResult<Vec<PaymentRecord>>;
}

/// SQLite implementation of [`ReadingLogRepository`].
#[derive(Debug, Clone)]
pub struct SqliteReadingLogRepository {
    pool: SqlitePool,
}

impl SqliteReadingLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl ReadingLogRepository for SqliteReadingLogRepository {
    async fn record_reading(&self, reading: &NewReading) -> StorageResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO device_readings (line, event_kind, card_id, read_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&reading.line)
        .bind(reading.event_kind)
        .bind(reading.card_id.as_ref().map(CardId::as_str))
        .bind(reading.read_at)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn record_payment(&self, payment: &NewPayment) -> StorageResult<i64> {
        let amount = i64::try_from(payment.amount.value()).map_err(|_| {
            StorageError::Validation(format!("Amount {} exceeds storage range", payment.amount))
        })?;

        let result = sqlx::query(
            r#"
            INSERT INTO payment_outcomes (
                card_id, amount, description, success, message, processed_at
            )
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(payment.card_id.as_ref().map(CardId::as_str))
        .bind(amount)
        .bind(&payment.description)
        .bind(payment.success)
        .bind(payment.message.as_deref())
        .bind(payment.processed_at)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn recent_readings(&self, limit: i64) -> StorageResult<Vec<Reading>> {
        let readings = sqlx::query_as::<_, Reading>(
            r#"
            SELECT id, line, event_kind, card_id, read_at
            FROM device_readings
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(readings)
    }

    async fn readings_for_card(&self, card_id: &CardId, limit: i64) -> StorageResult<Vec<Reading>> {
        let readings = sqlx::query_as::<_, Reading>(
            r#"
            SELECT id, line, event_kind, card_id, read_at
            FROM device_readings
            WHERE card_id = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(card_id.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(readings)
    }

    async fn recent_payments(&self, limit: i64) -> StorageResult<Vec<PaymentRecord>> {
        let payments = sqlx::query_as::<_, PaymentRecord>(
            r#"
            SELECT id, card_id, amount, description, success, message, processed_at
            FROM payment_outcomes
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Database;
    use cardbridge_core::Amount;
    use cardbridge_protocol::parse;
    use chrono::{TimeZone, Utc};

    async fn repo() -> SqliteReadingLogRepository {
        let db = Database::in_memory().await.unwrap();
        SqliteReadingLogRepository::new(db.pool().clone())
    }

    #[tokio::test]
    async fn test_record_and_list_readings() {
        let repo = repo().await;
        let card = CardId::new("RF001234");
        let at = Utc.with_ymd_and_hms(2025, 10, 16, 9, 0, 0).unwrap();

        for line in ["SYSTEM READY", "UID:RF001234", "PIN:123456"] {
            let reading = NewReading::from_event(&parse(line), Some(&card), at);
            repo.record_reading(&reading).await.unwrap();
        }

        let readings = repo.recent_readings(10).await.unwrap();
        assert_eq!(readings.len(), 3);
        assert_eq!(readings[0].line, "PIN:******");
        assert_eq!(readings[0].event_kind, "pin_complete");
        assert_eq!(readings[1].card_id.as_deref(), Some("RF001234"));
        assert_eq!(readings[2].event_kind, "ready");
        assert_eq!(readings[2].read_at, at);
    }

    #[tokio::test]
    async fn test_raw_pin_never_stored() {
        let repo = repo().await;
        let reading = NewReading::from_event(&parse("PIN:987654"), None, Utc::now());
        repo.record_reading(&reading).await.unwrap();

        let stored: Vec<(String,)> = sqlx::query_as("SELECT line FROM device_readings")
            .fetch_all(&repo.pool)
            .await
            .unwrap();
        assert!(stored.iter().all(|(line,)| !line.contains("987654")));
    }

    #[tokio::test]
    async fn test_readings_for_card() {
        let repo = repo().await;
        for line in ["UID:RF1", "UID:RF2", "UID:RF1"] {
            let reading = NewReading::from_event(&parse(line), None, Utc::now());
            repo.record_reading(&reading).await.unwrap();
        }

        let readings = repo.readings_for_card(&CardId::new("RF1"), 10).await.unwrap();
        assert_eq!(readings.len(), 2);
        assert!(readings.iter().all(|r| r.card_id.as_deref() == Some("RF1")));
    }

    #[tokio::test]
    async fn test_record_payment_outcomes() {
        let repo = repo().await;
        let at = Utc::now();

        repo.record_payment(&NewPayment {
            card_id: Some(CardId::new("RF001234")),
            amount: Amount::new(1000).unwrap(),
            description: "POS Payment".to_string(),
            success: true,
            message: None,
            processed_at: at,
        })
        .await
        .unwrap();
        repo.record_payment(&NewPayment {
            card_id: None,
            amount: Amount::new(50).unwrap(),
            description: "POS Payment".to_string(),
            success: false,
            message: Some("No verified session".to_string()),
            processed_at: at,
        })
        .await
        .unwrap();

        let payments = repo.recent_payments(10).await.unwrap();
        assert_eq!(payments.len(), 2);
        assert!(!payments[0].success);
        assert_eq!(payments[0].card_id, None);
        assert_eq!(payments[0].message.as_deref(), Some("No verified session"));
        assert!(payments[1].success);
        assert_eq!(payments[1].amount, 1000);
    }

    #[tokio::test]
    async fn test_amount_out_of_range_rejected() {
        let repo = repo().await;
        let err = repo
            .record_payment(&NewPayment {
                card_id: None,
                amount: Amount::new(u64::MAX).unwrap(),
                description: String::new(),
                success: false,
                message: None,
                processed_at: Utc::now(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Validation(_)));
    }
}
