//! Monitor tables (C24): a read-side projection the dashboard polls, kept separate from the
//! authoritative `strategy_state` archive so a slow or locked monitor write can never hold up a
//! save. `monitor_signal_snapshot` is upserted (latest state per signal instance);
//! `monitor_signal_event` is append-only with an idempotency key so a retried publish never
//! double-inserts the same event.

use rust_decimal::Decimal;
use sqlx::any::AnyPool;
use chrono::{DateTime, Utc};

/// Latest observed state of one signal instance, overwritten on every publish.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSnapshot {
    pub variant: String,
    pub instance_id: String,
    pub vt_symbol: String,
    pub bar_dt: DateTime<Utc>,
    pub payload_json: String,
}

/// A discrete, auditable signal event (open/close/skip/risk-block). `idempotency_key` is unique so
/// re-publishing the same logical event (e.g. after a worker restart mid-save) is a no-op.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalEvent {
    pub variant: String,
    pub instance_id: String,
    pub vt_symbol: String,
    pub bar_dt: DateTime<Utc>,
    pub event_type: String,
    pub detail: String,
    pub quantity: Option<Decimal>,
}

impl SignalEvent {
    fn idempotency_key(&self) -> String {
        format!("{}|{}|{}|{}|{}", self.variant, self.instance_id, self.vt_symbol, self.bar_dt.to_rfc3339(), self.event_type)
    }
}

pub async fn ensure_schema(pool: &AnyPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS monitor_signal_snapshot (\
            variant TEXT NOT NULL, \
            instance_id TEXT NOT NULL, \
            vt_symbol TEXT NOT NULL, \
            bar_dt TEXT NOT NULL, \
            payload_json TEXT NOT NULL, \
            PRIMARY KEY (variant, instance_id)\
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS monitor_signal_event (\
            id INTEGER PRIMARY KEY AUTOINCREMENT, \
            idempotency_key TEXT NOT NULL UNIQUE, \
            variant TEXT NOT NULL, \
            instance_id TEXT NOT NULL, \
            vt_symbol TEXT NOT NULL, \
            bar_dt TEXT NOT NULL, \
            event_type TEXT NOT NULL, \
            detail TEXT NOT NULL, \
            quantity TEXT\
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Upserts the latest snapshot for `(variant, instance_id)`.
pub async fn monitor_signal_snapshot(pool: &AnyPool, snapshot: &SignalSnapshot) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO monitor_signal_snapshot (variant, instance_id, vt_symbol, bar_dt, payload_json) VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT (variant, instance_id) DO UPDATE SET vt_symbol = excluded.vt_symbol, bar_dt = excluded.bar_dt, payload_json = excluded.payload_json",
    )
    .bind(&snapshot.variant)
    .bind(&snapshot.instance_id)
    .bind(&snapshot.vt_symbol)
    .bind(snapshot.bar_dt.to_rfc3339())
    .bind(&snapshot.payload_json)
    .execute(pool)
    .await?;
    Ok(())
}

/// Inserts `event`, ignoring it silently if its idempotency key has already been recorded.
pub async fn monitor_signal_event(pool: &AnyPool, event: &SignalEvent) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO monitor_signal_event (idempotency_key, variant, instance_id, vt_symbol, bar_dt, event_type, detail, quantity) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) ON CONFLICT (idempotency_key) DO NOTHING",
    )
    .bind(event.idempotency_key())
    .bind(&event.variant)
    .bind(&event.instance_id)
    .bind(&event.vt_symbol)
    .bind(event.bar_dt.to_rfc3339())
    .bind(&event.event_type)
    .bind(&event.detail)
    .bind(event.quantity.map(|q| q.to_string()))
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::db::connect;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    async fn pool() -> AnyPool {
        let pool = connect("sqlite::memory:", Duration::from_secs(5)).await.unwrap();
        ensure_schema(&pool).await.unwrap();
        pool
    }

    fn sample_event(event_type: &str) -> SignalEvent {
        SignalEvent {
            variant: "VolArb".to_string(),
            instance_id: "rb".to_string(),
            vt_symbol: "rb2505.SHFE".to_string(),
            bar_dt: Utc::now(),
            event_type: event_type.to_string(),
            detail: "opened long".to_string(),
            quantity: Some(dec!(5)),
        }
    }

    #[tokio::test]
    async fn snapshot_upsert_keeps_only_the_latest_row_per_instance() {
        let pool = pool().await;
        let mut snap = SignalSnapshot {
            variant: "VolArb".to_string(),
            instance_id: "rb".to_string(),
            vt_symbol: "rb2505.SHFE".to_string(),
            bar_dt: Utc::now(),
            payload_json: "{}".to_string(),
        };
        monitor_signal_snapshot(&pool, &snap).await.unwrap();
        snap.payload_json = "{\"updated\": true}".to_string();
        monitor_signal_snapshot(&pool, &snap).await.unwrap();

        let row: (String,) = sqlx::query_as("SELECT payload_json FROM monitor_signal_snapshot WHERE variant = ? AND instance_id = ?")
            .bind("VolArb")
            .bind("rb")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.0, "{\"updated\": true}");

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM monitor_signal_snapshot").fetch_one(&pool).await.unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn repeated_event_publish_is_idempotent() {
        let pool = pool().await;
        let event = sample_event("open");
        monitor_signal_event(&pool, &event).await.unwrap();
        monitor_signal_event(&pool, &event).await.unwrap();

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM monitor_signal_event").fetch_one(&pool).await.unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn distinct_event_types_are_both_recorded() {
        let pool = pool().await;
        monitor_signal_event(&pool, &sample_event("open")).await.unwrap();
        monitor_signal_event(&pool, &sample_event("close")).await.unwrap();

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM monitor_signal_event").fetch_one(&pool).await.unwrap();
        assert_eq!(count.0, 2);
    }
}
