use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{types::Type, Connection, Row};

use crate::error::Result;
use crate::types::{ScheduleSpec, Subscription, SubscriptionStatus};

/// Column list shared by every SELECT so `row_to_subscription` stays in sync.
pub(crate) const SUBSCRIPTION_COLUMNS: &str = "id, user_id, order_id, cleaner_id, address, \
     service_ids, start_date, end_date, schedule, price, status, last_order_date, \
     next_planned_date, created_at, updated_at";

/// Initialise the subscription schema in `conn`.
///
/// Creates the `subscriptions` table (idempotent) plus the indices used by the
/// driver's due-date scan and the per-client listing.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS subscriptions (
            id                 TEXT NOT NULL PRIMARY KEY,
            user_id            TEXT NOT NULL,
            order_id           TEXT NOT NULL,   -- template order
            cleaner_id         TEXT,
            address            TEXT,
            service_ids        TEXT NOT NULL DEFAULT '[]',  -- JSON array
            start_date         TEXT NOT NULL,   -- YYYY-MM-DD
            end_date           TEXT NOT NULL,   -- YYYY-MM-DD, inclusive
            schedule           TEXT NOT NULL,   -- JSON-encoded ScheduleSpec
            price              REAL NOT NULL,
            status             TEXT NOT NULL DEFAULT 'active',
            last_order_date    TEXT,            -- RFC 3339 or NULL
            next_planned_date  TEXT,            -- YYYY-MM-DD or NULL
            created_at         TEXT NOT NULL,
            updated_at         TEXT NOT NULL
        ) STRICT;

        -- Driver scan: WHERE status = 'active' AND next_planned_date <= ?
        CREATE INDEX IF NOT EXISTS idx_subscriptions_due
            ON subscriptions (status, next_planned_date);
        CREATE INDEX IF NOT EXISTS idx_subscriptions_user
            ON subscriptions (user_id);
        ",
    )?;
    Ok(())
}

/// Map a row selected with `SUBSCRIPTION_COLUMNS` to a `Subscription`.
pub(crate) fn row_to_subscription(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    let service_ids: String = row.get(5)?;
    let schedule: String = row.get(8)?;
    let status: String = row.get(10)?;

    Ok(Subscription {
        id: row.get(0)?,
        user_id: row.get(1)?,
        order_id: row.get(2)?,
        cleaner_id: row.get(3)?,
        address: row.get(4)?,
        service_ids: serde_json::from_str(&service_ids).map_err(|e| conversion_error(5, e))?,
        start_date: parse_date(6, &row.get::<_, String>(6)?)?,
        end_date: parse_date(7, &row.get::<_, String>(7)?)?,
        schedule: serde_json::from_str::<ScheduleSpec>(&schedule)
            .map_err(|e| conversion_error(8, e))?,
        price: row.get(9)?,
        status: status
            .parse::<SubscriptionStatus>()
            .map_err(|e| conversion_error(10, e))?,
        last_order_date: row
            .get::<_, Option<String>>(11)?
            .map(|s| parse_timestamp(11, &s))
            .transpose()?,
        next_planned_date: row
            .get::<_, Option<String>>(12)?
            .map(|s| parse_date(12, &s))
            .transpose()?,
        created_at: parse_timestamp(13, &row.get::<_, String>(13)?)?,
        updated_at: parse_timestamp(14, &row.get::<_, String>(14)?)?,
    })
}

/// Dates are stored as `YYYY-MM-DD` so string comparison orders them.
pub(crate) fn date_to_sql(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date(idx: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| conversion_error(idx, e))
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}
