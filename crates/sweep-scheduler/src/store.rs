use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::db::{date_to_sql, init_db, row_to_subscription, SUBSCRIPTION_COLUMNS};
use crate::error::{Result, SchedulerError};
use crate::types::{
    NewSubscription, Subscription, SubscriptionFilter, SubscriptionStatus, SubscriptionUpdate,
};

/// Persisted subscription state machine.
///
/// Every write is a single-row UPDATE guarded by the expected status, so each
/// transition is atomic without multi-statement transactions. Cloning the
/// store shares the underlying connection.
#[derive(Clone)]
pub struct SubscriptionStore {
    db: Arc<Mutex<Connection>>,
}

impl SubscriptionStore {
    /// Wrap a connection, creating the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Fresh store on a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    /// Create an Active subscription whose cursor starts at `start_date`.
    #[instrument(skip(self, new), fields(user_id = %new.user_id))]
    pub fn create(&self, new: NewSubscription) -> Result<Subscription> {
        validate_new(&new)?;

        let now = Utc::now();
        let sub = Subscription {
            id: Uuid::now_v7().to_string(),
            user_id: new.user_id,
            order_id: new.order_id,
            cleaner_id: new.cleaner_id,
            address: new.address,
            service_ids: new.service_ids,
            start_date: new.start_date,
            end_date: new.end_date,
            schedule: new.schedule,
            price: new.price,
            status: SubscriptionStatus::Active,
            last_order_date: None,
            next_planned_date: Some(new.start_date),
            created_at: now,
            updated_at: now,
        };

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO subscriptions
             (id, user_id, order_id, cleaner_id, address, service_ids, start_date,
              end_date, schedule, price, status, last_order_date, next_planned_date,
              created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,'active',NULL,?11,?12,?12)",
            rusqlite::params![
                sub.id,
                sub.user_id,
                sub.order_id,
                sub.cleaner_id,
                sub.address,
                serde_json::to_string(&sub.service_ids)?,
                date_to_sql(sub.start_date),
                date_to_sql(sub.end_date),
                serde_json::to_string(&sub.schedule)?,
                sub.price,
                date_to_sql(sub.start_date),
                now.to_rfc3339(),
            ],
        )?;

        info!(subscription_id = %sub.id, start = %sub.start_date, end = %sub.end_date, "subscription created");
        Ok(sub)
    }

    /// Fetch one subscription or `NotFound`.
    pub fn get(&self, id: &str) -> Result<Subscription> {
        let conn = self.conn()?;
        fetch(&conn, id)?.ok_or_else(|| not_found(id))
    }

    /// List subscriptions matching every set field of `filter`, oldest first.
    #[instrument(skip(self))]
    pub fn list(&self, filter: &SubscriptionFilter) -> Result<Vec<Subscription>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
             WHERE (?1 IS NULL OR status = ?1)
               AND (?2 IS NULL OR user_id = ?2)
               AND (?3 IS NULL OR cleaner_id = ?3)
             ORDER BY created_at, id"
        ))?;
        let rows = stmt.query_map(
            rusqlite::params![
                filter.status.map(|s| s.as_str()),
                filter.client_id,
                filter.cleaner_id,
            ],
            row_to_subscription,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn list_active(&self) -> Result<Vec<Subscription>> {
        self.list(&SubscriptionFilter::active())
    }

    pub fn list_for_client(&self, user_id: &str) -> Result<Vec<Subscription>> {
        self.list(&SubscriptionFilter::for_client(user_id))
    }

    /// Active subscriptions whose cursor is set and on or before `until`.
    #[instrument(skip(self))]
    pub fn list_due(&self, until: NaiveDate) -> Result<Vec<Subscription>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
             WHERE status = 'active'
               AND next_planned_date IS NOT NULL
               AND next_planned_date <= ?1
             ORDER BY next_planned_date, id"
        ))?;
        let rows = stmt.query_map([date_to_sql(until)], row_to_subscription)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Move the cursor to `next`. `None` means no occurrences remain and the
    /// subscription expires.
    ///
    /// Repeating a call with the same argument leaves the row untouched.
    #[instrument(skip(self))]
    pub fn advance(&self, id: &str, next: Option<NaiveDate>) -> Result<Subscription> {
        let conn = self.conn()?;
        let next_sql = next.map(date_to_sql);
        let n = conn.execute(
            "UPDATE subscriptions
             SET next_planned_date = ?2,
                 status = CASE WHEN ?2 IS NULL THEN 'expired' ELSE status END,
                 updated_at = ?3
             WHERE id = ?1 AND status = 'active'
               AND (?2 IS NULL OR next_planned_date IS NOT ?2)",
            rusqlite::params![id, next_sql, Utc::now().to_rfc3339()],
        )?;

        let current = fetch(&conn, id)?.ok_or_else(|| not_found(id))?;
        if n == 1 {
            log_advance(&current);
            return Ok(current);
        }

        // Nothing changed: either a repeat of an applied call or a refusal.
        let already_applied = match next {
            Some(_) => current.status == SubscriptionStatus::Active,
            None => current.status == SubscriptionStatus::Expired,
        } && current.next_planned_date == next;
        if already_applied {
            debug!(subscription_id = %id, "advance already applied");
            Ok(current)
        } else {
            Err(SchedulerError::InvalidTransition {
                id: id.to_string(),
                status: current.status,
                action: "advance",
            })
        }
    }

    /// Compare-and-swap variant of [`advance`](Self::advance): only applies
    /// when the subscription is still Active with its cursor at `expected`.
    ///
    /// Returns `false` when another writer moved the cursor first.
    #[instrument(skip(self))]
    pub fn advance_from(
        &self,
        id: &str,
        expected: NaiveDate,
        next: Option<NaiveDate>,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE subscriptions
             SET next_planned_date = ?3,
                 status = CASE WHEN ?3 IS NULL THEN 'expired' ELSE status END,
                 updated_at = ?4
             WHERE id = ?1 AND status = 'active' AND next_planned_date = ?2",
            rusqlite::params![
                id,
                date_to_sql(expected),
                next.map(date_to_sql),
                Utc::now().to_rfc3339()
            ],
        )?;
        if n == 1 {
            let current = fetch(&conn, id)?.ok_or_else(|| not_found(id))?;
            log_advance(&current);
            return Ok(true);
        }
        if fetch(&conn, id)?.is_none() {
            return Err(not_found(id));
        }
        Ok(false)
    }

    /// Cancel on explicit request. The cursor is kept for audit.
    #[instrument(skip(self))]
    pub fn cancel(&self, id: &str) -> Result<Subscription> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE subscriptions SET status = 'cancelled', updated_at = ?2
             WHERE id = ?1 AND status = 'active'",
            rusqlite::params![id, Utc::now().to_rfc3339()],
        )?;
        let current = fetch(&conn, id)?.ok_or_else(|| not_found(id))?;
        match (n, current.status) {
            (1, _) => {
                info!(subscription_id = %id, "subscription cancelled");
                Ok(current)
            }
            (_, SubscriptionStatus::Cancelled) => Ok(current),
            (_, status) => Err(SchedulerError::InvalidTransition {
                id: id.to_string(),
                status,
                action: "cancel",
            }),
        }
    }

    /// Stamp the time the latest order was materialized.
    #[instrument(skip(self))]
    pub fn record_occurrence(&self, id: &str, when: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE subscriptions SET last_order_date = ?2, updated_at = ?3 WHERE id = ?1",
            rusqlite::params![id, when.to_rfc3339(), Utc::now().to_rfc3339()],
        )?;
        if n == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    /// Apply a partial update to an Active subscription.
    ///
    /// A changed schedule takes effect from the cursor onwards; the next
    /// driver pass realigns the cursor to the new recurrence.
    #[instrument(skip(self, patch))]
    pub fn update(&self, id: &str, patch: SubscriptionUpdate) -> Result<Subscription> {
        if let Some(ref schedule) = patch.schedule {
            schedule.validate()?;
        }
        if let Some(price) = patch.price {
            validate_price(price)?;
        }

        let conn = self.conn()?;
        let mut sub = fetch(&conn, id)?.ok_or_else(|| not_found(id))?;
        if sub.status != SubscriptionStatus::Active {
            return Err(SchedulerError::InvalidTransition {
                id: id.to_string(),
                status: sub.status,
                action: "update",
            });
        }

        if let Some(price) = patch.price {
            sub.price = price;
        }
        if let Some(schedule) = patch.schedule {
            sub.schedule = schedule;
        }
        if let Some(address) = patch.address {
            sub.address = Some(address);
        }
        if let Some(service_ids) = patch.service_ids {
            sub.service_ids = service_ids;
        }
        if let Some(cleaner_id) = patch.cleaner_id {
            sub.cleaner_id = Some(cleaner_id);
        }
        sub.updated_at = Utc::now();

        let n = conn.execute(
            "UPDATE subscriptions
             SET price = ?2, schedule = ?3, address = ?4, service_ids = ?5,
                 cleaner_id = ?6, updated_at = ?7
             WHERE id = ?1 AND status = 'active'",
            rusqlite::params![
                id,
                sub.price,
                serde_json::to_string(&sub.schedule)?,
                sub.address,
                serde_json::to_string(&sub.service_ids)?,
                sub.cleaner_id,
                sub.updated_at.to_rfc3339(),
            ],
        )?;
        if n == 0 {
            return Err(SchedulerError::InvalidTransition {
                id: id.to_string(),
                status: sub.status,
                action: "update",
            });
        }
        info!(subscription_id = %id, "subscription updated");
        Ok(sub)
    }

    /// Push `end_date` out to `new_end`. Shortening is not allowed.
    #[instrument(skip(self))]
    pub fn extend(&self, id: &str, new_end: NaiveDate) -> Result<Subscription> {
        let conn = self.conn()?;
        let current = fetch(&conn, id)?.ok_or_else(|| not_found(id))?;
        if current.status != SubscriptionStatus::Active {
            return Err(SchedulerError::InvalidTransition {
                id: id.to_string(),
                status: current.status,
                action: "extend",
            });
        }
        if new_end < current.end_date {
            return Err(SchedulerError::Validation(format!(
                "new end_date {new_end} is before current end_date {}",
                current.end_date
            )));
        }

        conn.execute(
            "UPDATE subscriptions SET end_date = ?2, updated_at = ?3
             WHERE id = ?1 AND status = 'active'",
            rusqlite::params![id, date_to_sql(new_end), Utc::now().to_rfc3339()],
        )?;
        info!(subscription_id = %id, from = %current.end_date, to = %new_end, "subscription extended");
        fetch(&conn, id)?.ok_or_else(|| not_found(id))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| SchedulerError::LockPoisoned)
    }
}

fn fetch(conn: &Connection, id: &str) -> Result<Option<Subscription>> {
    Ok(conn
        .query_row(
            &format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = ?1"),
            [id],
            row_to_subscription,
        )
        .optional()?)
}

fn not_found(id: &str) -> SchedulerError {
    SchedulerError::NotFound { id: id.to_string() }
}

fn log_advance(sub: &Subscription) {
    match sub.next_planned_date {
        Some(next) => info!(subscription_id = %sub.id, %next, "cursor advanced"),
        None => info!(subscription_id = %sub.id, "no occurrences left; subscription expired"),
    }
}

fn validate_new(new: &NewSubscription) -> Result<()> {
    new.schedule.validate()?;
    validate_price(new.price)?;
    if new.start_date > new.end_date {
        return Err(SchedulerError::Validation(format!(
            "start_date {} is after end_date {}",
            new.start_date, new.end_date
        )));
    }
    if new.user_id.trim().is_empty() || new.order_id.trim().is_empty() {
        return Err(SchedulerError::Validation(
            "user_id and order_id are required".to_string(),
        ));
    }
    Ok(())
}

fn validate_price(price: f64) -> Result<()> {
    if !price.is_finite() || price < 0.0 {
        return Err(SchedulerError::Validation(format!(
            "price must be a non-negative number, got {price}"
        )));
    }
    Ok(())
}
