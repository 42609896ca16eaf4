use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, NaiveDate, Utc};
use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use sweep_core::config::SchedulerConfig;
use tokio::sync::{watch, Mutex};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::collaborators::{AuthContext, OrderCreator};
use crate::error::Result;
use crate::notify::{EventType, NotificationEvent, Notifier};
use crate::schedule::next_dates;
use crate::store::SubscriptionStore;
use crate::types::SubscriptionStatus;

/// Tunables for [`DailyDriver`].
#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub interval: Duration,
    pub run_on_startup: bool,
    pub horizon_days: u32,
    pub expiring_notice_days: u32,
    pub concurrency: usize,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for DriverSettings {
    fn from(cfg: &SchedulerConfig) -> Self {
        Self {
            interval: Duration::from_secs(cfg.interval_secs),
            run_on_startup: cfg.run_on_startup,
            horizon_days: cfg.horizon_days,
            expiring_notice_days: cfg.expiring_notice_days,
            concurrency: cfg.concurrency.max(1),
        }
    }
}

/// Counters for one driver pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub expiring_notices: usize,
    pub scanned: usize,
    pub materialized: usize,
    pub order_failures: usize,
    pub advanced: usize,
    pub expired: usize,
    pub skipped: usize,
    pub errors: usize,
    pub interrupted: usize,
}

/// What happened to a single subscription during the materialization pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Advanced {
        materialized: bool,
        order_failed: bool,
        expired: bool,
    },
    /// Not due, no longer active, or another writer moved the cursor first.
    Skipped,
    Failed,
    /// Shutdown was requested before the item started.
    Interrupted,
}

/// Periodic task that materializes due occurrences and advances cursors.
///
/// Passes never overlap: the loop awaits each pass before taking the next
/// tick, and [`run_pass`](Self::run_pass) refuses to start while another pass
/// is in flight. Within a pass each subscription is handled under its own
/// lock and its cursor is moved with a compare-and-swap.
pub struct DailyDriver {
    store: SubscriptionStore,
    orders: Arc<dyn OrderCreator>,
    notifier: Notifier,
    auth: AuthContext,
    settings: DriverSettings,
    in_flight: AtomicBool,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl DailyDriver {
    pub fn new(
        store: SubscriptionStore,
        orders: Arc<dyn OrderCreator>,
        notifier: Notifier,
        settings: DriverSettings,
    ) -> Self {
        Self {
            store,
            orders,
            notifier,
            auth: AuthContext::default(),
            settings,
            in_flight: AtomicBool::new(false),
            locks: DashMap::new(),
        }
    }

    /// Credentials forwarded to the order service.
    pub fn with_auth(mut self, auth: AuthContext) -> Self {
        self.auth = auth;
        self
    }

    /// Main loop. Runs a pass per tick until `shutdown` broadcasts `true`.
    ///
    /// A pass that is running when shutdown arrives stops taking new
    /// subscriptions but finishes the ones it already started.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.settings.interval.as_secs(),
            horizon_days = self.settings.horizon_days,
            "daily driver started"
        );

        let first = if self.settings.run_on_startup {
            Instant::now()
        } else {
            Instant::now() + self.settings.interval
        };
        let mut interval = tokio::time::interval_at(first, self.settings.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let today = Utc::now().date_naive();
                    self.run_pass_until(today, Some(&shutdown)).await;
                    if *shutdown.borrow() {
                        info!("daily driver shutting down");
                        break;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("daily driver shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Run both passes once for `today`.
    ///
    /// Returns `None` without doing anything if a pass is already running.
    pub async fn run_pass(&self, today: NaiveDate) -> Option<PassReport> {
        self.run_pass_until(today, None).await
    }

    async fn run_pass_until(
        &self,
        today: NaiveDate,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Option<PassReport> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            warn!(%today, "driver pass already in flight, tick skipped");
            return None;
        }
        let _guard = InFlight(&self.in_flight);

        let started = std::time::Instant::now();
        let mut report = PassReport::default();
        self.expiring_soon_pass(today, &mut report);
        self.materialization_pass(today, shutdown, &mut report).await;

        info!(
            %today,
            scanned = report.scanned,
            materialized = report.materialized,
            order_failures = report.order_failures,
            advanced = report.advanced,
            expired = report.expired,
            skipped = report.skipped,
            errors = report.errors,
            interrupted = report.interrupted,
            expiring_notices = report.expiring_notices,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "driver pass complete"
        );
        Some(report)
    }

    /// Notify owners of Active subscriptions whose `end_date` is exactly
    /// `expiring_notice_days` away. Read-only.
    fn expiring_soon_pass(&self, today: NaiveDate, report: &mut PassReport) {
        let target = add_days(today, self.settings.expiring_notice_days);
        let active = match self.store.list_active() {
            Ok(subs) => subs,
            Err(e) => {
                error!(error = %e, "expiring-soon scan failed");
                report.errors += 1;
                return;
            }
        };

        for sub in active.iter().filter(|s| s.end_date == target) {
            debug!(subscription_id = %sub.id, %target, "subscription expiring soon");
            self.notifier.notify(NotificationEvent::for_subscription(
                EventType::SubscriptionExpiringSoon,
                sub,
            ));
            report.expiring_notices += 1;
        }
    }

    async fn materialization_pass(
        &self,
        today: NaiveDate,
        shutdown: Option<&watch::Receiver<bool>>,
        report: &mut PassReport,
    ) {
        let horizon = add_days(today, self.settings.horizon_days);
        let due = match self.store.list_due(horizon) {
            Ok(subs) => subs,
            Err(e) => {
                error!(error = %e, "due-subscription scan failed");
                report.errors += 1;
                return;
            }
        };
        report.scanned = due.len();

        let outcomes: Vec<ItemOutcome> = stream::iter(due)
            .map(|sub| async move {
                if shutdown.is_some_and(|rx| *rx.borrow()) {
                    return ItemOutcome::Interrupted;
                }
                match self.process(&sub.id, today, horizon).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!(subscription_id = %sub.id, error = %e, "subscription skipped this pass");
                        ItemOutcome::Failed
                    }
                }
            })
            .buffer_unordered(self.settings.concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                ItemOutcome::Advanced {
                    materialized,
                    order_failed,
                    expired,
                } => {
                    report.advanced += 1;
                    report.materialized += usize::from(materialized);
                    report.order_failures += usize::from(order_failed);
                    report.expired += usize::from(expired);
                }
                ItemOutcome::Skipped => report.skipped += 1,
                ItemOutcome::Failed => report.errors += 1,
                ItemOutcome::Interrupted => report.interrupted += 1,
            }
        }
    }

    /// Evaluate, advance and materialize one subscription.
    ///
    /// The cursor advances whether or not the order is created, so an
    /// occurrence is attempted at most once.
    async fn process(&self, id: &str, today: NaiveDate, horizon: NaiveDate) -> Result<ItemOutcome> {
        let lock = self.lock_for(id);
        let outcome = {
            let _held = lock.lock().await;
            self.process_locked(id, today, horizon).await
        };
        drop(lock);
        // Keep the entry only while another task is queued on it.
        self.locks.remove_if(id, |_, m| Arc::strong_count(m) == 1);
        outcome
    }

    async fn process_locked(
        &self,
        id: &str,
        today: NaiveDate,
        horizon: NaiveDate,
    ) -> Result<ItemOutcome> {
        // Re-read under the lock; the listing may be stale.
        let sub = self.store.get(id)?;
        if sub.status != SubscriptionStatus::Active {
            return Ok(ItemOutcome::Skipped);
        }
        let Some(cursor) = sub.next_planned_date else {
            return Ok(ItemOutcome::Skipped);
        };
        if cursor > horizon {
            return Ok(ItemOutcome::Skipped);
        }

        let is_due = next_dates(&sub.schedule, today, horizon).contains(&cursor);
        let next = next_dates(&sub.schedule, add_days(horizon, 1), sub.end_date)
            .first()
            .copied();

        // Whoever moves the cursor owns the order for `cursor`.
        if !self.store.advance_from(id, cursor, next)? {
            warn!(subscription_id = %id, "cursor moved by another writer");
            return Ok(ItemOutcome::Skipped);
        }

        let mut materialized = false;
        let mut order_failed = false;
        if is_due {
            match self
                .orders
                .create_order_from_subscription(&sub, cursor, &self.auth)
                .await
            {
                Ok(()) => {
                    materialized = true;
                    info!(subscription_id = %id, due = %cursor, "order materialized");
                    if let Err(e) = self.store.record_occurrence(id, Utc::now()) {
                        warn!(subscription_id = %id, error = %e, "failed to record occurrence");
                    }
                }
                Err(e) => {
                    order_failed = true;
                    warn!(subscription_id = %id, due = %cursor, error = %e, "order creation failed; occurrence not retried");
                }
            }
        }

        let expired = next.is_none();
        if expired {
            let mut final_state = sub;
            final_state.status = SubscriptionStatus::Expired;
            final_state.next_planned_date = None;
            self.notifier.notify(NotificationEvent::for_subscription(
                EventType::SubscriptionExpired,
                &final_state,
            ));
        }

        Ok(ItemOutcome::Advanced {
            materialized,
            order_failed,
            expired,
        })
    }

    fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Clears the in-flight flag when a pass ends, including on panic.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn add_days(date: NaiveDate, days: u32) -> NaiveDate {
    date.checked_add_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MAX)
}
