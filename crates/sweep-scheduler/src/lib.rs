//! `sweep-scheduler`: recurring cleaning subscriptions with SQLite persistence.
//!
//! # Overview
//!
//! A subscription carries a [`types::ScheduleSpec`]. The pure evaluator in
//! [`schedule`] turns a spec and a date range into concrete service dates.
//! [`store::SubscriptionStore`] owns the lifecycle and the
//! `next_planned_date` cursor, and [`engine::DailyDriver`] runs once a day to
//! materialize due occurrences as orders, advance cursors and expire
//! subscriptions with nothing left to schedule.
//!
//! # Frequencies
//!
//! | Variant     | `week_numbers` | Matches                                   |
//! |-------------|----------------|-------------------------------------------|
//! | `Weekly`    | ignored        | every listed weekday                      |
//! | `BiWeekly`  | exactly 2      | listed weekdays in the two listed weeks   |
//! | `TriWeekly` | exactly 3      | listed weekdays in the three listed weeks |
//! | `Monthly`   | exactly 1      | listed weekdays in the listed week        |
//!
//! Week *n* of a month is days `7(n-1)+1 ..= 7n`.

pub mod collaborators;
pub mod db;
pub mod engine;
pub mod error;
pub mod notify;
pub mod schedule;
pub mod store;
pub mod types;

pub use collaborators::{AuthContext, NotificationSender, OrderCreator};
pub use engine::{DailyDriver, DriverSettings, PassReport};
pub use error::{CollaboratorError, Result, SchedulerError};
pub use notify::{EventType, NotificationEvent, Notifier};
pub use schedule::{next_dates, week_of_month};
pub use store::SubscriptionStore;
pub use types::{
    DayOfWeek, Frequency, NewSubscription, ScheduleSpec, Subscription, SubscriptionFilter,
    SubscriptionStatus, SubscriptionUpdate,
};
