use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// How often within a month a subscription recurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    /// Every matching weekday; `week_numbers` is ignored.
    Weekly,
    /// Two weeks of the month.
    #[serde(alias = "biweekly", alias = "bi-weekly")]
    BiWeekly,
    /// Three weeks of the month.
    #[serde(alias = "triweekly", alias = "tri-weekly")]
    TriWeekly,
    /// One week of the month.
    Monthly,
}

impl Frequency {
    /// Number of `week_numbers` entries the frequency requires, or `None`
    /// when the list is ignored.
    pub fn required_week_numbers(&self) -> Option<usize> {
        match self {
            Frequency::Weekly => None,
            Frequency::BiWeekly => Some(2),
            Frequency::TriWeekly => Some(3),
            Frequency::Monthly => Some(1),
        }
    }
}

/// Weekday abbreviation as it appears in a schedule (`"Mon"` … `"Sun"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DayOfWeek {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl From<Weekday> for DayOfWeek {
    fn from(day: Weekday) -> Self {
        match day {
            Weekday::Mon => DayOfWeek::Mon,
            Weekday::Tue => DayOfWeek::Tue,
            Weekday::Wed => DayOfWeek::Wed,
            Weekday::Thu => DayOfWeek::Thu,
            Weekday::Fri => DayOfWeek::Fri,
            Weekday::Sat => DayOfWeek::Sat,
            Weekday::Sun => DayOfWeek::Sun,
        }
    }
}

/// Declarative recurrence rule attached to a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSpec {
    pub frequency: Frequency,
    pub days_of_week: Vec<DayOfWeek>,
    /// 1-based week-of-month indices (1–5). Ignored for `Weekly`.
    #[serde(default)]
    pub week_numbers: Vec<u8>,
}

/// Lifecycle state of a subscription. `Expired` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SubscriptionStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "expired" => Ok(SubscriptionStatus::Expired),
            "cancelled" => Ok(SubscriptionStatus::Cancelled),
            other => Err(format!("unknown subscription status: {other}")),
        }
    }
}

/// A persisted subscription record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// UUIDv7 string, primary key.
    pub id: String,
    /// Client who owns the subscription.
    pub user_id: String,
    /// Template order every materialized occurrence is copied from.
    pub order_id: String,
    pub cleaner_id: Option<String>,
    pub address: Option<String>,
    pub service_ids: Vec<String>,
    /// First day of the service window (inclusive).
    pub start_date: NaiveDate,
    /// Last day of the service window (inclusive).
    pub end_date: NaiveDate,
    pub schedule: ScheduleSpec,
    /// Charged per materialized occurrence.
    pub price: f64,
    pub status: SubscriptionStatus,
    /// When the most recent order was materialized.
    pub last_order_date: Option<DateTime<Utc>>,
    /// Next occurrence due; `None` once no occurrences remain.
    pub next_planned_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubscription {
    pub user_id: String,
    pub order_id: String,
    #[serde(default)]
    pub cleaner_id: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub service_ids: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub schedule: ScheduleSpec,
    pub price: f64,
}

/// Partial update applied by `PUT /subscriptions/{id}`. Absent fields are
/// left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionUpdate {
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub schedule: Option<ScheduleSpec>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub service_ids: Option<Vec<String>>,
    #[serde(default)]
    pub cleaner_id: Option<String>,
}

/// Filter criteria for listing subscriptions. `None` matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionFilter {
    #[serde(default)]
    pub status: Option<SubscriptionStatus>,
    /// Owning client (`user_id`).
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub cleaner_id: Option<String>,
}

impl SubscriptionFilter {
    pub fn active() -> Self {
        Self {
            status: Some(SubscriptionStatus::Active),
            ..Self::default()
        }
    }

    pub fn for_client(client_id: impl Into<String>) -> Self {
        Self {
            client_id: Some(client_id.into()),
            ..Self::default()
        }
    }
}
