// End-to-end driver behaviour over a simulated calendar, using only the
// crate's public API.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use sweep_scheduler::{
    AuthContext, CollaboratorError, DailyDriver, DayOfWeek, DriverSettings, Frequency,
    NewSubscription, Notifier, OrderCreator, ScheduleSpec, Subscription, SubscriptionStatus,
    SubscriptionStore,
};

#[derive(Default)]
struct RecordingOrders {
    due_dates: Mutex<Vec<NaiveDate>>,
}

#[async_trait]
impl OrderCreator for RecordingOrders {
    async fn create_order_from_subscription(
        &self,
        _subscription: &Subscription,
        due_date: NaiveDate,
        _auth: &AuthContext,
    ) -> Result<(), CollaboratorError> {
        tokio::task::yield_now().await;
        self.due_dates.lock().unwrap().push(due_date);
        Ok(())
    }
}

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn monthly_second_saturday() -> NewSubscription {
    NewSubscription {
        user_id: "client-7".into(),
        order_id: "template-7".into(),
        cleaner_id: Some("cleaner-3".into()),
        address: Some("12 Harbour Rd".into()),
        service_ids: vec!["standard".into(), "windows".into()],
        start_date: date("2025-06-01"),
        end_date: date("2025-08-31"),
        schedule: ScheduleSpec {
            frequency: Frequency::Monthly,
            days_of_week: vec![DayOfWeek::Sat],
            week_numbers: vec![2],
        },
        price: 80.0,
    }
}

fn driver(store: &SubscriptionStore, orders: Arc<RecordingOrders>) -> DailyDriver {
    let (notifier, _rx) = Notifier::channel(64);
    DailyDriver::new(store.clone(), orders, notifier, DriverSettings::default())
}

#[tokio::test]
async fn daily_passes_over_a_summer_materialize_each_month_once() {
    let store = SubscriptionStore::open_in_memory().unwrap();
    let orders = Arc::new(RecordingOrders::default());
    let driver = driver(&store, orders.clone());
    let sub = store.create(monthly_second_saturday()).unwrap();

    let mut today = date("2025-06-01");
    while today <= date("2025-09-05") {
        driver.run_pass(today).await.unwrap();
        today = today.succ_opt().unwrap();
    }

    assert_eq!(
        *orders.due_dates.lock().unwrap(),
        vec![date("2025-06-14"), date("2025-07-12"), date("2025-08-09")]
    );
    let after = store.get(&sub.id).unwrap();
    assert_eq!(after.status, SubscriptionStatus::Expired);
    assert_eq!(after.next_planned_date, None);
    assert!(after.last_order_date.is_some());
}

#[tokio::test]
async fn two_drivers_on_one_store_do_not_duplicate_an_order() {
    let store = SubscriptionStore::open_in_memory().unwrap();
    let orders = Arc::new(RecordingOrders::default());
    let first = driver(&store, orders.clone());
    let second = driver(&store, orders.clone());
    let mut new = monthly_second_saturday();
    new.start_date = date("2025-06-14");
    store.create(new).unwrap();

    let today = date("2025-06-12");
    let (a, b) = tokio::join!(first.run_pass(today), second.run_pass(today));

    assert_eq!(*orders.due_dates.lock().unwrap(), vec![date("2025-06-14")]);
    let advanced = a.unwrap().advanced + b.unwrap().advanced;
    assert_eq!(advanced, 1);
}
