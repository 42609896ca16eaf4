use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use sweep_core::config::SweepConfig;
use sweep_scheduler::{Notifier, SubscriptionStore};
use tower_http::trace::TraceLayer;

use crate::auth::AuthValidator;
use crate::http::{health, subscriptions};

/// Central shared state, passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: SweepConfig,
    pub store: SubscriptionStore,
    pub notifier: Notifier,
    pub auth: Arc<dyn AuthValidator>,
}

impl AppState {
    pub fn new(
        config: SweepConfig,
        store: SubscriptionStore,
        notifier: Notifier,
        auth: Arc<dyn AuthValidator>,
    ) -> Self {
        Self {
            config,
            store,
            notifier,
            auth,
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/subscriptions",
            post(subscriptions::create).get(subscriptions::list),
        )
        .route("/subscriptions/my", get(subscriptions::my))
        .route("/subscriptions/extend/{id}", post(subscriptions::extend))
        .route(
            "/subscriptions/{id}",
            get(subscriptions::get_one)
                .put(subscriptions::update)
                .delete(subscriptions::cancel),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
