//! Subscription CRUD under `/subscriptions`.
//!
//! Every route requires an authenticated caller. Clients reach only their own
//! subscriptions; admins reach all of them and are the only role allowed to
//! list across owners.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use sweep_core::Caller;
use sweep_scheduler::{
    EventType, NewSubscription, NotificationEvent, ScheduleSpec, Subscription,
    SubscriptionFilter, SubscriptionUpdate,
};
use tracing::info;

use crate::app::AppState;
use crate::auth::AuthenticatedCaller;
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiQuery};

#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionRequest {
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

#[derive(Debug, Deserialize)]
pub struct ExtendRequest {
    pub end_date: NaiveDate,
}

/// Load a subscription and check the caller may act on it.
fn load_owned(state: &AppState, caller: &Caller, id: &str) -> ApiResult<Subscription> {
    let sub = state.store.get(id)?;
    if !caller.can_access(&sub.user_id) {
        return Err(ApiError::forbidden(format!(
            "subscription {id} belongs to another user"
        )));
    }
    Ok(sub)
}

/// POST /subscriptions: create a subscription owned by the caller.
pub async fn create(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    ApiJson(req): ApiJson<CreateSubscriptionRequest>,
) -> ApiResult<(StatusCode, Json<Subscription>)> {
    let sub = state.store.create(NewSubscription {
        user_id: caller.user_id.clone(),
        order_id: req.order_id,
        cleaner_id: req.cleaner_id,
        address: req.address,
        service_ids: req.service_ids,
        start_date: req.start_date,
        end_date: req.end_date,
        schedule: req.schedule,
        price: req.price,
    })?;
    state.notifier.notify(NotificationEvent::for_subscription(
        EventType::SubscriptionCreated,
        &sub,
    ));
    info!(id = %sub.id, user_id = %caller.user_id, "subscription created via API");
    Ok((StatusCode::CREATED, Json(sub)))
}

/// POST /subscriptions/extend/{id}: push `end_date` later.
pub async fn extend(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<ExtendRequest>,
) -> ApiResult<Json<Subscription>> {
    load_owned(&state, &caller, &id)?;
    Ok(Json(state.store.extend(&id, req.end_date)?))
}

/// GET /subscriptions/{id}
pub async fn get_one(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(id): Path<String>,
) -> ApiResult<Json<Subscription>> {
    Ok(Json(load_owned(&state, &caller, &id)?))
}

/// GET /subscriptions/my
pub async fn my(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
) -> ApiResult<Json<Vec<Subscription>>> {
    Ok(Json(state.store.list_for_client(&caller.user_id)?))
}

/// GET /subscriptions?status=&client_id=&cleaner_id=: admin only.
pub async fn list(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    ApiQuery(filter): ApiQuery<SubscriptionFilter>,
) -> ApiResult<Json<Vec<Subscription>>> {
    if !caller.role.is_admin() {
        return Err(ApiError::forbidden("listing all subscriptions requires admin"));
    }
    Ok(Json(state.store.list(&filter)?))
}

/// PUT /subscriptions/{id}
pub async fn update(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<SubscriptionUpdate>,
) -> ApiResult<Json<Subscription>> {
    load_owned(&state, &caller, &id)?;
    Ok(Json(state.store.update(&id, patch)?))
}

/// DELETE /subscriptions/{id}: soft cancel; the row is kept.
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(id): Path<String>,
) -> ApiResult<Json<Subscription>> {
    load_owned(&state, &caller, &id)?;
    let sub = state.store.cancel(&id)?;
    info!(%id, user_id = %caller.user_id, "subscription cancelled via API");
    Ok(Json(sub))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::build_router;
    use crate::auth::{AuthValidator, DenyAll};
    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::Request,
        Router,
    };
    use serde_json::{json, Value};
    use sweep_core::{config::AuthMode, Role, SweepConfig};
    use sweep_scheduler::{
        CollaboratorError, NotificationEvent as Event, Notifier, SubscriptionStatus,
        SubscriptionStore,
    };
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    struct Harness {
        router: Router,
        store: SubscriptionStore,
        events: mpsc::Receiver<Event>,
    }

    fn harness_with(mode: AuthMode, auth: Arc<dyn AuthValidator>) -> Harness {
        let mut config = SweepConfig::default();
        config.auth.mode = mode;
        let store = SubscriptionStore::open_in_memory().unwrap();
        let (notifier, events) = Notifier::channel(16);
        let state = Arc::new(AppState::new(config, store.clone(), notifier, auth));
        Harness {
            router: build_router(state),
            store,
            events,
        }
    }

    fn harness() -> Harness {
        harness_with(AuthMode::None, Arc::new(DenyAll))
    }

    fn request(
        method: &str,
        uri: &str,
        user: Option<(&str, &str)>,
        body: Option<Value>,
    ) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((id, role)) = user {
            builder = builder.header("x-user-id", id).header("x-user-role", role);
        }
        match body {
            Some(v) => builder
                .header("content-type", "application/json")
                .body(Body::from(v.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    fn weekly_body() -> Value {
        json!({
            "order_id": "template-1",
            "address": "4 Elm St",
            "service_ids": ["standard"],
            "start_date": "2025-06-02",
            "end_date": "2025-06-30",
            "schedule": {"frequency": "weekly", "days_of_week": ["Mon"]},
            "price": 55.0
        })
    }

    const CLIENT: Option<(&str, &str)> = Some(("client-1", "client"));
    const OTHER: Option<(&str, &str)> = Some(("client-2", "client"));
    const ADMIN: Option<(&str, &str)> = Some(("admin-1", "admin"));

    async fn create_as_client(h: &Harness) -> String {
        let (status, body) = send(
            &h.router,
            request("POST", "/subscriptions", CLIENT, Some(weekly_body())),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_is_public() {
        let h = harness();
        let (status, body) = send(&h.router, request("GET", "/health", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn create_sets_cursor_and_queues_event() {
        let mut h = harness();
        let (status, body) = send(
            &h.router,
            request("POST", "/subscriptions", CLIENT, Some(weekly_body())),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["user_id"], "client-1");
        assert_eq!(body["status"], "active");
        assert_eq!(body["next_planned_date"], "2025-06-02");

        let event = h.events.try_recv().unwrap();
        assert_eq!(event.event_type, EventType::SubscriptionCreated);
        assert_eq!(event.user_id, "client-1");
    }

    #[tokio::test]
    async fn invalid_schedule_is_bad_request() {
        let h = harness();
        let mut body = weekly_body();
        body["schedule"] = json!({
            "frequency": "monthly",
            "days_of_week": ["Sat"],
            "week_numbers": []
        });
        let (status, err) = send(
            &h.router,
            request("POST", "/subscriptions", CLIENT, Some(body)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn malformed_body_is_a_json_bad_request() {
        let h = harness();
        let mut body = weekly_body();
        body["schedule"]["days_of_week"] = json!(["Monday"]);
        let (status, err) = send(
            &h.router,
            request("POST", "/subscriptions", CLIENT, Some(body)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["code"], "BAD_REQUEST");
        assert!(err["error"].as_str().unwrap().contains("Monday"));

        let mut body = weekly_body();
        body["schedule"]["frequency"] = json!("daily");
        let (status, err) = send(
            &h.router,
            request("POST", "/subscriptions", CLIENT, Some(body)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn unknown_status_filter_is_a_json_bad_request() {
        let h = harness();
        let (status, err) = send(
            &h.router,
            request("GET", "/subscriptions?status=bogus", ADMIN, None),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn missing_identity_is_unauthorized() {
        let h = harness();
        let (status, err) = send(&h.router, request("GET", "/subscriptions/my", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(err["code"], "AUTH_FAILED");
    }

    #[tokio::test]
    async fn other_clients_are_forbidden_admins_are_not() {
        let h = harness();
        let id = create_as_client(&h).await;
        let uri = format!("/subscriptions/{id}");

        let (status, _) = send(&h.router, request("GET", &uri, OTHER, None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, body) = send(&h.router, request("GET", &uri, ADMIN, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], id.as_str());
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let h = harness();
        let (status, err) = send(
            &h.router,
            request("GET", "/subscriptions/nope", CLIENT, None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(err["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn my_lists_only_own_subscriptions() {
        let h = harness();
        create_as_client(&h).await;
        send(
            &h.router,
            request("POST", "/subscriptions", OTHER, Some(weekly_body())),
        )
        .await;

        let (status, body) = send(
            &h.router,
            request("GET", "/subscriptions/my", CLIENT, None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let items = body.as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["user_id"], "client-1");
    }

    #[tokio::test]
    async fn listing_all_is_admin_only_and_filters() {
        let h = harness();
        let id = create_as_client(&h).await;
        send(
            &h.router,
            request("POST", "/subscriptions", OTHER, Some(weekly_body())),
        )
        .await;
        h.store.cancel(&id).unwrap();

        let (status, _) = send(&h.router, request("GET", "/subscriptions", CLIENT, None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(&h.router, request("GET", "/subscriptions", ADMIN, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);

        let (_, body) = send(
            &h.router,
            request("GET", "/subscriptions?status=active", ADMIN, None),
        )
        .await;
        let items = body.as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["user_id"], "client-2");

        let (_, body) = send(
            &h.router,
            request("GET", "/subscriptions?client_id=client-1", ADMIN, None),
        )
        .await;
        assert_eq!(body.as_array().unwrap()[0]["status"], "cancelled");
    }

    #[tokio::test]
    async fn update_changes_price() {
        let h = harness();
        let id = create_as_client(&h).await;
        let (status, body) = send(
            &h.router,
            request("PUT", &format!("/subscriptions/{id}"), CLIENT, Some(json!({"price": 70.0}))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["price"], 70.0);
        assert_eq!(body["address"], "4 Elm St");
    }

    #[tokio::test]
    async fn extend_moves_end_date_forward_only() {
        let h = harness();
        let id = create_as_client(&h).await;
        let uri = format!("/subscriptions/extend/{id}");

        let (status, body) = send(
            &h.router,
            request("POST", &uri, CLIENT, Some(json!({"end_date": "2025-07-31"}))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["end_date"], "2025-07-31");

        let (status, _) = send(
            &h.router,
            request("POST", &uri, CLIENT, Some(json!({"end_date": "2025-06-10"}))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_cancels_and_blocks_updates() {
        let h = harness();
        let id = create_as_client(&h).await;
        let uri = format!("/subscriptions/{id}");

        let (status, body) = send(&h.router, request("DELETE", &uri, CLIENT, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "cancelled");
        assert_eq!(
            h.store.get(&id).unwrap().status,
            SubscriptionStatus::Cancelled
        );

        let (status, err) = send(
            &h.router,
            request("PUT", &uri, CLIENT, Some(json!({"price": 1.0}))),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(err["code"], "INVALID_TRANSITION");
    }

    struct StaticTokens;

    #[async_trait]
    impl AuthValidator for StaticTokens {
        async fn validate(&self, token: &str) -> Result<Option<Caller>, CollaboratorError> {
            match token {
                "good" => Ok(Some(Caller::new("client-1", Role::Client))),
                "down" => Err(CollaboratorError::Unavailable {
                    service: "auth",
                    reason: "connection refused".into(),
                }),
                _ => Ok(None),
            }
        }
    }

    fn bearer(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(t) = token {
            builder = builder.header("authorization", format!("Bearer {t}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn remote_mode_validates_bearer_tokens() {
        let h = harness_with(AuthMode::Remote, Arc::new(StaticTokens));

        let (status, _) = send(&h.router, bearer("/subscriptions/my", Some("good"))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&h.router, bearer("/subscriptions/my", Some("bad"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&h.router, bearer("/subscriptions/my", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&h.router, bearer("/subscriptions/my", Some("down"))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        // Identity headers are ignored in remote mode.
        let (status, _) = send(
            &h.router,
            request("GET", "/subscriptions/my", ADMIN, None),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
