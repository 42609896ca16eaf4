//! reqwest-backed implementations of the scheduler's collaborator traits and
//! the remote auth check.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use sweep_core::{config::CollaboratorsConfig, Caller};
use sweep_scheduler::{
    AuthContext, CollaboratorError, NotificationSender, OrderCreator, Subscription,
};
use tracing::debug;

use crate::auth::AuthValidator;

/// Shared HTTP client with the configured per-request timeout.
pub fn build_http_client(cfg: &CollaboratorsConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_millis(cfg.timeout_ms))
        .build()
}

fn send_error(service: &'static str, e: reqwest::Error) -> CollaboratorError {
    let reason = if e.is_timeout() {
        "request timed out".to_string()
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        e.to_string()
    };
    CollaboratorError::Unavailable { service, reason }
}

async fn check_status(
    service: &'static str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, CollaboratorError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(CollaboratorError::Rejected {
        service,
        status: status.as_u16(),
        message,
    })
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// `POST {orders_url}/orders/from-subscription`
pub struct HttpOrderClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpOrderClient {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: trim_base(base_url),
        }
    }
}

#[derive(Serialize)]
struct FromSubscriptionRequest<'a> {
    subscription_id: &'a str,
    template_order_id: &'a str,
    user_id: &'a str,
    due_date: NaiveDate,
    price: f64,
    address: Option<&'a str>,
    service_ids: &'a [String],
    cleaner_id: Option<&'a str>,
}

#[async_trait]
impl OrderCreator for HttpOrderClient {
    async fn create_order_from_subscription(
        &self,
        subscription: &Subscription,
        due_date: NaiveDate,
        auth: &AuthContext,
    ) -> Result<(), CollaboratorError> {
        let body = FromSubscriptionRequest {
            subscription_id: &subscription.id,
            template_order_id: &subscription.order_id,
            user_id: &subscription.user_id,
            due_date,
            price: subscription.price,
            address: subscription.address.as_deref(),
            service_ids: &subscription.service_ids,
            cleaner_id: subscription.cleaner_id.as_deref(),
        };

        let mut req = self
            .client
            .post(format!("{}/orders/from-subscription", self.base_url))
            .json(&body);
        if let Some(token) = &auth.bearer_token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(|e| send_error("orders", e))?;
        check_status("orders", resp).await?;
        debug!(subscription_id = %subscription.id, %due_date, "order created");
        Ok(())
    }
}

/// `POST {notifications_url}/notifications/events`
pub struct HttpNotificationClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpNotificationClient {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: trim_base(base_url),
        }
    }
}

#[derive(Serialize)]
struct EventRequest<'a> {
    user_id: &'a str,
    event_type: &'a str,
    payload: &'a Value,
}

#[async_trait]
impl NotificationSender for HttpNotificationClient {
    async fn send_event(
        &self,
        user_id: &str,
        event_type: &str,
        payload: &Value,
    ) -> Result<(), CollaboratorError> {
        let resp = self
            .client
            .post(format!("{}/notifications/events", self.base_url))
            .json(&EventRequest {
                user_id,
                event_type,
                payload,
            })
            .send()
            .await
            .map_err(|e| send_error("notifications", e))?;
        check_status("notifications", resp).await?;
        Ok(())
    }
}

/// `GET {auth_url}/auth/validate` with the caller's bearer token.
pub struct HttpAuthValidator {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAuthValidator {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: trim_base(base_url),
        }
    }
}

#[async_trait]
impl AuthValidator for HttpAuthValidator {
    async fn validate(&self, token: &str) -> Result<Option<Caller>, CollaboratorError> {
        let resp = self
            .client
            .get(format!("{}/auth/validate", self.base_url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| send_error("auth", e))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Ok(None);
        }
        let resp = check_status("auth", resp).await?;
        let caller = resp
            .json::<Caller>()
            .await
            .map_err(|e| CollaboratorError::InvalidResponse {
                service: "auth",
                reason: e.to_string(),
            })?;
        Ok(Some(caller))
    }
}
