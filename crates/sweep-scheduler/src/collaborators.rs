//! Boundaries to sibling services. The scheduler only depends on these
//! traits; HTTP implementations live in the gateway.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

use crate::error::CollaboratorError;
use crate::types::Subscription;

/// Credentials presented to sibling services on behalf of the driver.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub bearer_token: Option<String>,
}

impl AuthContext {
    pub fn service(token: impl Into<String>) -> Self {
        Self {
            bearer_token: Some(token.into()),
        }
    }
}

/// Creates a real order from a subscription's template for one occurrence.
///
/// Called once per due occurrence; implementations must not retry.
#[async_trait]
pub trait OrderCreator: Send + Sync {
    async fn create_order_from_subscription(
        &self,
        subscription: &Subscription,
        due_date: NaiveDate,
        auth: &AuthContext,
    ) -> Result<(), CollaboratorError>;
}

/// Delivers a lifecycle event to the notification service.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send_event(
        &self,
        user_id: &str,
        event_type: &str,
        payload: &Value,
    ) -> Result<(), CollaboratorError>;
}
