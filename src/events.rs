//! Optional NATS event publication. Subjects mirror the order lifecycle
//! (`storefront.order.paid`, `storefront.refund.approved`, ...). Publishing
//! is fire-and-forget: a missing or failing broker never blocks or fails
//! the workflow that raised the event.

use serde_json::Value;

#[derive(Clone)]
pub struct EventPublisher {
    client: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(client: Option<async_nats::Client>) -> Self {
        Self { client }
    }

    pub fn disabled() -> Self {
        Self { client: None }
    }

    pub async fn publish(&self, subject: &str, payload: Value) {
        let Some(client) = &self.client else {
            return;
        };
        let subject = format!("storefront.{subject}");
        if let Err(err) = client.publish(subject.clone(), payload.to_string().into()).await {
            tracing::warn!(%subject, error = %err, "failed to publish event");
        }
    }
}
