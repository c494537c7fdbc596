use super::config::{AlertConfig, ServiceContext};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;
use url::Url;

const QUEUE_CAPACITY: usize = 256;
const SEND_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Clone, Debug, Serialize)]
pub(crate) struct AlertEvent {
    pub(crate) level: String,
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) service: String,
    pub(crate) environment: String,
    pub(crate) component: String,
    pub(crate) target: String,
    pub(crate) message: Option<String>,
    pub(crate) fields: BTreeMap<String, String>,
}

/// Forwards events at or above `min_level` to an HTTP webhook. Delivery runs
/// on a background task; a full queue drops alerts instead of blocking the
/// logging call site.
pub(crate) struct AlertLayer {
    tx: mpsc::Sender<AlertEvent>,
    service_context: ServiceContext,
    min_level: Level,
}

impl AlertLayer {
    /// Must be called inside a tokio runtime.
    pub(crate) fn spawn(config: &AlertConfig, service_context: ServiceContext) -> Self {
        let (tx, rx) = mpsc::channel::<AlertEvent>(QUEUE_CAPACITY);
        tokio::spawn(deliver(config.webhook_url.clone(), rx));

        Self::new(tx, service_context, config.min_level)
    }

    fn new(tx: mpsc::Sender<AlertEvent>, service_context: ServiceContext, min_level: Level) -> Self {
        Self {
            tx,
            service_context,
            min_level,
        }
    }
}

async fn deliver(webhook_url: Url, mut rx: mpsc::Receiver<AlertEvent>) {
    let client = match reqwest::Client::builder().timeout(SEND_TIMEOUT).build() {
        Ok(client) => client,
        Err(err) => {
            eprintln!("alert webhook client could not be built: {err}");
            return;
        }
    };

    while let Some(event) = rx.recv().await {
        // Failures go to stderr: logging them through tracing would loop back here.
        match client.post(webhook_url.clone()).json(&event).send().await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => eprintln!("alert webhook returned status {}", resp.status()),
            Err(err) if err.is_timeout() => eprintln!("alert webhook request timed out"),
            Err(_) => eprintln!("alert webhook request failed"),
        }
    }
}

#[derive(Default)]
struct FieldMapVisitor {
    values: BTreeMap<String, String>,
}

impl FieldMapVisitor {
    fn insert(&mut self, field: &Field, value: String) {
        let value = if is_sensitive_key(field.name()) {
            "[REDACTED]".to_string()
        } else {
            value
        };
        self.values.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldMapVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.insert(field, format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, value.to_string());
    }
}

impl<S: Subscriber> Layer<S> for AlertLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        // `Level` orders by verbosity: ERROR is the smallest.
        if *metadata.level() > self.min_level {
            return;
        }

        let mut visitor = FieldMapVisitor::default();
        event.record(&mut visitor);
        let message = visitor
            .values
            .remove("message")
            .map(|raw| raw.trim_matches('"').to_string());

        let alert = AlertEvent {
            level: metadata.level().to_string(),
            timestamp: Utc::now(),
            service: self.service_context.service_name.clone(),
            environment: self.service_context.environment.clone(),
            component: self.service_context.component.clone(),
            target: metadata.target().to_string(),
            message,
            fields: visitor.values,
        };

        if self.tx.try_send(alert).is_err() {
            eprintln!("alert queue full or closed; dropping alert");
        }
    }
}

fn is_sensitive_key(field_name: &str) -> bool {
    let field = field_name.to_ascii_lowercase();
    ["secret", "password", "token", "authorization", "signature", "payload", "email"]
        .iter()
        .any(|needle| field.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_credentials_and_personal_data() {
        assert!(is_sensitive_key("stripe_signature"));
        assert!(is_sensitive_key("STRIPE_SECRET_KEY"));
        assert!(is_sensitive_key("user_email"));
        assert!(!is_sensitive_key("organization_id"));
    }

    #[test]
    fn forwards_only_events_at_or_above_min_level() {
        use tracing_subscriber::layer::SubscriberExt;

        let (tx, mut rx) = mpsc::channel(8);
        let layer = AlertLayer::new(
            tx,
            ServiceContext {
                service_name: "backend".to_string(),
                environment: "test".to_string(),
                component: "backend".to_string(),
            },
            Level::ERROR,
        );
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(organization_id = "org-1", "billing: slow vendor call");
            tracing::error!(
                organization_id = "org-1",
                stripe_signature = "t=1,v1=abc",
                "billing: reconciliation failed"
            );
        });

        let alert = rx.try_recv().expect("error event forwarded");
        assert_eq!(alert.level, "ERROR");
        assert_eq!(alert.message.as_deref(), Some("billing: reconciliation failed"));
        assert_eq!(alert.fields.get("organization_id").map(String::as_str), Some("org-1"));
        assert_eq!(
            alert.fields.get("stripe_signature").map(String::as_str),
            Some("[REDACTED]")
        );
        assert!(rx.try_recv().is_err());
    }
}
