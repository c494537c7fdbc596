use std::{collections::HashMap, time::Duration};

use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, de::DeserializeOwned};
use sha2::Sha256;
use tracing::error;

use crate::domain::value_objects::subscription_items::{BillingSubscription, SubscriptionLineItem};

type HmacSha256 = Hmac<Sha256>;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
/// Signed webhook timestamps older than this are rejected as replays.
pub const WEBHOOK_TOLERANCE_SECS: i64 = 300;

/// Minimal Stripe client built on reqwest.
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    webhook_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub type_: String,
    pub created: Option<i64>,
    pub livemode: Option<bool>,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub mode: Option<String>,
    pub subscription: Option<String>,
    pub customer: Option<StripeExpandable<StripeCustomer>>,
    pub metadata: Option<HashMap<String, String>>,
}

/// A field Stripe returns either as an id or, when expanded, as the object.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum StripeExpandable<T> {
    Object(T),
    Id(String),
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StripeCustomer {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StripeProduct {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StripeSubscription {
    pub id: String,
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub default_payment_method: Option<String>,
    #[serde(default)]
    pub items: StripeSubscriptionItems,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StripeSubscriptionItems {
    pub data: Vec<StripeSubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscriptionItem {
    pub id: String,
    pub price: StripePrice,
    pub quantity: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePrice {
    pub id: String,
    pub product: String,
    pub lookup_key: Option<String>,
}

/// Fields written back onto the Stripe customer after a checkout.
#[derive(Debug, Clone, PartialEq)]
pub struct StripeCustomerUpdate {
    pub name: String,
    pub metadata: HashMap<String, String>,
    pub default_payment_method: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorDetails,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetails {
    #[serde(rename = "type")]
    type_: Option<String>,
    code: Option<String>,
    message: Option<String>,
    param: Option<String>,
}

impl From<StripeSubscriptionItem> for SubscriptionLineItem {
    fn from(item: StripeSubscriptionItem) -> Self {
        Self {
            item_id: item.id,
            product_id: item.price.product,
            lookup_key: item.price.lookup_key,
            quantity: item.quantity.unwrap_or(1),
        }
    }
}

impl From<StripeSubscription> for BillingSubscription {
    fn from(mut subscription: StripeSubscription) -> Self {
        Self {
            organization_id: subscription.metadata.remove("organizationId"),
            id: subscription.id,
            default_payment_method: subscription.default_payment_method,
            items: subscription
                .items
                .data
                .into_iter()
                .map(SubscriptionLineItem::from)
                .collect(),
        }
    }
}

impl StripeClient {
    pub fn new(secret_key: String, webhook_secret: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build stripe http client")?;

        Ok(Self {
            http,
            secret_key,
            webhook_secret,
        })
    }

    async fn ensure_success(
        resp: reqwest::Response,
        context: &str,
    ) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let request_id = resp
            .headers()
            .get("request-id")
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let body = match resp.text().await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => "<empty response body>".to_string(),
            Err(err) => format!("<failed to read response body: {err}>"),
        };

        let details = serde_json::from_str::<StripeErrorEnvelope>(&body)
            .ok()
            .map(|envelope| envelope.error);

        error!(
            status = %status,
            stripe_request_id = ?request_id,
            stripe_error_type = ?details.as_ref().and_then(|d| d.type_.as_deref()),
            stripe_error_code = ?details.as_ref().and_then(|d| d.code.as_deref()),
            stripe_error_param = ?details.as_ref().and_then(|d| d.param.as_deref()),
            stripe_error_message = ?details.as_ref().and_then(|d| d.message.as_deref()),
            context = %context,
            "stripe api request failed"
        );

        bail!(
            "Stripe API request failed: {} (status {}, request_id={:?})",
            context,
            status,
            request_id
        );
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        context: &str,
    ) -> Result<T> {
        let resp = self
            .http
            .get(format!("{}{}", STRIPE_API_BASE, path))
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .query(query)
            .send()
            .await
            .with_context(|| format!("stripe request failed: {context}"))?;
        let resp = Self::ensure_success(resp, context).await?;

        resp.json::<T>()
            .await
            .with_context(|| format!("invalid stripe response: {context}"))
    }

    async fn post_form(
        &self,
        path: &str,
        body: &[(String, String)],
        context: &str,
    ) -> Result<reqwest::Response> {
        let resp = self
            .http
            .post(format!("{}{}", STRIPE_API_BASE, path))
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(body)
            .send()
            .await
            .with_context(|| format!("stripe request failed: {context}"))?;
        Self::ensure_success(resp, context).await
    }

    pub async fn retrieve_subscription(&self, subscription_id: &str) -> Result<StripeSubscription> {
        // https://stripe.com/docs/api/subscriptions/retrieve
        self.get_json(
            &format!("/subscriptions/{subscription_id}"),
            &[],
            "retrieve subscription",
        )
        .await
    }

    /// Retrieves a checkout session with its customer expanded.
    pub async fn retrieve_checkout_session_customer(
        &self,
        session_id: &str,
    ) -> Result<StripeCustomer> {
        // https://stripe.com/docs/api/checkout/sessions/retrieve
        let session: StripeCheckoutSession = self
            .get_json(
                &format!("/checkout/sessions/{session_id}"),
                &[("expand[]", "customer")],
                "retrieve checkout session",
            )
            .await?;

        match session.customer {
            Some(StripeExpandable::Object(customer)) => Ok(customer),
            Some(StripeExpandable::Id(id)) => Err(anyhow!(
                "checkout session {session_id} returned unexpanded customer {id}"
            )),
            None => Err(anyhow!("checkout session {session_id} has no customer")),
        }
    }

    pub async fn retrieve_product(&self, product_id: &str) -> Result<StripeProduct> {
        // https://stripe.com/docs/api/products/retrieve
        self.get_json(&format!("/products/{product_id}"), &[], "retrieve product")
            .await
    }

    /// Sets the usage quantity of a metered subscription item for the current period.
    pub async fn create_usage_record(&self, subscription_item_id: &str, quantity: i64) -> Result<()> {
        // https://stripe.com/docs/api/usage_records/create
        let body = vec![
            ("action".to_string(), "set".to_string()),
            ("quantity".to_string(), quantity.to_string()),
            ("timestamp".to_string(), Utc::now().timestamp().to_string()),
        ];
        self.post_form(
            &format!("/subscription_items/{subscription_item_id}/usage_records"),
            &body,
            "create usage record",
        )
        .await?;

        Ok(())
    }

    pub async fn update_customer(
        &self,
        customer_id: &str,
        customer_update: &StripeCustomerUpdate,
    ) -> Result<()> {
        // https://stripe.com/docs/api/customers/update
        let mut body: Vec<(String, String)> =
            vec![("name".to_string(), customer_update.name.clone())];

        for (key, value) in &customer_update.metadata {
            body.push((format!("metadata[{}]", key), value.clone()));
        }

        if let Some(payment_method) = &customer_update.default_payment_method {
            body.push((
                "invoice_settings[default_payment_method]".to_string(),
                payment_method.clone(),
            ));
        }

        self.post_form(&format!("/customers/{customer_id}"), &body, "update customer")
            .await?;

        Ok(())
    }

    /// Verifies the webhook signature. https://stripe.com/docs/webhooks/signatures
    pub fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<StripeEvent> {
        verify_signature(
            &self.webhook_secret,
            payload,
            signature_header,
            Utc::now().timestamp(),
        )?;

        let event: StripeEvent =
            serde_json::from_slice(payload).context("webhook payload is not a stripe event")?;
        Ok(event)
    }

    pub fn extract_checkout_session(event: &StripeEvent) -> Option<StripeCheckoutSession> {
        serde_json::from_value(event.data.object.clone()).ok()
    }

    pub fn extract_subscription(event: &StripeEvent) -> Option<StripeSubscription> {
        serde_json::from_value(event.data.object.clone()).ok()
    }
}

fn verify_signature(
    webhook_secret: &str,
    payload: &[u8],
    signature_header: &str,
    now: i64,
) -> Result<()> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<Vec<u8>> = Vec::new();

    for part in signature_header.split(',') {
        if let Some(rest) = part.trim().strip_prefix("t=") {
            timestamp = rest.parse().ok();
        } else if let Some(rest) = part.trim().strip_prefix("v1=") {
            // Stripe may send several v1 entries while a secret is being rolled.
            if let Ok(bytes) = hex::decode(rest) {
                signatures.push(bytes);
            }
        }
    }

    let timestamp = timestamp.ok_or_else(|| anyhow!("missing timestamp in stripe-signature"))?;
    if signatures.is_empty() {
        bail!("missing v1 in stripe-signature");
    }
    if (now - timestamp).abs() > WEBHOOK_TOLERANCE_SECS {
        bail!("stripe-signature timestamp outside tolerance");
    }

    let mut signed_payload = format!("{}.", timestamp).into_bytes();
    signed_payload.extend_from_slice(payload);

    for signature in &signatures {
        let mut mac = HmacSha256::new_from_slice(webhook_secret.as_bytes())?;
        mac.update(&signed_payload);
        if mac.verify_slice(signature).is_ok() {
            return Ok(());
        }
    }

    bail!("invalid webhook signature");
}
