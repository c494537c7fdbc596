use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value, json};
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Server-side PostHog capture client.
pub struct PosthogClient {
    http: reqwest::Client,
    api_key: String,
    capture_url: Url,
}

#[derive(Debug, Serialize)]
struct CaptureEvent<'a> {
    api_key: &'a str,
    event: &'a str,
    distinct_id: String,
    properties: Value,
    timestamp: DateTime<Utc>,
}

impl PosthogClient {
    pub fn new(api_key: String, api_host: &str) -> Result<Self> {
        let capture_url = Url::parse(api_host)
            .and_then(|host| host.join("/capture/"))
            .with_context(|| format!("invalid posthog host: {api_host}"))?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build posthog http client")?;

        Ok(Self {
            http,
            api_key,
            capture_url,
        })
    }

    pub async fn identify(&self, distinct_id: &str, attributes: Map<String, Value>) -> Result<()> {
        self.capture(CaptureEvent {
            api_key: &self.api_key,
            event: "$identify",
            distinct_id: distinct_id.to_string(),
            properties: json!({ "$set": attributes }),
            timestamp: Utc::now(),
        })
        .await
    }

    /// Sets group properties and links `distinct_id` to the group through
    /// `$groups`, so the user's later events are attributed to it.
    pub async fn group_identify(
        &self,
        distinct_id: &str,
        group_type: &str,
        group_key: &str,
        attributes: Map<String, Value>,
    ) -> Result<()> {
        self.capture(self.group_identify_event(distinct_id, group_type, group_key, attributes))
            .await
    }

    fn group_identify_event(
        &self,
        distinct_id: &str,
        group_type: &str,
        group_key: &str,
        attributes: Map<String, Value>,
    ) -> CaptureEvent<'_> {
        let mut groups = Map::new();
        groups.insert(group_type.to_string(), Value::from(group_key));

        CaptureEvent {
            api_key: &self.api_key,
            event: "$groupidentify",
            distinct_id: distinct_id.to_string(),
            properties: json!({
                "$group_type": group_type,
                "$group_key": group_key,
                "$group_set": attributes,
                "$groups": groups,
            }),
            timestamp: Utc::now(),
        }
    }

    async fn capture(&self, event: CaptureEvent<'_>) -> Result<()> {
        let resp = self
            .http
            .post(self.capture_url.clone())
            .json(&event)
            .send()
            .await
            .with_context(|| format!("posthog capture failed: {}", event.event))?;

        if !resp.status().is_success() {
            bail!(
                "posthog capture returned non-success status: {} ({})",
                resp.status(),
                event.event
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_capture_url_from_host() {
        let client =
            PosthogClient::new("phc_test".to_string(), "https://eu.posthog.com").unwrap();

        assert_eq!(client.capture_url.as_str(), "https://eu.posthog.com/capture/");
    }

    #[test]
    fn rejects_invalid_host() {
        assert!(PosthogClient::new("phc_test".to_string(), "not a url").is_err());
    }

    #[test]
    fn group_identify_links_the_user_to_the_group() {
        let client =
            PosthogClient::new("phc_test".to_string(), "https://eu.posthog.com").unwrap();
        let mut attributes = Map::new();
        attributes.insert("name".to_string(), Value::from("Acme Research"));

        let event = client.group_identify_event("user-42", "organization", "org-1", attributes);
        let payload = serde_json::to_value(&event).unwrap();

        assert_eq!(payload["event"], "$groupidentify");
        assert_eq!(payload["distinct_id"], "user-42");
        assert_eq!(payload["api_key"], "phc_test");
        assert_eq!(payload["properties"]["$group_type"], "organization");
        assert_eq!(payload["properties"]["$group_key"], "org-1");
        assert_eq!(payload["properties"]["$groups"]["organization"], "org-1");
        assert_eq!(
            payload["properties"]["$group_set"]["name"],
            "Acme Research"
        );
    }
}
