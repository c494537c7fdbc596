pub mod posthog_client;
