use anyhow::{Context, Result, bail};
use std::env;

use super::config_model::{
    BackendServer, Database, DotEnvyConfig, Posthog, Session, Stripe,
};

const DEFAULT_MAX_CONNECTIONS: u32 = 10;

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();
    from_lookup(|key| env::var(key).ok())
}

pub fn get_session_secret() -> Result<Session> {
    dotenvy::dotenv().ok();

    let lookup = |key: &str| env::var(key).ok();
    Ok(Session {
        jwt_secret: required(&lookup, "SESSION_JWT_SECRET")?,
    })
}

pub(crate) fn from_lookup<F>(lookup: F) -> Result<DotEnvyConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let backend_server = BackendServer {
        port: required(&lookup, "SERVER_PORT_BACKEND")?
            .parse()
            .context("SERVER_PORT_BACKEND is invalid")?,
        body_limit: required(&lookup, "SERVER_BODY_LIMIT")?
            .parse()
            .context("SERVER_BODY_LIMIT is invalid")?,
        timeout: required(&lookup, "SERVER_TIMEOUT")?
            .parse()
            .context("SERVER_TIMEOUT is invalid")?,
    };

    let database = Database {
        url: required(&lookup, "DATABASE_URL")?,
        max_connections: match optional(&lookup, "DATABASE_MAX_CONNECTIONS") {
            Some(raw) => raw.parse().context("DATABASE_MAX_CONNECTIONS is invalid")?,
            None => DEFAULT_MAX_CONNECTIONS,
        },
    };

    let session = Session {
        jwt_secret: required(&lookup, "SESSION_JWT_SECRET")?,
    };

    let stripe = match (
        optional(&lookup, "STRIPE_SECRET_KEY"),
        optional(&lookup, "STRIPE_WEBHOOK_SECRET"),
    ) {
        (Some(secret_key), Some(webhook_secret)) => Some(Stripe {
            secret_key,
            webhook_secret,
        }),
        (None, None) => None,
        (Some(_), None) => bail!("STRIPE_WEBHOOK_SECRET is required when STRIPE_SECRET_KEY is set"),
        (None, Some(_)) => bail!("STRIPE_SECRET_KEY is required when STRIPE_WEBHOOK_SECRET is set"),
    };

    // Analytics is best-effort: a half-configured pair just leaves it off.
    let posthog = match (
        optional(&lookup, "POSTHOG_API_KEY"),
        optional(&lookup, "POSTHOG_API_HOST"),
    ) {
        (Some(api_key), Some(api_host)) => Some(Posthog { api_key, api_host }),
        _ => None,
    };

    Ok(DotEnvyConfig {
        backend_server,
        database,
        session,
        stripe,
        posthog,
    })
}

fn optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn required<F>(lookup: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, key).with_context(|| format!("{key} is invalid"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_vars() -> HashMap<String, String> {
        [
            ("SERVER_PORT_BACKEND", "8080"),
            ("SERVER_BODY_LIMIT", "10"),
            ("SERVER_TIMEOUT", "30"),
            ("DATABASE_URL", "postgres://localhost:5432/db"),
            ("SESSION_JWT_SECRET", "supersecretsessionsecretforunittesting"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn load_with(vars: HashMap<String, String>) -> Result<DotEnvyConfig> {
        from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn loads_required_settings_without_integrations() {
        let config = load_with(base_vars()).unwrap();

        assert_eq!(config.backend_server.port, 8080);
        assert_eq!(config.database.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert!(config.stripe.is_none());
        assert!(config.posthog.is_none());
    }

    #[test]
    fn loads_stripe_pair() {
        let mut vars = base_vars();
        vars.insert("STRIPE_SECRET_KEY".into(), "sk_test_123".into());
        vars.insert("STRIPE_WEBHOOK_SECRET".into(), "whsec_123".into());

        let stripe = load_with(vars).unwrap().stripe.unwrap();
        assert_eq!(stripe.secret_key, "sk_test_123");
        assert_eq!(stripe.webhook_secret, "whsec_123");
    }

    #[test]
    fn rejects_half_configured_stripe() {
        let mut vars = base_vars();
        vars.insert("STRIPE_SECRET_KEY".into(), "sk_test_123".into());

        assert!(load_with(vars).is_err());
    }

    #[test]
    fn half_configured_posthog_is_disabled() {
        let mut vars = base_vars();
        vars.insert("POSTHOG_API_KEY".into(), "phc_123".into());

        assert!(load_with(vars).unwrap().posthog.is_none());
    }

    #[test]
    fn missing_database_url_is_an_error() {
        let mut vars = base_vars();
        vars.remove("DATABASE_URL");

        let err = load_with(vars).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }
}
