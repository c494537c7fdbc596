use std::env;
use tracing::Level;
use url::Url;

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ServiceContext {
    pub(crate) service_name: String,
    pub(crate) environment: String,
    pub(crate) component: String,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct AlertConfig {
    pub(crate) webhook_url: Url,
    pub(crate) min_level: Level,
}

#[derive(Clone, Debug)]
pub(crate) struct ObservabilityConfig {
    pub(crate) service_context: ServiceContext,
    pub(crate) alert: Option<AlertConfig>,
    /// Parse problems, logged once tracing is up.
    pub(crate) warnings: Vec<String>,
}

impl ObservabilityConfig {
    pub(crate) fn from_env(component: &str) -> Self {
        Self::from_lookup(component, |key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(component: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let component = component.trim().to_string();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let service_context = ServiceContext {
            service_name: non_empty("SERVICE_NAME").unwrap_or_else(|| component.clone()),
            environment: non_empty("STAGE").unwrap_or_else(|| "unknown".to_string()),
            component,
        };

        let mut warnings = Vec::new();
        let alert = match non_empty("ALERT_WEBHOOK_URL") {
            None => None,
            Some(raw) => match Url::parse(raw.trim()) {
                Ok(webhook_url) => {
                    let min_level = match non_empty("ALERT_LEVEL") {
                        None => Level::ERROR,
                        Some(raw_level) => parse_level(&raw_level).unwrap_or_else(|| {
                            warnings.push(format!(
                                "ALERT_LEVEL is invalid (value: {raw_level}); defaulting to ERROR"
                            ));
                            Level::ERROR
                        }),
                    };
                    Some(AlertConfig {
                        webhook_url,
                        min_level,
                    })
                }
                Err(err) => {
                    // The URL itself is a credential and stays out of the log.
                    warnings.push(format!(
                        "ALERT_WEBHOOK_URL is set but invalid; alerts disabled (parse error: {err})"
                    ));
                    None
                }
            },
        };

        Self {
            service_context,
            alert,
            warnings,
        }
    }
}

fn parse_level(input: &str) -> Option<Level> {
    match input.trim().to_ascii_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(vars: &[(&str, &str)]) -> ObservabilityConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ObservabilityConfig::from_lookup("backend", |key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_alert_sink() {
        let config = config_with(&[]);

        assert_eq!(config.service_context.service_name, "backend");
        assert_eq!(config.service_context.environment, "unknown");
        assert!(config.alert.is_none());
        assert!(config.warnings.is_empty());
    }

    #[test]
    fn parses_alert_sink_and_level() {
        let config = config_with(&[
            ("ALERT_WEBHOOK_URL", "https://hooks.example.com/billing"),
            ("ALERT_LEVEL", "warn"),
            ("STAGE", "production"),
        ]);

        let alert = config.alert.expect("alert configured");
        assert_eq!(alert.min_level, Level::WARN);
        assert_eq!(config.service_context.environment, "production");
    }

    #[test]
    fn invalid_level_falls_back_to_error_with_warning() {
        let config = config_with(&[
            ("ALERT_WEBHOOK_URL", "https://hooks.example.com/billing"),
            ("ALERT_LEVEL", "loud"),
        ]);

        assert_eq!(config.alert.unwrap().min_level, Level::ERROR);
        assert_eq!(config.warnings.len(), 1);
    }

    #[test]
    fn invalid_url_disables_alerts_with_warning() {
        let config = config_with(&[("ALERT_WEBHOOK_URL", "::not-a-url")]);

        assert!(config.alert.is_none());
        assert_eq!(config.warnings.len(), 1);
        assert!(!config.warnings[0].contains("::not-a-url"));
    }
}
