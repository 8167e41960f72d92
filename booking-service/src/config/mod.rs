//! Configuration module for booking-service.

use secrecy::{ExposeSecret, Secret};
use service_core::config as core_config;
use service_core::error::AppError;
use service_core::utils::signature::DEFAULT_TOLERANCE_SECS;
use std::env;

#[derive(Debug, Clone)]
pub struct BookingConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub stripe: StripeConfig,
    pub frontend: FrontendConfig,
    pub fcm: FcmConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub api_base_url: String,
    /// ISO currency for customer checkout, lower case.
    pub currency: String,
    pub webhook_tolerance_secs: i64,
}

impl StripeConfig {
    pub fn is_configured(&self) -> bool {
        !self.secret_key.expose_secret().is_empty()
    }
}

/// Where the hosted checkout page sends the browser back to.
#[derive(Debug, Clone)]
pub struct FrontendConfig {
    pub success_url: String,
    pub cancel_url: String,
    pub provider_success_url: String,
    pub provider_cancel_url: String,
    /// Browser origins allowed by CORS.
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FcmConfig {
    pub enabled: bool,
    pub project_id: String,
    /// Service account JSON as downloaded from the Firebase console.
    pub service_account_key: Secret<String>,
    pub api_base_url: String,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl BookingConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(Self {
            common,
            service_name: var_or("SERVICE_NAME", "booking-service"),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: var_or("LOG_LEVEL", "info"),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            database: DatabaseConfig {
                url: Secret::new(env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?),
                max_connections: parsed_or("DATABASE_MAX_CONNECTIONS", 10),
                min_connections: parsed_or("DATABASE_MIN_CONNECTIONS", 2),
            },
            stripe: StripeConfig {
                secret_key: Secret::new(var_or("STRIPE_SECRET_KEY", "")),
                webhook_secret: Secret::new(var_or("STRIPE_WEBHOOK_SECRET", "")),
                api_base_url: var_or("STRIPE_API_BASE_URL", "https://api.stripe.com/v1"),
                currency: var_or("STRIPE_CURRENCY", "inr").to_lowercase(),
                webhook_tolerance_secs: parsed_or(
                    "STRIPE_WEBHOOK_TOLERANCE_SECS",
                    DEFAULT_TOLERANCE_SECS,
                ),
            },
            frontend: FrontendConfig {
                success_url: var_or(
                    "FRONTEND_SUCCESS_URL",
                    "http://localhost:3000/payment/success",
                ),
                cancel_url: var_or("FRONTEND_CANCEL_URL", "http://localhost:3000/payment/cancel"),
                provider_success_url: var_or(
                    "FRONTEND_PROVIDER_SUCCESS_URL",
                    "http://localhost:3000/provider/subscription/success",
                ),
                provider_cancel_url: var_or(
                    "FRONTEND_PROVIDER_CANCEL_URL",
                    "http://localhost:3000/provider/subscription/cancel",
                ),
                allowed_origins: var_or("ALLOWED_ORIGINS", "http://localhost:3000")
                    .split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect(),
            },
            fcm: FcmConfig {
                enabled: parsed_or("FCM_ENABLED", false),
                project_id: var_or("FCM_PROJECT_ID", ""),
                service_account_key: Secret::new(var_or("FCM_SERVICE_ACCOUNT_KEY", "")),
                api_base_url: var_or("FCM_API_BASE_URL", "https://fcm.googleapis.com"),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: [&str; 6] = [
        "DATABASE_URL",
        "STRIPE_SECRET_KEY",
        "STRIPE_CURRENCY",
        "STRIPE_WEBHOOK_TOLERANCE_SECS",
        "FCM_ENABLED",
        "DATABASE_MAX_CONNECTIONS",
    ];

    fn clear() {
        for key in KEYS {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn database_url_is_required() {
        clear();
        let err = BookingConfig::from_env().unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    #[serial]
    fn defaults_apply() {
        clear();
        env::set_var("DATABASE_URL", "postgres://localhost/booking");

        let config = BookingConfig::from_env().unwrap();
        assert_eq!(config.service_name, "booking-service");
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.stripe.currency, "inr");
        assert_eq!(config.stripe.webhook_tolerance_secs, 300);
        assert!(!config.stripe.is_configured());
        assert!(!config.fcm.enabled);
        assert_eq!(config.frontend.allowed_origins, vec!["http://localhost:3000"]);

        clear();
    }

    #[test]
    #[serial]
    fn overrides_are_parsed() {
        clear();
        env::set_var("DATABASE_URL", "postgres://localhost/booking");
        env::set_var("STRIPE_SECRET_KEY", "sk_test_123");
        env::set_var("STRIPE_CURRENCY", "USD");
        env::set_var("STRIPE_WEBHOOK_TOLERANCE_SECS", "60");
        env::set_var("FCM_ENABLED", "true");
        env::set_var("DATABASE_MAX_CONNECTIONS", "not-a-number");

        let config = BookingConfig::from_env().unwrap();
        assert!(config.stripe.is_configured());
        assert_eq!(config.stripe.currency, "usd");
        assert_eq!(config.stripe.webhook_tolerance_secs, 60);
        assert!(config.fcm.enabled);
        assert_eq!(config.database.max_connections, 10);

        clear();
    }
}
