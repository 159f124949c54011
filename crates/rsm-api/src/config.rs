//! # Service Configuration
//!
//! All settings come from the environment. [`AppConfig::from_lookup`] takes
//! the lookup function as a parameter so tests never mutate process state.
//!
//! | Variable                  | Default  |
//! |---------------------------|----------|
//! | `PORT`                    | `8080`   |
//! | `AUTH_TOKEN`              | unset (auth disabled) |
//! | `DATABASE_URL`            | unset (in-memory only) |
//! | `RSM_TAX_RATE_BPS`        | `1600`   |
//! | `RSM_MAX_ORDER_QUANTITY`  | `100000` |
//! | `RSM_METRICS_ENABLED`     | `true`   |
//! | `RSM_LOG_FORMAT`          | `text`   |

use thiserror::Error;

/// Default VAT-style tax applied to stamp orders: 16%.
pub const DEFAULT_TAX_RATE_BPS: i64 = 1600;

/// Default upper bound on stamps per order.
pub const DEFAULT_MAX_ORDER_QUANTITY: i64 = 100_000;

/// A malformed environment value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid value for {var}: {reason}")]
pub struct ConfigError {
    /// Variable name.
    pub var: &'static str,
    /// What was wrong with it.
    pub reason: String,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Application configuration.
///
/// Custom `Debug` redacts the `auth_token` and `database_url`.
#[derive(Clone)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Shared bearer secret. If `None`, authentication is disabled.
    pub auth_token: Option<String>,
    /// Postgres URL. If `None`, the service runs in-memory only.
    pub database_url: Option<String>,
    /// Tax rate applied at order creation, in basis points.
    pub tax_rate_bps: i64,
    /// Largest accepted order quantity.
    pub max_order_quantity: i64,
    /// Install the Prometheus recorder and serve `/metrics`.
    pub metrics_enabled: bool,
    /// Log output format.
    pub log_format: LogFormat,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("tax_rate_bps", &self.tax_rate_bps)
            .field("max_order_quantity", &self.max_order_quantity)
            .field("metrics_enabled", &self.metrics_enabled)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            database_url: None,
            tax_rate_bps: DEFAULT_TAX_RATE_BPS,
            max_order_quantity: DEFAULT_MAX_ORDER_QUANTITY,
            metrics_enabled: true,
            log_format: LogFormat::Text,
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary lookup function.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match non_empty("PORT") {
            Some(v) => v.trim().parse::<u16>().map_err(|e| ConfigError {
                var: "PORT",
                reason: e.to_string(),
            })?,
            None => defaults.port,
        };

        let tax_rate_bps = match non_empty("RSM_TAX_RATE_BPS") {
            Some(v) => {
                let bps = v.trim().parse::<i64>().map_err(|e| ConfigError {
                    var: "RSM_TAX_RATE_BPS",
                    reason: e.to_string(),
                })?;
                if !(0..=10_000).contains(&bps) {
                    return Err(ConfigError {
                        var: "RSM_TAX_RATE_BPS",
                        reason: format!("{bps} is outside 0..=10000"),
                    });
                }
                bps
            }
            None => defaults.tax_rate_bps,
        };

        let max_order_quantity = match non_empty("RSM_MAX_ORDER_QUANTITY") {
            Some(v) => {
                let max = v.trim().parse::<i64>().map_err(|e| ConfigError {
                    var: "RSM_MAX_ORDER_QUANTITY",
                    reason: e.to_string(),
                })?;
                if max < 1 {
                    return Err(ConfigError {
                        var: "RSM_MAX_ORDER_QUANTITY",
                        reason: "must be at least 1".into(),
                    });
                }
                max
            }
            None => defaults.max_order_quantity,
        };

        let metrics_enabled = match non_empty("RSM_METRICS_ENABLED") {
            Some(v) => parse_bool(&v).ok_or_else(|| ConfigError {
                var: "RSM_METRICS_ENABLED",
                reason: format!("expected true/false, got {v:?}"),
            })?,
            None => defaults.metrics_enabled,
        };

        let log_format = match non_empty("RSM_LOG_FORMAT").as_deref().map(str::trim) {
            Some("json") => LogFormat::Json,
            Some("text") | None => LogFormat::Text,
            Some(other) => {
                return Err(ConfigError {
                    var: "RSM_LOG_FORMAT",
                    reason: format!("expected text or json, got {other:?}"),
                })
            }
        };

        Ok(Self {
            port,
            auth_token: non_empty("AUTH_TOKEN"),
            database_url: non_empty("DATABASE_URL"),
            tax_rate_bps,
            max_order_quantity,
            metrics_enabled,
            log_format,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
