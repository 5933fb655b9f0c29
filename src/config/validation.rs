use std::net::SocketAddr;

use eyre::Result;
use regex::Regex;

use crate::config::models::{AlertConfig, CanaryConfig, RateLimitConfig, ServerConfig};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Server configuration validator
pub struct ServerConfigValidator;

impl ServerConfigValidator {
    /// Validate the entire server configuration
    pub fn validate(config: &ServerConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if let Some(upstream) = &config.upstream
            && let Err(e) = Self::validate_url(upstream, "upstream")
        {
            errors.push(e);
        }

        if config.body_limit_bytes == 0 {
            errors.push(ValidationError::InvalidField {
                field: "body_limit_bytes".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if config.identity.ip_hash_salt.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "identity.ip_hash_salt".to_string(),
            });
        }

        if let Err(mut canary_errors) = Self::validate_canary_config(&config.canary) {
            errors.append(&mut canary_errors);
        }

        if let Err(mut alert_errors) = Self::validate_alert_config(&config.alerts) {
            errors.append(&mut alert_errors);
        }

        if config.threat.flag_ttl_secs == 0 {
            errors.push(ValidationError::InvalidField {
                field: "threat.flag_ttl_secs".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if let Some(rate_limit) = &config.rate_limit
            && let Err(e) = Self::validate_rate_limit(rate_limit)
        {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn validate_canary_config(config: &CanaryConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if config.token_ttl_secs == 0 {
            errors.push(ValidationError::InvalidField {
                field: "canary.token_ttl_secs".to_string(),
                message: "Tokens must live for at least one second".to_string(),
            });
        }

        if !config.callback_path.starts_with('/') {
            errors.push(ValidationError::InvalidField {
                field: "canary.callback_path".to_string(),
                message: "Must start with '/'".to_string(),
            });
        } else if config.callback_path.contains(['?', '#', '"', '<', '>']) {
            errors.push(ValidationError::InvalidField {
                field: "canary.callback_path".to_string(),
                message: "Must be a bare path without query, fragment or markup".to_string(),
            });
        }

        if !(config.stun_server.starts_with("stun:") || config.stun_server.starts_with("stuns:"))
        {
            errors.push(ValidationError::InvalidField {
                field: "canary.stun_server".to_string(),
                message: "STUN server must use the 'stun:' or 'stuns:' scheme".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_alert_config(config: &AlertConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if config.log_capacity == 0 {
            errors.push(ValidationError::InvalidField {
                field: "alerts.log_capacity".to_string(),
                message: "Alert log must hold at least one entry".to_string(),
            });
        }

        if config.incident_capacity == 0 {
            errors.push(ValidationError::InvalidField {
                field: "alerts.incident_capacity".to_string(),
                message: "Incident log must hold at least one entry".to_string(),
            });
        }

        if let Some(url) = &config.webhook_url {
            if let Err(e) = Self::validate_url(url, "alerts.webhook_url") {
                errors.push(e);
            }
            if config.timeout_secs == 0 {
                errors.push(ValidationError::InvalidField {
                    field: "alerts.timeout_secs".to_string(),
                    message: "Must be greater than 0 when a webhook is configured".to_string(),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate URL format
    fn validate_url(url_str: &str, context: &str) -> ValidationResult<()> {
        match url::Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: format!(
                            "URL scheme must be 'http' or 'https', got '{}'",
                            url.scheme()
                        ),
                    });
                }

                if url.host().is_none() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "URL must have a valid host".to_string(),
                    });
                }

                Ok(())
            }
            Err(e) => Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("Invalid URL format: {e}"),
            }),
        }
    }

    /// Validate rate limit configuration
    fn validate_rate_limit(config: &RateLimitConfig) -> ValidationResult<()> {
        if config.requests == 0 {
            return Err(ValidationError::InvalidField {
                field: "rate_limit.requests".to_string(),
                message: "Rate limit requests must be greater than 0".to_string(),
            });
        }

        // Validate period format (e.g., "1s", "1m", "1h")
        let period_regex = Regex::new(r"^\d+[smh]$").expect("Invalid regex pattern");
        if !period_regex.is_match(&config.period) {
            return Err(ValidationError::InvalidField {
                field: "rate_limit.period".to_string(),
                message: "Period must be in format like '1s', '1m', or '1h'".to_string(),
            });
        }

        if http::StatusCode::from_u16(config.status_code).is_err() {
            return Err(ValidationError::InvalidField {
                field: "rate_limit.status_code".to_string(),
                message: format!("{} is not a valid HTTP status code", config.status_code),
            });
        }

        Ok(())
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_valid_config() -> ServerConfig {
        ServerConfig {
            listen_addr: "127.0.0.1:8080".to_string(),
            upstream: Some("http://localhost:3000".to_string()),
            ..ServerConfig::default()
        }
    }

    #[test]
    fn validate_accepts_minimal_config() {
        assert!(ServerConfigValidator::validate(&minimal_valid_config()).is_ok());
    }

    #[test]
    fn validate_rejects_bad_listen_address() {
        let mut config = minimal_valid_config();
        config.listen_addr = "localhost".to_string();
        let err = ServerConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("Invalid listen address"));
    }

    #[test]
    fn validate_rejects_callback_path_without_slash() {
        let mut config = minimal_valid_config();
        config.canary.callback_path = "api/canary".to_string();
        let err = ServerConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("canary.callback_path"));
    }

    #[test]
    fn validate_rejects_zero_alert_capacity() {
        let mut config = minimal_valid_config();
        config.alerts.log_capacity = 0;
        let err = ServerConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("alerts.log_capacity"));
    }

    #[test]
    fn validate_rejects_bad_rate_limit_period() {
        let mut config = minimal_valid_config();
        config.rate_limit = Some(RateLimitConfig {
            requests: 10,
            period: "soon".to_string(),
            status_code: 429,
            message: "slow down".to_string(),
        });
        let err = ServerConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("rate_limit.period"));
    }

    #[test]
    fn validate_collects_multiple_errors() {
        let mut config = minimal_valid_config();
        config.upstream = Some("ftp://files".to_string());
        config.identity.ip_hash_salt = "  ".to_string();
        let err = ServerConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("Found 2 validation errors"));
    }
}
