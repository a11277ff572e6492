//! Configuration validation for Convo services.
//!
//! Provides validation logic for configuration fields to ensure
//! all required values are present and within valid ranges.

use thiserror::Error;

use crate::config::{
    ChannelsConfig, Config, DeferredConfig, ObservabilityConfig, SessionConfig, StoreBackend,
    StoreConfig,
};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port {port}: must be between 1 and 65535")]
    InvalidPort { port: u16, field: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.network.port == 0 {
            errors.push(ValidationError::InvalidPort {
                port: 0,
                field: "network.port".into(),
            });
        }

        let sections: [&dyn Validate; 5] = [
            &self.session,
            &self.store,
            &self.deferred,
            &self.channels,
            &self.observability,
        ];
        for section in sections {
            if let Err(e) = section.validate() {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }

    /// Load and validate configuration.
    pub fn load_and_validate() -> anyhow::Result<Self> {
        let config = Self::load_with_env()?;
        config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(config)
    }
}

impl Validate for SessionConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.ttl_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "session.ttl_secs".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if self.timeout_ms == 0 {
            return Err(ValidationError::InvalidValue {
                field: "session.timeout_ms".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if self.ttl_secs.saturating_mul(1000) <= self.timeout_ms {
            return Err(ValidationError::InvalidValue {
                field: "session.ttl_secs".into(),
                reason: format!(
                    "must exceed session.timeout_ms ({}ms)",
                    self.timeout_ms
                ),
            });
        }
        if self.sweep_interval_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "session.sweep_interval_secs".into(),
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

impl Validate for StoreConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.backend == StoreBackend::Redis {
            let url = self.redis.url.as_deref().unwrap_or_default();
            if url.is_empty() {
                return Err(ValidationError::MissingField {
                    field: "store.redis.url".into(),
                });
            }
            if !url.starts_with("redis://") && !url.starts_with("rediss://") {
                return Err(ValidationError::InvalidValue {
                    field: "store.redis.url".into(),
                    reason: format!("unsupported scheme in '{url}'"),
                });
            }
        }
        Ok(())
    }
}

impl Validate for DeferredConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.queue_capacity == 0 {
            return Err(ValidationError::InvalidValue {
                field: "deferred.queue_capacity".into(),
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ChannelsConfig {
    fn validate(&self) -> ValidationResult<()> {
        let Some(whatsapp) = self.whatsapp.as_ref().filter(|w| w.enabled) else {
            return Ok(());
        };

        if whatsapp.phone_number_id.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "channels.whatsapp.phone_number_id".into(),
            });
        }
        if whatsapp.access_token.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "channels.whatsapp.access_token".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("unknown level '{}'", self.log_level),
            });
        }
        Ok(())
    }
}
