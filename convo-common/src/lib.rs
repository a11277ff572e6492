//! Convo Common - Shared types, utilities, and configuration for the Convo services.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Configuration validation
//! - Logging setup
//! - Small string helpers used across services

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod logging;
pub mod util;
pub mod validation;

pub use config::{
    ChannelsConfig, Config, DeferredConfig, NetworkConfig, ObservabilityConfig,
    ProvidersConfig, RedisStoreConfig, SessionConfig, StoreBackend, StoreConfig, WhatsAppConfig,
};
pub use validation::{Validate, ValidationError, ValidationResult};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::{Config, DeferredConfig, SessionConfig, StoreConfig};
    pub use crate::logging::init_logging;
    pub use crate::validation::{Validate, ValidationError};
}
