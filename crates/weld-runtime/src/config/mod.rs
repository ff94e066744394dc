//! Host settings: schema, figment-based loading and validation.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{SettingsError, SettingsResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    HostSettings, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig,
    NameResolutionConfig, SpanEventConfig, WeldConfig,
};
pub use validation::validate_config;
