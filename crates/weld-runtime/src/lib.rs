//! Weld Runtime - host assembly for the Weld binding engine.
//!
//! This crate provides:
//! - [`HostConfiguration`]: one rule builder per marker type, shared
//!   converters and services, and the [`JobHost`] it builds
//! - Extension discovery through `#[register_extension]` and [`EXTENSIONS`]
//! - figment-based settings ([`config`]) and a settings-backed name resolver
//! - Logging configuration
//!
//! ```ignore
//! use weld_runtime::{HostConfiguration, config, logging};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = config::load_config()?;
//!     logging::init_from_config(&config.logging);
//!
//!     let mut host = HostConfiguration::from_config(&config)?;
//!     host.with_registered_extensions()?;
//!     let host = host.build()?;
//!
//!     tracing::info!("\n{}", host.dump_rule_graphs());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod extension;
pub mod host;
pub mod logging;
pub mod resolver;

pub use config::{ConfigLoader, SettingsError, SettingsResult, WeldConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use extension::{EXTENSIONS, ExtensionDescriptor, ExtensionInit, registered_extensions};
pub use host::{HostConfiguration, JobHost};
pub use logging::{LoggingBuilder, SpanEvents};
pub use resolver::SettingsNameResolver;

// Used by `#[register_extension]` expansions.
pub use linkme;

pub use tracing;
pub use tracing_subscriber;

/// Logging macros for extension authors.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
