//! Runtime error types.

use thiserror::Error;
use weld_core::ConfigError;

use crate::config::SettingsError;

/// Errors that can occur while assembling a job host.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A binding rule was misconfigured.
    #[error("Binding configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An extension initializer failed.
    #[error("Extension `{name}` failed to initialize: {source}")]
    Extension {
        name: &'static str,
        #[source]
        source: ConfigError,
    },

    /// Host settings could not be loaded or are invalid.
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
