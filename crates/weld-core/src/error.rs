//! Error taxonomy for the Weld binding engine.
//!
//! Three families, matching the three moments an error can surface:
//!
//! - [`ConfigError`]: raised while extensions stage rules or while the host
//!   finalizes them. These are fatal and must abort host startup.
//! - [`BindError`]: raised while resolving a parameter against a composite
//!   provider, or while producing its value for one invocation.
//! - [`InvocationError`]: raised by the invocation scope around a user body.
//!
//! A provider *declining* a parameter is not an error at all: providers
//! report it as `Ok(None)` and the composite moves on to the next candidate.

use thiserror::Error;

/// Boxed error returned by user-supplied callbacks (converters, validators).
pub type BoxError = tower::BoxError;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors raised while staging or finalizing binding rules.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A filter referenced a property the marker does not expose.
    #[error("marker '{marker}' has no readable property '{property}'")]
    UnknownProperty {
        /// Marker name.
        marker: &'static str,
        /// Requested property name.
        property: String,
    },

    /// The equality filter was given a value that is not an enumeration.
    #[error("filter on '{property}' expects an enum value, got {actual}")]
    NotAnEnum {
        /// Property name.
        property: String,
        /// Kind of the supplied value.
        actual: String,
    },

    /// The equality filter value cannot be assigned to the property.
    #[error("property '{marker}.{property}' is declared as {expected}, filter value is {actual}")]
    PropertyTypeMismatch {
        /// Marker name.
        marker: &'static str,
        /// Property name.
        property: String,
        /// Declared property type.
        expected: String,
        /// Type of the supplied value.
        actual: String,
    },

    /// A post-resolve hook was set twice without a bind in between.
    #[error("marker '{marker}' already has a pending post-resolve hook")]
    HookAlreadySet {
        /// Marker name.
        marker: &'static str,
    },

    /// Filters or a hook were staged but never attached to a provider.
    #[error("marker '{marker}' has a dangling guard (filters: '{filters}', hook: {hook})")]
    DanglingGuard {
        /// Marker name.
        marker: &'static str,
        /// Rendered pending filter description (empty if none).
        filters: String,
        /// Whether a hook was pending.
        hook: bool,
    },

    /// Trigger and non-trigger bindings were mixed on one marker.
    #[error("marker '{marker}' cannot be both a trigger source and a regular binding target")]
    TriggerConflict {
        /// Marker name.
        marker: &'static str,
    },

    /// A second builder-scoped validator was registered.
    #[error("marker '{marker}' already has a rule-wide validator")]
    DuplicateValidator {
        /// Marker name.
        marker: &'static str,
    },

    /// No conversion exists between the two types.
    #[error("no converter from '{from}' to '{to}'")]
    NoConverter {
        /// Source type name.
        from: &'static str,
        /// Target type name.
        to: &'static str,
    },

    /// A constructible converter type could not be built.
    #[error("cannot construct converter '{converter}': {reason}")]
    NoConstructor {
        /// Converter type name.
        converter: &'static str,
        /// Why construction failed.
        reason: String,
    },

    /// An ambient service required by a converter is not registered.
    #[error("service '{0}' is not registered")]
    MissingService(&'static str),

    /// A composite provider for the marker is already registered.
    #[error("a binding provider for marker '{marker}' is already registered")]
    AlreadyRegistered {
        /// Marker name.
        marker: &'static str,
    },

    /// A validator rejected a marker instance.
    #[error("validation of '{marker}' for parameter type '{param_type}' failed: {source}")]
    Validation {
        /// Debug rendering of the offending marker instance.
        marker: String,
        /// Requested parameter type.
        param_type: &'static str,
        /// Validator error.
        #[source]
        source: BoxError,
    },
}

// =============================================================================
// Binding Errors
// =============================================================================

/// Errors raised while resolving or binding a parameter.
#[derive(Debug, Error)]
pub enum BindError {
    /// Every staged provider declined the parameter.
    #[error("no applicable binding for parameter '{parameter}' of type '{param_type}' on marker '{marker}'")]
    NoApplicableBinding {
        /// Marker name.
        marker: &'static str,
        /// Parameter name.
        parameter: String,
        /// Declared parameter type.
        param_type: &'static str,
    },

    /// A configuration-class failure detected during resolution (validation).
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The resolution was cancelled before completing.
    #[error("binding cancelled")]
    Cancelled,

    /// A `%token%` placeholder had no value.
    #[error("unable to resolve token '%{0}%'")]
    UnresolvedToken(String),

    /// A trigger binding ran without a trigger payload in context.
    #[error("no trigger payload of type '{0}' in the resolution context")]
    MissingTriggerPayload(&'static str),

    /// A produced value had a different type than expected.
    #[error("type mismatch: expected '{expected}', got '{actual}'")]
    TypeMismatch {
        /// Expected type name.
        expected: &'static str,
        /// Actual type name.
        actual: &'static str,
    },

    /// A converter failed.
    #[error("conversion failed: {0}")]
    Conversion(#[source] BoxError),

    /// A stream was opened in a direction the parameter cannot use.
    #[error("stream opened for {opened} but parameter needs {required}")]
    AccessDenied {
        /// Direction the converter produced.
        opened: &'static str,
        /// Direction the parameter requires.
        required: &'static str,
    },

    /// I/O error while reading or flushing a bound stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BindError {
    /// Wraps a converter failure.
    pub fn conversion(err: impl Into<BoxError>) -> Self {
        Self::Conversion(err.into())
    }

    /// Returns `true` if this error came from cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

// =============================================================================
// Invocation Errors
// =============================================================================

/// Errors surfaced by an invocation scope.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// A parameter could not be bound.
    #[error("failed to bind parameter: {0}")]
    Binding(#[from] BindError),

    /// The user function returned an error.
    #[error("function failed: {0}")]
    Function(#[source] BoxError),

    /// The invocation was cancelled.
    #[error("invocation cancelled")]
    Cancelled,

    /// A completion action (flush, write-back) failed after a successful body.
    #[error("failed to complete binding '{parameter}': {source}")]
    Completion {
        /// Parameter whose completion failed.
        parameter: String,
        /// Underlying error.
        #[source]
        source: BindError,
    },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for rule configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for parameter resolution and binding.
pub type BindResult<T> = Result<T, BindError>;
