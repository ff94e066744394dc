//! # Weld
//!
//! Declarative binding rules that turn parameter markers into runtime values.
//!
//! ## Overview
//!
//! A host function declares parameters decorated with *markers*. Extensions
//! register, per marker type, an ordered list of guarded binding rules. At
//! startup the rules of each marker are folded into one composite provider;
//! for each parameter the first rule that accepts it produces the binding.
//!
//! ```text
//! ┌──────────────┐  open_rule_builder  ┌─────────────┐  build   ┌──────────────────┐
//! │  Extensions  │────────────────────▶│ RuleBuilder │─────────▶│ ExtensionRegistry │
//! └──────────────┘   when / bind_to    └─────────────┘ finalize └────────┬─────────┘
//!                                                                        │ resolve
//!                        ┌─────────────┐   bind    ┌──────────────────┐  │
//!                        │ Invocation  │◀──────────│ ParameterBinding │◀─┘
//!                        └─────────────┘           └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use weld::prelude::*;
//!
//! #[derive(Debug, Clone, Marker)]
//! #[weld(name = "Blob")]
//! struct BlobMarker {
//!     #[weld(auto_resolve)]
//!     path: String,
//!     access: Option<FileAccess>,
//! }
//!
//! #[register_extension]
//! fn blobs(host: &mut HostConfiguration) -> ConfigResult<()> {
//!     host.open_rule_builder::<BlobMarker>()
//!         .when_is_not_null("access")?
//!         .bind_to_stream(ConverterSource::from_context(open_blob), FileAccess::Read)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` (default): TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log lines

pub use weld_core as core;
pub use weld_framework as framework;
pub use weld_runtime as runtime;

pub use weld_macros::{Marker, MarkerEnum, register_extension};

/// Commonly used types for writing extensions and hosts.
///
/// ```rust,ignore
/// use weld::prelude::*;
/// ```
pub mod prelude {
    // Markers
    pub use weld_core::{
        FileAccess, IntoPropertyValue, Marker, MarkerEnum, PropertyField, PropertyValue,
    };
    pub use weld_macros::{Marker, MarkerEnum, register_extension};

    // Bound values
    pub use weld_core::{
        AsyncCollector, BoundValue, Collector, InvocationStatus, OpenedStream, Out, ReadStream,
        SharedValueProvider, ValueProvider, WriteStream,
    };

    // Resolution
    pub use weld_core::{
        BindingKind, CancellationToken, MapNameResolver, NameResolver, ParameterDescriptor,
        ParameterInfo, ResolutionContext, Services, TypeKey, TypePattern,
    };

    // Errors
    pub use weld_core::{
        BindError, BindResult, BoxError, ConfigError, ConfigResult, InvocationError,
    };

    // Rules
    pub use weld_framework::{
        AsyncConverter, BindingProvider, Constructible, Converter, ConverterSource,
        CompositeBindingProvider, FilterClause, Invocation, ItemTypes, ParameterBinding,
        PatternMatcher, ProviderContext, RuleBuilder, RuleState,
    };

    // Host
    pub use weld_runtime::{HostConfiguration, JobHost, WeldConfig};

    pub use weld_core::async_trait;
}
