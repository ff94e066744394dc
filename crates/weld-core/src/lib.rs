//! # Weld Core
//!
//! Foundation types for the Weld binding engine.
//!
//! A host function declares parameters decorated with *markers* ("this
//! parameter is a blob", "this parameter is a queue output"). Extensions teach
//! the host how to turn a marker plus a parameter type into a runtime value.
//! This crate holds the vocabulary every layer shares:
//!
//! - **Markers**: the [`Marker`] trait and its explicit property accessor
//!   tables ([`PropertyAccessor`], [`PropertyValue`]).
//! - **Types**: runtime type identity ([`TypeKey`], [`TypePattern`]) used to
//!   match parameters against what a converter can produce.
//! - **Resolution**: `%token%` substitution ([`NameResolver`]), ambient
//!   [`Services`], and the per-invocation [`ResolutionContext`].
//! - **Values**: [`BoundValue`] with its [`Completion`] action, [`Out`],
//!   streams ([`ReadStream`], [`WriteStream`]), [`Collector`] and
//!   [`ValueProvider`].
//! - **Errors**: [`ConfigError`], [`BindError`], [`InvocationError`].
//!
//! The rule builder and composite providers live in `weld-framework`.

pub mod collector;
pub mod context;
pub mod error;
pub mod marker;
pub mod resolver;
pub mod services;
pub mod stream;
pub mod types;
pub mod value;

pub use collector::{
    AsyncCollector, Collector, ItemConvert, MappedCollector, SharedValueProvider, ValueProvider,
};
pub use context::{ParameterInfo, ResolutionContext};
pub use error::{BindError, BindResult, BoxError, ConfigError, ConfigResult, InvocationError};
pub use marker::{
    EnumValue, IntoPropertyValue, Marker, MarkerEnum, PropertyAccessor, PropertyField,
    PropertyKind, PropertyShape, PropertyValue,
};
pub use resolver::{
    AutoResolve, EnvNameResolver, MapNameResolver, NameResolver, SharedNameResolver,
    resolve_tokens,
};
pub use services::Services;
pub use stream::{BoxedReader, BoxedWriter, FileAccess, OpenedStream, ReadStream, WriteStream};
pub use types::{BoxedValue, TypeKey, TypePattern, downcast_value};
pub use value::{
    BindingKind, BoundValue, Completion, FnCompletion, InvocationStatus, Out,
    ParameterDescriptor, completion_fn,
};

pub use async_trait::async_trait;
pub use futures::future::BoxFuture;
pub use tokio_util::sync::CancellationToken;

/// Prelude for common imports.
pub mod prelude {
    pub use super::collector::{AsyncCollector, Collector, SharedValueProvider, ValueProvider};
    pub use super::context::{ParameterInfo, ResolutionContext};
    pub use super::error::{BindError, BindResult, BoxError, ConfigError, ConfigResult};
    pub use super::marker::{Marker, MarkerEnum, PropertyValue};
    pub use super::resolver::{MapNameResolver, NameResolver};
    pub use super::services::Services;
    pub use super::stream::{FileAccess, OpenedStream, ReadStream, WriteStream};
    pub use super::types::{TypeKey, TypePattern};
    pub use super::value::{BindingKind, BoundValue, InvocationStatus, Out, ParameterDescriptor};
    pub use super::{CancellationToken, async_trait};
}
