//! # Weld Framework
//!
//! Binding rules and their composition.
//!
//! This layer provides:
//! - Property filters (`when_is_null`, `when_is_not_null`, `when_eq`)
//! - Converter normalization into pattern matchers, plus the shared converter manager
//! - The provider variants: input, stream, collector, trigger, value provider
//! - Filter, validator and hook decorators as `tower_layer::Layer`s
//! - The fluent [`RuleBuilder`] and the [`CompositeBindingProvider`] it finalizes into
//! - The [`ExtensionRegistry`] and the per-call [`Invocation`] scope
//!
//! Host wiring (configuration, extension discovery, logging) lives in
//! `weld-runtime`.

pub mod binding;
pub mod composite;
pub mod converter;
pub mod filter;
pub mod invocation;
pub mod layer;
pub mod pattern;
pub mod provider;
pub mod registry;
pub mod rule;

pub use binding::{BindingProvider, BoxedProvider, ParameterBinding, ProviderContext};
pub use composite::{BindingRequest, CompositeBindingProvider};
pub use converter::{Conversion, ConverterFunc, ConverterManager};
pub use filter::{FilterClause, FilterSet, PredicateFn};
pub use invocation::Invocation;
pub use layer::{
    FilterLayer, Filtered, HookLayer, Hooked, PostResolveHook, ValidateLayer, Validated,
    Validator,
};
pub use pattern::{
    AsyncConverter, Constructible, Converter, ConverterSource, ErasedConverter, PatternMatcher,
};
pub use provider::{
    ACCESS_PROPERTY, CollectorBinder, InputBinder, ItemTypes, StreamBinder, TriggerAdapter,
    ValueProviderBinder,
};
pub use registry::ExtensionRegistry;
pub use rule::{RuleBuilder, RuleState, SharedConverters, SharedServices, StagedRule};
