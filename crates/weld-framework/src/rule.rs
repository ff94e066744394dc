//! The fluent rule builder an extension uses to teach the host one marker type.
//!
//! # Example
//!
//! ```rust,ignore
//! use weld::prelude::*;
//!
//! let rule = config.open_rule_builder::<Blob>();
//!
//! rule.when_eq("access", FileAccess::Write)?
//!     .bind_to_stream(ConverterSource::from_context(open_blob), FileAccess::Write)?;
//!
//! rule.when_is_null("access")?
//!     .bind_to_input(ConverterSource::from_fn(|b: &Blob| b.path.clone()))?
//!     .add_validator(|b: &Blob, _: &TypeKey| check_path(&b.path));
//! ```
//!
//! Filters and the post-resolve hook apply to the next `bind_*` call only.
//! Staged providers are tried in the order they were bound.

use std::mem;
use std::sync::Arc;

use parking_lot::RwLock;
use tower_layer::Layer;
use tracing::{debug, trace};
use weld_core::{
    BindResult, BindingKind, BoxError, Collector, ConfigError, ConfigResult, FileAccess,
    IntoPropertyValue, Marker, NameResolver, OpenedStream, ParameterDescriptor, ParameterInfo,
    Services, SharedValueProvider, TypeKey,
};

use crate::binding::{BindingProvider, BoxedProvider};
use crate::composite::CompositeBindingProvider;
use crate::converter::ConverterManager;
use crate::filter::{FilterClause, FilterSet};
use crate::layer::{FilterLayer, HookLayer, PostResolveHook, ValidateLayer, Validator};
use crate::pattern::{ConverterSource, PatternMatcher};
use crate::provider::{
    CollectorBinder, InputBinder, ItemTypes, StreamBinder, TriggerAdapter, ValueProviderBinder,
};
use crate::registry::ExtensionRegistry;

/// The converter manager shared by every builder of one host.
pub type SharedConverters = Arc<RwLock<ConverterManager>>;

/// The ambient services shared by every builder of one host.
pub type SharedServices = Arc<RwLock<Services>>;

/// Where a builder stands between two `bind_*` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleState {
    /// Nothing pending, nothing staged.
    Idle,
    /// Filter clauses are waiting for a bind.
    FiltersStaged,
    /// A post-resolve hook is waiting for a bind.
    HookStaged,
    /// At least one provider is staged and nothing is pending.
    ProviderStaged,
}

// =============================================================================
// Staged Providers
// =============================================================================

struct StagedProvider<M> {
    provider: BoxedProvider<M>,
    hooked: bool,
    filters: FilterSet<M>,
    validator: Option<Validator<M>>,
    kind: BindingKind,
}

impl<M: Marker> StagedProvider<M> {
    /// Stacks the decorators: filter, then validator, then the hooked provider.
    fn assemble(self) -> BoxedProvider<M> {
        let mut provider = self.provider;
        if let Some(validator) = self.validator {
            provider = Arc::new(ValidateLayer::new(validator).layer(provider));
        }
        if !self.filters.is_empty() {
            provider = Arc::new(FilterLayer::new(self.filters).layer(provider));
        }
        provider
    }
}

/// Handle to the provider a `bind_*` call just staged.
pub struct StagedRule<'a, M: Marker> {
    builder: &'a mut RuleBuilder<M>,
    index: usize,
}

impl<'a, M: Marker> StagedRule<'a, M> {
    /// Attaches a validator that runs only when this provider is consulted.
    pub fn add_validator<F>(self, validator: F) -> &'a mut RuleBuilder<M>
    where
        F: Fn(&M, &TypeKey) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let staged = &mut self.builder.staged[self.index];
        staged.validator = Some(Arc::new(validator));
        self.builder
    }

    /// Returns the builder without further decoration.
    pub fn done(self) -> &'a mut RuleBuilder<M> {
        self.builder
    }

    /// Returns the position of the staged provider.
    pub fn index(&self) -> usize {
        self.index
    }
}

// =============================================================================
// RuleBuilder
// =============================================================================

/// Stages filters, hooks and providers for one marker type.
pub struct RuleBuilder<M: Marker> {
    filters: FilterSet<M>,
    hook: Option<PostResolveHook<M>>,
    staged: Vec<StagedProvider<M>>,
    validator: Option<Validator<M>>,
    converters: SharedConverters,
    services: SharedServices,
}

impl<M: Marker> RuleBuilder<M> {
    /// Creates a builder over host-wide converters and services.
    pub fn new(converters: SharedConverters, services: SharedServices) -> Self {
        Self {
            filters: FilterSet::new(),
            hook: None,
            staged: Vec::new(),
            validator: None,
            converters,
            services,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> RuleState {
        if self.hook.is_some() {
            RuleState::HookStaged
        } else if !self.filters.is_empty() {
            RuleState::FiltersStaged
        } else if !self.staged.is_empty() {
            RuleState::ProviderStaged
        } else {
            RuleState::Idle
        }
    }

    /// Returns the number of staged providers.
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    // ---- filters --------------------------------------------------------

    /// Guards the next bind with "`property` is absent".
    pub fn when_is_null(&mut self, property: &str) -> ConfigResult<&mut Self> {
        let clause = FilterClause::is_null(property)?;
        Ok(self.when(clause))
    }

    /// Guards the next bind with "`property` is present".
    pub fn when_is_not_null(&mut self, property: &str) -> ConfigResult<&mut Self> {
        let clause = FilterClause::is_not_null(property)?;
        Ok(self.when(clause))
    }

    /// Guards the next bind with "`property` equals the enumeration value".
    pub fn when_eq(
        &mut self,
        property: &str,
        expected: impl IntoPropertyValue,
    ) -> ConfigResult<&mut Self> {
        let clause = FilterClause::equals(property, expected)?;
        Ok(self.when(clause))
    }

    /// Guards the next bind with an arbitrary clause.
    pub fn when(&mut self, clause: FilterClause<M>) -> &mut Self {
        trace!(marker = M::NAME, clause = clause.description(), "Staged filter");
        self.filters.push(clause);
        self
    }

    // ---- hooks and validators -------------------------------------------

    /// Replaces the descriptor produced by the next bound provider.
    pub fn set_post_resolve_hook<F>(&mut self, hook: F) -> ConfigResult<&mut Self>
    where
        F: Fn(&M, &ParameterInfo, &dyn NameResolver) -> ParameterDescriptor + Send + Sync + 'static,
    {
        if self.hook.is_some() {
            return Err(ConfigError::HookAlreadySet { marker: M::NAME });
        }
        self.hook = Some(Arc::new(hook));
        Ok(self)
    }

    /// Adds the rule-wide validator, run before any provider is consulted.
    pub fn add_validator<F>(&mut self, validator: F) -> ConfigResult<&mut Self>
    where
        F: Fn(&M, &TypeKey) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        if self.validator.is_some() {
            return Err(ConfigError::DuplicateValidator { marker: M::NAME });
        }
        self.validator = Some(Arc::new(validator));
        Ok(self)
    }

    // ---- converters -----------------------------------------------------

    /// Registers `F -> T` in the host-wide converter manager.
    pub fn add_converter<F, T, C>(&mut self, convert: C) -> &mut Self
    where
        F: Send + 'static,
        T: Send + 'static,
        C: Fn(F) -> BindResult<T> + Send + Sync + 'static,
    {
        self.converters.write().add_converter(convert);
        self
    }

    /// Returns the host-wide converter manager.
    pub fn converters(&self) -> SharedConverters {
        Arc::clone(&self.converters)
    }

    // ---- binds ----------------------------------------------------------

    /// Binds parameters of the produced type, or of one registered conversion of it.
    pub fn bind_to_input<T: Send + 'static>(
        &mut self,
        source: ConverterSource<M, T>,
    ) -> ConfigResult<StagedRule<'_, M>> {
        let matcher = self.matcher(source)?;
        self.stage(InputBinder::new(matcher))
    }

    /// Binds parameters through a prebuilt matcher, typically an open one.
    pub fn bind_to_input_with(
        &mut self,
        matcher: PatternMatcher<M>,
    ) -> ConfigResult<StagedRule<'_, M>> {
        self.stage(InputBinder::new(matcher))
    }

    /// Binds streams opened by `source`.
    ///
    /// The direction comes from the marker's `access` property when it has
    /// one, otherwise from `default_access`.
    pub fn bind_to_stream(
        &mut self,
        source: ConverterSource<M, OpenedStream>,
        default_access: FileAccess,
    ) -> ConfigResult<StagedRule<'_, M>> {
        let matcher = self.matcher(source)?;
        self.stage(StreamBinder::new(matcher, default_access))
    }

    /// Binds collectors of `T`.
    pub fn bind_to_collector<T: Send + 'static>(
        &mut self,
        source: ConverterSource<M, Collector<T>>,
    ) -> ConfigResult<StagedRule<'_, M>> {
        self.bind_to_collector_with(source, ItemTypes::new())
    }

    /// Binds collectors of `T` that also accept the given item types.
    ///
    /// Item conversions are looked up now. An extension that accepts `U` must
    /// run after the one registering the `U -> T` converter.
    pub fn bind_to_collector_with<T: Send + 'static>(
        &mut self,
        source: ConverterSource<M, Collector<T>>,
        items: ItemTypes<T>,
    ) -> ConfigResult<StagedRule<'_, M>> {
        let matcher = self.matcher(source)?;
        let binder = CollectorBinder::new(matcher, items, &self.converters.read())?;
        self.stage(binder)
    }

    /// Declares the marker as an invocation origin with payload `P`.
    ///
    /// Must be the only bind on this builder.
    pub fn bind_to_trigger<P: Clone + Send + Sync + 'static>(
        &mut self,
    ) -> ConfigResult<StagedRule<'_, M>> {
        self.stage(TriggerAdapter::<M, P>::new())
    }

    /// Binds `T` and `Out<T>` through a value provider.
    pub fn bind_to_value_provider<T: Send + 'static>(
        &mut self,
        source: ConverterSource<M, SharedValueProvider<T>>,
    ) -> ConfigResult<StagedRule<'_, M>> {
        let matcher = self.matcher(source)?;
        self.stage(ValueProviderBinder::<M, T>::new(matcher))
    }

    /// Stages a custom provider.
    pub fn bind_to_provider(
        &mut self,
        provider: impl BindingProvider<M> + 'static,
    ) -> ConfigResult<StagedRule<'_, M>> {
        self.stage(provider)
    }

    fn matcher<T: Send + 'static>(
        &self,
        source: ConverterSource<M, T>,
    ) -> ConfigResult<PatternMatcher<M>> {
        PatternMatcher::new(source, &self.services.read())
    }

    fn stage(
        &mut self,
        provider: impl BindingProvider<M> + 'static,
    ) -> ConfigResult<StagedRule<'_, M>> {
        let kind = provider.kind();
        let has_trigger = self.staged.iter().any(|s| s.kind == BindingKind::Trigger);
        if has_trigger || (kind == BindingKind::Trigger && !self.staged.is_empty()) {
            return Err(ConfigError::TriggerConflict { marker: M::NAME });
        }

        let mut boxed: BoxedProvider<M> = Arc::new(provider);
        let hooked = match self.hook.take() {
            Some(hook) => {
                boxed = Arc::new(HookLayer::new(hook).layer(boxed));
                true
            }
            None => false,
        };
        let filters = mem::take(&mut self.filters);

        let index = self.staged.len();
        debug!(
            marker = M::NAME,
            index,
            kind = %kind,
            filters = %filters.description(),
            hooked,
            "Staged binding provider"
        );
        self.staged.push(StagedProvider {
            provider: boxed,
            hooked,
            filters,
            validator: None,
            kind,
        });
        Ok(StagedRule {
            builder: self,
            index,
        })
    }

    // ---- finalize -------------------------------------------------------

    /// Merges the staged providers into one composite and registers it.
    ///
    /// Pending filters or a pending hook fail with
    /// [`ConfigError::DanglingGuard`] and register nothing. An empty builder
    /// is a no-op.
    pub fn finalize(&mut self, registry: &mut ExtensionRegistry) -> ConfigResult<()> {
        if self.hook.is_some() || !self.filters.is_empty() {
            return Err(ConfigError::DanglingGuard {
                marker: M::NAME,
                filters: self.filters.description(),
                hook: self.hook.is_some(),
            });
        }
        if self.staged.is_empty() {
            trace!(marker = M::NAME, "Nothing staged, skipping finalize");
            return Ok(());
        }
        if registry.contains::<M>() {
            return Err(ConfigError::AlreadyRegistered { marker: M::NAME });
        }

        let hooked = self.staged.iter().filter(|s| s.hooked).count();
        let providers: Vec<_> = self.staged.drain(..).map(StagedProvider::assemble).collect();
        let count = providers.len();
        let composite = CompositeBindingProvider::new(
            providers,
            self.validator.clone(),
            self.converters.read().clone(),
        );
        registry.register(composite)?;

        debug!(marker = M::NAME, providers = count, hooked, "Registered composite provider");
        Ok(())
    }
}

impl<M: Marker> Default for RuleBuilder<M> {
    fn default() -> Self {
        Self::new(
            Arc::new(RwLock::new(ConverterManager::new())),
            Arc::new(RwLock::new(Services::new())),
        )
    }
}
