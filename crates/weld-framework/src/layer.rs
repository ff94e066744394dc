//! Decorators stacked on top of a staged provider.
//!
//! Every `bind_*` call produces a bare provider variant. What the builder had
//! staged before the bind is expressed as ordinary [`Layer`]s around it:
//!
//! ```text
//! FilterLayer        ← filters staged with when_*()
//!   ValidateLayer    ← StagedRule::add_validator()
//!     HookLayer      ← set_post_resolve_hook()
//!       provider     ← bind_to_*()
//! ```
//!
//! Filtering and validation act before delegating; the hook acts after a
//! successful resolution. None of them runs per invocation.

use std::sync::Arc;

use tower_layer::Layer;
use tracing::trace;
use weld_core::{
    BindResult, BindingKind, BoxError, ConfigError, Marker, NameResolver, ParameterDescriptor,
    ParameterInfo, TypeKey,
};

use crate::binding::{BindingProvider, ParameterBinding, ProviderContext};
use crate::filter::FilterSet;

/// A validator: receives the resolved marker and the requested type.
pub type Validator<M> = Arc<dyn Fn(&M, &TypeKey) -> Result<(), BoxError> + Send + Sync>;

/// A post-resolve hook producing the descriptor shown in diagnostics.
pub type PostResolveHook<M> =
    Arc<dyn Fn(&M, &ParameterInfo, &dyn NameResolver) -> ParameterDescriptor + Send + Sync>;

/// Runs a validator, mapping rejection to [`ConfigError::Validation`].
pub(crate) fn run_validator<M: Marker>(
    validator: &Validator<M>,
    marker: &M,
    requested: &TypeKey,
) -> BindResult<()> {
    validator(marker, requested).map_err(|source| {
        ConfigError::Validation {
            marker: format!("{marker:?}"),
            param_type: requested.name(),
            source,
        }
        .into()
    })
}

// ============================================================================
// FilterLayer
// ============================================================================

/// Declines the parameter unless every staged clause holds.
#[derive(Clone)]
pub struct FilterLayer<M> {
    filters: FilterSet<M>,
}

impl<M> FilterLayer<M> {
    pub fn new(filters: FilterSet<M>) -> Self {
        Self { filters }
    }
}

impl<M, P> Layer<P> for FilterLayer<M> {
    type Service = Filtered<M, P>;

    fn layer(&self, inner: P) -> Self::Service {
        Filtered {
            filters: self.filters.clone(),
            inner,
        }
    }
}

pub struct Filtered<M, P> {
    filters: FilterSet<M>,
    inner: P,
}

impl<M, P> Filtered<M, P> {
    /// Returns the rendered clause list, e.g. `(path != null) && (access == Read)`.
    pub fn description(&self) -> String {
        self.filters.description()
    }
}

impl<M: Marker, P: BindingProvider<M>> BindingProvider<M> for Filtered<M, P> {
    fn try_create(&self, ctx: &ProviderContext<'_, M>) -> BindResult<Option<ParameterBinding>> {
        if !self.filters.evaluate(ctx.marker().as_ref()) {
            trace!(
                marker = M::NAME,
                filters = %self.filters.description(),
                "Filters rejected marker"
            );
            return Ok(None);
        }
        self.inner.try_create(ctx)
    }

    fn kind(&self) -> BindingKind {
        self.inner.kind()
    }

    fn describe(&self) -> String {
        format!("when {} => {}", self.filters.description(), self.inner.describe())
    }
}

// ============================================================================
// ValidateLayer
// ============================================================================

/// Runs a provider-scoped validator before delegating.
///
/// The validator gates every parameter that reaches the provider, including
/// parameters whose type the inner provider would decline. A rejection aborts
/// resolution instead of letting the composite try the next rule, so a
/// validator that only cares about some types must check the `TypeKey` it is
/// given.
#[derive(Clone)]
pub struct ValidateLayer<M> {
    validator: Validator<M>,
}

impl<M> ValidateLayer<M> {
    pub fn new(validator: Validator<M>) -> Self {
        Self { validator }
    }
}

impl<M, P> Layer<P> for ValidateLayer<M> {
    type Service = Validated<M, P>;

    fn layer(&self, inner: P) -> Self::Service {
        Validated {
            validator: Arc::clone(&self.validator),
            inner,
        }
    }
}

pub struct Validated<M, P> {
    validator: Validator<M>,
    inner: P,
}

impl<M: Marker, P: BindingProvider<M>> BindingProvider<M> for Validated<M, P> {
    fn try_create(&self, ctx: &ProviderContext<'_, M>) -> BindResult<Option<ParameterBinding>> {
        run_validator(&self.validator, ctx.marker().as_ref(), &ctx.param_type())?;
        self.inner.try_create(ctx)
    }

    fn kind(&self) -> BindingKind {
        self.inner.kind()
    }

    fn describe(&self) -> String {
        format!("{} (validated)", self.inner.describe())
    }
}

// ============================================================================
// HookLayer
// ============================================================================

/// Replaces the descriptor of a successful resolution with the hook's output.
#[derive(Clone)]
pub struct HookLayer<M> {
    hook: PostResolveHook<M>,
}

impl<M> HookLayer<M> {
    pub fn new(hook: PostResolveHook<M>) -> Self {
        Self { hook }
    }
}

impl<M, P> Layer<P> for HookLayer<M> {
    type Service = Hooked<M, P>;

    fn layer(&self, inner: P) -> Self::Service {
        Hooked {
            hook: Arc::clone(&self.hook),
            inner,
        }
    }
}

pub struct Hooked<M, P> {
    hook: PostResolveHook<M>,
    inner: P,
}

impl<M: Marker, P: BindingProvider<M>> BindingProvider<M> for Hooked<M, P> {
    fn try_create(&self, ctx: &ProviderContext<'_, M>) -> BindResult<Option<ParameterBinding>> {
        let Some(binding) = self.inner.try_create(ctx)? else {
            return Ok(None);
        };
        let descriptor = (self.hook)(ctx.marker().as_ref(), ctx.parameter(), ctx.resolver());
        Ok(Some(binding.with_descriptor(descriptor)))
    }

    fn kind(&self) -> BindingKind {
        self.inner.kind()
    }

    fn describe(&self) -> String {
        format!("{} (hooked)", self.inner.describe())
    }
}
