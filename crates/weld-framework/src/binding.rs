//! The provider contract and the binding it produces.
//!
//! Binding happens in two phases. *Resolution* runs once per parameter: the
//! composite asks each staged [`BindingProvider`] whether it accepts the
//! parameter's declared type and the resolved marker. The accepting provider
//! returns a [`ParameterBinding`]. *Binding* then runs once per invocation:
//! [`ParameterBinding::bind`] produces the value and its completion action.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use weld_core::{
    BindError, BindResult, BindingKind, BoundValue, Marker, NameResolver, ParameterDescriptor,
    ParameterInfo, ResolutionContext, TypeKey,
};

use crate::converter::ConverterManager;

// =============================================================================
// ParameterBinding
// =============================================================================

type BindFn = Arc<dyn Fn(ResolutionContext) -> BoxFuture<'static, BindResult<BoundValue>> + Send + Sync>;

/// A resolved parameter, ready to be bound for any number of invocations.
#[derive(Clone)]
pub struct ParameterBinding {
    kind: BindingKind,
    descriptor: ParameterDescriptor,
    bind: BindFn,
}

impl ParameterBinding {
    /// Creates a binding from a per-invocation bind function.
    pub fn new<F, Fut>(kind: BindingKind, descriptor: ParameterDescriptor, bind: F) -> Self
    where
        F: Fn(ResolutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BindResult<BoundValue>> + Send + 'static,
    {
        Self {
            kind,
            descriptor,
            bind: Arc::new(move |ctx| bind(ctx).boxed()),
        }
    }

    /// Returns the provider variant that produced this binding.
    pub fn kind(&self) -> BindingKind {
        self.kind
    }

    /// Returns the diagnostics descriptor.
    pub fn descriptor(&self) -> &ParameterDescriptor {
        &self.descriptor
    }

    /// Replaces the diagnostics descriptor.
    pub fn with_descriptor(mut self, descriptor: ParameterDescriptor) -> Self {
        self.descriptor = descriptor;
        self
    }

    /// Produces the value for one invocation.
    ///
    /// Nothing starts once the context's token is cancelled, and a
    /// conversion suspended when cancellation fires is dropped.
    pub async fn bind(&self, ctx: ResolutionContext) -> BindResult<BoundValue> {
        let token = ctx.cancellation().clone();
        if token.is_cancelled() {
            return Err(BindError::Cancelled);
        }

        let binding = (self.bind)(ctx);
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(BindError::Cancelled),
            result = binding => result,
        }
    }
}

impl fmt::Debug for ParameterBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterBinding")
            .field("kind", &self.kind)
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

// =============================================================================
// Provider Contract
// =============================================================================

/// Everything a provider sees while resolving one parameter.
pub struct ProviderContext<'a, M> {
    marker: Arc<M>,
    parameter: &'a ParameterInfo,
    resolver: &'a dyn NameResolver,
    converters: &'a ConverterManager,
}

impl<'a, M> ProviderContext<'a, M> {
    /// Creates a context over an already resolved marker.
    pub fn new(
        marker: Arc<M>,
        parameter: &'a ParameterInfo,
        resolver: &'a dyn NameResolver,
        converters: &'a ConverterManager,
    ) -> Self {
        Self {
            marker,
            parameter,
            resolver,
            converters,
        }
    }

    /// Returns the marker with placeholders already substituted.
    pub fn marker(&self) -> &Arc<M> {
        &self.marker
    }

    /// Returns the parameter being resolved.
    pub fn parameter(&self) -> &ParameterInfo {
        self.parameter
    }

    /// Returns the parameter's declared type.
    pub fn param_type(&self) -> TypeKey {
        self.parameter.param_type
    }

    /// Returns the host's name resolver.
    pub fn resolver(&self) -> &dyn NameResolver {
        self.resolver
    }

    /// Returns the frozen converter snapshot.
    pub fn converters(&self) -> &ConverterManager {
        self.converters
    }

    /// Returns the default descriptor for a binding of `kind`.
    pub fn descriptor(&self, kind: BindingKind) -> ParameterDescriptor {
        ParameterDescriptor::new(
            self.parameter.name.clone(),
            self.parameter.param_type.short_name(),
            kind,
        )
    }
}

/// One way to bind parameters for a marker type.
///
/// Declining is `Ok(None)`; errors are reserved for real failures such as a
/// validator rejecting the marker.
pub trait BindingProvider<M: Marker>: Send + Sync {
    /// Accepts or declines the parameter.
    fn try_create(&self, ctx: &ProviderContext<'_, M>) -> BindResult<Option<ParameterBinding>>;

    /// Returns the provider variant.
    fn kind(&self) -> BindingKind;

    /// Renders this provider for rule-graph dumps.
    fn describe(&self) -> String;
}

/// A shared, type-erased provider.
pub type BoxedProvider<M> = Arc<dyn BindingProvider<M>>;

impl<M: Marker> BindingProvider<M> for BoxedProvider<M> {
    fn try_create(&self, ctx: &ProviderContext<'_, M>) -> BindResult<Option<ParameterBinding>> {
        (**self).try_create(ctx)
    }

    fn kind(&self) -> BindingKind {
        (**self).kind()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use weld_core::CancellationToken;

    fn descriptor() -> ParameterDescriptor {
        ParameterDescriptor::new("value", "String", BindingKind::Input)
    }

    #[tokio::test]
    async fn test_bind_produces_value() {
        let binding = ParameterBinding::new(BindingKind::Input, descriptor(), |_ctx| async {
            Ok(BoundValue::new(String::from("ok")))
        });
        let mut value = binding.bind(ResolutionContext::new()).await.unwrap();
        assert_eq!(value.take::<String>().unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_no_binding_starts_after_cancellation() {
        let started = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&started);
        let binding = ParameterBinding::new(BindingKind::Input, descriptor(), move |_ctx| {
            flag.store(true, Ordering::SeqCst);
            async { Ok(BoundValue::new(())) }
        });
        let token = CancellationToken::new();
        token.cancel();

        let result = binding
            .bind(ResolutionContext::new().with_cancellation(token))
            .await;
        assert!(matches!(result, Err(BindError::Cancelled)));
        assert!(!started.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_cancellation_reaches_suspended_conversion() {
        let binding = ParameterBinding::new(BindingKind::Input, descriptor(), |_ctx| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(BoundValue::new(()))
        });
        let token = CancellationToken::new();
        let ctx = ResolutionContext::new().with_cancellation(token.clone());

        let pending = tokio::spawn(async move { binding.bind(ctx).await });
        tokio::task::yield_now().await;
        token.cancel();

        let result = pending.await.unwrap();
        assert!(result.unwrap_err().is_cancelled());
    }
}
