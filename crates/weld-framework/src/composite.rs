//! The per-marker composite provider assembled at host build time.
//!
//! Resolution order for one parameter:
//!
//! 1. substitute `%token%` placeholders ([`Marker::resolve`]);
//! 2. run the rule-wide validator, if any;
//! 3. consult staged providers in order, first acceptance wins;
//! 4. nobody accepted: [`BindError::NoApplicableBinding`].
//!
//! The composite is immutable and cheap to clone, so it is shared freely
//! between concurrent resolutions. It also implements
//! `tower::Service<BindingRequest<M>>` for hosts that drive resolution through
//! tower middleware.

use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::{Ready, ready};
use tower::Service;
use tracing::trace;
use weld_core::{
    BindError, BindResult, BindingKind, Marker, NameResolver, ParameterInfo, SharedNameResolver,
};

use crate::binding::{BoxedProvider, ParameterBinding, ProviderContext};
use crate::converter::ConverterManager;
use crate::layer::{Validator, run_validator};

/// One resolution request, as handled by the [`Service`] implementation.
#[derive(Clone)]
pub struct BindingRequest<M> {
    /// The marker as declared on the parameter, placeholders unresolved.
    pub marker: M,
    /// The parameter being resolved.
    pub parameter: ParameterInfo,
    /// Resolver for `%token%` placeholders.
    pub resolver: SharedNameResolver,
}

impl<M> BindingRequest<M> {
    pub fn new(marker: M, parameter: ParameterInfo, resolver: SharedNameResolver) -> Self {
        Self {
            marker,
            parameter,
            resolver,
        }
    }
}

struct CompositeInner<M> {
    providers: Vec<BoxedProvider<M>>,
    validator: Option<Validator<M>>,
    converters: ConverterManager,
}

/// All staged providers of one marker type, merged.
pub struct CompositeBindingProvider<M> {
    inner: Arc<CompositeInner<M>>,
}

impl<M: Marker> CompositeBindingProvider<M> {
    /// Assembles a composite over already decorated providers.
    pub fn new(
        providers: Vec<BoxedProvider<M>>,
        validator: Option<Validator<M>>,
        converters: ConverterManager,
    ) -> Self {
        Self {
            inner: Arc::new(CompositeInner {
                providers,
                validator,
                converters,
            }),
        }
    }

    /// Resolves one parameter.
    pub fn resolve(
        &self,
        marker: &M,
        parameter: &ParameterInfo,
        resolver: &dyn NameResolver,
    ) -> BindResult<ParameterBinding> {
        let resolved = Arc::new(marker.resolve(resolver)?);
        if let Some(validator) = &self.inner.validator {
            run_validator(validator, resolved.as_ref(), &parameter.param_type)?;
        }

        let ctx = ProviderContext::new(
            Arc::clone(&resolved),
            parameter,
            resolver,
            &self.inner.converters,
        );
        for (index, provider) in self.inner.providers.iter().enumerate() {
            if let Some(binding) = provider.try_create(&ctx)? {
                trace!(
                    marker = M::NAME,
                    parameter = %parameter.name,
                    index,
                    kind = %binding.kind(),
                    "Resolved parameter"
                );
                return Ok(binding);
            }
        }

        Err(BindError::NoApplicableBinding {
            marker: M::NAME,
            parameter: parameter.name.clone(),
            param_type: parameter.param_type.name(),
        })
    }

    /// Returns the number of providers.
    pub fn len(&self) -> usize {
        self.inner.providers.len()
    }

    /// Returns `true` if no provider is staged.
    pub fn is_empty(&self) -> bool {
        self.inner.providers.is_empty()
    }

    /// Returns `true` if the marker is an invocation origin.
    pub fn is_trigger(&self) -> bool {
        self.kinds().contains(&BindingKind::Trigger)
    }

    /// Returns each provider's variant, in order.
    pub fn kinds(&self) -> Vec<BindingKind> {
        self.inner.providers.iter().map(|p| p.kind()).collect()
    }

    /// Renders the rule graph, one provider per line, in resolution order.
    ///
    /// ```text
    /// Blob
    ///   validator: rule-wide
    ///   [0] when (access == Write) => stream [fn(context) -> OpenedStream] (access Write)
    ///   [1] input [fn -> String]
    /// ```
    pub fn describe(&self) -> String {
        let mut out = String::from(M::NAME);
        if self.inner.validator.is_some() {
            out.push_str("\n  validator: rule-wide");
        }
        for (index, provider) in self.inner.providers.iter().enumerate() {
            let _ = write!(out, "\n  [{index}] {}", provider.describe());
        }
        out
    }

    /// Returns the frozen converter snapshot.
    pub fn converters(&self) -> &ConverterManager {
        &self.inner.converters
    }
}

impl<M> Clone for CompositeBindingProvider<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Marker> fmt::Debug for CompositeBindingProvider<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeBindingProvider")
            .field("marker", &M::NAME)
            .field("kinds", &self.kinds())
            .field("validator", &self.inner.validator.is_some())
            .finish()
    }
}

impl<M: Marker> Service<BindingRequest<M>> for CompositeBindingProvider<M> {
    type Response = ParameterBinding;
    type Error = BindError;
    type Future = Ready<BindResult<ParameterBinding>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: BindingRequest<M>) -> Self::Future {
        ready(self.resolve(&req.marker, &req.parameter, req.resolver.as_ref()))
    }
}
