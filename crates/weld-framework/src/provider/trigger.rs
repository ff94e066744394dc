//! Trigger adapter: binds the payload of the trigger that started the invocation.

use std::marker::PhantomData;

use tracing::trace;
use weld_core::{BindError, BindResult, BindingKind, BoundValue, BoxedValue, Marker, TypeKey};

use super::chain_conversion;
use crate::binding::{BindingProvider, ParameterBinding, ProviderContext};

/// Marks a marker type as an invocation origin carrying payloads of type `P`.
///
/// A marker with a trigger adapter cannot have any other provider.
pub struct TriggerAdapter<M, P> {
    _marker: PhantomData<fn(M) -> P>,
}

impl<M: Marker, P: Clone + Send + Sync + 'static> TriggerAdapter<M, P> {
    /// Creates the adapter.
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<M: Marker, P: Clone + Send + Sync + 'static> Default for TriggerAdapter<M, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Marker, P: Clone + Send + Sync + 'static> BindingProvider<M> for TriggerAdapter<M, P> {
    fn try_create(&self, ctx: &ProviderContext<'_, M>) -> BindResult<Option<ParameterBinding>> {
        let requested = ctx.param_type();
        let payload = TypeKey::of::<P>();
        let chain = match chain_conversion(Some(payload), requested, ctx.converters()) {
            Some((_, conversion)) => conversion,
            None => {
                trace!(
                    marker = M::NAME,
                    requested = %requested,
                    payload = %payload,
                    "Trigger adapter declined"
                );
                return Ok(None);
            }
        };

        let descriptor = ctx
            .descriptor(BindingKind::Trigger)
            .with_hint("payload", payload.short_name());

        Ok(Some(ParameterBinding::new(
            BindingKind::Trigger,
            descriptor,
            move |rctx| {
                let bound = rctx
                    .trigger_payload::<P>()
                    .cloned()
                    .ok_or(BindError::MissingTriggerPayload(payload.name()))
                    .and_then(|value| chain.apply(Box::new(value) as BoxedValue))
                    .map(|value| BoundValue::from_boxed(value, requested.name()));
                futures::future::ready(bound)
            },
        )))
    }

    fn kind(&self) -> BindingKind {
        BindingKind::Trigger
    }

    fn describe(&self) -> String {
        format!("trigger [payload {}]", TypeKey::of::<P>())
    }
}
