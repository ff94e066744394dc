//! Value-provider binder: reads a value before the call and writes it back after.

use std::marker::PhantomData;
use std::sync::Arc;

use futures::FutureExt;
use tracing::trace;
use weld_core::{
    BindError, BindResult, BindingKind, BoundValue, Marker, Out, SharedValueProvider, TypeKey,
    completion_fn, downcast_value,
};

use crate::binding::{BindingProvider, ParameterBinding, ProviderContext};
use crate::pattern::PatternMatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueTarget {
    Value,
    Out,
    Provider,
}

/// Binds parameters through a [`weld_core::ValueProvider`] produced per
/// invocation.
///
/// `T` parameters receive `get_value()`. `Out<T>` parameters are written back
/// with `set_value()` after a successful invocation. Parameters of type
/// [`SharedValueProvider<T>`] receive the provider itself.
pub struct ValueProviderBinder<M, T> {
    matcher: PatternMatcher<M>,
    _value: PhantomData<fn() -> T>,
}

impl<M: Marker, T: Send + 'static> ValueProviderBinder<M, T> {
    /// Wraps a converter producing [`SharedValueProvider<T>`].
    pub fn new(matcher: PatternMatcher<M>) -> Self {
        Self {
            matcher,
            _value: PhantomData,
        }
    }

    fn target(requested: &TypeKey) -> Option<ValueTarget> {
        if requested.is::<T>() {
            Some(ValueTarget::Value)
        } else if requested.is::<Out<T>>() {
            Some(ValueTarget::Out)
        } else if requested.is::<SharedValueProvider<T>>() {
            Some(ValueTarget::Provider)
        } else {
            None
        }
    }
}

impl<M: Marker, T: Send + 'static> BindingProvider<M> for ValueProviderBinder<M, T> {
    fn try_create(&self, ctx: &ProviderContext<'_, M>) -> BindResult<Option<ParameterBinding>> {
        let requested = ctx.param_type();
        let Some(target) = Self::target(&requested) else {
            trace!(marker = M::NAME, requested = %requested, "Value provider binder declined");
            return Ok(None);
        };

        let matcher = self.matcher.clone();
        let marker = Arc::clone(ctx.marker());
        let descriptor = ctx.descriptor(BindingKind::ValueProvider);

        Ok(Some(ParameterBinding::new(
            BindingKind::ValueProvider,
            descriptor,
            move |rctx| {
                let opening = matcher.convert(
                    Arc::clone(&marker),
                    TypeKey::of::<SharedValueProvider<T>>(),
                    rctx,
                );
                async move {
                    let provider =
                        downcast_value::<SharedValueProvider<T>>(opening.await?, "value provider")?;
                    let invoke_string = provider.invoke_string();
                    let bound = match target {
                        ValueTarget::Value => BoundValue::new(provider.get_value().await?),
                        ValueTarget::Out => bind_write_back(provider),
                        ValueTarget::Provider => BoundValue::new(provider),
                    };
                    Ok(bound.with_invoke_string(invoke_string))
                }
            },
        )))
    }

    fn kind(&self) -> BindingKind {
        BindingKind::ValueProvider
    }

    fn describe(&self) -> String {
        format!("value provider [{}]", self.matcher.description())
    }
}

fn bind_write_back<T: Send + 'static>(provider: SharedValueProvider<T>) -> BoundValue {
    let out = Out::<T>::new();
    let slot = out.clone();
    BoundValue::new(out).with_completion(completion_fn(move |status| {
        async move {
            match slot.take() {
                Some(value) if status.is_success() => provider.set_value(value).await,
                _ => Ok::<(), BindError>(()),
            }
        }
        .boxed()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::ConverterManager;
    use crate::pattern::ConverterSource;
    use parking_lot::Mutex;
    use weld_core::{
        InvocationStatus, MapNameResolver, ParameterInfo, PropertyAccessor, ResolutionContext,
        Services, ValueProvider, async_trait,
    };

    #[derive(Debug, Clone)]
    struct Counter;

    impl Marker for Counter {
        const NAME: &'static str = "Counter";

        fn properties() -> Vec<PropertyAccessor<Self>> {
            Vec::new()
        }
    }

    struct Cell {
        key: String,
        value: Mutex<u64>,
    }

    #[async_trait]
    impl ValueProvider<u64> for Cell {
        async fn get_value(&self) -> BindResult<u64> {
            Ok(*self.value.lock())
        }

        async fn set_value(&self, value: u64) -> BindResult<()> {
            *self.value.lock() = value;
            Ok(())
        }

        fn invoke_string(&self) -> String {
            format!("counter {}", self.key)
        }
    }

    fn binder(cell: Arc<Cell>) -> ValueProviderBinder<Counter, u64> {
        let source = ConverterSource::from_fn(move |_c: &Counter| {
            Arc::clone(&cell) as SharedValueProvider<u64>
        });
        ValueProviderBinder::new(PatternMatcher::new(source, &Services::new()).unwrap())
    }

    fn resolve<P: 'static>(binder: &ValueProviderBinder<Counter, u64>) -> Option<ParameterBinding> {
        let parameter = ParameterInfo::of::<P>("count");
        let resolver = MapNameResolver::new();
        let converters = ConverterManager::new();
        let ctx = ProviderContext::new(Arc::new(Counter), &parameter, &resolver, &converters);
        binder.try_create(&ctx).unwrap()
    }

    fn cell(value: u64) -> Arc<Cell> {
        Arc::new(Cell {
            key: "visits".into(),
            value: Mutex::new(value),
        })
    }

    #[tokio::test]
    async fn test_value_is_read_with_invoke_string() {
        let binding = resolve::<u64>(&binder(cell(41))).unwrap();
        let mut value = binding.bind(ResolutionContext::new()).await.unwrap();
        assert_eq!(value.invoke_string(), "counter visits");
        assert_eq!(value.take::<u64>().unwrap(), 41);
        assert!(resolve::<String>(&binder(cell(0))).is_none());
    }

    #[tokio::test]
    async fn test_write_back_only_on_success() {
        let cell = cell(1);
        let binding = resolve::<Out<u64>>(&binder(Arc::clone(&cell))).unwrap();

        let mut value = binding.bind(ResolutionContext::new()).await.unwrap();
        value.take::<Out<u64>>().unwrap().set(5);
        value.complete(InvocationStatus::Failed).await.unwrap();
        assert_eq!(*cell.value.lock(), 1);

        let mut value = binding.bind(ResolutionContext::new()).await.unwrap();
        value.take::<Out<u64>>().unwrap().set(7);
        value.complete(InvocationStatus::Succeeded).await.unwrap();
        assert_eq!(*cell.value.lock(), 7);
    }

    #[tokio::test]
    async fn test_provider_passthrough() {
        let binding = resolve::<SharedValueProvider<u64>>(&binder(cell(3))).unwrap();
        let mut value = binding.bind(ResolutionContext::new()).await.unwrap();
        let provider = value.take::<SharedValueProvider<u64>>().unwrap();
        assert_eq!(provider.get_value().await.unwrap(), 3);
    }
}
