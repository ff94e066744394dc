//! Collector binder: output sinks of messages.

use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use tracing::trace;
use weld_core::{
    BindError, BindingKind, BindResult, BoundValue, Collector, ConfigResult, Marker, Out, TypeKey,
    completion_fn, downcast_value,
};

use crate::binding::{BindingProvider, ParameterBinding, ProviderContext};
use crate::converter::{ConverterFunc, ConverterManager};
use crate::pattern::PatternMatcher;

type PendingItem<T> = Box<dyn FnOnce(&ConverterManager) -> ConfigResult<ItemAdapter<T>> + Send>;
type AdaptFn<T> = Arc<dyn Fn(TypeKey, Collector<T>) -> Option<BoundValue> + Send + Sync>;

// =============================================================================
// Item Types
// =============================================================================

/// The item types a collector rule accepts besides `T` itself.
///
/// Each accepted `U` needs a registered `U -> T` conversion; a missing one
/// fails when the rule is staged. The lookup happens at the bind call, so the
/// converter must be registered before it, not merely before the host is
/// built.
///
/// ```rust,ignore
/// let items = ItemTypes::<Message>::new().accept::<String>().accept::<Order>();
/// ```
pub struct ItemTypes<T> {
    pending: Vec<PendingItem<T>>,
}

impl<T: Send + 'static> ItemTypes<T> {
    /// Accepts only `T`.
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Also accepts items of type `U`.
    pub fn accept<U: Send + 'static>(mut self) -> Self {
        self.pending.push(Box::new(|converters: &ConverterManager| {
            let convert = converters.try_get_converter_func::<U, T>()?;
            Ok(ItemAdapter::new(convert))
        }));
        self
    }

    pub(crate) fn resolve(self, converters: &ConverterManager) -> ConfigResult<Vec<ItemAdapter<T>>> {
        let mut adapters = vec![ItemAdapter::new(converters.try_get_converter_func::<T, T>()?)];
        for pending in self.pending {
            adapters.push(pending(converters)?);
        }
        Ok(adapters)
    }
}

impl<T: Send + 'static> Default for ItemTypes<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Binds the three parameter shapes of one item type `U`.
pub(crate) struct ItemAdapter<T> {
    item: TypeKey,
    shapes: [TypeKey; 3],
    adapt: AdaptFn<T>,
}

impl<T: Send + 'static> ItemAdapter<T> {
    fn new<U: Send + 'static>(convert: ConverterFunc<U, T>) -> Self {
        let adapt: AdaptFn<T> = Arc::new(move |requested: TypeKey, sink: Collector<T>| {
            let convert = convert.clone();
            let items = sink.map(move |item: U| convert.call(item));
            if requested.is::<Collector<U>>() {
                Some(bind_sink(items))
            } else if requested.is::<Out<U>>() {
                Some(bind_out(items, |item: U| vec![item]))
            } else if requested.is::<Out<Vec<U>>>() {
                Some(bind_out(items, |batch: Vec<U>| batch))
            } else {
                None
            }
        });

        Self {
            item: TypeKey::of::<U>(),
            shapes: [
                TypeKey::of::<Collector<U>>(),
                TypeKey::of::<Out<U>>(),
                TypeKey::of::<Out<Vec<U>>>(),
            ],
            adapt,
        }
    }
}

impl<T> ItemAdapter<T> {
    fn accepts(&self, requested: &TypeKey) -> bool {
        self.shapes.contains(requested)
    }
}

impl<T> Clone for ItemAdapter<T> {
    fn clone(&self) -> Self {
        Self {
            item: self.item,
            shapes: self.shapes,
            adapt: Arc::clone(&self.adapt),
        }
    }
}

impl<T> fmt::Debug for ItemAdapter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ItemAdapter({})", self.item)
    }
}

/// Hands out the collector; flushes it after a successful invocation.
fn bind_sink<U: Send + 'static>(items: Collector<U>) -> BoundValue {
    let flushing = items.clone();
    BoundValue::new(items).with_completion(completion_fn(move |status| {
        async move {
            if status.is_success() {
                flushing.flush().await
            } else {
                Ok(())
            }
        }
        .boxed()
    }))
}

/// Hands out an `Out<V>` whose contents are added and flushed on success.
fn bind_out<U, V, F>(items: Collector<U>, unpack: F) -> BoundValue
where
    U: Send + 'static,
    V: Send + 'static,
    F: FnOnce(V) -> Vec<U> + Send + 'static,
{
    let out = Out::<V>::new();
    let slot = out.clone();
    BoundValue::new(out).with_completion(completion_fn(move |status| {
        async move {
            if !status.is_success() {
                return Ok(());
            }
            if let Some(value) = slot.take() {
                items.add_all(unpack(value)).await?;
            }
            items.flush().await
        }
        .boxed()
    }))
}

// =============================================================================
// CollectorBinder
// =============================================================================

/// Binds collectors produced by a converter of [`Collector<T>`].
pub struct CollectorBinder<M, T> {
    matcher: PatternMatcher<M>,
    adapters: Vec<ItemAdapter<T>>,
}

impl<M: Marker, T: Send + 'static> CollectorBinder<M, T> {
    /// Wraps a collector converter accepting the given item types.
    ///
    /// Fails with [`weld_core::ConfigError::NoConverter`] if an accepted item
    /// type has no conversion to `T` in `converters` at this point. Later
    /// registrations are not seen.
    pub fn new(
        matcher: PatternMatcher<M>,
        items: ItemTypes<T>,
        converters: &ConverterManager,
    ) -> ConfigResult<Self> {
        Ok(Self {
            matcher,
            adapters: items.resolve(converters)?,
        })
    }

    /// Returns the accepted item types, `T` first.
    pub fn item_types(&self) -> Vec<TypeKey> {
        self.adapters.iter().map(|a| a.item).collect()
    }
}

impl<M: Marker, T: Send + 'static> BindingProvider<M> for CollectorBinder<M, T> {
    fn try_create(&self, ctx: &ProviderContext<'_, M>) -> BindResult<Option<ParameterBinding>> {
        let requested = ctx.param_type();
        let Some(adapter) = self.adapters.iter().find(|a| a.accepts(&requested)).cloned() else {
            trace!(marker = M::NAME, requested = %requested, "Collector binder declined");
            return Ok(None);
        };

        let matcher = self.matcher.clone();
        let marker = Arc::clone(ctx.marker());
        let descriptor = ctx
            .descriptor(BindingKind::Collector)
            .with_hint("item", adapter.item.short_name());

        Ok(Some(ParameterBinding::new(
            BindingKind::Collector,
            descriptor,
            move |rctx| {
                let opening = matcher.convert(
                    Arc::clone(&marker),
                    TypeKey::of::<Collector<T>>(),
                    rctx,
                );
                let adapter = adapter.clone();
                async move {
                    let sink = downcast_value::<Collector<T>>(opening.await?, "collector")?;
                    (adapter.adapt)(requested, sink).ok_or(BindError::TypeMismatch {
                        expected: requested.name(),
                        actual: "collector",
                    })
                }
            },
        )))
    }

    fn kind(&self) -> BindingKind {
        BindingKind::Collector
    }

    fn describe(&self) -> String {
        let items = self
            .adapters
            .iter()
            .map(|a| a.item.short_name())
            .collect::<Vec<_>>()
            .join(", ");
        format!("collector [{}] items [{items}]", self.matcher.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::ConverterSource;
    use parking_lot::Mutex;
    use weld_core::{
        AsyncCollector, InvocationStatus, MapNameResolver, ParameterInfo,
        PropertyAccessor, ResolutionContext, Services, async_trait,
    };

    #[derive(Debug, Clone)]
    struct Queue;

    impl Marker for Queue {
        const NAME: &'static str = "Queue";

        fn properties() -> Vec<PropertyAccessor<Self>> {
            Vec::new()
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Message(String);

    #[derive(Default)]
    struct Journal {
        events: Mutex<Vec<String>>,
    }

    struct JournalSink(Arc<Journal>);

    #[async_trait]
    impl AsyncCollector<Message> for JournalSink {
        async fn add(&self, item: Message) -> BindResult<()> {
            self.0.events.lock().push(format!("add {}", item.0));
            Ok(())
        }

        async fn flush(&self) -> BindResult<()> {
            self.0.events.lock().push("flush".into());
            Ok(())
        }
    }

    fn converters() -> ConverterManager {
        let mut converters = ConverterManager::new();
        converters.add_converter(|text: String| Ok(Message(text)));
        converters
    }

    fn binder(journal: Arc<Journal>) -> CollectorBinder<Queue, Message> {
        let source = ConverterSource::from_fn(move |_q: &Queue| {
            Collector::new(JournalSink(Arc::clone(&journal)))
        });
        CollectorBinder::new(
            PatternMatcher::new(source, &Services::new()).unwrap(),
            ItemTypes::new().accept::<String>(),
            &converters(),
        )
        .unwrap()
    }

    fn resolve<P: 'static>(binder: &CollectorBinder<Queue, Message>) -> Option<ParameterBinding> {
        let parameter = ParameterInfo::of::<P>("output");
        let resolver = MapNameResolver::new();
        let converters = converters();
        let ctx = ProviderContext::new(
            Arc::new(Queue),
            &parameter,
            &resolver,
            &converters,
        );
        binder.try_create(&ctx).unwrap()
    }

    #[test]
    fn test_missing_item_conversion_fails_fast() {
        let source = ConverterSource::from_fn(|_q: &Queue| {
            Collector::new(JournalSink(Arc::new(Journal::default())))
        });
        let result = CollectorBinder::new(
            PatternMatcher::new(source, &Services::new()).unwrap(),
            ItemTypes::<Message>::new().accept::<u64>(),
            &converters(),
        );
        assert!(matches!(
            result,
            Err(weld_core::ConfigError::NoConverter { .. })
        ));
    }

    #[test]
    fn test_accepted_shapes() {
        let binder = binder(Arc::default());
        assert!(resolve::<Collector<Message>>(&binder).is_some());
        assert!(resolve::<Out<Message>>(&binder).is_some());
        assert!(resolve::<Out<Vec<String>>>(&binder).is_some());
        assert!(resolve::<Collector<String>>(&binder).is_some());
        assert!(resolve::<Out<u64>>(&binder).is_none());
        assert!(resolve::<Message>(&binder).is_none());
        assert_eq!(binder.item_types().len(), 2);
    }

    #[tokio::test]
    async fn test_converted_items_flush_on_success() {
        let journal = Arc::new(Journal::default());
        let binding = resolve::<Out<Vec<String>>>(&binder(Arc::clone(&journal))).unwrap();

        let mut value = binding.bind(ResolutionContext::new()).await.unwrap();
        value
            .take::<Out<Vec<String>>>()
            .unwrap()
            .set(vec!["a".into(), "b".into()]);
        value.complete(InvocationStatus::Succeeded).await.unwrap();

        assert_eq!(*journal.events.lock(), vec!["add a", "add b", "flush"]);
    }

    #[tokio::test]
    async fn test_nothing_committed_on_failure() {
        let journal = Arc::new(Journal::default());
        let binding = resolve::<Collector<Message>>(&binder(Arc::clone(&journal))).unwrap();

        let mut value = binding.bind(ResolutionContext::new()).await.unwrap();
        let sink = value.take::<Collector<Message>>().unwrap();
        sink.add(Message("queued".into())).await.unwrap();
        value.complete(InvocationStatus::Failed).await.unwrap();

        assert_eq!(*journal.events.lock(), vec!["add queued"]);
    }

    #[tokio::test]
    async fn test_item_conversion_errors_surface_on_add() {
        let mut converters = ConverterManager::new();
        converters.add_converter(|text: String| {
            text.parse::<u32>()
                .map(|n| Message(n.to_string()))
                .map_err(BindError::conversion)
        });
        let journal = Arc::new(Journal::default());
        let sink = Collector::new(JournalSink(Arc::clone(&journal)));
        let adapters = ItemTypes::<Message>::new()
            .accept::<String>()
            .resolve(&converters)
            .unwrap();

        let mut value = (adapters[1].adapt)(TypeKey::of::<Collector<String>>(), sink).unwrap();
        let strings = value.take::<Collector<String>>().unwrap();
        assert!(strings.add("12".into()).await.is_ok());
        assert!(strings.add("twelve".into()).await.is_err());
        assert_eq!(*journal.events.lock(), vec!["add 12"]);
    }
}
