//! Output sinks and value providers.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BindResult;

// =============================================================================
// Collectors
// =============================================================================

/// An asynchronous sink of messages of type `T`.
#[async_trait]
pub trait AsyncCollector<T>: Send + Sync {
    /// Queues one item.
    async fn add(&self, item: T) -> BindResult<()>;

    /// Commits everything queued so far.
    async fn flush(&self) -> BindResult<()> {
        Ok(())
    }
}

/// A cloneable collector handle bound to a parameter.
pub struct Collector<T> {
    inner: Arc<dyn AsyncCollector<T>>,
}

impl<T: Send + 'static> Collector<T> {
    /// Wraps a sink.
    pub fn new(inner: impl AsyncCollector<T> + 'static) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Wraps an already shared sink.
    pub fn from_arc(inner: Arc<dyn AsyncCollector<T>>) -> Self {
        Self { inner }
    }

    /// Queues one item.
    pub async fn add(&self, item: T) -> BindResult<()> {
        self.inner.add(item).await
    }

    /// Queues every item in order.
    pub async fn add_all(&self, items: impl IntoIterator<Item = T> + Send) -> BindResult<()> {
        for item in items {
            self.inner.add(item).await?;
        }
        Ok(())
    }

    /// Commits queued items.
    pub async fn flush(&self) -> BindResult<()> {
        self.inner.flush().await
    }

    /// Returns a collector of `U` that converts each item before queueing it.
    pub fn map<U, F>(&self, convert: F) -> Collector<U>
    where
        U: Send + 'static,
        F: Fn(U) -> BindResult<T> + Send + Sync + 'static,
    {
        Collector::new(MappedCollector {
            inner: self.clone(),
            convert: Arc::new(convert),
            _item: PhantomData,
        })
    }
}

impl<T> Clone for Collector<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Collector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collector")
            .field("item", &std::any::type_name::<T>())
            .finish()
    }
}

/// Type-erased item conversion used by [`MappedCollector`].
pub type ItemConvert<U, T> = Arc<dyn Fn(U) -> BindResult<T> + Send + Sync>;

/// A collector of `U` forwarding converted items to a collector of `T`.
pub struct MappedCollector<U, T> {
    inner: Collector<T>,
    convert: ItemConvert<U, T>,
    _item: PhantomData<fn(U)>,
}

impl<U, T> MappedCollector<U, T> {
    /// Creates a mapped collector.
    pub fn new(inner: Collector<T>, convert: ItemConvert<U, T>) -> Self {
        Self {
            inner,
            convert,
            _item: PhantomData,
        }
    }
}

#[async_trait]
impl<U, T> AsyncCollector<U> for MappedCollector<U, T>
where
    U: Send + 'static,
    T: Send + 'static,
{
    async fn add(&self, item: U) -> BindResult<()> {
        let converted = (self.convert)(item)?;
        self.inner.add(converted).await
    }

    async fn flush(&self) -> BindResult<()> {
        self.inner.flush().await
    }
}

// =============================================================================
// Value Providers
// =============================================================================

/// A shareable value provider, as produced by value-provider converters.
pub type SharedValueProvider<T> = Arc<dyn ValueProvider<T>>;

/// A source of one value with optional write-back after the invocation.
#[async_trait]
pub trait ValueProvider<T: Send + 'static>: Send + Sync {
    /// Produces the value passed to the function.
    async fn get_value(&self) -> BindResult<T>;

    /// Writes back the value an `Out<T>` parameter was set to.
    async fn set_value(&self, _value: T) -> BindResult<()> {
        Ok(())
    }

    /// Returns the string shown for this argument in invocation logs.
    fn invoke_string(&self) -> String {
        String::new()
    }
}
