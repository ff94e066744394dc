//! Converter sources and their normalization into a [`PatternMatcher`].
//!
//! A rule can say "how to produce `T` from a marker" in several ways: a plain
//! function, an async function taking a cancellation token or the resolution
//! context, a [`Converter`] or [`AsyncConverter`] object, or a
//! [`Constructible`] type built against ambient [`Services`]. Every form goes
//! through [`PatternMatcher::new`], so all `bind_*` calls share one matching
//! routine regardless of how the converter was expressed.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::debug;
use weld_core::{
    BindError, BindResult, BoxError, BoxedValue, CancellationToken, ConfigResult, Marker,
    ResolutionContext, Services, TypeKey, TypePattern,
};

// =============================================================================
// Converter Capabilities
// =============================================================================

/// Synchronous conversion from a marker to `T`.
pub trait Converter<M, T>: Send + Sync {
    /// Produces the value.
    fn convert(&self, marker: &M) -> Result<T, BoxError>;
}

/// Asynchronous conversion from a marker to `T`.
#[async_trait]
pub trait AsyncConverter<M, T>: Send + Sync {
    /// Produces the value. Should return promptly once `ctx` is cancelled.
    async fn convert(&self, marker: Arc<M>, ctx: ResolutionContext) -> Result<T, BoxError>;
}

/// A converter type built at registration time from arguments and services.
///
/// Construction failures surface as [`weld_core::ConfigError`] while the host
/// starts, never at invocation time.
pub trait Constructible: Sized + Send + Sync + 'static {
    /// Arguments supplied by the rule.
    type Args: Send + 'static;

    /// Builds the converter.
    fn construct(args: Self::Args, services: &Services) -> ConfigResult<Self>;
}

// =============================================================================
// ConverterSource
// =============================================================================

type SyncFn<M, T> = Arc<dyn Fn(&M) -> Result<T, BoxError> + Send + Sync>;
type CancellableFn<M, T> =
    Arc<dyn Fn(Arc<M>, CancellationToken) -> BoxFuture<'static, Result<T, BoxError>> + Send + Sync>;
type ContextFn<M, T> =
    Arc<dyn Fn(Arc<M>, ResolutionContext) -> BoxFuture<'static, Result<T, BoxError>> + Send + Sync>;
type BuildFn<M, T> = Box<dyn FnOnce(&Services) -> ConfigResult<ConverterSource<M, T>> + Send>;

/// The ways a rule can describe "how to produce `T` from marker `M`".
pub enum ConverterSource<M, T> {
    /// A single-argument function.
    Func(SyncFn<M, T>),
    /// An async function receiving the cancellation token.
    FuncWithCancellation(CancellableFn<M, T>),
    /// An async function receiving the whole resolution context.
    FuncWithContext(ContextFn<M, T>),
    /// A synchronous converter object.
    Converter(Arc<dyn Converter<M, T>>),
    /// An asynchronous converter object.
    AsyncConverter(Arc<dyn AsyncConverter<M, T>>),
    /// A converter type constructed against services at registration.
    Construct {
        /// Converter type name, for diagnostics.
        converter: &'static str,
        /// Deferred construction.
        build: BuildFn<M, T>,
    },
}

impl<M: Marker, T: Send + 'static> ConverterSource<M, T> {
    /// Wraps an infallible function.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&M) -> T + Send + Sync + 'static,
    {
        Self::Func(Arc::new(move |m: &M| -> Result<T, BoxError> { Ok(f(m)) }))
    }

    /// Wraps a fallible function.
    pub fn try_from_fn<F>(f: F) -> Self
    where
        F: Fn(&M) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self::Func(Arc::new(f))
    }

    /// Wraps an async function receiving the cancellation token.
    pub fn from_cancellable<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<M>, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        Self::FuncWithCancellation(Arc::new(move |m, token| f(m, token).boxed()))
    }

    /// Wraps an async function receiving the resolution context.
    pub fn from_context<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<M>, ResolutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        Self::FuncWithContext(Arc::new(move |m, ctx| f(m, ctx).boxed()))
    }

    /// Wraps a synchronous converter object.
    pub fn converter(converter: impl Converter<M, T> + 'static) -> Self {
        Self::Converter(Arc::new(converter))
    }

    /// Wraps an asynchronous converter object.
    pub fn async_converter(converter: impl AsyncConverter<M, T> + 'static) -> Self {
        Self::AsyncConverter(Arc::new(converter))
    }

    /// Defers to a [`Constructible`] synchronous converter.
    pub fn construct<C>(args: C::Args) -> Self
    where
        C: Constructible + Converter<M, T>,
    {
        Self::Construct {
            converter: std::any::type_name::<C>(),
            build: Box::new(move |services: &Services| {
                let built = C::construct(args, services)?;
                Ok(Self::Converter(Arc::new(built)))
            }),
        }
    }

    /// Defers to a [`Constructible`] asynchronous converter.
    pub fn construct_async<C>(args: C::Args) -> Self
    where
        C: Constructible + AsyncConverter<M, T>,
    {
        Self::Construct {
            converter: std::any::type_name::<C>(),
            build: Box::new(move |services: &Services| {
                let built = C::construct(args, services)?;
                Ok(Self::AsyncConverter(Arc::new(built)))
            }),
        }
    }
}

impl<M, T> ConverterSource<M, T> {
    /// Short name of the form, used in rule-graph dumps.
    pub fn form(&self) -> &'static str {
        match self {
            Self::Func(_) => "fn",
            Self::FuncWithCancellation(_) => "fn(cancellation)",
            Self::FuncWithContext(_) => "fn(context)",
            Self::Converter(_) => "converter",
            Self::AsyncConverter(_) => "async converter",
            Self::Construct { .. } => "constructed",
        }
    }
}

impl<M, T> fmt::Debug for ConverterSource<M, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Construct { converter, .. } => write!(f, "Construct({converter})"),
            other => f.write_str(other.form()),
        }
    }
}

// =============================================================================
// PatternMatcher
// =============================================================================

/// The normalized conversion every provider variant wraps.
pub type ErasedConverter<M> = Arc<
    dyn Fn(Arc<M>, TypeKey, ResolutionContext) -> BoxFuture<'static, BindResult<BoxedValue>>
        + Send
        + Sync,
>;

/// A normalized converter plus the set of types it can produce.
pub struct PatternMatcher<M> {
    target: TypePattern,
    description: String,
    convert: ErasedConverter<M>,
}

impl<M: Marker> PatternMatcher<M> {
    /// Normalizes a converter source producing exactly `T`.
    ///
    /// [`ConverterSource::Construct`] is built here, so construction errors
    /// surface at registration.
    pub fn new<T: Send + 'static>(
        source: ConverterSource<M, T>,
        services: &Services,
    ) -> ConfigResult<Self> {
        let target = TypePattern::exact::<T>();
        let produced = TypeKey::of::<T>();
        let form = source.form();

        let convert: ErasedConverter<M> = match source {
            ConverterSource::Construct { converter, build } => {
                let built = build(services)?;
                debug!(converter, produces = %produced, "Constructed converter");
                let mut matcher = Self::new(built, services)?;
                matcher.description = format!("constructed {} -> {}", short(converter), produced);
                return Ok(matcher);
            }
            ConverterSource::Func(f) => Arc::new(move |marker: Arc<M>, _, _| {
                let result = f(&*marker).map(boxed).map_err(BindError::Conversion);
                futures::future::ready(result).boxed()
            }),
            ConverterSource::Converter(c) => Arc::new(move |marker: Arc<M>, _, _| {
                let result = c.convert(&*marker).map(boxed).map_err(BindError::Conversion);
                futures::future::ready(result).boxed()
            }),
            ConverterSource::FuncWithCancellation(f) => {
                Arc::new(move |marker: Arc<M>, _, ctx: ResolutionContext| {
                    let fut = f(marker, ctx.cancellation().clone());
                    async move { fut.await.map(boxed).map_err(BindError::Conversion) }.boxed()
                })
            }
            ConverterSource::FuncWithContext(f) => {
                Arc::new(move |marker: Arc<M>, _, ctx: ResolutionContext| {
                    let fut = f(marker, ctx);
                    async move { fut.await.map(boxed).map_err(BindError::Conversion) }.boxed()
                })
            }
            ConverterSource::AsyncConverter(c) => {
                Arc::new(move |marker: Arc<M>, _, ctx: ResolutionContext| {
                    let c = Arc::clone(&c);
                    async move {
                        c.convert(marker, ctx)
                            .await
                            .map(boxed)
                            .map_err(BindError::Conversion)
                    }
                    .boxed()
                })
            }
        };

        Ok(Self {
            target,
            description: format!("{form} -> {produced}"),
            convert,
        })
    }

    /// Creates a matcher for an open target.
    ///
    /// The function receives the requested type and must return a value of
    /// exactly that type.
    pub fn open<F, Fut>(target: TypePattern, description: impl Into<String>, f: F) -> Self
    where
        F: Fn(Arc<M>, TypeKey, ResolutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BindResult<BoxedValue>> + Send + 'static,
    {
        Self {
            description: format!("{} -> {}", description.into(), target),
            target,
            convert: Arc::new(move |marker, requested, ctx| f(marker, requested, ctx).boxed()),
        }
    }
}

impl<M> PatternMatcher<M> {
    /// Returns `true` if the matcher can produce `requested`.
    pub fn can_produce(&self, requested: &TypeKey) -> bool {
        self.target.matches(requested)
    }

    /// Returns the declared target pattern.
    pub fn target(&self) -> &TypePattern {
        &self.target
    }

    /// Returns the produced type when it is fixed.
    pub fn produced_type(&self) -> Option<TypeKey> {
        self.target.exact_type()
    }

    /// Returns the rendered description, e.g. `fn -> String`.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Runs the conversion.
    pub fn convert(
        &self,
        marker: Arc<M>,
        requested: TypeKey,
        ctx: ResolutionContext,
    ) -> BoxFuture<'static, BindResult<BoxedValue>> {
        (self.convert)(marker, requested, ctx)
    }
}

impl<M> Clone for PatternMatcher<M> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            description: self.description.clone(),
            convert: Arc::clone(&self.convert),
        }
    }
}

impl<M> fmt::Debug for PatternMatcher<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternMatcher")
            .field("target", &self.target)
            .field("description", &self.description)
            .finish()
    }
}

fn boxed<T: Send + 'static>(value: T) -> BoxedValue {
    Box::new(value)
}

fn short(type_name: &str) -> &str {
    type_name.rsplit("::").next().unwrap_or(type_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use weld_core::{ConfigError, PropertyAccessor, downcast_value};

    #[derive(Debug, Clone)]
    struct Queue {
        name: String,
    }

    impl Marker for Queue {
        const NAME: &'static str = "Queue";

        fn properties() -> Vec<PropertyAccessor<Self>> {
            Vec::new()
        }
    }

    struct Prefixer {
        prefix: Arc<String>,
        suffix: &'static str,
    }

    impl Constructible for Prefixer {
        type Args = &'static str;

        fn construct(suffix: Self::Args, services: &Services) -> ConfigResult<Self> {
            Ok(Self {
                prefix: services.require::<String>()?,
                suffix,
            })
        }
    }

    impl Converter<Queue, String> for Prefixer {
        fn convert(&self, marker: &Queue) -> Result<String, BoxError> {
            Ok(format!("{}{}{}", self.prefix, marker.name, self.suffix))
        }
    }

    struct Upper;

    #[async_trait]
    impl AsyncConverter<Queue, String> for Upper {
        async fn convert(&self, marker: Arc<Queue>, _ctx: ResolutionContext) -> Result<String, BoxError> {
            Ok(marker.name.to_uppercase())
        }
    }

    fn queue() -> Arc<Queue> {
        Arc::new(Queue {
            name: "orders".into(),
        })
    }

    async fn run(matcher: &PatternMatcher<Queue>) -> String {
        let value = matcher
            .convert(queue(), TypeKey::of::<String>(), ResolutionContext::new())
            .await
            .unwrap();
        downcast_value::<String>(value, "?").unwrap()
    }

    #[tokio::test]
    async fn test_every_form_normalizes() {
        let services = Services::new();
        let sources: Vec<ConverterSource<Queue, String>> = vec![
            ConverterSource::from_fn(|q: &Queue| q.name.clone()),
            ConverterSource::try_from_fn(|q: &Queue| Ok(q.name.clone())),
            ConverterSource::from_cancellable(|q: Arc<Queue>, _token| async move {
                Ok::<_, BoxError>(q.name.clone())
            }),
            ConverterSource::from_context(|q: Arc<Queue>, _ctx| async move {
                Ok::<_, BoxError>(q.name.clone())
            }),
        ];

        for source in sources {
            let matcher = PatternMatcher::new(source, &services).unwrap();
            assert!(matcher.can_produce(&TypeKey::of::<String>()));
            assert!(!matcher.can_produce(&TypeKey::of::<Vec<u8>>()));
            assert_eq!(run(&matcher).await, "orders");
        }

        let upper = PatternMatcher::new(ConverterSource::async_converter(Upper), &services).unwrap();
        assert_eq!(upper.description(), "async converter -> String");
        assert_eq!(run(&upper).await, "ORDERS");
    }

    #[tokio::test]
    async fn test_constructible_uses_services() {
        let mut services = Services::new();
        services.insert(Arc::new(String::from("q:")));

        let matcher =
            PatternMatcher::new(ConverterSource::construct::<Prefixer>("!"), &services).unwrap();
        assert_eq!(matcher.description(), "constructed Prefixer -> String");
        assert_eq!(run(&matcher).await, "q:orders!");
    }

    #[test]
    fn test_constructible_fails_at_registration() {
        let err = PatternMatcher::new(ConverterSource::construct::<Prefixer>("!"), &Services::new())
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingService(_)));
    }

    #[tokio::test]
    async fn test_open_matcher_receives_requested_type() {
        let matcher = PatternMatcher::<Queue>::open(
            TypePattern::OneOf(vec![TypeKey::of::<String>(), TypeKey::of::<u64>()]),
            "name or length",
            |q: Arc<Queue>, requested: TypeKey, _ctx| async move {
                if requested.is::<u64>() {
                    Ok(Box::new(q.name.len() as u64) as BoxedValue)
                } else {
                    Ok(Box::new(q.name.clone()) as BoxedValue)
                }
            },
        );

        assert!(matcher.can_produce(&TypeKey::of::<u64>()));
        assert_eq!(matcher.produced_type(), None);
        let len = matcher
            .convert(queue(), TypeKey::of::<u64>(), ResolutionContext::new())
            .await
            .unwrap();
        assert_eq!(downcast_value::<u64>(len, "?").unwrap(), 6);
    }

    #[tokio::test]
    async fn test_conversion_errors_are_wrapped() {
        let matcher = PatternMatcher::new(
            ConverterSource::<Queue, String>::try_from_fn(|_| Err("broken".into())),
            &Services::new(),
        )
        .unwrap();
        let err = matcher
            .convert(queue(), TypeKey::of::<String>(), ResolutionContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BindError::Conversion(_)));
    }
}
