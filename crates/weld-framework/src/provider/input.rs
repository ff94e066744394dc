//! Input binder: hands the converter's value straight to the parameter.

use std::sync::Arc;

use tracing::trace;
use weld_core::{BindResult, BindingKind, BoundValue, Marker};

use super::chain_conversion;
use crate::binding::{BindingProvider, ParameterBinding, ProviderContext};
use crate::pattern::PatternMatcher;

/// Produces the converter's value, or that value passed through one
/// registered conversion when the parameter asks for another type.
pub struct InputBinder<M> {
    matcher: PatternMatcher<M>,
}

impl<M: Marker> InputBinder<M> {
    /// Wraps a normalized converter.
    pub fn new(matcher: PatternMatcher<M>) -> Self {
        Self { matcher }
    }
}

impl<M: Marker> BindingProvider<M> for InputBinder<M> {
    fn try_create(&self, ctx: &ProviderContext<'_, M>) -> BindResult<Option<ParameterBinding>> {
        let requested = ctx.param_type();
        let (produce, chain) = if self.matcher.can_produce(&requested) {
            (requested, None)
        } else {
            match chain_conversion(self.matcher.produced_type(), requested, ctx.converters()) {
                Some((produced, conversion)) => (produced, Some(conversion)),
                None => {
                    trace!(marker = M::NAME, requested = %requested, "Input binder declined");
                    return Ok(None);
                }
            }
        };

        let matcher = self.matcher.clone();
        let marker = Arc::clone(ctx.marker());
        let mut descriptor = ctx.descriptor(BindingKind::Input);
        if let Some(conversion) = &chain {
            descriptor = descriptor.with_hint("conversion", format!("{conversion:?}"));
        }

        Ok(Some(ParameterBinding::new(
            BindingKind::Input,
            descriptor,
            move |rctx| {
                let produced = matcher.convert(Arc::clone(&marker), produce, rctx);
                let chain = chain.clone();
                async move {
                    let mut value = produced.await?;
                    if let Some(conversion) = chain {
                        value = conversion.apply(value)?;
                    }
                    Ok(BoundValue::from_boxed(value, requested.name()))
                }
            },
        )))
    }

    fn kind(&self) -> BindingKind {
        BindingKind::Input
    }

    fn describe(&self) -> String {
        format!("input [{}]", self.matcher.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::ConverterManager;
    use crate::pattern::ConverterSource;
    use weld_core::{MapNameResolver, ParameterInfo, PropertyAccessor, ResolutionContext, Services};

    #[derive(Debug, Clone)]
    struct Setting {
        key: String,
    }

    impl Marker for Setting {
        const NAME: &'static str = "Setting";

        fn properties() -> Vec<PropertyAccessor<Self>> {
            Vec::new()
        }
    }

    fn binder() -> InputBinder<Setting> {
        let source = ConverterSource::from_fn(|s: &Setting| format!("value of {}", s.key));
        InputBinder::new(PatternMatcher::new(source, &Services::new()).unwrap())
    }

    fn resolve<T: 'static>(binder: &InputBinder<Setting>) -> Option<ParameterBinding> {
        let parameter = ParameterInfo::of::<T>("arg");
        let resolver = MapNameResolver::new();
        let converters = ConverterManager::new();
        let ctx = ProviderContext::new(
            Arc::new(Setting { key: "port".into() }),
            &parameter,
            &resolver,
            &converters,
        );
        binder.try_create(&ctx).unwrap()
    }

    #[tokio::test]
    async fn test_direct_and_chained_input() {
        let binder = binder();

        let direct = resolve::<String>(&binder).unwrap();
        let mut value = direct.bind(ResolutionContext::new()).await.unwrap();
        assert_eq!(value.take::<String>().unwrap(), "value of port");
        assert!(!value.has_completion());

        let chained = resolve::<Vec<u8>>(&binder).unwrap();
        assert!(chained.descriptor().display_hints.contains_key("conversion"));
        let mut value = chained.bind(ResolutionContext::new()).await.unwrap();
        assert_eq!(value.take::<Vec<u8>>().unwrap(), b"value of port".to_vec());
    }

    #[test]
    fn test_declines_unconvertible_type() {
        assert!(resolve::<u64>(&binder()).is_none());
        assert_eq!(binder().describe(), "input [fn -> String]");
    }
}
