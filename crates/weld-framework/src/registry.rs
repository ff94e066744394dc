//! Registry of composite providers, keyed by marker type.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use tracing::debug;
use weld_core::{ConfigError, ConfigResult, Marker};

use crate::composite::CompositeBindingProvider;

/// Object-safe view of a composite provider of any marker type.
trait ErasedComposite: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn marker_name(&self) -> &'static str;
    fn describe(&self) -> String;
}

impl<M: Marker> ErasedComposite for CompositeBindingProvider<M> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn marker_name(&self) -> &'static str {
        M::NAME
    }

    fn describe(&self) -> String {
        CompositeBindingProvider::describe(self)
    }
}

/// The finalized binding rules of a host.
///
/// Entries keep registration order, which is also the order of
/// [`ExtensionRegistry::dump_all`].
#[derive(Default)]
pub struct ExtensionRegistry {
    index: HashMap<TypeId, usize>,
    entries: Vec<Box<dyn ErasedComposite>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the composite for `M`.
    ///
    /// A marker type can only be registered once.
    pub fn register<M: Marker>(&mut self, composite: CompositeBindingProvider<M>) -> ConfigResult<()> {
        let key = TypeId::of::<M>();
        if self.index.contains_key(&key) {
            return Err(ConfigError::AlreadyRegistered { marker: M::NAME });
        }
        debug!(marker = M::NAME, providers = composite.len(), "Registering marker");
        self.index.insert(key, self.entries.len());
        self.entries.push(Box::new(composite));
        Ok(())
    }

    /// Returns the composite for `M`.
    pub fn provider<M: Marker>(&self) -> Option<CompositeBindingProvider<M>> {
        let position = *self.index.get(&TypeId::of::<M>())?;
        self.entries[position]
            .as_any()
            .downcast_ref::<CompositeBindingProvider<M>>()
            .cloned()
    }

    /// Returns `true` if `M` is registered.
    pub fn contains<M: Marker>(&self) -> bool {
        self.index.contains_key(&TypeId::of::<M>())
    }

    /// Returns the number of registered marker types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the registered marker names in registration order.
    pub fn markers(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.marker_name()).collect()
    }

    /// Renders the rule graph of `M`.
    pub fn dump_rule_graph<M: Marker>(&self) -> Option<String> {
        let position = *self.index.get(&TypeId::of::<M>())?;
        Some(self.entries[position].describe())
    }

    /// Renders every rule graph, separated by blank lines.
    pub fn dump_all(&self) -> String {
        self.entries
            .iter()
            .map(|e| e.describe())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("markers", &self.markers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::ConverterManager;
    use weld_core::PropertyAccessor;

    macro_rules! marker {
        ($name:ident) => {
            #[derive(Debug, Clone)]
            struct $name;

            impl Marker for $name {
                const NAME: &'static str = stringify!($name);

                fn properties() -> Vec<PropertyAccessor<Self>> {
                    Vec::new()
                }
            }
        };
    }

    marker!(Blob);
    marker!(Queue);
    marker!(Timer);

    fn empty<M: Marker>() -> CompositeBindingProvider<M> {
        CompositeBindingProvider::new(Vec::new(), None, ConverterManager::new())
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ExtensionRegistry::new();
        registry.register(empty::<Queue>()).unwrap();
        registry.register(empty::<Blob>()).unwrap();

        assert!(registry.provider::<Queue>().is_some());
        assert!(registry.provider::<Timer>().is_none());
        assert_eq!(registry.markers(), vec!["Queue", "Blob"]);
        assert_eq!(registry.dump_all(), "Queue\n\nBlob");
        assert_eq!(registry.dump_rule_graph::<Blob>().as_deref(), Some("Blob"));
        assert!(registry.dump_rule_graph::<Timer>().is_none());
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = ExtensionRegistry::new();
        registry.register(empty::<Timer>()).unwrap();
        let err = registry.register(empty::<Timer>()).unwrap_err();
        assert!(matches!(err, ConfigError::AlreadyRegistered { marker: "Timer" }));
        assert_eq!(registry.len(), 1);
    }
}
