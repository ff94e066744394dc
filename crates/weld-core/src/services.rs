//! Ambient services available to constructible converters.
//!
//! Services are keyed by type. Trait objects are supported: register an
//! `Arc<dyn Clock>` with [`Services::insert`] and fetch it back with
//! `services.get::<dyn Clock>()`.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{ConfigError, ConfigResult};

/// Type alias for the heterogeneous values stored in the map.
///
/// The inner `dyn Any` is an `Arc<T>` upcast to `Any`, so `T` may be unsized.
type ServiceArc = Arc<dyn Any + Send + Sync>;

/// A type-keyed service map.
#[derive(Clone, Default)]
pub struct Services {
    entries: HashMap<TypeId, (&'static str, ServiceArc)>,
}

impl Services {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service, replacing any previous one of the same type.
    pub fn insert<T: ?Sized + Send + Sync + 'static>(&mut self, service: Arc<T>) -> &mut Self {
        let name = std::any::type_name::<T>();
        if self
            .entries
            .insert(TypeId::of::<T>(), (name, Arc::new(service)))
            .is_some()
        {
            tracing::debug!(service = name, "Replaced registered service");
        }
        self
    }

    /// Looks up a service.
    pub fn get<T: ?Sized + 'static>(&self) -> Option<Arc<T>> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|(_, arc)| arc.downcast_ref::<Arc<T>>().map(Arc::clone))
    }

    /// Looks up a service, failing with [`ConfigError::MissingService`].
    pub fn require<T: ?Sized + 'static>(&self) -> ConfigResult<Arc<T>> {
        self.get::<T>()
            .ok_or(ConfigError::MissingService(std::any::type_name::<T>()))
    }

    /// Returns `true` if a service of type `T` is registered.
    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    /// Returns the number of registered services.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no services are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.values().map(|(name, _)| name))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Clock: Send + Sync {
        fn now(&self) -> u64;
    }

    struct FixedClock;

    impl Clock for FixedClock {
        fn now(&self) -> u64 {
            42
        }
    }

    #[test]
    fn test_trait_object_services() {
        let mut services = Services::new();
        services.insert::<dyn Clock>(Arc::new(FixedClock));
        services.insert(Arc::new(String::from("prefix")));

        assert_eq!(services.require::<dyn Clock>().unwrap().now(), 42);
        assert_eq!(services.get::<String>().unwrap().as_str(), "prefix");
        assert_eq!(services.len(), 2);
    }

    #[test]
    fn test_missing_service() {
        let services = Services::new();
        assert!(!services.contains::<u32>());
        assert!(matches!(
            services.require::<u32>(),
            Err(ConfigError::MissingService("u32"))
        ));
    }
}
