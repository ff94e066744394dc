//! Registry of type-to-type conversions shared by every rule builder.
//!
//! Input binders and trigger adapters chain one registered conversion after
//! the value their converter produces, so a rule producing `String` can also
//! serve `Vec<u8>` parameters. Lookups that must succeed for the host to work
//! go through [`ConverterManager::try_get_converter_func`], which fails at
//! registration instead of at the first invocation.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use weld_core::{
    BindError, BindResult, BoxedValue, ConfigError, ConfigResult, TypeKey, downcast_value,
};

/// A conversion between two erased values.
type ErasedConvert = Arc<dyn Fn(BoxedValue) -> BindResult<BoxedValue> + Send + Sync>;

// =============================================================================
// Conversion Handles
// =============================================================================

/// A registered conversion from one type to another.
#[derive(Clone)]
pub struct Conversion {
    from: TypeKey,
    to: TypeKey,
    convert: ErasedConvert,
}

impl Conversion {
    fn identity(key: TypeKey) -> Self {
        Self {
            from: key,
            to: key,
            convert: Arc::new(|value: BoxedValue| -> BindResult<BoxedValue> { Ok(value) }),
        }
    }

    /// Returns the source type.
    pub fn from_type(&self) -> TypeKey {
        self.from
    }

    /// Returns the target type.
    pub fn to_type(&self) -> TypeKey {
        self.to
    }

    /// Converts an erased value of the source type.
    pub fn apply(&self, value: BoxedValue) -> BindResult<BoxedValue> {
        (self.convert)(value)
    }
}

impl fmt::Debug for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// A typed conversion function returned by
/// [`ConverterManager::try_get_converter_func`].
pub struct ConverterFunc<F, T> {
    convert: Arc<dyn Fn(F) -> BindResult<T> + Send + Sync>,
}

impl<F, T> ConverterFunc<F, T> {
    /// Converts one value.
    pub fn call(&self, value: F) -> BindResult<T> {
        (self.convert)(value)
    }
}

impl<F, T> Clone for ConverterFunc<F, T> {
    fn clone(&self) -> Self {
        Self {
            convert: Arc::clone(&self.convert),
        }
    }
}

impl<F: 'static, T: 'static> fmt::Debug for ConverterFunc<F, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConverterFunc({} -> {})",
            TypeKey::of::<F>(),
            TypeKey::of::<T>()
        )
    }
}

// =============================================================================
// ConverterManager
// =============================================================================

/// Conversions keyed by `(from, to)`.
///
/// Cloning takes a snapshot; composites hold a frozen clone so resolution
/// never takes a lock.
#[derive(Clone)]
pub struct ConverterManager {
    conversions: HashMap<(TypeId, TypeId), Conversion>,
}

impl ConverterManager {
    /// Creates a manager with the built-in text and byte conversions.
    pub fn new() -> Self {
        let mut manager = Self::empty();
        manager
            .add_converter(|s: String| Ok(s.into_bytes()))
            .add_converter(|b: Vec<u8>| String::from_utf8(b).map_err(BindError::conversion));
        manager
    }

    /// Creates a manager with no conversions at all.
    pub fn empty() -> Self {
        Self {
            conversions: HashMap::new(),
        }
    }

    /// Registers `F -> T`, replacing any previous conversion for the pair.
    pub fn add_converter<F, T, C>(&mut self, convert: C) -> &mut Self
    where
        F: Send + 'static,
        T: Send + 'static,
        C: Fn(F) -> BindResult<T> + Send + Sync + 'static,
    {
        let from = TypeKey::of::<F>();
        let to = TypeKey::of::<T>();
        let erased: ErasedConvert = Arc::new(move |value: BoxedValue| {
            let input = downcast_value::<F>(value, from.name())?;
            convert(input).map(|out| Box::new(out) as BoxedValue)
        });

        let previous = self.conversions.insert(
            (from.id(), to.id()),
            Conversion {
                from,
                to,
                convert: erased,
            },
        );
        if previous.is_some() {
            warn!(from = %from, to = %to, "Replaced existing converter");
        } else {
            debug!(from = %from, to = %to, "Registered converter");
        }
        self
    }

    /// Registers `T -> String` through `serde_json`.
    pub fn add_json_serializer<T>(&mut self) -> &mut Self
    where
        T: Serialize + Send + 'static,
    {
        self.add_converter(|value: T| serde_json::to_string(&value).map_err(BindError::conversion))
    }

    /// Registers `String -> T` through `serde_json`.
    pub fn add_json_deserializer<T>(&mut self) -> &mut Self
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.add_converter(|text: String| {
            serde_json::from_str::<T>(&text).map_err(BindError::conversion)
        })
    }

    /// Returns `true` if `from -> to` is available, identity included.
    pub fn contains(&self, from: TypeKey, to: TypeKey) -> bool {
        from == to || self.conversions.contains_key(&(from.id(), to.id()))
    }

    /// Looks up an erased conversion. Identity is always available.
    pub fn lookup(&self, from: TypeKey, to: TypeKey) -> Option<Conversion> {
        if from == to {
            return Some(Conversion::identity(from));
        }
        self.conversions.get(&(from.id(), to.id())).cloned()
    }

    /// Returns a typed `F -> T` function.
    ///
    /// Fails immediately with [`ConfigError::NoConverter`] if the pair is not
    /// registered.
    pub fn try_get_converter_func<F, T>(&self) -> ConfigResult<ConverterFunc<F, T>>
    where
        F: Send + 'static,
        T: Send + 'static,
    {
        let from = TypeKey::of::<F>();
        let to = TypeKey::of::<T>();
        let conversion = self.lookup(from, to).ok_or(ConfigError::NoConverter {
            from: from.name(),
            to: to.name(),
        })?;

        Ok(ConverterFunc {
            convert: Arc::new(move |value: F| {
                let out = conversion.apply(Box::new(value))?;
                downcast_value::<T>(out, to.name())
            }),
        })
    }

    /// Returns the number of registered conversions.
    pub fn len(&self) -> usize {
        self.conversions.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.conversions.is_empty()
    }
}

impl Default for ConverterManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConverterManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.conversions.values()).finish()
    }
}
