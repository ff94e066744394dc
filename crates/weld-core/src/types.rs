//! Runtime type identity used to match parameters against providers.
//!
//! Rust has no runtime reflection over generic instantiations, so every type
//! a provider can produce is named up front as a [`TypeKey`] at registration.
//! Matching a parameter is then a `TypeId` comparison.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A type-erased value handed between converters and the user function.
pub type BoxedValue = Box<dyn Any + Send>;

/// A `TypeId` paired with its readable name.
///
/// Equality and hashing only consider the `TypeId`.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Returns the key for `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Returns the underlying `TypeId`.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Returns the full type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the type name with module paths stripped, for diagnostics.
    ///
    /// `alloc::vec::Vec<u8>` becomes `Vec<u8>`.
    pub fn short_name(&self) -> String {
        let mut out = String::with_capacity(self.name.len());
        let mut segment = String::new();
        for ch in self.name.chars() {
            match ch {
                ':' => segment.clear(),
                '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | ';' | '&' => {
                    out.push_str(&segment);
                    segment.clear();
                    out.push(ch);
                }
                _ => segment.push(ch),
            }
        }
        out.push_str(&segment);
        out
    }

    /// Returns `true` if this key names `T`.
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_name())
    }
}

/// The set of types a converter is declared to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypePattern {
    /// Exactly one type.
    Exact(TypeKey),
    /// Any of the listed types; the converter receives the requested key.
    OneOf(Vec<TypeKey>),
    /// Any requested type; the converter decides at bind time.
    Any,
}

impl TypePattern {
    /// Returns the pattern matching exactly `T`.
    pub fn exact<T: 'static>() -> Self {
        Self::Exact(TypeKey::of::<T>())
    }

    /// Returns `true` if `requested` is accepted by this pattern.
    pub fn matches(&self, requested: &TypeKey) -> bool {
        match self {
            Self::Exact(key) => key == requested,
            Self::OneOf(keys) => keys.contains(requested),
            Self::Any => true,
        }
    }

    /// Returns the single produced type, if the pattern is closed.
    pub fn exact_type(&self) -> Option<TypeKey> {
        match self {
            Self::Exact(key) => Some(*key),
            _ => None,
        }
    }
}

impl fmt::Display for TypePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(key) => write!(f, "{key}"),
            Self::OneOf(keys) => {
                f.write_str("one of [")?;
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}")?;
                }
                f.write_str("]")
            }
            Self::Any => f.write_str("<any>"),
        }
    }
}

/// Downcasts a boxed value, reporting the expected type on mismatch.
pub fn downcast_value<T: 'static>(
    value: BoxedValue,
    actual: &'static str,
) -> crate::error::BindResult<T> {
    value
        .downcast::<T>()
        .map(|v| *v)
        .map_err(|_| crate::error::BindError::TypeMismatch {
            expected: std::any::type_name::<T>(),
            actual,
        })
}
