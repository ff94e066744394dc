//! Marker types and their property accessor tables.
//!
//! A *marker* is the declarative annotation a function parameter carries
//! ("read this blob", "write to this queue"). Binding rules filter on marker
//! properties by name, so every marker publishes an explicit accessor table
//! through [`Marker::properties`]. The table is usually generated with
//! `#[derive(Marker)]`:
//!
//! ```rust,ignore
//! use weld::prelude::*;
//!
//! #[derive(Debug, Clone, Marker)]
//! #[weld(name = "Blob")]
//! pub struct Blob {
//!     #[weld(auto_resolve)]
//!     pub path: String,
//!     pub access: Option<FileAccess>,
//!     pub connection: Option<String>,
//! }
//! ```

use std::fmt;

use crate::error::BindResult;
use crate::resolver::NameResolver;
use crate::types::TypeKey;

// =============================================================================
// Marker
// =============================================================================

/// A marker type that binding rules can be declared for.
pub trait Marker: Clone + fmt::Debug + Send + Sync + 'static {
    /// Human-readable marker name used in diagnostics and errors.
    const NAME: &'static str;

    /// Returns the accessor table for every readable property.
    fn properties() -> Vec<PropertyAccessor<Self>>;

    /// Looks up a single property accessor by name.
    fn property(name: &str) -> Option<PropertyAccessor<Self>> {
        Self::properties().into_iter().find(|p| p.name() == name)
    }

    /// Returns a copy with `%token%` placeholders substituted.
    ///
    /// The derive macro rewrites fields tagged `#[weld(auto_resolve)]`;
    /// the default implementation returns an unchanged clone.
    fn resolve(&self, _resolver: &dyn NameResolver) -> BindResult<Self> {
        Ok(self.clone())
    }
}

// =============================================================================
// Property Accessors
// =============================================================================

/// Declared kind of a marker property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    /// A string.
    Text,
    /// Any integer, widened to `i64`.
    Integer,
    /// A boolean flag.
    Boolean,
    /// An enumeration implementing [`MarkerEnum`].
    Enum(TypeKey),
    /// Something filters cannot compare against.
    Other(&'static str),
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Integer => f.write_str("integer"),
            Self::Boolean => f.write_str("boolean"),
            Self::Enum(key) => write!(f, "enum {key}"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

/// Declared shape of a property: its kind plus whether it may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyShape {
    /// The underlying kind, with any `Option` unwrapped.
    pub kind: PropertyKind,
    /// Whether the property is optional.
    pub optional: bool,
}

impl PropertyShape {
    /// A required property of the given kind.
    pub const fn required(kind: PropertyKind) -> Self {
        Self {
            kind,
            optional: false,
        }
    }
}

impl fmt::Display for PropertyShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.optional {
            write!(f, "optional {}", self.kind)
        } else {
            write!(f, "{}", self.kind)
        }
    }
}

/// A value of an enumeration property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumValue {
    /// The enumeration type.
    pub type_key: TypeKey,
    /// The variant name.
    pub variant: &'static str,
}

impl EnumValue {
    /// Captures an enum value.
    pub fn of<E: MarkerEnum>(value: E) -> Self {
        Self {
            type_key: TypeKey::of::<E>(),
            variant: value.variant_name(),
        }
    }
}

/// The dynamic value read from a marker property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    /// A string.
    Text(String),
    /// An integer that fits in `i64`.
    Integer(i64),
    /// An unsigned integer above `i64::MAX`.
    Unsigned(u64),
    /// A boolean.
    Boolean(bool),
    /// An enumeration variant.
    Enum(EnumValue),
}

impl PropertyValue {
    /// Returns the kind of this value.
    pub fn kind(&self) -> PropertyKind {
        match self {
            Self::Text(_) => PropertyKind::Text,
            Self::Integer(_) | Self::Unsigned(_) => PropertyKind::Integer,
            Self::Boolean(_) => PropertyKind::Boolean,
            Self::Enum(e) => PropertyKind::Enum(e.type_key),
        }
    }

    /// Builds the integer value for `value`: `Integer` when it fits, else `Unsigned`.
    pub fn from_unsigned(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(i) => Self::Integer(i),
            Err(_) => Self::Unsigned(value),
        }
    }

    /// Returns the enum payload, if this is an enum value.
    pub fn as_enum(&self) -> Option<&EnumValue> {
        match self {
            Self::Enum(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "\"{s}\""),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Unsigned(u) => write!(f, "{u}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Enum(e) => f.write_str(e.variant),
        }
    }
}

/// A named, typed getter over one marker field.
pub struct PropertyAccessor<M> {
    name: &'static str,
    shape: PropertyShape,
    get: fn(&M) -> Option<PropertyValue>,
}

impl<M> PropertyAccessor<M> {
    /// Creates an accessor.
    pub const fn new(
        name: &'static str,
        shape: PropertyShape,
        get: fn(&M) -> Option<PropertyValue>,
    ) -> Self {
        Self { name, shape, get }
    }

    /// Returns the property name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the declared shape.
    pub fn shape(&self) -> PropertyShape {
        self.shape
    }

    /// Reads the property from a marker instance. `None` means absent.
    pub fn get(&self, marker: &M) -> Option<PropertyValue> {
        (self.get)(marker)
    }
}

impl<M> Clone for PropertyAccessor<M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for PropertyAccessor<M> {}

impl<M> fmt::Debug for PropertyAccessor<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyAccessor")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .finish()
    }
}

// =============================================================================
// Field and Value Conversions
// =============================================================================

/// An enumeration usable in marker properties and equality filters.
///
/// Implemented by `#[derive(MarkerEnum)]` for fieldless enums.
pub trait MarkerEnum: Copy + Send + Sync + 'static {
    /// Returns the variant name.
    fn variant_name(&self) -> &'static str;
}

/// A field type that can appear in a marker's accessor table.
pub trait PropertyField {
    /// The declared shape of the field type.
    fn shape() -> PropertyShape;

    /// Reads the field as a property value.
    fn to_property(&self) -> Option<PropertyValue>;
}

/// A value that can be compared against a marker property by a filter.
pub trait IntoPropertyValue {
    /// Converts into a property value.
    fn into_property_value(self) -> PropertyValue;
}

impl PropertyField for String {
    fn shape() -> PropertyShape {
        PropertyShape::required(PropertyKind::Text)
    }

    fn to_property(&self) -> Option<PropertyValue> {
        Some(PropertyValue::Text(self.clone()))
    }
}

impl PropertyField for bool {
    fn shape() -> PropertyShape {
        PropertyShape::required(PropertyKind::Boolean)
    }

    fn to_property(&self) -> Option<PropertyValue> {
        Some(PropertyValue::Boolean(*self))
    }
}

macro_rules! impl_integer_field {
    ($wide:ty, $build:path => $($ty:ty),*) => {
        $(
            impl PropertyField for $ty {
                fn shape() -> PropertyShape {
                    PropertyShape::required(PropertyKind::Integer)
                }

                fn to_property(&self) -> Option<PropertyValue> {
                    Some((*self).into_property_value())
                }
            }

            impl IntoPropertyValue for $ty {
                fn into_property_value(self) -> PropertyValue {
                    $build(self as $wide)
                }
            }
        )*
    };
}

impl_integer_field!(i64, PropertyValue::Integer => i8, i16, i32, i64, u8, u16, u32);
impl_integer_field!(u64, PropertyValue::from_unsigned => u64, usize);

impl<T: PropertyField> PropertyField for Option<T> {
    fn shape() -> PropertyShape {
        PropertyShape {
            optional: true,
            ..T::shape()
        }
    }

    fn to_property(&self) -> Option<PropertyValue> {
        self.as_ref().and_then(PropertyField::to_property)
    }
}

impl IntoPropertyValue for String {
    fn into_property_value(self) -> PropertyValue {
        PropertyValue::Text(self)
    }
}

impl IntoPropertyValue for &str {
    fn into_property_value(self) -> PropertyValue {
        PropertyValue::Text(self.to_string())
    }
}

impl IntoPropertyValue for bool {
    fn into_property_value(self) -> PropertyValue {
        PropertyValue::Boolean(self)
    }
}

impl IntoPropertyValue for PropertyValue {
    fn into_property_value(self) -> PropertyValue {
        self
    }
}
