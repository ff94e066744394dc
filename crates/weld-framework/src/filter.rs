//! Property filters that guard a binding rule.
//!
//! Filters are staged on a rule builder before a `bind_*` call and apply to
//! exactly that call's provider. Every clause must pass; a failing clause
//! makes the guarded provider decline, it never raises an error.
//!
//! Property names are checked against [`Marker::properties`] when the clause
//! is created, so a typo fails host startup instead of silently never
//! matching.

use std::fmt;
use std::sync::Arc;

use weld_core::{
    ConfigError, ConfigResult, IntoPropertyValue, Marker, PropertyAccessor, PropertyKind,
    PropertyValue,
};

/// A type-erased predicate over a marker instance.
pub type PredicateFn<M> = Arc<dyn Fn(&M) -> bool + Send + Sync>;

// =============================================================================
// FilterClause
// =============================================================================

/// One predicate over one marker property, with its rendered description.
pub struct FilterClause<M> {
    property: &'static str,
    predicate: PredicateFn<M>,
    description: String,
}

impl<M: Marker> FilterClause<M> {
    /// Matches when the property is absent.
    pub fn is_null(property: &str) -> ConfigResult<Self> {
        let accessor = accessor::<M>(property)?;
        Ok(Self {
            property: accessor.name(),
            predicate: Arc::new(move |m: &M| accessor.get(m).is_none()),
            description: format!("({} == null)", accessor.name()),
        })
    }

    /// Matches when the property is present.
    pub fn is_not_null(property: &str) -> ConfigResult<Self> {
        let accessor = accessor::<M>(property)?;
        Ok(Self {
            property: accessor.name(),
            predicate: Arc::new(move |m: &M| accessor.get(m).is_some()),
            description: format!("({} != null)", accessor.name()),
        })
    }

    /// Matches when the property holds the enumeration variant `expected`.
    ///
    /// Fails if `expected` is not an enumeration value or if its type differs
    /// from the property's declared enumeration. At evaluation time a value of
    /// another type, or an absent value, simply does not match.
    pub fn equals(property: &str, expected: impl IntoPropertyValue) -> ConfigResult<Self> {
        let accessor = accessor::<M>(property)?;
        let value = expected.into_property_value();
        let PropertyValue::Enum(expected) = value else {
            return Err(ConfigError::NotAnEnum {
                property: accessor.name().to_string(),
                actual: value.kind().to_string(),
            });
        };

        let shape = accessor.shape();
        match shape.kind {
            PropertyKind::Enum(declared) if declared == expected.type_key => {}
            _ => {
                return Err(ConfigError::PropertyTypeMismatch {
                    marker: M::NAME,
                    property: accessor.name().to_string(),
                    expected: shape.to_string(),
                    actual: format!("enum {}", expected.type_key),
                });
            }
        }

        Ok(Self {
            property: accessor.name(),
            predicate: Arc::new(move |m: &M| match accessor.get(m) {
                Some(PropertyValue::Enum(actual)) => actual == expected,
                _ => false,
            }),
            description: format!("({} == {})", accessor.name(), expected.variant),
        })
    }

    /// Wraps an arbitrary predicate. The property is not checked.
    pub fn custom<F>(property: &'static str, description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&M) -> bool + Send + Sync + 'static,
    {
        Self {
            property,
            predicate: Arc::new(predicate),
            description: description.into(),
        }
    }
}

impl<M> FilterClause<M> {
    /// Returns the property the clause reads.
    pub fn property(&self) -> &'static str {
        self.property
    }

    /// Returns the rendered fragment, e.g. `(access == Write)`.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Evaluates the clause.
    pub fn evaluate(&self, marker: &M) -> bool {
        (self.predicate)(marker)
    }
}

impl<M> Clone for FilterClause<M> {
    fn clone(&self) -> Self {
        Self {
            property: self.property,
            predicate: Arc::clone(&self.predicate),
            description: self.description.clone(),
        }
    }
}

impl<M> fmt::Debug for FilterClause<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

fn accessor<M: Marker>(property: &str) -> ConfigResult<PropertyAccessor<M>> {
    M::property(property).ok_or_else(|| ConfigError::UnknownProperty {
        marker: M::NAME,
        property: property.to_string(),
    })
}

// =============================================================================
// FilterSet
// =============================================================================

/// An ordered conjunction of clauses.
pub struct FilterSet<M> {
    clauses: Vec<FilterClause<M>>,
}

impl<M> FilterSet<M> {
    /// Creates an empty set, which matches everything.
    pub fn new() -> Self {
        Self {
            clauses: Vec::new(),
        }
    }

    /// Appends a clause.
    pub fn push(&mut self, clause: FilterClause<M>) {
        self.clauses.push(clause);
    }

    /// Returns `true` if no clause is staged.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Returns the number of clauses.
    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    /// Returns the clauses in declaration order.
    pub fn clauses(&self) -> &[FilterClause<M>] {
        &self.clauses
    }

    /// Returns `true` if every clause holds.
    pub fn evaluate(&self, marker: &M) -> bool {
        self.clauses.iter().all(|c| c.evaluate(marker))
    }

    /// Renders every fragment joined with ` && `.
    pub fn description(&self) -> String {
        self.clauses
            .iter()
            .map(FilterClause::description)
            .collect::<Vec<_>>()
            .join(" && ")
    }
}

impl<M> Default for FilterSet<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Clone for FilterSet<M> {
    fn clone(&self) -> Self {
        Self {
            clauses: self.clauses.clone(),
        }
    }
}

impl<M> fmt::Debug for FilterSet<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FilterSet({})", self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weld_core::{FileAccess, PropertyField, PropertyShape};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Tier {
        Hot,
    }

    impl weld_core::MarkerEnum for Tier {
        fn variant_name(&self) -> &'static str {
            "Hot"
        }
    }

    impl IntoPropertyValue for Tier {
        fn into_property_value(self) -> PropertyValue {
            PropertyValue::Enum(weld_core::EnumValue::of(self))
        }
    }

    #[derive(Debug, Clone)]
    struct Blob {
        path: Option<String>,
        access: Option<FileAccess>,
    }

    impl Marker for Blob {
        const NAME: &'static str = "Blob";

        fn properties() -> Vec<PropertyAccessor<Self>> {
            vec![
                PropertyAccessor::new(
                    "path",
                    <Option<String> as PropertyField>::shape(),
                    |m: &Self| m.path.to_property(),
                ),
                PropertyAccessor::new(
                    "access",
                    <Option<FileAccess> as PropertyField>::shape(),
                    |m: &Self| m.access.to_property(),
                ),
                // Declared as FileAccess but yields another enum at runtime.
                PropertyAccessor::new(
                    "drifted",
                    PropertyShape::required(PropertyKind::Enum(weld_core::TypeKey::of::<
                        FileAccess,
                    >())),
                    |_: &Self| Some(PropertyValue::Enum(weld_core::EnumValue::of(Tier::Hot))),
                ),
            ]
        }
    }

    fn blob(path: Option<&str>, access: Option<FileAccess>) -> Blob {
        Blob {
            path: path.map(str::to_string),
            access,
        }
    }

    #[test]
    fn test_null_clauses_are_negations() {
        let is_null = FilterClause::<Blob>::is_null("path").unwrap();
        let not_null = FilterClause::<Blob>::is_not_null("path").unwrap();

        for m in [blob(None, None), blob(Some("a"), None)] {
            assert_eq!(is_null.evaluate(&m), m.path.is_none());
            assert_eq!(not_null.evaluate(&m), !is_null.evaluate(&m));
        }
        assert_eq!(is_null.description(), "(path == null)");
        assert_eq!(not_null.description(), "(path != null)");
    }

    #[derive(Debug, Clone)]
    struct Sized64 {
        size: u64,
        offset: Option<usize>,
    }

    impl Marker for Sized64 {
        const NAME: &'static str = "Sized64";

        fn properties() -> Vec<PropertyAccessor<Self>> {
            vec![
                PropertyAccessor::new("size", <u64 as PropertyField>::shape(), |m: &Self| {
                    m.size.to_property()
                }),
                PropertyAccessor::new(
                    "offset",
                    <Option<usize> as PropertyField>::shape(),
                    |m: &Self| m.offset.to_property(),
                ),
            ]
        }
    }

    #[test]
    fn test_large_unsigned_values_are_present() {
        let size_null = FilterClause::<Sized64>::is_null("size").unwrap();
        let size_set = FilterClause::<Sized64>::is_not_null("size").unwrap();
        let offset_null = FilterClause::<Sized64>::is_null("offset").unwrap();

        let big = Sized64 {
            size: u64::MAX,
            offset: Some(usize::MAX),
        };
        assert!(!size_null.evaluate(&big));
        assert!(size_set.evaluate(&big));
        assert!(!offset_null.evaluate(&big));
        assert_eq!(
            Sized64::property("size").unwrap().get(&big),
            Some(PropertyValue::Unsigned(u64::MAX))
        );

        let small = Sized64 {
            size: 7,
            offset: None,
        };
        assert!(offset_null.evaluate(&small));
        assert_eq!(
            Sized64::property("size").unwrap().get(&small),
            Some(PropertyValue::Integer(7))
        );
    }

    #[test]
    fn test_enum_equality() {
        let clause = FilterClause::<Blob>::equals("access", FileAccess::Write).unwrap();
        assert_eq!(clause.description(), "(access == Write)");
        assert!(clause.evaluate(&blob(None, Some(FileAccess::Write))));
        assert!(!clause.evaluate(&blob(None, Some(FileAccess::Read))));
        assert!(!clause.evaluate(&blob(None, None)));
    }

    #[test]
    fn test_enum_equality_rejects_non_enum_and_mismatched_types() {
        assert!(matches!(
            FilterClause::<Blob>::equals("access", "Write"),
            Err(ConfigError::NotAnEnum { .. })
        ));
        assert!(matches!(
            FilterClause::<Blob>::equals("access", Tier::Hot),
            Err(ConfigError::PropertyTypeMismatch { marker: "Blob", .. })
        ));
        assert!(matches!(
            FilterClause::<Blob>::is_null("missing"),
            Err(ConfigError::UnknownProperty { marker: "Blob", .. })
        ));
    }

    #[test]
    fn test_dynamic_type_mismatch_does_not_match() {
        let clause = FilterClause::<Blob>::equals("drifted", FileAccess::Write).unwrap();
        assert!(!clause.evaluate(&blob(None, Some(FileAccess::Write))));
    }

    #[test]
    fn test_filter_set_is_commutative() {
        let a = FilterClause::<Blob>::is_not_null("path").unwrap();
        let b = FilterClause::<Blob>::equals("access", FileAccess::Read).unwrap();

        let mut forward = FilterSet::new();
        forward.push(a.clone());
        forward.push(b.clone());
        let mut backward = FilterSet::new();
        backward.push(b);
        backward.push(a);

        let markers = [
            blob(None, None),
            blob(Some("x"), None),
            blob(Some("x"), Some(FileAccess::Read)),
            blob(None, Some(FileAccess::Read)),
        ];
        for m in &markers {
            assert_eq!(forward.evaluate(m), backward.evaluate(m));
        }
        assert_eq!(
            forward.description(),
            "(path != null) && (access == Read)"
        );
        assert!(FilterSet::<Blob>::new().evaluate(&markers[0]));
    }
}
