//! Name resolution for `%token%` placeholders inside marker properties.
//!
//! The host supplies a [`NameResolver`]; marker fields tagged
//! `#[weld(auto_resolve)]` have every `%name%` replaced with the resolved
//! value before any binding rule sees the marker. `%%` is a literal percent.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{BindError, BindResult};

/// Resolves setting names to values.
pub trait NameResolver: Send + Sync {
    /// Returns the value of `name`, or `None` if it is not defined.
    fn resolve(&self, name: &str) -> Option<String>;
}

/// A shareable name resolver.
pub type SharedNameResolver = Arc<dyn NameResolver>;

/// Resolves names from process environment variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvNameResolver;

impl NameResolver for EnvNameResolver {
    fn resolve(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Resolves names from an in-memory map.
#[derive(Debug, Clone, Default)]
pub struct MapNameResolver {
    values: HashMap<String, String>,
}

impl MapNameResolver {
    /// Creates an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapNameResolver {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl NameResolver for MapNameResolver {
    fn resolve(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

/// Substitutes every `%name%` in `input`.
///
/// Fails with [`BindError::UnresolvedToken`] if a name has no value or a
/// token is left unterminated.
pub fn resolve_tokens(input: &str, resolver: &dyn NameResolver) -> BindResult<String> {
    if !input.contains('%') {
        return Ok(input.to_string());
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('%') else {
            return Err(BindError::UnresolvedToken(after.to_string()));
        };
        let name = &after[..end];
        if name.is_empty() {
            out.push('%');
        } else {
            let value = resolver
                .resolve(name)
                .ok_or_else(|| BindError::UnresolvedToken(name.to_string()))?;
            out.push_str(&value);
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// A marker field type whose placeholders can be resolved.
pub trait AutoResolve: Sized {
    /// Returns a copy with all placeholders substituted.
    fn auto_resolve(&self, resolver: &dyn NameResolver) -> BindResult<Self>;
}

impl AutoResolve for String {
    fn auto_resolve(&self, resolver: &dyn NameResolver) -> BindResult<Self> {
        resolve_tokens(self, resolver)
    }
}

impl AutoResolve for Option<String> {
    fn auto_resolve(&self, resolver: &dyn NameResolver) -> BindResult<Self> {
        self.as_deref()
            .map(|s| resolve_tokens(s, resolver))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> MapNameResolver {
        MapNameResolver::new()
            .with("container", "images")
            .with("env", "prod")
    }

    #[test]
    fn test_resolve_tokens() {
        let r = resolver();
        assert_eq!(resolve_tokens("plain/path", &r).unwrap(), "plain/path");
        assert_eq!(
            resolve_tokens("%container%/%env%/x.png", &r).unwrap(),
            "images/prod/x.png"
        );
        assert_eq!(resolve_tokens("100%% done", &r).unwrap(), "100% done");
    }

    #[test]
    fn test_unresolved_token() {
        let r = resolver();
        let err = resolve_tokens("%missing%/x", &r).unwrap_err();
        assert!(matches!(err, BindError::UnresolvedToken(name) if name == "missing"));
        assert!(resolve_tokens("%dangling", &r).is_err());
    }

    #[test]
    fn test_auto_resolve_option() {
        let r = resolver();
        assert_eq!(None::<String>.auto_resolve(&r).unwrap(), None);
        assert_eq!(
            Some("%env%".to_string()).auto_resolve(&r).unwrap(),
            Some("prod".to_string())
        );
    }
}
