//! Parameter metadata and the per-invocation resolution context.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::stream::FileAccess;
use crate::types::TypeKey;

/// What the host knows about one function parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterInfo {
    /// Parameter name.
    pub name: String,
    /// Declared static type.
    pub param_type: TypeKey,
}

impl ParameterInfo {
    /// Describes a parameter `name: T`.
    pub fn of<T: 'static>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type: TypeKey::of::<T>(),
        }
    }
}

/// Context handed to converters when a parameter is bound for one invocation.
///
/// Cheap to clone: the trigger payload is shared behind an `Arc`.
#[derive(Clone, Default)]
pub struct ResolutionContext {
    cancellation: CancellationToken,
    trigger_payload: Option<Arc<dyn Any + Send + Sync>>,
    access: Option<FileAccess>,
}

impl ResolutionContext {
    /// Creates a context with a fresh, never-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `token` for cancellation.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Attaches the payload of the trigger that started this invocation.
    pub fn with_trigger_payload<P: Any + Send + Sync>(mut self, payload: P) -> Self {
        self.trigger_payload = Some(Arc::new(payload));
        self
    }

    /// Records the stream direction a stream binder is opening.
    pub fn with_access(mut self, access: FileAccess) -> Self {
        self.access = Some(access);
        self
    }

    /// Returns the cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Returns `true` once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Returns the trigger payload if it has type `P`.
    pub fn trigger_payload<P: Any>(&self) -> Option<&P> {
        self.trigger_payload
            .as_deref()
            .and_then(|p| p.downcast_ref::<P>())
    }

    /// Returns `true` if any trigger payload is attached.
    pub fn has_trigger_payload(&self) -> bool {
        self.trigger_payload.is_some()
    }

    /// Returns the stream direction being opened, if a stream binder set one.
    pub fn access(&self) -> Option<FileAccess> {
        self.access
    }
}

impl fmt::Debug for ResolutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionContext")
            .field("cancelled", &self.is_cancelled())
            .field("trigger_payload", &self.trigger_payload.is_some())
            .field("access", &self.access)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_payload_downcast() {
        let ctx = ResolutionContext::new().with_trigger_payload(String::from("msg"));
        assert!(ctx.has_trigger_payload());
        assert_eq!(ctx.trigger_payload::<String>().map(String::as_str), Some("msg"));
        assert!(ctx.trigger_payload::<u32>().is_none());
    }

    #[test]
    fn test_cancellation_is_shared() {
        let token = CancellationToken::new();
        let ctx = ResolutionContext::new().with_cancellation(token.clone());
        let copy = ctx.clone();
        assert!(!copy.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
        assert!(copy.is_cancelled());
    }
}
