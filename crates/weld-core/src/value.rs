//! Bound values, their completion actions, and parameter descriptors.
//!
//! Binding a parameter for one invocation yields a [`BoundValue`]: the value
//! passed to the user function plus an optional [`Completion`] that runs
//! after the function body (flush a stream, write back an `Out<T>`).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::{BindError, BindResult};
use crate::types::{BoxedValue, downcast_value};

// =============================================================================
// Binding Kind / Descriptor
// =============================================================================

/// The closed set of provider variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    /// Produces a value directly.
    Input,
    /// Produces a stream in a read or write direction.
    Stream,
    /// Produces an output sink.
    Collector,
    /// The binding that starts the invocation.
    Trigger,
    /// Produces a value provider with write-back.
    ValueProvider,
}

impl BindingKind {
    /// Returns the kind name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Stream => "stream",
            Self::Collector => "collector",
            Self::Trigger => "trigger",
            Self::ValueProvider => "value_provider",
        }
    }
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostics record for a resolved parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParameterDescriptor {
    /// Parameter name.
    pub name: String,
    /// Short name of the declared type.
    pub type_name: String,
    /// Which provider variant bound it.
    pub kind: BindingKind,
    /// Free-form hints surfaced to operators.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub display_hints: BTreeMap<String, String>,
}

impl ParameterDescriptor {
    /// Creates a descriptor without hints.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, kind: BindingKind) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            kind,
            display_hints: BTreeMap::new(),
        }
    }

    /// Adds a display hint.
    pub fn with_hint(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.display_hints.insert(key.into(), value.into());
        self
    }
}

// =============================================================================
// Completion
// =============================================================================

/// How the user function body ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationStatus {
    /// The body returned `Ok`.
    Succeeded,
    /// The body returned an error or panicked.
    Failed,
    /// The invocation was cancelled.
    Cancelled,
}

impl InvocationStatus {
    /// Returns `true` for [`InvocationStatus::Succeeded`].
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// An action run once after the user function body finishes.
#[async_trait]
pub trait Completion: Send {
    /// Runs the action. Called exactly once, on every exit path.
    async fn complete(self: Box<Self>, status: InvocationStatus) -> BindResult<()>;
}

/// A [`Completion`] built from a closure.
pub struct FnCompletion<F>(F);

/// Wraps a closure as a [`Completion`].
pub fn completion_fn<F>(f: F) -> FnCompletion<F>
where
    F: FnOnce(InvocationStatus) -> BoxFuture<'static, BindResult<()>> + Send,
{
    FnCompletion(f)
}

#[async_trait]
impl<F> Completion for FnCompletion<F>
where
    F: FnOnce(InvocationStatus) -> BoxFuture<'static, BindResult<()>> + Send,
{
    async fn complete(self: Box<Self>, status: InvocationStatus) -> BindResult<()> {
        (self.0)(status).await
    }
}

// =============================================================================
// Out<T>
// =============================================================================

/// An output slot the user function fills in; written back on success.
pub struct Out<T> {
    slot: Arc<Mutex<Option<T>>>,
}

impl<T> Out<T> {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Stores a value, replacing any previous one.
    pub fn set(&self, value: T) {
        *self.slot.lock() = Some(value);
    }

    /// Removes and returns the stored value.
    pub fn take(&self) -> Option<T> {
        self.slot.lock().take()
    }

    /// Returns `true` if a value is stored.
    pub fn is_set(&self) -> bool {
        self.slot.lock().is_some()
    }
}

impl<T> Clone for Out<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Default for Out<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Out<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Out").field("is_set", &self.is_set()).finish()
    }
}

// =============================================================================
// BoundValue
// =============================================================================

/// The value bound to one parameter for one invocation.
pub struct BoundValue {
    value: Option<BoxedValue>,
    value_type: &'static str,
    completion: Option<Box<dyn Completion>>,
    invoke_string: String,
}

impl BoundValue {
    /// Wraps a concrete value.
    pub fn new<T: Send + 'static>(value: T) -> Self {
        Self::from_boxed(Box::new(value), std::any::type_name::<T>())
    }

    /// Wraps an already boxed value of the named type.
    pub fn from_boxed(value: BoxedValue, value_type: &'static str) -> Self {
        Self {
            value: Some(value),
            value_type,
            completion: None,
            invoke_string: String::new(),
        }
    }

    /// Attaches a completion action.
    pub fn with_completion(mut self, completion: impl Completion + 'static) -> Self {
        self.completion = Some(Box::new(completion));
        self
    }

    /// Sets the string shown for this argument in invocation logs.
    pub fn with_invoke_string(mut self, invoke_string: impl Into<String>) -> Self {
        self.invoke_string = invoke_string.into();
        self
    }

    /// Returns the invocation log string.
    pub fn invoke_string(&self) -> &str {
        &self.invoke_string
    }

    /// Returns the type name of the wrapped value.
    pub fn value_type(&self) -> &'static str {
        self.value_type
    }

    /// Returns `true` if a completion action is attached.
    pub fn has_completion(&self) -> bool {
        self.completion.is_some()
    }

    /// Takes the value out as `T`.
    pub fn take<T: 'static>(&mut self) -> BindResult<T> {
        let value = self.take_boxed().ok_or(BindError::TypeMismatch {
            expected: std::any::type_name::<T>(),
            actual: "<taken>",
        })?;
        downcast_value(value, self.value_type)
    }

    /// Takes the boxed value out, leaving the slot empty.
    pub fn take_boxed(&mut self) -> Option<BoxedValue> {
        self.value.take()
    }

    /// Detaches the completion action.
    pub fn take_completion(&mut self) -> Option<Box<dyn Completion>> {
        self.completion.take()
    }

    /// Runs the completion action, if any.
    pub async fn complete(mut self, status: InvocationStatus) -> BindResult<()> {
        match self.completion.take() {
            Some(completion) => completion.complete(status).await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for BoundValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundValue")
            .field("value_type", &self.value_type)
            .field("taken", &self.value.is_none())
            .field("has_completion", &self.completion.is_some())
            .field("invoke_string", &self.invoke_string)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_take_value() {
        let mut bound = BoundValue::new(String::from("hello")).with_invoke_string("in/a.txt");
        assert_eq!(bound.invoke_string(), "in/a.txt");
        assert_eq!(bound.take::<String>().unwrap(), "hello");
        assert!(bound.take::<String>().is_err());
    }

    #[test]
    fn test_take_wrong_type() {
        let mut bound = BoundValue::new(5_i32);
        assert!(matches!(
            bound.take::<String>(),
            Err(BindError::TypeMismatch { actual: "i32", .. })
        ));
    }

    #[test]
    fn test_out_slot_is_shared() {
        let out = Out::<u8>::new();
        let copy = out.clone();
        copy.set(9);
        assert!(out.is_set());
        assert_eq!(out.take(), Some(9));
        assert!(!copy.is_set());
    }

    #[tokio::test]
    async fn test_completion_runs_with_status() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let bound = BoundValue::new(()).with_completion(completion_fn(move |status| {
            async move {
                assert_eq!(status, InvocationStatus::Failed);
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }
            .boxed()
        }));

        assert!(bound.has_completion());
        bound.complete(InvocationStatus::Failed).await.unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_descriptor_serializes_kind() {
        let descriptor =
            ParameterDescriptor::new("input", "String", BindingKind::ValueProvider).with_hint("path", "a");
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["kind"], "value_provider");
        assert_eq!(json["display_hints"]["path"], "a");
    }
}
