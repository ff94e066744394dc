//! The invocation scope around one call of a user function.
//!
//! ```rust,ignore
//! let mut invocation = Invocation::bind_all(&bindings, ctx).await?;
//! let input = invocation.take::<String>(0)?;
//! let output = invocation.take::<Out<String>>(1)?;
//!
//! invocation
//!     .run(async move {
//!         output.set(input.to_uppercase());
//!         Ok(())
//!     })
//!     .await?;
//! ```
//!
//! Completions (stream flushes, collector flushes, write-backs) run strictly
//! after the body finishes and before [`Invocation::run`] returns, whether the
//! body succeeded, failed, panicked or was cancelled.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{debug, warn};
use weld_core::{
    BindError, BindResult, BoundValue, BoxError, CancellationToken, InvocationError,
    InvocationStatus, ResolutionContext,
};

use crate::binding::ParameterBinding;

struct BoundParameter {
    name: String,
    value: BoundValue,
}

enum Outcome<R> {
    Returned(R),
    Failed(BoxError),
    Panicked(Box<dyn std::any::Any + Send>),
    Cancelled,
}

/// Bound values of one invocation, in parameter order.
pub struct Invocation {
    parameters: Vec<BoundParameter>,
    cancellation: CancellationToken,
}

impl Invocation {
    /// Binds every parameter in order.
    ///
    /// If one binding fails, the values bound so far are completed with
    /// [`InvocationStatus::Failed`] (or `Cancelled`) before the error is
    /// returned.
    pub async fn bind_all(
        bindings: &[ParameterBinding],
        ctx: ResolutionContext,
    ) -> Result<Self, InvocationError> {
        let cancellation = ctx.cancellation().clone();
        let mut parameters = Vec::with_capacity(bindings.len());

        for binding in bindings {
            let name = binding.descriptor().name.clone();
            match binding.bind(ctx.clone()).await {
                Ok(value) => parameters.push(BoundParameter { name, value }),
                Err(err) => {
                    let cancelled = err.is_cancelled();
                    let status = if cancelled {
                        InvocationStatus::Cancelled
                    } else {
                        InvocationStatus::Failed
                    };
                    debug!(parameter = %name, error = %err, "Binding failed, releasing bound values");
                    if let Err(completion) = complete_all(parameters, status).await {
                        warn!(error = %completion, "Release after failed binding also failed");
                    }
                    return Err(if cancelled {
                        InvocationError::Cancelled
                    } else {
                        InvocationError::Binding(err)
                    });
                }
            }
        }

        Ok(Self {
            parameters,
            cancellation,
        })
    }

    /// Returns the number of bound parameters.
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// Returns `true` if the function takes no parameters.
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Takes the value of the parameter at `index`.
    pub fn take<T: 'static>(&mut self, index: usize) -> BindResult<T> {
        match self.parameters.get_mut(index) {
            Some(parameter) => parameter.value.take(),
            None => Err(missing::<T>()),
        }
    }

    /// Takes the value of the parameter called `name`.
    pub fn take_by_name<T: 'static>(&mut self, name: &str) -> BindResult<T> {
        match self.parameters.iter_mut().find(|p| p.name == name) {
            Some(parameter) => parameter.value.take(),
            None => Err(missing::<T>()),
        }
    }

    /// Returns `(name, invoke string)` pairs for invocation logs.
    pub fn invoke_strings(&self) -> Vec<(&str, &str)> {
        self.parameters
            .iter()
            .map(|p| (p.name.as_str(), p.value.invoke_string()))
            .collect()
    }

    /// Runs the body, then every completion.
    ///
    /// A panic in the body is resumed after the completions ran.
    pub async fn run<R, Fut>(self, body: Fut) -> Result<R, InvocationError>
    where
        Fut: Future<Output = Result<R, BoxError>>,
    {
        let token = self.cancellation;
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Outcome::Cancelled,
            result = AssertUnwindSafe(body).catch_unwind() => match result {
                Ok(Ok(value)) => Outcome::Returned(value),
                Ok(Err(err)) => Outcome::Failed(err),
                Err(panic) => Outcome::Panicked(panic),
            },
        };

        let status = match outcome {
            Outcome::Returned(_) => InvocationStatus::Succeeded,
            Outcome::Failed(_) | Outcome::Panicked(_) => InvocationStatus::Failed,
            Outcome::Cancelled => InvocationStatus::Cancelled,
        };
        let completed = complete_all(self.parameters, status).await;

        match outcome {
            Outcome::Returned(value) => completed.map(|()| value),
            Outcome::Failed(err) => {
                if let Err(completion) = completed {
                    warn!(error = %completion, "Completion failed after function error");
                }
                Err(InvocationError::Function(err))
            }
            Outcome::Cancelled => {
                if let Err(completion) = completed {
                    warn!(error = %completion, "Completion failed after cancellation");
                }
                Err(InvocationError::Cancelled)
            }
            Outcome::Panicked(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// Completes every value in order; the first failure is returned, the rest logged.
async fn complete_all(
    parameters: Vec<BoundParameter>,
    status: InvocationStatus,
) -> Result<(), InvocationError> {
    let mut first = None;
    for BoundParameter { name, value } in parameters {
        if let Err(err) = value.complete(status).await {
            warn!(parameter = %name, error = %err, ?status, "Completion failed");
            if first.is_none() {
                first = Some(InvocationError::Completion {
                    parameter: name,
                    source: err,
                });
            }
        }
    }
    first.map_or(Ok(()), Err)
}

fn missing<T>() -> BindError {
    BindError::TypeMismatch {
        expected: std::any::type_name::<T>(),
        actual: "<no such parameter>",
    }
}
