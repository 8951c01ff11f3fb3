//! # Task handler abstraction and function-backed implementation.
//!
//! This module defines the [`TaskHandler`] trait (async, zero-argument) and a
//! convenient closure-backed implementation [`HandlerFn`]. The common handle
//! type is [`HandlerRef`], an `Arc<dyn TaskHandler>` shared between the
//! registry and in-flight executions.
//!
//! Each invocation produces a fresh future, so handlers need no shared
//! mutable state; when state is required, capture an `Arc<...>` explicitly
//! inside the closure.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TaskError;

/// Shared handle to a task handler.
pub type HandlerRef = Arc<dyn TaskHandler>;

/// # Asynchronous unit of work invoked at each scheduled occurrence.
///
/// Handlers run to completion; a slow handler delays only its own task's next
/// scheduling step. Panics are caught by the scheduler and recorded as failed
/// attempts.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use cronloom::{TaskError, TaskHandler};
///
/// struct Heartbeat;
///
/// #[async_trait]
/// impl TaskHandler for Heartbeat {
///     async fn run(&self) -> Result<(), TaskError> {
///         // do work...
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    /// Executes one attempt of the task.
    async fn run(&self) -> Result<(), TaskError>;
}

/// Closure-backed task handler.
///
/// Wraps a closure that *creates* a new future per invocation.
pub struct HandlerFn<F> {
    f: F,
}

impl<F, Fut> HandlerFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the handler and returns it as a shared [`HandlerRef`].
    ///
    /// ## Example
    /// ```rust
    /// use cronloom::{HandlerFn, HandlerRef, TaskError};
    ///
    /// let handler: HandlerRef = HandlerFn::arc(|| async {
    ///     Ok::<_, TaskError>(())
    /// });
    /// ```
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> TaskHandler for HandlerFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    async fn run(&self) -> Result<(), TaskError> {
        (self.f)().await
    }
}
