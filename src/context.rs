//! # Context Module
//!
//! Every hook invocation receives a [`Context`]: a cheap-to-clone carrier of
//! connection-scoped cancellation, an optional call deadline and immutable
//! request-scoped values.
//!
//! Cancellation is cooperative. When the transport goes away (or the host
//! cancels the context it passed into `serve`), `cancelled()` resolves and
//! the connection worker stops waiting on in-flight hooks. The deadline is
//! advisory for hook code; the dispatcher is the one enforcing it.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellable call context handed to every hook.
///
/// A context is a value: deriving methods (`with_value`, `with_deadline`,
/// `child`) return a new context and leave the original untouched. All
/// derived contexts share the original's cancellation unless created with
/// [`Context::child`], whose cancellation can also be triggered on the
/// child alone.
///
/// ## Example
///
/// ```rust
/// use tokio_relay::context::Context;
///
/// #[derive(Clone)]
/// struct Tenant(String);
///
/// let ctx = Context::new().with_value(Tenant("acme".into()));
/// assert_eq!(ctx.value::<Tenant>().unwrap().0, "acme");
/// assert!(!ctx.is_cancelled());
///
/// ctx.cancel();
/// assert!(ctx.is_cancelled());
/// ```
#[derive(Clone, Default)]
pub struct Context {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    values: Arc<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl Context {
    /// Creates a root context with no deadline and no values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a context carrying `value`, keyed by its type.
    ///
    /// Storing a second value of the same type replaces the first.
    /// Wrap host types in newtypes to keep keys distinct.
    pub fn with_value<T: Any + Send + Sync>(self, value: T) -> Self {
        let mut values: HashMap<_, _> = (*self.values).clone();
        values.insert(
            TypeId::of::<T>(),
            Arc::new(value) as Arc<dyn Any + Send + Sync>,
        );
        Self {
            values: Arc::new(values),
            ..self
        }
    }

    /// Looks up a value stored with [`Context::with_value`].
    pub fn value<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }

    /// Returns a context whose deadline is at most `deadline`.
    ///
    /// An earlier deadline already present is kept.
    pub fn with_deadline(self, deadline: Instant) -> Self {
        Self {
            deadline: Some(self.deadline.map_or(deadline, |d| d.min(deadline))),
            ..self
        }
    }

    /// Shorthand for [`Context::with_deadline`] relative to now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Returns a context with the deadline cleared.
    pub fn without_deadline(self) -> Self {
        Self {
            deadline: None,
            ..self
        }
    }

    /// Deadline of this call, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns a context that is cancelled when `self` is cancelled, and
    /// can additionally be cancelled on its own.
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
            values: self.values.clone(),
        }
    }

    /// Cancels this context and everything derived from it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the context is cancelled. Safe to call repeatedly.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("deadline", &self.deadline)
            .field("values", &self.values.len())
            .finish()
    }
}
