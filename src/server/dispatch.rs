//! # Dispatch Module
//!
//! Runs hooks for a connection, one at a time. A hook executes on its
//! own task so a panicking handler cannot take the connection worker
//! down, and every invocation races against the connection context and
//! an optional deadline.
//!
//! Hooks of one connection never overlap: the worker awaits each
//! invocation before it picks up the next command. Hooks of different
//! connections run independently.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::context::Context;
use crate::errors::HookFault;

/// Runs a single hook future under the connection context
///
/// The future is spawned on its own task and awaited. When the context
/// is cancelled or the deadline passes first, the invocation resolves
/// with a fault and the task is left to finish on its own in the
/// background.
///
/// The effective deadline is the earlier of the context deadline and
/// `deadline` counted from now.
pub async fn invoke<F, T>(ctx: &Context, deadline: Option<Duration>, fut: F) -> Result<T, HookFault>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let mut expire_at = ctx.deadline().unwrap_or_else(far_future);
    if let Some(limit) = deadline {
        expire_at = expire_at.min(Instant::now() + limit);
    }

    let handle = tokio::spawn(fut);

    tokio::select! {
        biased;

        _ = ctx.cancelled() => Err(HookFault::Cancelled),

        _ = tokio::time::sleep_until(expire_at) => Err(HookFault::Deadline),

        result = handle => match result {
            Ok(value) => Ok(value),
            Err(err) => {
                log::warn!("hook task failed: {}", err);
                Err(HookFault::Panicked)
            }
        },
    }
}

/// Creates a timestamp far in the future for parking timers
pub(crate) fn far_future() -> Instant {
    // Roughly 30 years from now.
    // API does not provide a way to obtain max `Instant`
    // or convert specific date in the future to instant.
    // 1000 years overflows on macOS, 100 years overflows on FreeBSD.
    Instant::now() + Duration::from_secs(86400 * 365 * 30)
}
