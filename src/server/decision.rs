//! # Decision Module
//!
//! Shared interpretation of decision hook replies. Every decision hook
//! reports its opinion through the same two optional fields, `error` and
//! `disconnect`, and the precedence between them is the same for every
//! command. This module turns those fields into a [`Verdict`] and turns
//! expiration grants into an [`Expiry`] the connection can arm timers
//! from.

use std::time::SystemTime;

use tokio::time::Instant;

use crate::errors::{Disconnect, Error};

/// Outcome of interpreting a decision hook reply
///
/// The ordering contract is fixed: an error is always answered on the
/// frame that caused it before any disconnect takes effect, and a
/// disconnect without an error lets the command succeed first.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// No opinion, apply the defaults of the command and continue
    Proceed,
    /// Answer the command with an error frame, keep the connection
    Reject(Error),
    /// Apply the reply, answer the command, then close the connection
    ProceedThenClose(Disconnect),
    /// Answer the command with an error frame, then close the connection
    RejectThenClose(Error, Disconnect),
}

impl Verdict {
    /// Interprets the `error` and `disconnect` fields of a hook reply
    pub fn of(error: Option<Error>, disconnect: Option<Disconnect>) -> Self {
        match (error, disconnect) {
            (None, None) => Verdict::Proceed,
            (Some(error), None) => Verdict::Reject(error),
            (None, Some(disconnect)) => Verdict::ProceedThenClose(disconnect),
            (Some(error), Some(disconnect)) => Verdict::RejectThenClose(error, disconnect),
        }
    }
}

/// Lease state derived from an expiration grant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// No lease, the grant never expires
    None,
    /// Lease runs out at the given instant
    At(Instant),
    /// Lease is already over
    Expired,
}

impl Expiry {
    /// Evaluates an expiration grant against the current wall clock
    ///
    /// A timestamp in the past is the same grant as an explicit expired
    /// flag. A future timestamp becomes a monotonic deadline so later
    /// wall clock adjustments cannot move the lease.
    pub fn evaluate(expired: bool, expire_at: Option<SystemTime>) -> Self {
        if expired {
            return Expiry::Expired;
        }
        match expire_at {
            None => Expiry::None,
            Some(at) => match at.duration_since(SystemTime::now()) {
                Ok(left) => Expiry::At(Instant::now() + left),
                Err(_) => Expiry::Expired,
            },
        }
    }

    /// Returns the deadline of a live lease, if any
    pub fn deadline(&self) -> Option<Instant> {
        match self {
            Expiry::At(at) => Some(*at),
            _ => None,
        }
    }
}

/// Computes the wire expiration fields for a lease
///
/// Returns the `expires` flag and the remaining seconds, rounded up so
/// a client never believes a lease outlives its grant.
pub fn lease_ttl(expire_at: Option<SystemTime>) -> (bool, u32) {
    match expire_at {
        None => (false, 0),
        Some(at) => match at.duration_since(SystemTime::now()) {
            Ok(left) => {
                let mut secs = left.as_secs();
                if left.subsec_nanos() > 0 {
                    secs += 1;
                }
                (true, secs.min(u32::MAX as u64) as u32)
            }
            Err(_) => (true, 0),
        },
    }
}
