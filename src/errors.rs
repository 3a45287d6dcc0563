use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

/// Code of an operation error reported to a client.
///
/// Codes below 1000 are reserved by the server; hosts may use their own
/// codes starting from 1000 in hook replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    pub const INTERNAL: ErrorCode = ErrorCode(100);
    pub const UNAUTHORIZED: ErrorCode = ErrorCode(101);
    pub const UNKNOWN_CHANNEL: ErrorCode = ErrorCode(102);
    pub const PERMISSION_DENIED: ErrorCode = ErrorCode(103);
    pub const METHOD_NOT_FOUND: ErrorCode = ErrorCode(104);
    pub const ALREADY_SUBSCRIBED: ErrorCode = ErrorCode(105);
    pub const LIMIT_EXCEEDED: ErrorCode = ErrorCode(106);
    pub const BAD_REQUEST: ErrorCode = ErrorCode(107);
    pub const NOT_AVAILABLE: ErrorCode = ErrorCode(108);
    pub const TOKEN_EXPIRED: ErrorCode = ErrorCode(109);
    pub const EXPIRED: ErrorCode = ErrorCode(110);
    pub const TOO_MANY_REQUESTS: ErrorCode = ErrorCode(111);

    /// Canonical message for this code.
    pub fn message(&self) -> &'static str {
        match *self {
            ErrorCode::INTERNAL => "internal server error",
            ErrorCode::UNAUTHORIZED => "unauthorized",
            ErrorCode::UNKNOWN_CHANNEL => "unknown channel",
            ErrorCode::PERMISSION_DENIED => "permission denied",
            ErrorCode::METHOD_NOT_FOUND => "method not found",
            ErrorCode::ALREADY_SUBSCRIBED => "already subscribed",
            ErrorCode::LIMIT_EXCEEDED => "limit exceeded",
            ErrorCode::BAD_REQUEST => "bad request",
            ErrorCode::NOT_AVAILABLE => "not available",
            ErrorCode::TOKEN_EXPIRED => "token expired",
            ErrorCode::EXPIRED => "expired",
            ErrorCode::TOO_MANY_REQUESTS => "too many requests",
            _ => "unknown error",
        }
    }

    /// Whether retrying the failed operation may succeed without any
    /// change on the client side.
    pub fn is_temporary(&self) -> bool {
        matches!(*self, ErrorCode::INTERNAL | ErrorCode::TOO_MANY_REQUESTS)
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

/// Structured error attached to a hook reply and sent to the client.
///
/// An error rejects the triggering operation; the connection itself
/// stays open unless the reply also carries a [`Disconnect`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub temporary: bool,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            temporary: code.is_temporary(),
        }
    }

    /// Internal server error with a host-supplied message.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::INTERNAL, message)
    }

    /// Same code, canonical message. Used where host-supplied detail
    /// must not reach the client.
    pub fn to_generic(&self) -> Self {
        Self {
            code: self.code,
            message: self.code.message().to_string(),
            temporary: self.temporary,
        }
    }
}

impl From<ErrorCode> for Error {
    fn from(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.message().to_string(),
            temporary: code.is_temporary(),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code.0)
    }
}

impl std::error::Error for Error {}

/// Code of a connection close reason.
///
/// Codes below 3500 tell a well-behaved client to reconnect; codes in the
/// 3500-3999 range mean the client should stay away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisconnectCode(pub u16);

impl DisconnectCode {
    pub const CONNECTION_CLOSED: DisconnectCode = DisconnectCode(3000);
    pub const SHUTDOWN: DisconnectCode = DisconnectCode(3001);
    pub const SERVER_ERROR: DisconnectCode = DisconnectCode(3002);
    pub const EXPIRED: DisconnectCode = DisconnectCode(3003);
    pub const SUB_EXPIRED: DisconnectCode = DisconnectCode(3004);
    pub const STALE: DisconnectCode = DisconnectCode(3005);
    pub const SLOW: DisconnectCode = DisconnectCode(3006);
    pub const WRITE_ERROR: DisconnectCode = DisconnectCode(3007);
    pub const INSUFFICIENT_STATE: DisconnectCode = DisconnectCode(3008);
    pub const FORCE_RECONNECT: DisconnectCode = DisconnectCode(3009);
    pub const NO_PONG: DisconnectCode = DisconnectCode(3010);
    pub const TOO_MANY_REQUESTS: DisconnectCode = DisconnectCode(3011);
    pub const TIMEOUT: DisconnectCode = DisconnectCode(3012);
    pub const INVALID_TOKEN: DisconnectCode = DisconnectCode(3500);
    pub const BAD_REQUEST: DisconnectCode = DisconnectCode(3501);
    pub const FORCE_DISCONNECT: DisconnectCode = DisconnectCode(3502);
    pub const CONNECTION_LIMIT: DisconnectCode = DisconnectCode(3503);
    pub const CHANNEL_LIMIT: DisconnectCode = DisconnectCode(3504);

    /// Canonical reason for this code.
    pub fn reason(&self) -> &'static str {
        match *self {
            DisconnectCode::CONNECTION_CLOSED => "connection closed",
            DisconnectCode::SHUTDOWN => "shutdown",
            DisconnectCode::SERVER_ERROR => "internal server error",
            DisconnectCode::EXPIRED => "connection expired",
            DisconnectCode::SUB_EXPIRED => "subscription expired",
            DisconnectCode::STALE => "stale",
            DisconnectCode::SLOW => "slow",
            DisconnectCode::WRITE_ERROR => "write error",
            DisconnectCode::INSUFFICIENT_STATE => "insufficient state",
            DisconnectCode::FORCE_RECONNECT => "force reconnect",
            DisconnectCode::NO_PONG => "no pong",
            DisconnectCode::TOO_MANY_REQUESTS => "too many requests",
            DisconnectCode::TIMEOUT => "timeout",
            DisconnectCode::INVALID_TOKEN => "invalid token",
            DisconnectCode::BAD_REQUEST => "bad request",
            DisconnectCode::FORCE_DISCONNECT => "force disconnect",
            DisconnectCode::CONNECTION_LIMIT => "connection limit",
            DisconnectCode::CHANNEL_LIMIT => "channel limit",
            _ => "disconnected",
        }
    }

    pub fn should_reconnect(&self) -> bool {
        self.0 < 3500
    }
}

impl Display for DisconnectCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason())
    }
}

/// Close reason attached to a hook reply or produced by the server itself.
///
/// Applied after every other effect of the reply it rides on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disconnect {
    pub code: DisconnectCode,
    pub reason: String,
}

impl Disconnect {
    pub fn new(code: DisconnectCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

impl From<DisconnectCode> for Disconnect {
    fn from(code: DisconnectCode) -> Self {
        Self {
            code,
            reason: code.reason().to_string(),
        }
    }
}

impl Display for Disconnect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.reason, self.code.0)
    }
}

/// Why a hook invocation produced no reply.
#[derive(ThisError, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookFault {
    #[error("connection context cancelled")]
    Cancelled,
    #[error("hook deadline exceeded")]
    Deadline,
    #[error("hook panicked")]
    Panicked,
}
