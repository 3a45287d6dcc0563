//! # Types Module
//!
//! This module contains the core types used by the server: client
//! identification and per-connection serve parameters.
//!
//! ## Core Types
//!
//! - **ClientId**: Unique identifier for each client connection
//! - **ServeParams**: Configuration parameters for one served connection

use std::fmt::Display;
use std::time::Duration;

use uuid::Uuid;

use crate::context::Context;

/// Unique identifier for a client connection
///
/// This is a wrapper around a UUID that provides a human-readable
/// string representation and implements common traits for easy use.
///
/// ## Example
///
/// ```rust
/// use tokio_relay::server::types::ClientId;
///
/// let client_id = ClientId::new();
/// println!("Client ID: {}", client_id);
///
/// // Use as HashMap key
/// let mut clients = std::collections::HashMap::new();
/// clients.insert(client_id, "client_data");
/// ```
#[derive(Debug, Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Creates a new random client ID
    ///
    /// This generates a new UUID v4 for the client.
    ///
    /// ## Example
    ///
    /// ```rust
    /// use tokio_relay::server::types::ClientId;
    ///
    /// let id = ClientId::new();
    /// assert_ne!(id, ClientId::new()); // Each ID is unique
    /// ```
    pub fn new() -> Self {
        Default::default()
    }
}

impl Default for ClientId {
    /// Creates a default client ID (same as `new()`)
    fn default() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for ClientId {
    /// Formats the client ID as a hyphenated UUID string
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.as_hyphenated())
    }
}

/// Configuration parameters for one served connection
///
/// This struct controls client identification, the root context of the
/// connection and how long a single hook invocation may run.
///
/// ## Example
///
/// ```rust
/// use std::time::Duration;
/// use tokio_relay::server::types::{ClientId, ServeParams};
///
/// let params = ServeParams::new()
///     .with_client_id(ClientId::new())
///     .with_hook_deadline(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct ServeParams {
    /// Optional client ID to assign to this connection
    ///
    /// If `None`, a new random ID will be generated.
    pub client_id: Option<ClientId>,

    /// Root context of the connection (None for a fresh one)
    ///
    /// Cancelling it stops the connection worker and abandons any
    /// in-flight hook.
    pub context: Option<Context>,

    /// Upper bound on a single hook invocation (None to disable)
    ///
    /// Default is 30 seconds. A hook exceeding it closes the connection
    /// with a timeout reason.
    pub hook_deadline: Option<Duration>,
}

impl Default for ServeParams {
    /// Creates default serve parameters (same as `new()`)
    fn default() -> Self {
        Self::new()
    }
}

impl ServeParams {
    /// Creates default serve parameters
    pub fn new() -> Self {
        Self {
            client_id: None,
            context: None,
            hook_deadline: Some(Duration::from_secs(30)),
        }
    }

    /// Sets a specific client ID for this connection
    pub fn with_client_id(self, client_id: ClientId) -> Self {
        Self {
            client_id: Some(client_id),
            ..self
        }
    }

    /// Sets the root context for this connection
    ///
    /// ## Example
    ///
    /// ```rust
    /// use tokio_relay::context::Context;
    /// use tokio_relay::server::types::ServeParams;
    ///
    /// let ctx = Context::new();
    /// let params = ServeParams::new().with_context(ctx.clone());
    /// // ctx.cancel() later stops the connection.
    /// ```
    pub fn with_context(self, context: Context) -> Self {
        Self {
            context: Some(context),
            ..self
        }
    }

    /// Bounds every hook invocation on this connection
    pub fn with_hook_deadline(self, deadline: Duration) -> Self {
        Self {
            hook_deadline: Some(deadline),
            ..self
        }
    }

    /// Lets hooks run until the connection context is cancelled
    ///
    /// ## Example
    ///
    /// ```rust
    /// use tokio_relay::server::types::ServeParams;
    ///
    /// let params = ServeParams::new().without_hook_deadline();
    /// assert_eq!(params.hook_deadline, None);
    /// ```
    pub fn without_hook_deadline(self) -> Self {
        Self {
            hook_deadline: None,
            ..self
        }
    }
}
