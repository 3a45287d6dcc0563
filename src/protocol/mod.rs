//! # Protocol Module
//!
//! This module defines the value types crossing the transport seam: commands
//! a client sends, replies and pushes the server produces. No wire format is
//! defined here; the transport layer owns framing and encoding, and every
//! type derives serde so it can pick one.
//!
//! ## Core Types
//!
//! - **Command**: client-to-server operations
//! - **Reply**: server-to-client responses, correlated by frame id
//! - **Push**: server-initiated messages for one channel
//!
//! ## Example
//!
//! ```rust
//! use tokio_relay::protocol::{Command, ConnectRequest, ConnectResult, Reply};
//!
//! let command = Command::Connect(ConnectRequest {
//!     token: "auth-token".to_string(),
//!     name: "js".to_string(),
//!     ..Default::default()
//! });
//!
//! let reply = Reply::Connect(ConnectResult {
//!     client: "client-id".to_string(),
//!     ..Default::default()
//! });
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Client-to-server commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Establish the connection, carrying authentication material
    Connect(ConnectRequest),
    /// Subscribe to a channel
    Subscribe(SubscribeRequest),
    /// Unsubscribe from a channel
    Unsubscribe(UnsubscribeRequest),
    /// Publish data into a channel
    Publish(PublishRequest),
    /// Fire-and-forget message to the server
    Send(SendRequest),
    /// Call a server method
    Rpc(RpcRequest),
}

/// Server-to-client replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    /// Server-initiated push, frame id 0
    Push(Push),
    /// Error response to a command
    Error(Error),
    /// Connection establishment result
    Connect(ConnectResult),
    /// Subscription result
    Subscribe(SubscribeResult),
    /// Unsubscription result
    Unsubscribe(UnsubscribeResult),
    /// Publication result
    Publish(PublishResult),
    /// Method call result
    Rpc(RpcResult),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectRequest {
    #[serde(default, skip_serializing_if = "is_default")]
    pub token: String,
    #[serde(default, skip_serializing_if = "is_default")]
    pub data: Vec<u8>,
    #[serde(default, skip_serializing_if = "is_default")]
    pub name: String,
    #[serde(default, skip_serializing_if = "is_default")]
    pub version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub channel: String,
    #[serde(default, skip_serializing_if = "is_default")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnsubscribeRequest {
    pub channel: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishRequest {
    pub channel: String,
    #[serde(default, skip_serializing_if = "is_default")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendRequest {
    #[serde(default, skip_serializing_if = "is_default")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(default, skip_serializing_if = "is_default")]
    pub method: String,
    #[serde(default, skip_serializing_if = "is_default")]
    pub data: Vec<u8>,
}

/// Result of a successful connect.
///
/// `subs` lists subscriptions established server-side during the handshake.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectResult {
    pub client: String,
    #[serde(default, skip_serializing_if = "is_default")]
    pub version: String,
    #[serde(default, skip_serializing_if = "is_default")]
    pub data: Vec<u8>,
    #[serde(default, skip_serializing_if = "is_default")]
    pub expires: bool,
    #[serde(default, skip_serializing_if = "is_default")]
    pub ttl: u32,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub subs: HashMap<String, SubscribeResult>,
}

/// Result of a successful subscribe.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscribeResult {
    #[serde(default, skip_serializing_if = "is_default")]
    pub expires: bool,
    #[serde(default, skip_serializing_if = "is_default")]
    pub ttl: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnsubscribeResult {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishResult {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RpcResult {
    #[serde(default, skip_serializing_if = "is_default")]
    pub data: Vec<u8>,
}

/// Server-initiated message for one channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Push {
    pub channel: String,
    pub data: PushData,
}

/// Payload of a [`Push`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushData {
    /// New publication in the channel
    Publication(Publication),
    /// The server removed the client's subscription
    Unsubscribe(Unsubscribe),
    /// Plain message outside any subscription
    Message(Message),
}

/// A publication as delivered to subscribers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Publication {
    #[serde(default, skip_serializing_if = "is_default")]
    pub data: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<ClientInfo>,
}

/// Identity of the publishing client as subscribers see it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client: String,
    #[serde(default, skip_serializing_if = "is_default")]
    pub user: String,
    #[serde(default, skip_serializing_if = "is_default")]
    pub conn_info: Vec<u8>,
    #[serde(default, skip_serializing_if = "is_default")]
    pub chan_info: Vec<u8>,
}

/// Server-initiated unsubscription notice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Unsubscribe {
    pub code: u32,
    #[serde(default, skip_serializing_if = "is_default")]
    pub reason: String,
}

impl Unsubscribe {
    /// The channel was closed on the server side.
    pub fn channel_closed() -> Self {
        Self {
            code: 2500,
            reason: "channel closed".to_string(),
        }
    }

    /// The subscription expired and was removed.
    pub fn expired() -> Self {
        Self {
            code: 2501,
            reason: "subscription expired".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "is_default")]
    pub data: Vec<u8>,
}

fn is_default<T: Default + PartialEq>(value: &T) -> bool {
    *value == T::default()
}
