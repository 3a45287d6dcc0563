//! Event and reply types exchanged with hook code.
//!
//! Events are immutable snapshots of what the server knows at one lifecycle
//! point; replies carry the host's decision back. A default-constructed reply
//! means "no opinion": the operation proceeds the way it would with no hook
//! registered at all.

use std::time::SystemTime;

use crate::context::Context;
use crate::errors::{Disconnect, Error};
use crate::protocol::ClientInfo;
use crate::server::types::ClientId;

/// Identity granted to a connection by the `on_connecting` hook.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Authenticated user id. Empty means anonymous.
    pub user_id: String,
    /// Absolute expiration of this identity. `None` never expires.
    pub expire_at: Option<SystemTime>,
    /// Opaque connection info attached to this client's publications.
    pub info: Vec<u8>,
}

#[derive(Debug, Clone)]
/// ConnectEvent is passed to the `on_connecting` hook while a connection is
/// being established.
pub struct ConnectEvent {
    pub client_id: ClientId,
    pub token: String,
    pub data: Vec<u8>,
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone)]
/// ConnectedEvent is passed to the `on_connected` hook once the handshake has
/// completed.
pub struct ConnectedEvent {
    pub client_id: ClientId,
    pub user_id: String,
}

#[derive(Debug, Clone)]
/// RefreshEvent is passed to the `on_refresh` hook when connection
/// credentials come up for re-validation. Fired by the server, never by the
/// client.
pub struct RefreshEvent {
    pub client_id: ClientId,
    pub user_id: String,
}

#[derive(Debug, Clone)]
/// SubscribeEvent is passed to the `on_subscribe` hook when a client asks to
/// join a channel.
pub struct SubscribeEvent {
    pub client_id: ClientId,
    pub user_id: String,
    pub channel: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
/// UnsubscribeEvent is passed to the `on_unsubscribe` hook when a
/// subscription goes away, whatever the cause.
pub struct UnsubscribeEvent {
    pub client_id: ClientId,
    pub channel: String,
}

#[derive(Debug, Clone)]
/// PublishEvent is passed to the `on_publish` hook when a client publishes
/// into a channel.
pub struct PublishEvent {
    pub client_id: ClientId,
    pub channel: String,
    pub data: Vec<u8>,
    /// Publisher identity as subscribers would see it.
    pub info: Option<ClientInfo>,
}

#[derive(Debug, Clone)]
/// SubRefreshEvent is passed to the `on_sub_refresh` hook when a subscription
/// comes up for re-validation.
pub struct SubRefreshEvent {
    pub client_id: ClientId,
    pub user_id: String,
    pub channel: String,
}

#[derive(Debug, Clone)]
/// RpcEvent is passed to the `on_rpc` hook for a client method call.
pub struct RpcEvent {
    pub client_id: ClientId,
    pub method: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
/// MessageEvent is passed to the `on_message` hook for a fire-and-forget
/// client message. No reply ever reaches the client.
pub struct MessageEvent {
    pub client_id: ClientId,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
/// DisconnectEvent is passed to the `on_disconnect` callback during teardown
/// of an established connection. Fired exactly once per connection.
pub struct DisconnectEvent {
    pub client_id: ClientId,
    /// The close reason actually applied.
    pub disconnect: Disconnect,
}

/// Decision of the `on_connecting` hook.
///
/// Default accepts the connection anonymously: no credentials, no channels,
/// no expiration.
#[derive(Debug, Clone, Default)]
pub struct ConnectReply {
    /// Replacement base context for the connection. Connecting is the only
    /// hook allowed to swap the context; any call deadline is stripped from
    /// the adopted value.
    pub context: Option<Context>,
    /// Identity granted to the connection. A past `expire_at` closes the
    /// connection as expired before the handshake completes.
    pub credentials: Option<Credentials>,
    /// Payload attached verbatim to the connect result.
    pub data: Vec<u8>,
    /// Channels subscribed server-side once the connection is established.
    /// No `on_subscribe` dispatch happens for these.
    pub channels: Vec<String>,
    /// Rejects the handshake. Fatal for the connection; the client sees the
    /// code with its canonical message, never the one set here.
    pub error: Option<Error>,
    /// Closes the connection without completing the handshake.
    pub disconnect: Option<Disconnect>,
}

/// Decision of the `on_refresh` hook.
///
/// Default means the connection never expires.
#[derive(Debug, Clone, Default)]
pub struct RefreshReply {
    /// Close the connection as expired right away. Equivalent to returning
    /// an `expire_at` in the past.
    pub expired: bool,
    /// Next re-validation deadline. `None` stops further refreshes.
    pub expire_at: Option<SystemTime>,
    /// Replaces the connection info carried in the client's publications.
    pub info: Option<Vec<u8>>,
    /// Fails closed: treated as an expiration of the connection.
    pub error: Option<Error>,
    pub disconnect: Option<Disconnect>,
}

/// Decision of the `on_subscribe` hook.
///
/// Default accepts the subscription without expiration or channel info.
#[derive(Debug, Clone, Default)]
pub struct SubscribeReply {
    /// Subscription expiration. A past value rejects the subscribe as
    /// expired.
    pub expire_at: Option<SystemTime>,
    /// Per-channel info attached to this client's publications in the
    /// channel.
    pub info: Vec<u8>,
    /// Rejects the subscribe; the connection stays open.
    pub error: Option<Error>,
    pub disconnect: Option<Disconnect>,
}

/// Decision of the `on_publish` hook.
///
/// Default lets the publication through unchanged.
#[derive(Debug, Clone, Default)]
pub struct PublishReply {
    /// Replaces the payload subscribers receive. `Some` wins even when
    /// empty; `None` keeps the client's payload.
    pub data: Option<Vec<u8>>,
    /// Suppresses the publication; the connection stays open.
    pub error: Option<Error>,
    pub disconnect: Option<Disconnect>,
}

/// Decision of the `on_sub_refresh` hook.
///
/// Default means the subscription never expires.
#[derive(Debug, Clone, Default)]
pub struct SubRefreshReply {
    /// Remove the subscription as expired right away. Equivalent to
    /// returning an `expire_at` in the past.
    pub expired: bool,
    /// Next re-validation deadline for this subscription. `None` stops
    /// further refreshes.
    pub expire_at: Option<SystemTime>,
    /// Replaces the channel info attached to this client's publications in
    /// the channel.
    pub info: Option<Vec<u8>>,
    /// Fails closed: treated as an expiration of this subscription only.
    pub error: Option<Error>,
    pub disconnect: Option<Disconnect>,
}

/// Decision of the `on_rpc` hook.
///
/// Without a registered hook every call is rejected as not available.
#[derive(Debug, Clone, Default)]
pub struct RpcReply {
    /// Result payload returned to the caller.
    pub data: Vec<u8>,
    /// Rejects the call; the connection stays open.
    pub error: Option<Error>,
    pub disconnect: Option<Disconnect>,
}
