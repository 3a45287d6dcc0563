//! # Hooks Module
//!
//! This module defines the hook function types used throughout the server.
//! Hooks observe and steer the lifecycle of each connection: a handler
//! receives an immutable event snapshot and returns a reply struct that
//! the server interprets before answering the client.
//!
//! ## Hook Types
//!
//! - **ConnectingFn**: Decides whether a handshake is accepted
//! - **ConnectedFn**: Observes an established connection
//! - **RefreshFn**: Renews connection credentials near expiry
//! - **SubscribeFn**: Decides channel subscription requests
//! - **UnsubscribeFn**: Observes channel departure
//! - **PublishFn**: Decides client publications
//! - **SubRefreshFn**: Renews subscription leases near expiry
//! - **RpcFn**: Answers application RPC calls
//! - **MessageFn**: Consumes fire-and-forget client messages
//! - **DisconnectFn**: Observes connection teardown
//! - **BrokerFn**: Forwards accepted publications to the fanout layer

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::errors::Error;
use crate::events::{
    ConnectEvent, ConnectReply, ConnectedEvent, DisconnectEvent, MessageEvent, PublishEvent,
    PublishReply, RefreshEvent, RefreshReply, RpcEvent, RpcReply, SubRefreshEvent, SubRefreshReply,
    SubscribeEvent, SubscribeReply, UnsubscribeEvent,
};
use crate::protocol::Publication;

/// Function type for deciding client handshakes
///
/// This hook is called when a client attempts to establish a connection.
/// It can perform authentication, attach credentials and context values,
/// or reject the attempt.
///
/// ## Arguments
///
/// * `ctx` - Root context of the connection
/// * `event` - Handshake data sent by the client
///
/// ## Returns
///
/// A [`ConnectReply`]. An empty reply accepts the connection with
/// anonymous credentials; setting `error` rejects the handshake and
/// closes the connection.
///
/// ## Example
///
/// ```rust
/// use tokio_relay::context::Context;
/// use tokio_relay::errors::ErrorCode;
/// use tokio_relay::events::{ConnectEvent, ConnectReply};
/// use tokio_relay::server::hooks::ConnectingFn;
/// use std::sync::Arc;
///
/// let connecting: ConnectingFn = Arc::new(|_ctx: Context, event: ConnectEvent| {
///     Box::pin(async move {
///         if event.token.is_empty() {
///             return ConnectReply {
///                 error: Some(ErrorCode::UNAUTHORIZED.into()),
///                 ..Default::default()
///             };
///         }
///         ConnectReply::default()
///     })
/// });
/// ```
pub type ConnectingFn = Arc<
    dyn Fn(Context, ConnectEvent) -> Pin<Box<dyn Future<Output = ConnectReply> + Send>>
        + Send
        + Sync,
>;

/// Function type for observing established connections
///
/// This hook is called once the handshake reply has been queued for the
/// client. It has no reply and cannot fail the connection.
///
/// ## Arguments
///
/// * `ctx` - Context of the connection
/// * `event` - Identity of the freshly connected client
///
/// ## Example
///
/// ```rust
/// use tokio_relay::context::Context;
/// use tokio_relay::events::ConnectedEvent;
/// use tokio_relay::server::hooks::ConnectedFn;
/// use std::sync::Arc;
///
/// let connected: ConnectedFn = Arc::new(|_ctx: Context, event: ConnectedEvent| {
///     Box::pin(async move {
///         println!("client {} connected as {:?}", event.client_id, event.user_id);
///     })
/// });
/// ```
pub type ConnectedFn = Arc<
    dyn Fn(Context, ConnectedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync,
>;

/// Function type for renewing connection credentials
///
/// This hook is called when the credentials of a connection are about to
/// expire. It can extend the lease or confirm the expiration.
///
/// ## Arguments
///
/// * `ctx` - Context of the connection
/// * `event` - Identity of the client whose credentials expire
///
/// ## Returns
///
/// A [`RefreshReply`]. Leaving it at its default confirms the
/// expiration and closes the connection.
///
/// ## Example
///
/// ```rust
/// use tokio_relay::context::Context;
/// use tokio_relay::events::{RefreshEvent, RefreshReply};
/// use tokio_relay::server::hooks::RefreshFn;
/// use std::sync::Arc;
/// use std::time::{Duration, SystemTime};
///
/// let refresh: RefreshFn = Arc::new(|_ctx: Context, _event: RefreshEvent| {
///     Box::pin(async move {
///         RefreshReply {
///             expire_at: Some(SystemTime::now() + Duration::from_secs(300)),
///             ..Default::default()
///         }
///     })
/// });
/// ```
pub type RefreshFn = Arc<
    dyn Fn(Context, RefreshEvent) -> Pin<Box<dyn Future<Output = RefreshReply> + Send>>
        + Send
        + Sync,
>;

/// Function type for deciding channel subscriptions
///
/// This hook is called when a client asks to subscribe to a channel.
/// It can check permissions, attach channel info or put a lease on the
/// subscription.
///
/// ## Arguments
///
/// * `ctx` - Context of the connection
/// * `event` - Requested channel and the identity of the requester
///
/// ## Returns
///
/// A [`SubscribeReply`]. An empty reply accepts the subscription without
/// a lease; setting `error` rejects it while keeping the connection.
///
/// ## Example
///
/// ```rust
/// use tokio_relay::context::Context;
/// use tokio_relay::errors::ErrorCode;
/// use tokio_relay::events::{SubscribeEvent, SubscribeReply};
/// use tokio_relay::server::hooks::SubscribeFn;
/// use std::sync::Arc;
///
/// let subscribe: SubscribeFn = Arc::new(|_ctx: Context, event: SubscribeEvent| {
///     Box::pin(async move {
///         if !event.channel.starts_with("public:") {
///             return SubscribeReply {
///                 error: Some(ErrorCode::PERMISSION_DENIED.into()),
///                 ..Default::default()
///             };
///         }
///         SubscribeReply::default()
///     })
/// });
/// ```
pub type SubscribeFn = Arc<
    dyn Fn(Context, SubscribeEvent) -> Pin<Box<dyn Future<Output = SubscribeReply> + Send>>
        + Send
        + Sync,
>;

/// Function type for observing channel departure
///
/// This hook is called when a subscription ends for any reason. It has
/// no reply.
///
/// ## Arguments
///
/// * `ctx` - Context of the connection
/// * `event` - Channel the client left
///
/// ## Example
///
/// ```rust
/// use tokio_relay::context::Context;
/// use tokio_relay::events::UnsubscribeEvent;
/// use tokio_relay::server::hooks::UnsubscribeFn;
/// use std::sync::Arc;
///
/// let unsubscribe: UnsubscribeFn = Arc::new(|_ctx: Context, event: UnsubscribeEvent| {
///     Box::pin(async move {
///         println!("client {} left {}", event.client_id, event.channel);
///     })
/// });
/// ```
pub type UnsubscribeFn = Arc<
    dyn Fn(Context, UnsubscribeEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync,
>;

/// Function type for deciding client publications
///
/// This hook is called when a client publishes data to a channel it is
/// subscribed to. It can validate or rewrite the payload before the
/// publication reaches the broker.
///
/// ## Arguments
///
/// * `ctx` - Context of the connection
/// * `event` - Channel, payload and the identity of the publisher
///
/// ## Returns
///
/// A [`PublishReply`]. An empty reply forwards the payload unchanged;
/// setting `data` replaces it, setting `error` rejects the publication.
///
/// ## Example
///
/// ```rust
/// use tokio_relay::context::Context;
/// use tokio_relay::events::{PublishEvent, PublishReply};
/// use tokio_relay::server::hooks::PublishFn;
/// use std::sync::Arc;
///
/// let publish: PublishFn = Arc::new(|_ctx: Context, event: PublishEvent| {
///     Box::pin(async move {
///         println!("client {} published to {}", event.client_id, event.channel);
///         PublishReply::default()
///     })
/// });
/// ```
pub type PublishFn = Arc<
    dyn Fn(Context, PublishEvent) -> Pin<Box<dyn Future<Output = PublishReply> + Send>>
        + Send
        + Sync,
>;

/// Function type for renewing subscription leases
///
/// This hook is called when the lease of a single subscription is about
/// to expire. It can extend the lease or confirm the expiration, which
/// removes the subscription but keeps the connection.
///
/// ## Arguments
///
/// * `ctx` - Context of the connection
/// * `event` - Channel whose lease expires
///
/// ## Returns
///
/// A [`SubRefreshReply`]. Leaving it at its default confirms the
/// expiration.
///
/// ## Example
///
/// ```rust
/// use tokio_relay::context::Context;
/// use tokio_relay::events::{SubRefreshEvent, SubRefreshReply};
/// use tokio_relay::server::hooks::SubRefreshFn;
/// use std::sync::Arc;
/// use std::time::{Duration, SystemTime};
///
/// let sub_refresh: SubRefreshFn = Arc::new(|_ctx: Context, _event: SubRefreshEvent| {
///     Box::pin(async move {
///         SubRefreshReply {
///             expire_at: Some(SystemTime::now() + Duration::from_secs(60)),
///             ..Default::default()
///         }
///     })
/// });
/// ```
pub type SubRefreshFn = Arc<
    dyn Fn(Context, SubRefreshEvent) -> Pin<Box<dyn Future<Output = SubRefreshReply> + Send>>
        + Send
        + Sync,
>;

/// Function type for answering application RPC calls
///
/// This hook is called when a client invokes a named method. Without a
/// registered handler every call is answered with a not available error.
///
/// ## Arguments
///
/// * `ctx` - Context of the connection
/// * `event` - Method name and raw request payload
///
/// ## Returns
///
/// An [`RpcReply`] carrying the raw response payload or an error.
///
/// ## Example
///
/// ```rust
/// use tokio_relay::context::Context;
/// use tokio_relay::errors::ErrorCode;
/// use tokio_relay::events::{RpcEvent, RpcReply};
/// use tokio_relay::server::hooks::RpcFn;
/// use std::sync::Arc;
///
/// let rpc: RpcFn = Arc::new(|_ctx: Context, event: RpcEvent| {
///     Box::pin(async move {
///         match event.method.as_str() {
///             "ping" => RpcReply {
///                 data: b"pong".to_vec(),
///                 ..Default::default()
///             },
///             _ => RpcReply {
///                 error: Some(ErrorCode::METHOD_NOT_FOUND.into()),
///                 ..Default::default()
///             },
///         }
///     })
/// });
/// ```
pub type RpcFn = Arc<
    dyn Fn(Context, RpcEvent) -> Pin<Box<dyn Future<Output = RpcReply> + Send>> + Send + Sync,
>;

/// Function type for consuming fire-and-forget client messages
///
/// This hook is called when a client sends a message that expects no
/// reply. It has no reply and the client is never answered.
///
/// ## Arguments
///
/// * `ctx` - Context of the connection
/// * `event` - Raw message payload
///
/// ## Example
///
/// ```rust
/// use tokio_relay::context::Context;
/// use tokio_relay::events::MessageEvent;
/// use tokio_relay::server::hooks::MessageFn;
/// use std::sync::Arc;
///
/// let message: MessageFn = Arc::new(|_ctx: Context, event: MessageEvent| {
///     Box::pin(async move {
///         println!("client {} sent {} bytes", event.client_id, event.data.len());
///     })
/// });
/// ```
pub type MessageFn = Arc<
    dyn Fn(Context, MessageEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync,
>;

/// Function type for observing connection teardown
///
/// This hook is called exactly once when a previously connected client
/// goes away. It is synchronous so it can also run from drop handlers
/// outside any async runtime.
///
/// ## Arguments
///
/// * `event` - Identity of the client and the close reason
///
/// ## Example
///
/// ```rust
/// use tokio_relay::events::DisconnectEvent;
/// use tokio_relay::server::hooks::DisconnectFn;
/// use std::sync::Arc;
///
/// let disconnect: DisconnectFn = Arc::new(|event: DisconnectEvent| {
///     println!("client {} disconnected: {}", event.client_id, event.disconnect);
/// });
/// ```
pub type DisconnectFn = Arc<dyn Fn(DisconnectEvent) + Send + Sync>;

/// Function type for forwarding accepted publications
///
/// The broker receives every publication that passed the publish hook.
/// Returning an error surfaces it to the publishing client.
///
/// ## Arguments
///
/// * `channel` - Channel the publication belongs to
/// * `publication` - Final payload and publisher info
///
/// ## Returns
///
/// * `Ok(())` - Publication was handed to the fanout layer
/// * `Err(Error)` - Publication failed with a specific error
///
/// ## Example
///
/// ```rust
/// use tokio_relay::protocol::Publication;
/// use tokio_relay::server::hooks::BrokerFn;
/// use std::sync::Arc;
///
/// let broker: BrokerFn = Arc::new(|channel: String, publication: Publication| {
///     Box::pin(async move {
///         println!("fanout to {}: {} bytes", channel, publication.data.len());
///         Ok(())
///     })
/// });
/// ```
pub type BrokerFn = Arc<
    dyn Fn(String, Publication) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send>>
        + Send
        + Sync,
>;

/// Set of registered hooks shared by every connection of a server
///
/// All hooks are optional. A connection served with an empty set accepts
/// every handshake with anonymous credentials, answers RPC calls with a
/// not available error and lets the remaining operations proceed with
/// their defaults.
///
/// ## Example
///
/// ```rust
/// use tokio_relay::server::hooks::HookSet;
///
/// let hooks = HookSet::default();
/// assert!(hooks.connecting.is_none());
/// ```
#[derive(Clone, Default)]
pub struct HookSet {
    pub connecting: Option<ConnectingFn>,
    pub connected: Option<ConnectedFn>,
    pub refresh: Option<RefreshFn>,
    pub subscribe: Option<SubscribeFn>,
    pub unsubscribe: Option<UnsubscribeFn>,
    pub publish: Option<PublishFn>,
    pub sub_refresh: Option<SubRefreshFn>,
    pub rpc: Option<RpcFn>,
    pub message: Option<MessageFn>,
    pub disconnect: Option<DisconnectFn>,
    pub broker: Option<BrokerFn>,
}
