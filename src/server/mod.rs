//! # Server Module
//!
//! This module provides the core server functionality for tokio-relay.
//! It drives connections over a decoded command stream and dispatches
//! lifecycle hooks for every client operation.
//!
//! ## Features
//!
//! - **Lifecycle Hooks**: One optional handler per connection event
//! - **Reply Interpretation**: Error and disconnect precedence applied uniformly
//! - **Expiration**: Connection and subscription leases with hook-driven renewal
//! - **Broker Seam**: Accepted publications handed to an external fanout layer
//!
//! ## Example
//!
//! ```rust
//! use tokio_relay::events::{ConnectReply, Credentials, RpcReply};
//! use tokio_relay::server::Server;
//!
//! let mut server = Server::new();
//!
//! server.on_connecting(|_ctx, event| async move {
//!     ConnectReply {
//!         credentials: Some(Credentials {
//!             user_id: format!("user-{}", event.client_id),
//!             ..Default::default()
//!         }),
//!         ..Default::default()
//!     }
//! });
//!
//! server.on_rpc(|_ctx, event| async move {
//!     RpcReply {
//!         data: event.data,
//!         ..Default::default()
//!     }
//! });
//! ```

use std::sync::Arc;

use futures::{Sink, Stream};

use crate::errors::Disconnect;
use crate::protocol::{Command, Reply};
use crate::server::hooks::{
    BrokerFn, ConnectedFn, ConnectingFn, HookSet, MessageFn, PublishFn, RefreshFn, RpcFn,
    SubRefreshFn, SubscribeFn, UnsubscribeFn,
};
use crate::server::types::ServeParams;
use crate::server::worker::serve_connection;

pub mod connection;
pub mod decision;
pub mod dispatch;
pub mod hooks;
pub mod types;
pub mod worker;

// Re-export commonly used types
pub use connection::ConnectionState;

/// Main server instance dispatching lifecycle hooks
///
/// This struct carries the hook set shared by every connection it
/// serves. Register hooks before serving begins: each call to
/// [`Server::serve`] snapshots the set, so later registrations do not
/// affect connections already being served.
///
/// ## Example
///
/// ```rust
/// use tokio_relay::errors::ErrorCode;
/// use tokio_relay::events::{PublishReply, SubscribeReply};
/// use tokio_relay::server::Server;
///
/// let mut server = Server::new();
///
/// // Only let clients into their own user channel
/// server.on_subscribe(|_ctx, event| async move {
///     if event.channel.starts_with("user:") && !event.channel.ends_with(&event.user_id) {
///         return SubscribeReply {
///             error: Some(ErrorCode::PERMISSION_DENIED.into()),
///             ..Default::default()
///         };
///     }
///     SubscribeReply::default()
/// });
///
/// server.on_publish(|_ctx, _event| async move { PublishReply::default() });
/// ```
#[derive(Default, Clone)]
pub struct Server {
    hooks: HookSet,
}

impl Server {
    /// Creates a new server instance with no hooks registered
    ///
    /// Without hooks the server accepts every handshake with anonymous
    /// credentials, answers RPC calls with a not available error and
    /// lets the remaining operations proceed with their defaults.
    ///
    /// ## Example
    ///
    /// ```rust
    /// use tokio_relay::server::Server;
    ///
    /// let server = Server::new();
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the hook deciding client handshakes
    ///
    /// The hook can authenticate the client, bind credentials, replace
    /// the connection context and list channels to subscribe the client
    /// to server-side. Setting `error` on the reply rejects the
    /// handshake; only a generic form of the error reaches the client.
    ///
    /// ## Arguments
    ///
    /// * `f` - Async function deciding the handshake
    ///
    /// ## Example
    ///
    /// ```rust
    /// use tokio_relay::errors::ErrorCode;
    /// use tokio_relay::events::{ConnectReply, Credentials};
    /// use tokio_relay::server::Server;
    ///
    /// let mut server = Server::new();
    ///
    /// server.on_connecting(|_ctx, event| async move {
    ///     if event.token.is_empty() {
    ///         return ConnectReply {
    ///             error: Some(ErrorCode::UNAUTHORIZED.into()),
    ///             ..Default::default()
    ///         };
    ///     }
    ///     ConnectReply {
    ///         credentials: Some(Credentials {
    ///             user_id: event.token,
    ///             ..Default::default()
    ///         }),
    ///         ..Default::default()
    ///     }
    /// });
    /// ```
    pub fn on_connecting<Fut>(
        &mut self,
        f: impl Fn(crate::context::Context, crate::events::ConnectEvent) -> Fut
            + Send
            + Sync
            + 'static,
    ) where
        Fut: std::future::Future<Output = crate::events::ConnectReply> + Send + 'static,
    {
        let wrap_f: ConnectingFn = Arc::new(
            move |ctx: crate::context::Context, event: crate::events::ConnectEvent| {
                Box::pin(f(ctx, event))
            },
        );
        self.hooks.connecting = Some(wrap_f);
    }

    /// Sets the hook observing established connections
    ///
    /// Called once per connection after the handshake reply has been
    /// queued. It carries no decision.
    ///
    /// ## Arguments
    ///
    /// * `f` - Async function receiving the connected client
    ///
    /// ## Example
    ///
    /// ```rust
    /// use tokio_relay::server::Server;
    ///
    /// let mut server = Server::new();
    ///
    /// server.on_connected(|_ctx, event| async move {
    ///     println!("client {} connected as {:?}", event.client_id, event.user_id);
    /// });
    /// ```
    pub fn on_connected<Fut>(
        &mut self,
        f: impl Fn(crate::context::Context, crate::events::ConnectedEvent) -> Fut
            + Send
            + Sync
            + 'static,
    ) where
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let wrap_f: ConnectedFn = Arc::new(
            move |ctx: crate::context::Context, event: crate::events::ConnectedEvent| {
                Box::pin(f(ctx, event))
            },
        );
        self.hooks.connected = Some(wrap_f);
    }

    /// Sets the hook renewing connection credentials
    ///
    /// Called when the credentials of a connection reach their
    /// expiration time. Without this hook an armed expiration lapses
    /// into a connection that never expires.
    ///
    /// ## Arguments
    ///
    /// * `f` - Async function producing the new lease
    ///
    /// ## Example
    ///
    /// ```rust
    /// use std::time::{Duration, SystemTime};
    /// use tokio_relay::events::RefreshReply;
    /// use tokio_relay::server::Server;
    ///
    /// let mut server = Server::new();
    ///
    /// server.on_refresh(|_ctx, _event| async move {
    ///     RefreshReply {
    ///         expire_at: Some(SystemTime::now() + Duration::from_secs(300)),
    ///         ..Default::default()
    ///     }
    /// });
    /// ```
    pub fn on_refresh<Fut>(
        &mut self,
        f: impl Fn(crate::context::Context, crate::events::RefreshEvent) -> Fut
            + Send
            + Sync
            + 'static,
    ) where
        Fut: std::future::Future<Output = crate::events::RefreshReply> + Send + 'static,
    {
        let wrap_f: RefreshFn = Arc::new(
            move |ctx: crate::context::Context, event: crate::events::RefreshEvent| {
                Box::pin(f(ctx, event))
            },
        );
        self.hooks.refresh = Some(wrap_f);
    }

    /// Sets the hook deciding channel subscriptions
    ///
    /// ## Arguments
    ///
    /// * `f` - Async function deciding the subscription request
    ///
    /// ## Example
    ///
    /// ```rust
    /// use tokio_relay::errors::ErrorCode;
    /// use tokio_relay::events::SubscribeReply;
    /// use tokio_relay::server::Server;
    ///
    /// let mut server = Server::new();
    ///
    /// server.on_subscribe(|_ctx, event| async move {
    ///     if !event.channel.starts_with("public:") {
    ///         return SubscribeReply {
    ///             error: Some(ErrorCode::PERMISSION_DENIED.into()),
    ///             ..Default::default()
    ///         };
    ///     }
    ///     SubscribeReply::default()
    /// });
    /// ```
    pub fn on_subscribe<Fut>(
        &mut self,
        f: impl Fn(crate::context::Context, crate::events::SubscribeEvent) -> Fut
            + Send
            + Sync
            + 'static,
    ) where
        Fut: std::future::Future<Output = crate::events::SubscribeReply> + Send + 'static,
    {
        let wrap_f: SubscribeFn = Arc::new(
            move |ctx: crate::context::Context, event: crate::events::SubscribeEvent| {
                Box::pin(f(ctx, event))
            },
        );
        self.hooks.subscribe = Some(wrap_f);
    }

    /// Sets the hook observing channel departure
    ///
    /// Called whenever a subscription ends, whether the client asked,
    /// the lease expired or the connection closed.
    ///
    /// ## Arguments
    ///
    /// * `f` - Async function receiving the ended subscription
    pub fn on_unsubscribe<Fut>(
        &mut self,
        f: impl Fn(crate::context::Context, crate::events::UnsubscribeEvent) -> Fut
            + Send
            + Sync
            + 'static,
    ) where
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let wrap_f: UnsubscribeFn = Arc::new(
            move |ctx: crate::context::Context, event: crate::events::UnsubscribeEvent| {
                Box::pin(f(ctx, event))
            },
        );
        self.hooks.unsubscribe = Some(wrap_f);
    }

    /// Sets the hook deciding client publications
    ///
    /// The hook may rewrite the payload before it reaches the broker by
    /// setting `data` on the reply.
    ///
    /// ## Arguments
    ///
    /// * `f` - Async function deciding the publication
    ///
    /// ## Example
    ///
    /// ```rust
    /// use tokio_relay::events::PublishReply;
    /// use tokio_relay::server::Server;
    ///
    /// let mut server = Server::new();
    ///
    /// server.on_publish(|_ctx, event| async move {
    ///     PublishReply {
    ///         data: Some(event.data.to_ascii_uppercase()),
    ///         ..Default::default()
    ///     }
    /// });
    /// ```
    pub fn on_publish<Fut>(
        &mut self,
        f: impl Fn(crate::context::Context, crate::events::PublishEvent) -> Fut
            + Send
            + Sync
            + 'static,
    ) where
        Fut: std::future::Future<Output = crate::events::PublishReply> + Send + 'static,
    {
        let wrap_f: PublishFn = Arc::new(
            move |ctx: crate::context::Context, event: crate::events::PublishEvent| {
                Box::pin(f(ctx, event))
            },
        );
        self.hooks.publish = Some(wrap_f);
    }

    /// Sets the hook renewing subscription leases
    ///
    /// Called when the lease of a subscription reaches its expiration
    /// time. Confirming the expiration removes the subscription but
    /// keeps the connection.
    ///
    /// ## Arguments
    ///
    /// * `f` - Async function producing the new lease
    pub fn on_sub_refresh<Fut>(
        &mut self,
        f: impl Fn(crate::context::Context, crate::events::SubRefreshEvent) -> Fut
            + Send
            + Sync
            + 'static,
    ) where
        Fut: std::future::Future<Output = crate::events::SubRefreshReply> + Send + 'static,
    {
        let wrap_f: SubRefreshFn = Arc::new(
            move |ctx: crate::context::Context, event: crate::events::SubRefreshEvent| {
                Box::pin(f(ctx, event))
            },
        );
        self.hooks.sub_refresh = Some(wrap_f);
    }

    /// Sets the hook answering application RPC calls
    ///
    /// Without this hook every RPC call is answered with a not
    /// available error.
    ///
    /// ## Arguments
    ///
    /// * `f` - Async function answering the call
    ///
    /// ## Example
    ///
    /// ```rust
    /// use tokio_relay::errors::ErrorCode;
    /// use tokio_relay::events::RpcReply;
    /// use tokio_relay::server::Server;
    ///
    /// let mut server = Server::new();
    ///
    /// server.on_rpc(|_ctx, event| async move {
    ///     match event.method.as_str() {
    ///         "ping" => RpcReply {
    ///             data: b"pong".to_vec(),
    ///             ..Default::default()
    ///         },
    ///         _ => RpcReply {
    ///             error: Some(ErrorCode::METHOD_NOT_FOUND.into()),
    ///             ..Default::default()
    ///         },
    ///     }
    /// });
    /// ```
    pub fn on_rpc<Fut>(
        &mut self,
        f: impl Fn(crate::context::Context, crate::events::RpcEvent) -> Fut + Send + Sync + 'static,
    ) where
        Fut: std::future::Future<Output = crate::events::RpcReply> + Send + 'static,
    {
        let wrap_f: RpcFn = Arc::new(
            move |ctx: crate::context::Context, event: crate::events::RpcEvent| {
                Box::pin(f(ctx, event))
            },
        );
        self.hooks.rpc = Some(wrap_f);
    }

    /// Sets the hook consuming fire-and-forget client messages
    ///
    /// ## Arguments
    ///
    /// * `f` - Async function receiving the message
    pub fn on_message<Fut>(
        &mut self,
        f: impl Fn(crate::context::Context, crate::events::MessageEvent) -> Fut
            + Send
            + Sync
            + 'static,
    ) where
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let wrap_f: MessageFn = Arc::new(
            move |ctx: crate::context::Context, event: crate::events::MessageEvent| {
                Box::pin(f(ctx, event))
            },
        );
        self.hooks.message = Some(wrap_f);
    }

    /// Sets the hook observing connection teardown
    ///
    /// Called exactly once when a previously connected client goes
    /// away, with the close reason. The hook is synchronous so it also
    /// runs when a connection is dropped outside its worker.
    ///
    /// ## Arguments
    ///
    /// * `f` - Function receiving the teardown notification
    ///
    /// ## Example
    ///
    /// ```rust
    /// use tokio_relay::server::Server;
    ///
    /// let mut server = Server::new();
    ///
    /// server.on_disconnect(|event| {
    ///     println!("client {} disconnected: {}", event.client_id, event.disconnect);
    /// });
    /// ```
    pub fn on_disconnect(
        &mut self,
        f: impl Fn(crate::events::DisconnectEvent) + Send + Sync + 'static,
    ) {
        self.hooks.disconnect = Some(Arc::new(f));
    }

    /// Sets the broker receiving accepted publications
    ///
    /// Every publication that passed the publish hook is handed to this
    /// callback with its final payload. Returning an error surfaces it
    /// to the publishing client. Without a broker, accepted
    /// publications are acknowledged and dropped.
    ///
    /// ## Arguments
    ///
    /// * `f` - Async function forwarding the publication
    ///
    /// ## Example
    ///
    /// ```rust
    /// use tokio_relay::server::Server;
    ///
    /// let mut server = Server::new();
    ///
    /// server.with_broker(|channel, publication| async move {
    ///     println!("fanout to {}: {} bytes", channel, publication.data.len());
    ///     Ok(())
    /// });
    /// ```
    pub fn with_broker<Fut>(
        &mut self,
        f: impl Fn(String, crate::protocol::Publication) -> Fut + Send + Sync + 'static,
    ) where
        Fut: std::future::Future<Output = Result<(), crate::errors::Error>> + Send + 'static,
    {
        let wrap_f: BrokerFn = Arc::new(
            move |channel: String, publication: crate::protocol::Publication| {
                Box::pin(f(channel, publication))
            },
        );
        self.hooks.broker = Some(wrap_f);
    }

    /// Starts serving one connection on the given endpoints
    ///
    /// This method takes a stream of decoded commands and a sink for
    /// replies, and drives the connection until it closes. The last
    /// item written to the sink is always a disconnect carrying the
    /// close reason.
    ///
    /// ## Arguments
    ///
    /// * `incoming` - Stream of decoded commands with their frame ids
    /// * `outgoing` - Sink taking numbered replies and the final disconnect
    /// * `params` - Per-connection serve parameters
    ///
    /// ## Example
    ///
    /// ```rust
    /// use futures::channel::mpsc;
    /// use tokio_relay::server::{Server, types::ServeParams};
    ///
    /// // In a real implementation the transport provides the endpoints
    /// // let (commands_tx, commands_rx) = mpsc::unbounded();
    /// // let (replies_tx, replies_rx) = mpsc::unbounded();
    ///
    /// // Serve the connection (in async context)
    /// // server.serve(commands_rx, replies_tx, ServeParams::new()).await;
    /// ```
    pub async fn serve<In, Out>(&self, incoming: In, outgoing: Out, params: ServeParams)
    where
        In: Stream<Item = (u32, Command)> + Send + Unpin + 'static,
        Out: Sink<Result<(u32, Reply), Disconnect>> + Send + Unpin + 'static,
    {
        serve_connection(incoming, outgoing, params, self.hooks.clone()).await;
    }
}
