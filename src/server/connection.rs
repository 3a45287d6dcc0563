//! # Connection Module
//!
//! This module drives a single client connection: state tracking,
//! command processing, hook dispatch and expiration bookkeeping.
//!
//! ## Core Components
//!
//! - **Connection**: Main handler for one client connection
//! - **ConnectionState**: Tracks the current state of the connection
//! - **Subscription**: Lease bookkeeping for one channel subscription
//!
//! ## Connection Lifecycle
//!
//! 1. **Connecting**: Client sent nothing yet, only a connect command is accepted
//! 2. **Connected**: Handshake done, all other commands are accepted
//! 3. **Closed**: Connection is torn down, terminal

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::context::Context;
use crate::errors::{Disconnect, DisconnectCode, Error, ErrorCode, HookFault};
use crate::events::{
    ConnectEvent, ConnectReply, ConnectedEvent, Credentials, DisconnectEvent, MessageEvent,
    PublishEvent, PublishReply, RefreshEvent, RefreshReply, RpcEvent, SubRefreshEvent,
    SubRefreshReply, SubscribeEvent, SubscribeReply, UnsubscribeEvent,
};
use crate::protocol::{
    ClientInfo, Command, ConnectRequest, ConnectResult, Publication, PublishRequest, PublishResult,
    Push, PushData, Reply, RpcRequest, RpcResult, SendRequest, SubscribeRequest, SubscribeResult,
    Unsubscribe, UnsubscribeRequest, UnsubscribeResult,
};
use crate::server::decision::{lease_ttl, Expiry, Verdict};
use crate::server::dispatch;
use crate::server::hooks::HookSet;
use crate::server::types::{ClientId, ServeParams};

/// Represents the current state of a client connection
///
/// ## State Transitions
///
/// - **Connecting** → **Connected**: After an accepted handshake
/// - **Connecting** → **Closed**: Rejected handshake or transport failure
/// - **Connected** → **Closed**: Disconnect decision, expiration or transport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Client has connected but the handshake is not done yet
    Connecting,
    /// Handshake accepted, client can send commands
    Connected,
    /// Connection is torn down
    Closed,
}

/// Lease bookkeeping for one channel subscription
struct Subscription {
    /// Deadline at which the lease must be renewed
    deadline: Option<Instant>,
    /// Channel info attached by the subscribe hook
    info: Vec<u8>,
}

/// Main handler for a single client connection
///
/// The connection interprets client commands, dispatches hooks one at a
/// time and applies their replies. All of its state is owned exclusively
/// by the worker driving it, so no locking is needed.
///
/// ## Features
///
/// - **State Management**: Enforces the handshake-first protocol rule
/// - **Hook Dispatch**: Runs at most one hook of this connection at a time
/// - **Reply Interpretation**: Error and disconnect precedence, payload overrides
/// - **Expiration**: Tracks connection and subscription leases and re-validates them
pub struct Connection {
    /// Identifier of this client
    client_id: ClientId,
    /// Current connection state
    state: ConnectionState,
    /// Context passed to every hook of this connection
    context: Context,
    /// Upper bound on a single hook invocation
    hook_deadline: Option<Duration>,
    /// Hooks registered on the server
    hooks: HookSet,
    /// Credentials bound by the connect hook
    credentials: Credentials,
    /// Deadline at which the credentials must be renewed
    deadline: Option<Instant>,
    /// Active subscriptions of this client
    subscriptions: HashMap<String, Subscription>,
    /// Channel for sending replies to the client
    reply_ch: tokio::sync::mpsc::Sender<Result<(u32, Reply), Disconnect>>,
}

impl Connection {
    /// Creates a new connection in the `Connecting` state
    ///
    /// ## Arguments
    ///
    /// * `params` - Per-connection serve parameters
    /// * `hooks` - Hooks registered on the server
    /// * `reply_ch` - Channel for sending replies to the client
    pub fn new(
        params: ServeParams,
        hooks: HookSet,
        reply_ch: tokio::sync::mpsc::Sender<Result<(u32, Reply), Disconnect>>,
    ) -> Self {
        Self {
            client_id: params.client_id.unwrap_or_default(),
            state: ConnectionState::Connecting,
            context: params.context.unwrap_or_default(),
            hook_deadline: params.hook_deadline,
            hooks,
            credentials: Credentials::default(),
            deadline: None,
            subscriptions: HashMap::new(),
            reply_ch,
        }
    }

    /// Returns the current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns the identifier of this client
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Returns the current context of the connection
    ///
    /// This starts as the root context from the serve parameters and is
    /// replaced once if the connect hook returns an override.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Processes a command from the client
    ///
    /// Replies are sent through the reply channel. An `Err` means the
    /// connection must be torn down with the returned reason.
    ///
    /// ## Arguments
    ///
    /// * `id` - Command ID for response correlation
    /// * `command` - The command to process
    ///
    /// ## State-Based Processing
    ///
    /// - **Connecting**: Only accepts a connect command
    /// - **Connected**: Accepts all commands except connect
    pub async fn process_command(&mut self, id: u32, command: Command) -> Result<(), Disconnect> {
        match self.state {
            ConnectionState::Connecting => match command {
                Command::Connect(request) => self.handle_connect(id, request).await,
                _ => {
                    log::debug!("expected connect request, got: {:?}", command);
                    Err(DisconnectCode::BAD_REQUEST.into())
                }
            },
            ConnectionState::Connected => match command {
                Command::Connect(_) => {
                    log::debug!("client already authenticated");
                    Err(DisconnectCode::BAD_REQUEST.into())
                }
                Command::Subscribe(request) => self.handle_subscribe(id, request).await,
                Command::Unsubscribe(request) => self.handle_unsubscribe(id, request).await,
                Command::Publish(request) => self.handle_publish(id, request).await,
                Command::Send(request) => self.handle_send(request).await,
                Command::Rpc(request) => self.handle_rpc(id, request).await,
            },
            ConnectionState::Closed => Ok(()),
        }
    }

    /// Returns the earliest lease deadline of this connection, if any
    ///
    /// Covers the connection credentials and every subscription. The
    /// worker parks its expiration timer on this instant.
    pub fn next_deadline(&self) -> Option<Instant> {
        let mut next = self.deadline;
        for sub in self.subscriptions.values() {
            next = match (next, sub.deadline) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
        }
        next
    }

    /// Re-validates every lease that is due
    ///
    /// Runs the refresh hook for due connection credentials and the sub
    /// refresh hook for every due subscription. An `Err` means the
    /// connection must be torn down with the returned reason.
    pub async fn run_expirations(&mut self) -> Result<(), Disconnect> {
        let now = Instant::now();

        if self.deadline.is_some_and(|at| at <= now) {
            self.refresh_connection().await?;
        }

        let due: Vec<String> = self
            .subscriptions
            .iter()
            .filter(|(_, sub)| sub.deadline.is_some_and(|at| at <= now))
            .map(|(channel, _)| channel.clone())
            .collect();
        for channel in due {
            self.refresh_subscription(channel).await?;
        }
        Ok(())
    }

    /// Tears the connection down with the given reason
    ///
    /// If the client was connected, this notifies the unsubscribe hook
    /// for every remaining subscription and then the disconnect hook,
    /// exactly once. Later calls are no-ops.
    pub async fn shutdown(&mut self, disconnect: &Disconnect) {
        if self.state != ConnectionState::Connected {
            self.state = ConnectionState::Closed;
            return;
        }
        self.state = ConnectionState::Closed;

        for channel in std::mem::take(&mut self.subscriptions).into_keys() {
            if let Some(hook) = self.hooks.unsubscribe.clone() {
                let event = UnsubscribeEvent {
                    client_id: self.client_id,
                    channel,
                };
                let fut = hook(self.context.clone(), event);
                if let Err(fault) = dispatch::invoke(&self.context, self.hook_deadline, fut).await {
                    log::debug!("unsubscribe hook failed during shutdown: {}", fault);
                }
            }
        }

        if let Some(hook) = &self.hooks.disconnect {
            hook(DisconnectEvent {
                client_id: self.client_id,
                disconnect: disconnect.clone(),
            });
        }
    }

    async fn handle_connect(&mut self, id: u32, request: ConnectRequest) -> Result<(), Disconnect> {
        log::debug!(
            "connection established with name={}, version={}",
            request.name,
            request.version
        );

        let event = ConnectEvent {
            client_id: self.client_id,
            token: request.token,
            data: request.data,
            name: request.name,
            version: request.version,
        };

        let mut reply = match self.hooks.connecting.clone() {
            Some(hook) => {
                let fut = hook(self.context.clone(), event);
                match dispatch::invoke(&self.context, self.hook_deadline, fut).await {
                    Ok(reply) => reply,
                    Err(fault) => {
                        let error = self.decision_fault("connect", fault)?;
                        let _ = self
                            .reply_ch
                            .send(Ok((id, Reply::Error(error.to_generic()))))
                            .await;
                        return Err(DisconnectCode::SERVER_ERROR.into());
                    }
                }
            }
            None => ConnectReply::default(),
        };

        // an error on the handshake is always fatal, and only the generic
        // form of it goes to the client
        let close_after = match Verdict::of(reply.error.take(), reply.disconnect.take()) {
            Verdict::Proceed => None,
            Verdict::ProceedThenClose(disconnect) => Some(disconnect),
            Verdict::Reject(error) => {
                log::debug!("authentication failed: {}", error);
                let _ = self
                    .reply_ch
                    .send(Ok((id, Reply::Error(error.to_generic()))))
                    .await;
                return Err(DisconnectCode::CONNECTION_CLOSED.into());
            }
            Verdict::RejectThenClose(error, disconnect) => {
                log::debug!("authentication failed: {}", error);
                let _ = self
                    .reply_ch
                    .send(Ok((id, Reply::Error(error.to_generic()))))
                    .await;
                return Err(disconnect);
            }
        };

        if let Some(context) = reply.context.take() {
            // a call deadline on the adopted context would outlive the
            // call it was scoped to
            self.context = context.without_deadline();
        }

        let credentials = reply.credentials.take().unwrap_or_default();
        match Expiry::evaluate(false, credentials.expire_at) {
            Expiry::Expired => {
                log::debug!("connection credentials already expired");
                return Err(DisconnectCode::EXPIRED.into());
            }
            expiry => self.deadline = expiry.deadline(),
        }
        self.credentials = credentials;
        self.state = ConnectionState::Connected;

        let mut subs = HashMap::new();
        for channel in reply.channels.drain(..) {
            if channel.is_empty() || self.subscriptions.contains_key(&channel) {
                continue;
            }
            self.subscriptions.insert(
                channel.clone(),
                Subscription {
                    deadline: None,
                    info: Vec::new(),
                },
            );
            subs.insert(channel, SubscribeResult::default());
        }

        let (expires, ttl) = lease_ttl(self.credentials.expire_at);
        let _ = self
            .reply_ch
            .send(Ok((
                id,
                Reply::Connect(ConnectResult {
                    client: self.client_id.to_string(),
                    data: reply.data,
                    expires,
                    ttl,
                    subs,
                    ..Default::default()
                }),
            )))
            .await;

        if let Some(hook) = self.hooks.connected.clone() {
            let event = ConnectedEvent {
                client_id: self.client_id,
                user_id: self.credentials.user_id.clone(),
            };
            let fut = hook(self.context.clone(), event);
            if let Err(fault) = dispatch::invoke(&self.context, self.hook_deadline, fut).await {
                self.absorb("connected", fault)?;
            }
        }

        match close_after {
            Some(disconnect) => Err(disconnect),
            None => Ok(()),
        }
    }

    async fn handle_subscribe(
        &mut self,
        id: u32,
        request: SubscribeRequest,
    ) -> Result<(), Disconnect> {
        const MAX_SUBSCRIPTION_COUNT: usize = 128;

        if request.channel.is_empty() {
            log::debug!("subscribe to empty channel");
            return Err(DisconnectCode::BAD_REQUEST.into());
        }
        if self.subscriptions.contains_key(&request.channel) {
            let _ = self
                .reply_ch
                .send(Ok((id, Reply::Error(ErrorCode::ALREADY_SUBSCRIBED.into()))))
                .await;
            return Ok(());
        }
        if self.subscriptions.len() >= MAX_SUBSCRIPTION_COUNT {
            log::warn!("subscription limit exceeded");
            let _ = self
                .reply_ch
                .send(Ok((id, Reply::Error(ErrorCode::LIMIT_EXCEEDED.into()))))
                .await;
            return Ok(());
        }

        let mut reply = match self.hooks.subscribe.clone() {
            Some(hook) => {
                let event = SubscribeEvent {
                    client_id: self.client_id,
                    user_id: self.credentials.user_id.clone(),
                    channel: request.channel.clone(),
                    data: request.data,
                };
                let fut = hook(self.context.clone(), event);
                match dispatch::invoke(&self.context, self.hook_deadline, fut).await {
                    Ok(reply) => reply,
                    Err(fault) => {
                        let error = self.decision_fault("subscribe", fault)?;
                        let _ = self.reply_ch.send(Ok((id, Reply::Error(error)))).await;
                        return Ok(());
                    }
                }
            }
            None => SubscribeReply::default(),
        };

        let close_after = match Verdict::of(reply.error.take(), reply.disconnect.take()) {
            Verdict::Proceed => None,
            Verdict::ProceedThenClose(disconnect) => Some(disconnect),
            Verdict::Reject(error) => {
                let _ = self.reply_ch.send(Ok((id, Reply::Error(error)))).await;
                return Ok(());
            }
            Verdict::RejectThenClose(error, disconnect) => {
                let _ = self.reply_ch.send(Ok((id, Reply::Error(error)))).await;
                return Err(disconnect);
            }
        };

        let deadline = match Expiry::evaluate(false, reply.expire_at) {
            Expiry::Expired => {
                log::debug!("subscription to {} already expired", request.channel);
                let _ = self
                    .reply_ch
                    .send(Ok((id, Reply::Error(ErrorCode::EXPIRED.into()))))
                    .await;
                return match close_after {
                    Some(disconnect) => Err(disconnect),
                    None => Ok(()),
                };
            }
            expiry => expiry.deadline(),
        };

        let (expires, ttl) = lease_ttl(reply.expire_at);
        self.subscriptions.insert(
            request.channel,
            Subscription {
                deadline,
                info: reply.info,
            },
        );
        let _ = self
            .reply_ch
            .send(Ok((id, Reply::Subscribe(SubscribeResult { expires, ttl }))))
            .await;

        match close_after {
            Some(disconnect) => Err(disconnect),
            None => Ok(()),
        }
    }

    async fn handle_unsubscribe(
        &mut self,
        id: u32,
        request: UnsubscribeRequest,
    ) -> Result<(), Disconnect> {
        if request.channel.is_empty() {
            log::debug!("unsubscribe from empty channel");
            return Err(DisconnectCode::BAD_REQUEST.into());
        }

        let was_subscribed = self.subscriptions.remove(&request.channel).is_some();
        let _ = self
            .reply_ch
            .send(Ok((id, Reply::Unsubscribe(UnsubscribeResult::default()))))
            .await;

        if was_subscribed {
            self.notify_unsubscribe(request.channel).await?;
        }
        Ok(())
    }

    async fn handle_publish(&mut self, id: u32, request: PublishRequest) -> Result<(), Disconnect> {
        if request.channel.is_empty() {
            log::debug!("publish to empty channel");
            return Err(DisconnectCode::BAD_REQUEST.into());
        }

        let info = self.client_info(&request.channel);

        let mut reply = match self.hooks.publish.clone() {
            Some(hook) => {
                let event = PublishEvent {
                    client_id: self.client_id,
                    channel: request.channel.clone(),
                    data: request.data.clone(),
                    info: Some(info.clone()),
                };
                let fut = hook(self.context.clone(), event);
                match dispatch::invoke(&self.context, self.hook_deadline, fut).await {
                    Ok(reply) => reply,
                    Err(fault) => {
                        let error = self.decision_fault("publish", fault)?;
                        let _ = self.reply_ch.send(Ok((id, Reply::Error(error)))).await;
                        return Ok(());
                    }
                }
            }
            None => PublishReply::default(),
        };

        let close_after = match Verdict::of(reply.error.take(), reply.disconnect.take()) {
            Verdict::Proceed => None,
            Verdict::ProceedThenClose(disconnect) => Some(disconnect),
            Verdict::Reject(error) => {
                let _ = self.reply_ch.send(Ok((id, Reply::Error(error)))).await;
                return Ok(());
            }
            Verdict::RejectThenClose(error, disconnect) => {
                let _ = self.reply_ch.send(Ok((id, Reply::Error(error)))).await;
                return Err(disconnect);
            }
        };

        // a data override from the hook replaces the payload even when it
        // is empty
        let data = reply.data.take().unwrap_or(request.data);

        match self.hooks.broker.clone() {
            Some(broker) => {
                let publication = Publication {
                    data,
                    info: Some(info),
                };
                let fut = broker(request.channel.clone(), publication);
                match dispatch::invoke(&self.context, self.hook_deadline, fut).await {
                    Ok(Ok(())) => {
                        let _ = self
                            .reply_ch
                            .send(Ok((id, Reply::Publish(PublishResult {}))))
                            .await;
                    }
                    Ok(Err(error)) => {
                        log::debug!("broker refused publication to {}: {}", request.channel, error);
                        let _ = self.reply_ch.send(Ok((id, Reply::Error(error)))).await;
                    }
                    Err(fault) => {
                        let error = self.decision_fault("broker", fault)?;
                        let _ = self.reply_ch.send(Ok((id, Reply::Error(error)))).await;
                    }
                }
            }
            None => {
                log::trace!("no broker registered, dropping publication to {}", request.channel);
                let _ = self
                    .reply_ch
                    .send(Ok((id, Reply::Publish(PublishResult {}))))
                    .await;
            }
        }

        match close_after {
            Some(disconnect) => Err(disconnect),
            None => Ok(()),
        }
    }

    async fn handle_send(&mut self, request: SendRequest) -> Result<(), Disconnect> {
        // fire and forget, the client is never answered
        if let Some(hook) = self.hooks.message.clone() {
            let event = MessageEvent {
                client_id: self.client_id,
                data: request.data,
            };
            let fut = hook(self.context.clone(), event);
            if let Err(fault) = dispatch::invoke(&self.context, self.hook_deadline, fut).await {
                self.absorb("message", fault)?;
            }
        }
        Ok(())
    }

    async fn handle_rpc(&mut self, id: u32, request: RpcRequest) -> Result<(), Disconnect> {
        let Some(hook) = self.hooks.rpc.clone() else {
            let _ = self
                .reply_ch
                .send(Ok((id, Reply::Error(ErrorCode::NOT_AVAILABLE.into()))))
                .await;
            return Ok(());
        };

        let event = RpcEvent {
            client_id: self.client_id,
            method: request.method,
            data: request.data,
        };
        let fut = hook(self.context.clone(), event);
        let mut reply = match dispatch::invoke(&self.context, self.hook_deadline, fut).await {
            Ok(reply) => reply,
            Err(fault) => {
                let error = self.decision_fault("rpc", fault)?;
                let _ = self.reply_ch.send(Ok((id, Reply::Error(error)))).await;
                return Ok(());
            }
        };

        let close_after = match Verdict::of(reply.error.take(), reply.disconnect.take()) {
            Verdict::Proceed => None,
            Verdict::ProceedThenClose(disconnect) => Some(disconnect),
            Verdict::Reject(error) => {
                let _ = self.reply_ch.send(Ok((id, Reply::Error(error)))).await;
                return Ok(());
            }
            Verdict::RejectThenClose(error, disconnect) => {
                let _ = self.reply_ch.send(Ok((id, Reply::Error(error)))).await;
                return Err(disconnect);
            }
        };

        let _ = self
            .reply_ch
            .send(Ok((id, Reply::Rpc(RpcResult { data: reply.data }))))
            .await;

        match close_after {
            Some(disconnect) => Err(disconnect),
            None => Ok(()),
        }
    }

    async fn refresh_connection(&mut self) -> Result<(), Disconnect> {
        let mut reply = match self.hooks.refresh.clone() {
            Some(hook) => {
                let event = RefreshEvent {
                    client_id: self.client_id,
                    user_id: self.credentials.user_id.clone(),
                };
                let fut = hook(self.context.clone(), event);
                match dispatch::invoke(&self.context, self.hook_deadline, fut).await {
                    Ok(reply) => reply,
                    // there is no client frame to answer here, an extension
                    // that cannot be produced expires the connection
                    Err(HookFault::Cancelled) => {
                        return Err(DisconnectCode::CONNECTION_CLOSED.into());
                    }
                    Err(HookFault::Deadline) => return Err(DisconnectCode::TIMEOUT.into()),
                    Err(fault @ HookFault::Panicked) => {
                        log::warn!("refresh hook failed: {}", fault);
                        return Err(DisconnectCode::EXPIRED.into());
                    }
                }
            }
            None => RefreshReply::default(),
        };

        if let Some(disconnect) = reply.disconnect.take() {
            return Err(disconnect);
        }
        if let Some(error) = reply.error.take() {
            log::debug!("refresh failed: {}", error);
            return Err(DisconnectCode::EXPIRED.into());
        }

        match Expiry::evaluate(reply.expired, reply.expire_at) {
            Expiry::Expired => {
                log::debug!("connection expired");
                Err(DisconnectCode::EXPIRED.into())
            }
            expiry => {
                self.deadline = expiry.deadline();
                self.credentials.expire_at = reply.expire_at;
                if let Some(info) = reply.info.take() {
                    self.credentials.info = info;
                }
                Ok(())
            }
        }
    }

    async fn refresh_subscription(&mut self, channel: String) -> Result<(), Disconnect> {
        let mut reply = match self.hooks.sub_refresh.clone() {
            Some(hook) => {
                let event = SubRefreshEvent {
                    client_id: self.client_id,
                    user_id: self.credentials.user_id.clone(),
                    channel: channel.clone(),
                };
                let fut = hook(self.context.clone(), event);
                match dispatch::invoke(&self.context, self.hook_deadline, fut).await {
                    Ok(reply) => reply,
                    Err(HookFault::Cancelled) => {
                        return Err(DisconnectCode::CONNECTION_CLOSED.into());
                    }
                    Err(HookFault::Deadline) => return Err(DisconnectCode::TIMEOUT.into()),
                    Err(fault @ HookFault::Panicked) => {
                        log::warn!("sub refresh hook failed: {}", fault);
                        return self.expire_subscription(channel).await;
                    }
                }
            }
            None => SubRefreshReply::default(),
        };

        if let Some(disconnect) = reply.disconnect.take() {
            return Err(disconnect);
        }
        if let Some(error) = reply.error.take() {
            log::debug!("sub refresh for {} failed: {}", channel, error);
            return self.expire_subscription(channel).await;
        }

        match Expiry::evaluate(reply.expired, reply.expire_at) {
            Expiry::Expired => self.expire_subscription(channel).await,
            expiry => {
                if let Some(sub) = self.subscriptions.get_mut(&channel) {
                    sub.deadline = expiry.deadline();
                    if let Some(info) = reply.info.take() {
                        sub.info = info;
                    }
                }
                Ok(())
            }
        }
    }

    /// Removes an expired subscription, notifies the client and the
    /// unsubscribe hook
    async fn expire_subscription(&mut self, channel: String) -> Result<(), Disconnect> {
        log::debug!("subscription to {} expired", channel);
        self.subscriptions.remove(&channel);
        let _ = self
            .reply_ch
            .send(Ok((
                0,
                Reply::Push(Push {
                    channel: channel.clone(),
                    data: PushData::Unsubscribe(Unsubscribe::expired()),
                }),
            )))
            .await;
        self.notify_unsubscribe(channel).await
    }

    async fn notify_unsubscribe(&mut self, channel: String) -> Result<(), Disconnect> {
        if let Some(hook) = self.hooks.unsubscribe.clone() {
            let event = UnsubscribeEvent {
                client_id: self.client_id,
                channel,
            };
            let fut = hook(self.context.clone(), event);
            if let Err(fault) = dispatch::invoke(&self.context, self.hook_deadline, fut).await {
                self.absorb("unsubscribe", fault)?;
            }
        }
        Ok(())
    }

    /// Identity of this client as seen by subscribers
    fn client_info(&self, channel: &str) -> ClientInfo {
        ClientInfo {
            client: self.client_id.to_string(),
            user: self.credentials.user_id.clone(),
            conn_info: self.credentials.info.clone(),
            chan_info: self
                .subscriptions
                .get(channel)
                .map(|sub| sub.info.clone())
                .unwrap_or_default(),
        }
    }

    /// Maps a decision hook fault, a contained panic surfaces as an
    /// internal error on the triggering frame
    fn decision_fault(&self, hook: &str, fault: HookFault) -> Result<Error, Disconnect> {
        match fault {
            HookFault::Panicked => {
                log::warn!("{} hook failed: {}", hook, fault);
                Ok(ErrorCode::INTERNAL.into())
            }
            HookFault::Cancelled => Err(DisconnectCode::CONNECTION_CLOSED.into()),
            HookFault::Deadline => Err(DisconnectCode::TIMEOUT.into()),
        }
    }

    /// Maps a notification hook fault, a contained panic is logged and
    /// the connection carries on
    fn absorb(&self, hook: &str, fault: HookFault) -> Result<(), Disconnect> {
        match fault {
            HookFault::Panicked => {
                log::warn!("{} hook failed: {}", hook, fault);
                Ok(())
            }
            HookFault::Cancelled => Err(DisconnectCode::CONNECTION_CLOSED.into()),
            HookFault::Deadline => Err(DisconnectCode::TIMEOUT.into()),
        }
    }
}

impl Drop for Connection {
    /// Safety net for abnormal teardown
    ///
    /// If the client was connected and `shutdown` never ran, this still
    /// delivers the disconnect notification.
    fn drop(&mut self) {
        if self.state == ConnectionState::Connected {
            if let Some(hook) = &self.hooks.disconnect {
                hook(DisconnectEvent {
                    client_id: self.client_id,
                    disconnect: DisconnectCode::CONNECTION_CLOSED.into(),
                });
            }
        }
    }
}
