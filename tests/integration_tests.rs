use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use tokio_relay::context::Context;
use tokio_relay::errors::{Disconnect, DisconnectCode, Error, ErrorCode};
use tokio_relay::events::{
    ConnectReply, Credentials, PublishReply, RefreshReply, RpcReply, SubRefreshReply,
    SubscribeReply,
};
use tokio_relay::protocol::{
    Command, ConnectRequest, ConnectResult, Publication, PublishRequest, PushData, Reply,
    RpcRequest, SendRequest, SubscribeRequest, UnsubscribeRequest,
};
use tokio_relay::server::types::{ClientId, ServeParams};
use tokio_relay::server::Server;

#[derive(Clone)]
struct Tenant(String);

type Frame = Result<(u32, Reply), Disconnect>;

/// Starts serving one connection over in-memory endpoints.
fn spawn_connection(
    server: Server,
    params: ServeParams,
) -> (
    UnboundedSender<(u32, Command)>,
    UnboundedReceiver<Frame>,
    tokio::task::JoinHandle<()>,
) {
    let (commands_tx, commands_rx) = mpsc::unbounded();
    let (replies_tx, replies_rx) = mpsc::unbounded();

    let handle = tokio::spawn(async move {
        server.serve(commands_rx, replies_tx, params).await;
    });

    (commands_tx, replies_rx, handle)
}

/// Waits for the next frame, failing the test on a stall.
async fn next_frame(replies: &mut UnboundedReceiver<Frame>) -> Frame {
    tokio::time::timeout(Duration::from_secs(5), replies.next())
        .await
        .expect("timed out waiting for a frame")
        .expect("reply stream ended without a disconnect")
}

/// Waits for a reply frame with the given id.
async fn expect_reply(replies: &mut UnboundedReceiver<Frame>, expected_id: u32) -> Reply {
    match next_frame(replies).await {
        Ok((id, reply)) => {
            assert_eq!(id, expected_id);
            reply
        }
        Err(disconnect) => panic!("expected a reply frame, got disconnect: {}", disconnect),
    }
}

/// Waits for the terminal disconnect item.
async fn expect_disconnect(replies: &mut UnboundedReceiver<Frame>) -> Disconnect {
    match next_frame(replies).await {
        Ok((id, reply)) => panic!("expected a disconnect, got frame {}: {:?}", id, reply),
        Err(disconnect) => disconnect,
    }
}

fn connect_command(id: u32) -> (u32, Command) {
    (
        id,
        Command::Connect(ConnectRequest {
            token: "token".to_string(),
            name: "tests".to_string(),
            version: "0.1.0".to_string(),
            ..Default::default()
        }),
    )
}

fn subscribe_command(id: u32, channel: &str) -> (u32, Command) {
    (
        id,
        Command::Subscribe(SubscribeRequest {
            channel: channel.to_string(),
            data: vec![],
        }),
    )
}

fn rpc_command(id: u32, method: &str) -> (u32, Command) {
    (
        id,
        Command::Rpc(RpcRequest {
            method: method.to_string(),
            data: vec![],
        }),
    )
}

/// Performs the handshake and returns the connect result.
async fn connect(
    commands: &UnboundedSender<(u32, Command)>,
    replies: &mut UnboundedReceiver<Frame>,
) -> ConnectResult {
    commands.unbounded_send(connect_command(1)).unwrap();
    match expect_reply(replies, 1).await {
        Reply::Connect(result) => result,
        other => panic!("expected a connect result, got {:?}", other),
    }
}

/// Test the default handshake with no hooks registered
#[tokio::test]
async fn test_anonymous_connect() {
    let client_id = ClientId::new();
    let params = ServeParams::new().with_client_id(client_id);
    let (commands, mut replies, _handle) = spawn_connection(Server::new(), params);

    let result = connect(&commands, &mut replies).await;
    assert_eq!(result.client, client_id.to_string());
    assert!(!result.expires);
    assert_eq!(result.ttl, 0);
    assert!(result.subs.is_empty());

    // Closing the command stream ends the connection, and the terminal
    // disconnect is the last item ever written
    drop(commands);
    let disconnect = expect_disconnect(&mut replies).await;
    assert_eq!(disconnect.code, DisconnectCode::CONNECTION_CLOSED);

    let end = tokio::time::timeout(Duration::from_secs(5), replies.next())
        .await
        .unwrap();
    assert!(end.is_none());
}

/// Test that any command before connect closes the connection
#[tokio::test]
async fn test_command_before_connect() {
    let (commands, mut replies, _handle) =
        spawn_connection(Server::new(), ServeParams::new());

    commands.unbounded_send(rpc_command(1, "echo")).unwrap();

    let disconnect = expect_disconnect(&mut replies).await;
    assert_eq!(disconnect.code, DisconnectCode::BAD_REQUEST);
    assert!(!disconnect.code.should_reconnect());
}

/// Test that a second connect closes the connection
#[tokio::test]
async fn test_double_connect() {
    let (commands, mut replies, _handle) =
        spawn_connection(Server::new(), ServeParams::new());

    connect(&commands, &mut replies).await;
    commands.unbounded_send(connect_command(2)).unwrap();

    let disconnect = expect_disconnect(&mut replies).await;
    assert_eq!(disconnect.code, DisconnectCode::BAD_REQUEST);
}

/// Test that a handshake rejection reaches the client in generic form
#[tokio::test]
async fn test_handshake_rejection_is_generic() {
    let connected = Arc::new(AtomicBool::new(false));
    let disconnected = Arc::new(AtomicBool::new(false));

    let mut server = Server::new();
    server.on_connecting(|_ctx, _event| async move {
        ConnectReply {
            error: Some(Error::new(ErrorCode::UNAUTHORIZED, "token signed with wrong key")),
            ..Default::default()
        }
    });
    let connected_hook = connected.clone();
    server.on_connected(move |_ctx, _event| {
        let connected = connected_hook.clone();
        async move {
            connected.store(true, Ordering::SeqCst);
        }
    });
    let disconnected_hook = disconnected.clone();
    server.on_disconnect(move |_event| {
        disconnected_hook.store(true, Ordering::SeqCst);
    });

    let (commands, mut replies, handle) = spawn_connection(server, ServeParams::new());
    commands.unbounded_send(connect_command(1)).unwrap();

    // The error is answered on the connect frame before the close, and
    // the host-supplied detail never leaves the server
    match expect_reply(&mut replies, 1).await {
        Reply::Error(error) => {
            assert_eq!(error.code, ErrorCode::UNAUTHORIZED);
            assert_eq!(error.message, "unauthorized");
        }
        other => panic!("expected an error frame, got {:?}", other),
    }
    let disconnect = expect_disconnect(&mut replies).await;
    assert_eq!(disconnect.code, DisconnectCode::CONNECTION_CLOSED);

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(!connected.load(Ordering::SeqCst));
    // The connection was never established, so no teardown notification
    assert!(!disconnected.load(Ordering::SeqCst));
}

/// Test a handshake rejection carrying its own close reason
#[tokio::test]
async fn test_handshake_rejection_custom_close() {
    let mut server = Server::new();
    server.on_connecting(|_ctx, _event| async move {
        ConnectReply {
            error: Some(Error::new(ErrorCode::PERMISSION_DENIED, "blocklisted")),
            disconnect: Some(DisconnectCode::INVALID_TOKEN.into()),
            ..Default::default()
        }
    });

    let (commands, mut replies, _handle) = spawn_connection(server, ServeParams::new());
    commands.unbounded_send(connect_command(1)).unwrap();

    match expect_reply(&mut replies, 1).await {
        Reply::Error(error) => {
            assert_eq!(error.code, ErrorCode::PERMISSION_DENIED);
            assert_eq!(error.message, "permission denied");
        }
        other => panic!("expected an error frame, got {:?}", other),
    }
    let disconnect = expect_disconnect(&mut replies).await;
    assert_eq!(disconnect.code, DisconnectCode::INVALID_TOKEN);
    assert!(!disconnect.code.should_reconnect());
}

/// Test that a disconnect decision alone completes the handshake first
#[tokio::test]
async fn test_handshake_disconnect_applies_after_effects() {
    let connected = Arc::new(AtomicBool::new(false));
    let close_seen = Arc::new(Mutex::new(None));

    let mut server = Server::new();
    server.on_connecting(|_ctx, _event| async move {
        ConnectReply {
            disconnect: Some(Disconnect::new(DisconnectCode::SHUTDOWN, "draining")),
            ..Default::default()
        }
    });
    let connected_hook = connected.clone();
    server.on_connected(move |_ctx, _event| {
        let connected = connected_hook.clone();
        async move {
            connected.store(true, Ordering::SeqCst);
        }
    });
    let close_hook = close_seen.clone();
    server.on_disconnect(move |event| {
        *close_hook.lock().unwrap() = Some(event.disconnect);
    });

    let (commands, mut replies, handle) = spawn_connection(server, ServeParams::new());
    commands.unbounded_send(connect_command(1)).unwrap();

    // The connect result goes out, then the connection closes with the
    // reason the hook chose
    match expect_reply(&mut replies, 1).await {
        Reply::Connect(_) => {}
        other => panic!("expected a connect result, got {:?}", other),
    }
    let disconnect = expect_disconnect(&mut replies).await;
    assert_eq!(disconnect.code, DisconnectCode::SHUTDOWN);
    assert_eq!(disconnect.reason, "draining");

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(connected.load(Ordering::SeqCst));
    let seen = close_seen.lock().unwrap().clone().expect("teardown not seen");
    assert_eq!(seen.reason, "draining");
}

/// Test credentials, context override and server-side channels
#[tokio::test]
async fn test_connect_credentials_and_channels() {
    let user_seen = Arc::new(Mutex::new(String::new()));

    let mut server = Server::new();
    server.on_connecting(|_ctx, _event| async move {
        ConnectReply {
            context: Some(Context::new().with_value(Tenant("acme".to_string()))),
            credentials: Some(Credentials {
                user_id: "u-1".to_string(),
                ..Default::default()
            }),
            data: b"welcome".to_vec(),
            channels: vec!["news".to_string(), "alerts".to_string()],
            ..Default::default()
        }
    });
    let user_hook = user_seen.clone();
    server.on_connected(move |_ctx, event| {
        let user_seen = user_hook.clone();
        async move {
            *user_seen.lock().unwrap() = event.user_id;
        }
    });
    // Later hooks observe the context adopted during the handshake
    server.on_rpc(|ctx, _event| {
        let tenant = ctx
            .value::<Tenant>()
            .map(|t| t.0.clone())
            .unwrap_or_default();
        async move {
            RpcReply {
                data: tenant.into_bytes(),
                ..Default::default()
            }
        }
    });

    let (commands, mut replies, _handle) = spawn_connection(server, ServeParams::new());

    let result = connect(&commands, &mut replies).await;
    assert_eq!(result.data, b"welcome");
    assert!(!result.expires);
    assert_eq!(result.subs.len(), 2);
    assert!(result.subs.contains_key("news"));
    assert!(result.subs.contains_key("alerts"));

    commands.unbounded_send(rpc_command(2, "tenant")).unwrap();
    match expect_reply(&mut replies, 2).await {
        Reply::Rpc(rpc) => assert_eq!(rpc.data, b"acme"),
        other => panic!("expected an rpc result, got {:?}", other),
    }

    assert_eq!(*user_seen.lock().unwrap(), "u-1");
}

/// Test that expiring credentials advertise a lease
#[tokio::test]
async fn test_connect_lease_advertised() {
    let mut server = Server::new();
    server.on_connecting(|_ctx, _event| async move {
        ConnectReply {
            credentials: Some(Credentials {
                user_id: "u-1".to_string(),
                expire_at: Some(SystemTime::now() + Duration::from_secs(60)),
                ..Default::default()
            }),
            ..Default::default()
        }
    });

    let (commands, mut replies, _handle) = spawn_connection(server, ServeParams::new());
    let result = connect(&commands, &mut replies).await;
    assert!(result.expires);
    assert_eq!(result.ttl, 60);
}

/// Test a handshake with already expired credentials
#[tokio::test]
async fn test_connect_expired_credentials() {
    let mut server = Server::new();
    server.on_connecting(|_ctx, _event| async move {
        ConnectReply {
            credentials: Some(Credentials {
                user_id: "u-1".to_string(),
                expire_at: Some(SystemTime::now() - Duration::from_secs(1)),
                ..Default::default()
            }),
            ..Default::default()
        }
    });

    let (commands, mut replies, _handle) = spawn_connection(server, ServeParams::new());
    commands.unbounded_send(connect_command(1)).unwrap();

    // No connect result, the connection closes as expired
    let disconnect = expect_disconnect(&mut replies).await;
    assert_eq!(disconnect.code, DisconnectCode::EXPIRED);
    assert!(disconnect.code.should_reconnect());
}

/// Test that a panicking connect hook rejects the handshake
#[tokio::test]
async fn test_connecting_hook_panic() {
    let mut server = Server::new();
    server.on_connecting(|_ctx, _event| async move {
        panic!("intentional panic for testing");
    });

    let (commands, mut replies, _handle) = spawn_connection(server, ServeParams::new());
    commands.unbounded_send(connect_command(1)).unwrap();

    match expect_reply(&mut replies, 1).await {
        Reply::Error(error) => {
            assert_eq!(error.code, ErrorCode::INTERNAL);
            assert_eq!(error.message, "internal server error");
        }
        other => panic!("expected an error frame, got {:?}", other),
    }
    let disconnect = expect_disconnect(&mut replies).await;
    assert_eq!(disconnect.code, DisconnectCode::SERVER_ERROR);
}

/// Test that rpc without a hook is not available
#[tokio::test]
async fn test_rpc_without_hook() {
    let (commands, mut replies, _handle) =
        spawn_connection(Server::new(), ServeParams::new());

    connect(&commands, &mut replies).await;
    commands.unbounded_send(rpc_command(2, "anything")).unwrap();

    match expect_reply(&mut replies, 2).await {
        Reply::Error(error) => assert_eq!(error.code, ErrorCode::NOT_AVAILABLE),
        other => panic!("expected an error frame, got {:?}", other),
    }
}

/// Test rpc hook data and error answers
#[tokio::test]
async fn test_rpc_hook_answers() {
    let mut server = Server::new();
    server.on_rpc(|_ctx, event| async move {
        match event.method.as_str() {
            "echo" => RpcReply {
                data: b"pong".to_vec(),
                ..Default::default()
            },
            _ => RpcReply {
                error: Some(Error::new(ErrorCode(1000), "no such method")),
                ..Default::default()
            },
        }
    });

    let (commands, mut replies, _handle) = spawn_connection(server, ServeParams::new());
    connect(&commands, &mut replies).await;

    commands.unbounded_send(rpc_command(2, "echo")).unwrap();
    match expect_reply(&mut replies, 2).await {
        Reply::Rpc(rpc) => assert_eq!(rpc.data, b"pong"),
        other => panic!("expected an rpc result, got {:?}", other),
    }

    // Hook errors outside the handshake keep their message
    commands.unbounded_send(rpc_command(3, "missing")).unwrap();
    match expect_reply(&mut replies, 3).await {
        Reply::Error(error) => {
            assert_eq!(error.code, ErrorCode(1000));
            assert_eq!(error.message, "no such method");
        }
        other => panic!("expected an error frame, got {:?}", other),
    }
}

/// Test that an rpc disconnect decision answers the call first
#[tokio::test]
async fn test_rpc_disconnect_answers_first() {
    let mut server = Server::new();
    server.on_rpc(|_ctx, _event| async move {
        RpcReply {
            data: b"bye".to_vec(),
            disconnect: Some(DisconnectCode::FORCE_DISCONNECT.into()),
            ..Default::default()
        }
    });

    let (commands, mut replies, _handle) = spawn_connection(server, ServeParams::new());
    connect(&commands, &mut replies).await;
    commands.unbounded_send(rpc_command(2, "last")).unwrap();

    match expect_reply(&mut replies, 2).await {
        Reply::Rpc(rpc) => assert_eq!(rpc.data, b"bye"),
        other => panic!("expected an rpc result, got {:?}", other),
    }
    let disconnect = expect_disconnect(&mut replies).await;
    assert_eq!(disconnect.code, DisconnectCode::FORCE_DISCONNECT);
}

/// Test that a panicking rpc hook keeps the connection alive
#[tokio::test]
async fn test_rpc_hook_panic_keeps_connection() {
    let mut server = Server::new();
    server.on_rpc(|_ctx, _event| async move {
        panic!("intentional panic for testing");
    });

    let (commands, mut replies, _handle) = spawn_connection(server, ServeParams::new());
    connect(&commands, &mut replies).await;

    commands.unbounded_send(rpc_command(2, "boom")).unwrap();
    match expect_reply(&mut replies, 2).await {
        Reply::Error(error) => assert_eq!(error.code, ErrorCode::INTERNAL),
        other => panic!("expected an error frame, got {:?}", other),
    }

    // The connection survived the panic
    commands.unbounded_send(subscribe_command(3, "room")).unwrap();
    match expect_reply(&mut replies, 3).await {
        Reply::Subscribe(_) => {}
        other => panic!("expected a subscribe result, got {:?}", other),
    }
}

/// Test that a panicking connected hook is absorbed
#[tokio::test]
async fn test_connected_hook_panic_absorbed() {
    let mut server = Server::new();
    server.on_connected(|_ctx, _event| async move {
        panic!("intentional panic for testing");
    });
    server.on_rpc(|_ctx, _event| async move {
        RpcReply {
            data: b"alive".to_vec(),
            ..Default::default()
        }
    });

    let (commands, mut replies, _handle) = spawn_connection(server, ServeParams::new());
    connect(&commands, &mut replies).await;

    commands.unbounded_send(rpc_command(2, "ping")).unwrap();
    match expect_reply(&mut replies, 2).await {
        Reply::Rpc(rpc) => assert_eq!(rpc.data, b"alive"),
        other => panic!("expected an rpc result, got {:?}", other),
    }
}

/// Test subscribe, duplicate subscribe and idempotent unsubscribe
#[tokio::test]
async fn test_subscribe_lifecycle() {
    let unsubscribed = Arc::new(Mutex::new(Vec::new()));

    let mut server = Server::new();
    let unsubscribed_hook = unsubscribed.clone();
    server.on_unsubscribe(move |_ctx, event| {
        let unsubscribed = unsubscribed_hook.clone();
        async move {
            unsubscribed.lock().unwrap().push(event.channel);
        }
    });

    let (commands, mut replies, _handle) = spawn_connection(server, ServeParams::new());
    connect(&commands, &mut replies).await;

    commands.unbounded_send(subscribe_command(2, "room")).unwrap();
    match expect_reply(&mut replies, 2).await {
        Reply::Subscribe(result) => {
            assert!(!result.expires);
            assert_eq!(result.ttl, 0);
        }
        other => panic!("expected a subscribe result, got {:?}", other),
    }

    commands.unbounded_send(subscribe_command(3, "room")).unwrap();
    match expect_reply(&mut replies, 3).await {
        Reply::Error(error) => assert_eq!(error.code, ErrorCode::ALREADY_SUBSCRIBED),
        other => panic!("expected an error frame, got {:?}", other),
    }

    let unsubscribe = |id: u32| {
        (
            id,
            Command::Unsubscribe(UnsubscribeRequest {
                channel: "room".to_string(),
            }),
        )
    };

    commands.unbounded_send(unsubscribe(4)).unwrap();
    match expect_reply(&mut replies, 4).await {
        Reply::Unsubscribe(_) => {}
        other => panic!("expected an unsubscribe result, got {:?}", other),
    }

    // Unsubscribing again succeeds but fires no second notification
    commands.unbounded_send(unsubscribe(5)).unwrap();
    match expect_reply(&mut replies, 5).await {
        Reply::Unsubscribe(_) => {}
        other => panic!("expected an unsubscribe result, got {:?}", other),
    }

    assert_eq!(*unsubscribed.lock().unwrap(), vec!["room".to_string()]);
}

/// Test that subscribing to an empty channel closes the connection
#[tokio::test]
async fn test_subscribe_empty_channel() {
    let (commands, mut replies, _handle) =
        spawn_connection(Server::new(), ServeParams::new());

    connect(&commands, &mut replies).await;
    commands.unbounded_send(subscribe_command(2, "")).unwrap();

    let disconnect = expect_disconnect(&mut replies).await;
    assert_eq!(disconnect.code, DisconnectCode::BAD_REQUEST);
}

/// Test that a subscribe rejection keeps the connection alive
#[tokio::test]
async fn test_subscribe_rejection_keeps_connection() {
    let mut server = Server::new();
    server.on_subscribe(|_ctx, _event| async move {
        SubscribeReply {
            error: Some(Error::new(ErrorCode::PERMISSION_DENIED, "members only")),
            ..Default::default()
        }
    });

    let (commands, mut replies, _handle) = spawn_connection(server, ServeParams::new());
    connect(&commands, &mut replies).await;

    commands.unbounded_send(subscribe_command(2, "vip")).unwrap();
    match expect_reply(&mut replies, 2).await {
        Reply::Error(error) => {
            assert_eq!(error.code, ErrorCode::PERMISSION_DENIED);
            assert_eq!(error.message, "members only");
        }
        other => panic!("expected an error frame, got {:?}", other),
    }

    commands.unbounded_send(rpc_command(3, "ping")).unwrap();
    match expect_reply(&mut replies, 3).await {
        Reply::Error(error) => assert_eq!(error.code, ErrorCode::NOT_AVAILABLE),
        other => panic!("expected an error frame, got {:?}", other),
    }
}

/// Test that an already expired subscribe grant is rejected
#[tokio::test]
async fn test_subscribe_expired_grant() {
    let mut server = Server::new();
    server.on_subscribe(|_ctx, _event| async move {
        SubscribeReply {
            expire_at: Some(SystemTime::now() - Duration::from_secs(1)),
            ..Default::default()
        }
    });

    let (commands, mut replies, _handle) = spawn_connection(server, ServeParams::new());
    connect(&commands, &mut replies).await;

    commands.unbounded_send(subscribe_command(2, "room")).unwrap();
    match expect_reply(&mut replies, 2).await {
        Reply::Error(error) => assert_eq!(error.code, ErrorCode::EXPIRED),
        other => panic!("expected an error frame, got {:?}", other),
    }

    commands.unbounded_send(rpc_command(3, "ping")).unwrap();
    match expect_reply(&mut replies, 3).await {
        Reply::Error(error) => assert_eq!(error.code, ErrorCode::NOT_AVAILABLE),
        other => panic!("expected an error frame, got {:?}", other),
    }
}

/// Test the subscription count limit
#[tokio::test]
async fn test_subscription_limit() {
    let (commands, mut replies, _handle) =
        spawn_connection(Server::new(), ServeParams::new());

    connect(&commands, &mut replies).await;

    for i in 0u32..128 {
        let id = 2 + i;
        commands
            .unbounded_send(subscribe_command(id, &format!("room-{}", i)))
            .unwrap();
        match expect_reply(&mut replies, id).await {
            Reply::Subscribe(_) => {}
            other => panic!("subscription {} should be accepted, got {:?}", i, other),
        }
    }

    commands
        .unbounded_send(subscribe_command(130, "room-128"))
        .unwrap();
    match expect_reply(&mut replies, 130).await {
        Reply::Error(error) => assert_eq!(error.code, ErrorCode::LIMIT_EXCEEDED),
        other => panic!("expected an error frame, got {:?}", other),
    }
}

/// Test that an accepted publication reaches the broker rewritten
#[tokio::test]
async fn test_publish_reaches_broker() {
    let published: Arc<Mutex<Vec<(String, Publication)>>> = Arc::new(Mutex::new(Vec::new()));

    let mut server = Server::new();
    server.on_connecting(|_ctx, _event| async move {
        ConnectReply {
            credentials: Some(Credentials {
                user_id: "pub-user".to_string(),
                info: b"conn-info".to_vec(),
                ..Default::default()
            }),
            ..Default::default()
        }
    });
    server.on_subscribe(|_ctx, _event| async move {
        SubscribeReply {
            info: b"chan-info".to_vec(),
            ..Default::default()
        }
    });
    server.on_publish(|_ctx, event| async move {
        PublishReply {
            data: Some(event.data.to_ascii_uppercase()),
            ..Default::default()
        }
    });
    let published_hook = published.clone();
    server.with_broker(move |channel, publication| {
        let published = published_hook.clone();
        async move {
            published.lock().unwrap().push((channel, publication));
            Ok(())
        }
    });

    let (commands, mut replies, _handle) = spawn_connection(server, ServeParams::new());
    let result = connect(&commands, &mut replies).await;

    commands.unbounded_send(subscribe_command(2, "room")).unwrap();
    match expect_reply(&mut replies, 2).await {
        Reply::Subscribe(_) => {}
        other => panic!("expected a subscribe result, got {:?}", other),
    }

    commands
        .unbounded_send((
            3,
            Command::Publish(PublishRequest {
                channel: "room".to_string(),
                data: b"hello".to_vec(),
            }),
        ))
        .unwrap();
    match expect_reply(&mut replies, 3).await {
        Reply::Publish(_) => {}
        other => panic!("expected a publish result, got {:?}", other),
    }

    let published = published.lock().unwrap();
    assert_eq!(published.len(), 1);
    let (channel, publication) = &published[0];
    assert_eq!(channel, "room");
    assert_eq!(publication.data, b"HELLO");

    let info = publication.info.as_ref().expect("missing publisher info");
    assert_eq!(info.client, result.client);
    assert_eq!(info.user, "pub-user");
    assert_eq!(info.conn_info, b"conn-info");
    assert_eq!(info.chan_info, b"chan-info");
}

/// Test that a payload override applies even when it is empty
#[tokio::test]
async fn test_publish_empty_override() {
    let published: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));

    let mut server = Server::new();
    server.on_publish(|_ctx, _event| async move {
        PublishReply {
            data: Some(vec![]),
            ..Default::default()
        }
    });
    let published_hook = published.clone();
    server.with_broker(move |_channel, publication| {
        let published = published_hook.clone();
        async move {
            published.lock().unwrap().push(publication.data);
            Ok(())
        }
    });

    let (commands, mut replies, _handle) = spawn_connection(server, ServeParams::new());
    connect(&commands, &mut replies).await;

    commands
        .unbounded_send((
            2,
            Command::Publish(PublishRequest {
                channel: "room".to_string(),
                data: b"payload".to_vec(),
            }),
        ))
        .unwrap();
    match expect_reply(&mut replies, 2).await {
        Reply::Publish(_) => {}
        other => panic!("expected a publish result, got {:?}", other),
    }

    assert_eq!(*published.lock().unwrap(), vec![Vec::<u8>::new()]);
}

/// Test that a publication without a broker is acknowledged and dropped
#[tokio::test]
async fn test_publish_without_broker() {
    let (commands, mut replies, _handle) =
        spawn_connection(Server::new(), ServeParams::new());

    connect(&commands, &mut replies).await;
    commands
        .unbounded_send((
            2,
            Command::Publish(PublishRequest {
                channel: "room".to_string(),
                data: b"nowhere".to_vec(),
            }),
        ))
        .unwrap();

    match expect_reply(&mut replies, 2).await {
        Reply::Publish(_) => {}
        other => panic!("expected a publish result, got {:?}", other),
    }
}

/// Test that a broker error reaches the publisher
#[tokio::test]
async fn test_broker_error_reaches_publisher() {
    let mut server = Server::new();
    server.with_broker(|_channel, _publication| async move {
        Err(Error::new(ErrorCode(1001), "storage down"))
    });

    let (commands, mut replies, _handle) = spawn_connection(server, ServeParams::new());
    connect(&commands, &mut replies).await;

    commands
        .unbounded_send((
            2,
            Command::Publish(PublishRequest {
                channel: "room".to_string(),
                data: b"lost".to_vec(),
            }),
        ))
        .unwrap();
    match expect_reply(&mut replies, 2).await {
        Reply::Error(error) => {
            assert_eq!(error.code, ErrorCode(1001));
            assert_eq!(error.message, "storage down");
        }
        other => panic!("expected an error frame, got {:?}", other),
    }
}

/// Test that a rejected publication never reaches the broker
#[tokio::test]
async fn test_publish_rejection_skips_broker() {
    let broker_called = Arc::new(AtomicBool::new(false));

    let mut server = Server::new();
    server.on_publish(|_ctx, _event| async move {
        PublishReply {
            error: Some(Error::new(ErrorCode(1002), "spam")),
            disconnect: Some(Disconnect::new(DisconnectCode::FORCE_DISCONNECT, "spammer")),
            ..Default::default()
        }
    });
    let broker_hook = broker_called.clone();
    server.with_broker(move |_channel, _publication| {
        let broker_called = broker_hook.clone();
        async move {
            broker_called.store(true, Ordering::SeqCst);
            Ok(())
        }
    });

    let (commands, mut replies, _handle) = spawn_connection(server, ServeParams::new());
    connect(&commands, &mut replies).await;

    commands
        .unbounded_send((
            2,
            Command::Publish(PublishRequest {
                channel: "room".to_string(),
                data: b"buy now".to_vec(),
            }),
        ))
        .unwrap();

    match expect_reply(&mut replies, 2).await {
        Reply::Error(error) => assert_eq!(error.message, "spam"),
        other => panic!("expected an error frame, got {:?}", other),
    }
    let disconnect = expect_disconnect(&mut replies).await;
    assert_eq!(disconnect.code, DisconnectCode::FORCE_DISCONNECT);
    assert_eq!(disconnect.reason, "spammer");
    assert!(!broker_called.load(Ordering::SeqCst));
}

/// Test that send is fire and forget
#[tokio::test]
async fn test_send_fire_and_forget() {
    let message_seen = Arc::new(Mutex::new(Vec::new()));

    let mut server = Server::new();
    let message_hook = message_seen.clone();
    server.on_message(move |_ctx, event| {
        let message_seen = message_hook.clone();
        async move {
            message_seen.lock().unwrap().push(event.data);
        }
    });

    let (commands, mut replies, _handle) = spawn_connection(server, ServeParams::new());
    connect(&commands, &mut replies).await;

    commands
        .unbounded_send((
            2,
            Command::Send(SendRequest {
                data: b"fire".to_vec(),
            }),
        ))
        .unwrap();
    commands.unbounded_send(rpc_command(3, "barrier")).unwrap();

    // The next frame answers the rpc, nothing was emitted for the send
    match expect_reply(&mut replies, 3).await {
        Reply::Error(error) => assert_eq!(error.code, ErrorCode::NOT_AVAILABLE),
        other => panic!("expected an error frame, got {:?}", other),
    }
    assert_eq!(*message_seen.lock().unwrap(), vec![b"fire".to_vec()]);
}

/// Test that hooks of one connection never overlap
#[tokio::test]
async fn test_hooks_never_overlap() {
    let active = Arc::new(AtomicU32::new(0));
    let calls = Arc::new(AtomicU32::new(0));
    let overlapped = Arc::new(AtomicBool::new(false));

    let mut server = Server::new();
    let active_hook = active.clone();
    let calls_hook = calls.clone();
    let overlapped_hook = overlapped.clone();
    server.on_message(move |_ctx, _event| {
        let active = active_hook.clone();
        let calls = calls_hook.clone();
        let overlapped = overlapped_hook.clone();
        async move {
            if active.fetch_add(1, Ordering::SeqCst) > 0 {
                overlapped.store(true, Ordering::SeqCst);
            }
            tokio::time::sleep(Duration::from_millis(30)).await;
            active.fetch_sub(1, Ordering::SeqCst);
            calls.fetch_add(1, Ordering::SeqCst);
        }
    });

    let (commands, mut replies, _handle) = spawn_connection(server, ServeParams::new());
    connect(&commands, &mut replies).await;

    for id in 2..5 {
        commands
            .unbounded_send((id, Command::Send(SendRequest { data: vec![] })))
            .unwrap();
    }
    commands.unbounded_send(rpc_command(5, "barrier")).unwrap();
    expect_reply(&mut replies, 5).await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(!overlapped.load(Ordering::SeqCst));
}

/// Test that hooks for two connections run in parallel
#[tokio::test]
async fn test_connections_run_in_parallel() {
    let active = Arc::new(AtomicU32::new(0));
    let max_active = Arc::new(AtomicU32::new(0));

    let mut server = Server::new();
    let active_hook = active.clone();
    let max_hook = max_active.clone();
    server.on_rpc(move |_ctx, _event| {
        let active = active_hook.clone();
        let max_active = max_hook.clone();
        async move {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            active.fetch_sub(1, Ordering::SeqCst);
            RpcReply::default()
        }
    });

    let (commands_a, mut replies_a, _handle_a) =
        spawn_connection(server.clone(), ServeParams::new());
    let (commands_b, mut replies_b, _handle_b) = spawn_connection(server, ServeParams::new());

    connect(&commands_a, &mut replies_a).await;
    connect(&commands_b, &mut replies_b).await;

    commands_a.unbounded_send(rpc_command(2, "slow")).unwrap();
    commands_b.unbounded_send(rpc_command(2, "slow")).unwrap();
    expect_reply(&mut replies_a, 2).await;
    expect_reply(&mut replies_b, 2).await;

    assert_eq!(max_active.load(Ordering::SeqCst), 2);
}

/// Test that the hook deadline closes the connection
#[tokio::test]
async fn test_hook_deadline_closes_connection() {
    let mut server = Server::new();
    server.on_rpc(|_ctx, _event| async move {
        tokio::time::sleep(Duration::from_secs(30)).await;
        RpcReply::default()
    });

    let params = ServeParams::new().with_hook_deadline(Duration::from_millis(50));
    let (commands, mut replies, _handle) = spawn_connection(server, params);

    connect(&commands, &mut replies).await;
    commands.unbounded_send(rpc_command(2, "slow")).unwrap();

    let disconnect = expect_disconnect(&mut replies).await;
    assert_eq!(disconnect.code, DisconnectCode::TIMEOUT);
    assert!(disconnect.code.should_reconnect());
}

/// Test that cancelling the root context stops the connection
#[tokio::test]
async fn test_context_cancellation_stops_connection() {
    let mut server = Server::new();
    server.on_rpc(|_ctx, _event| async move {
        tokio::time::sleep(Duration::from_secs(30)).await;
        RpcReply::default()
    });

    let ctx = Context::new();
    let params = ServeParams::new().with_context(ctx.clone());
    let (commands, mut replies, handle) = spawn_connection(server, params);

    connect(&commands, &mut replies).await;

    // Cancel while a hook is in flight
    commands.unbounded_send(rpc_command(2, "stuck")).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    ctx.cancel();

    let disconnect = expect_disconnect(&mut replies).await;
    assert_eq!(disconnect.code, DisconnectCode::CONNECTION_CLOSED);

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}

/// Test that the refresh hook extends the connection lease
#[tokio::test]
async fn test_refresh_extends_lease() {
    let refreshed = Arc::new(AtomicU32::new(0));

    let mut server = Server::new();
    server.on_connecting(|_ctx, _event| async move {
        ConnectReply {
            credentials: Some(Credentials {
                user_id: "u-1".to_string(),
                expire_at: Some(SystemTime::now() + Duration::from_millis(200)),
                ..Default::default()
            }),
            ..Default::default()
        }
    });
    let refreshed_hook = refreshed.clone();
    server.on_refresh(move |_ctx, _event| {
        let refreshed = refreshed_hook.clone();
        async move {
            refreshed.fetch_add(1, Ordering::SeqCst);
            RefreshReply {
                expire_at: Some(SystemTime::now() + Duration::from_secs(60)),
                ..Default::default()
            }
        }
    });

    let (commands, mut replies, _handle) = spawn_connection(server, ServeParams::new());
    let result = connect(&commands, &mut replies).await;
    assert!(result.expires);
    assert_eq!(result.ttl, 1);

    // Let the lease run out and get renewed
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(refreshed.load(Ordering::SeqCst) >= 1);

    commands.unbounded_send(rpc_command(2, "alive")).unwrap();
    match expect_reply(&mut replies, 2).await {
        Reply::Error(error) => assert_eq!(error.code, ErrorCode::NOT_AVAILABLE),
        other => panic!("expected an error frame, got {:?}", other),
    }
}

/// Test that a refresh confirming expiration closes the connection
#[tokio::test]
async fn test_refresh_expiration_closes_connection() {
    let close_seen = Arc::new(Mutex::new(None));

    let mut server = Server::new();
    server.on_connecting(|_ctx, _event| async move {
        ConnectReply {
            credentials: Some(Credentials {
                user_id: "u-1".to_string(),
                expire_at: Some(SystemTime::now() + Duration::from_millis(100)),
                ..Default::default()
            }),
            ..Default::default()
        }
    });
    server.on_refresh(|_ctx, _event| async move {
        RefreshReply {
            expired: true,
            ..Default::default()
        }
    });
    let close_hook = close_seen.clone();
    server.on_disconnect(move |event| {
        *close_hook.lock().unwrap() = Some(event.disconnect);
    });

    let (commands, mut replies, handle) = spawn_connection(server, ServeParams::new());
    connect(&commands, &mut replies).await;

    let disconnect = expect_disconnect(&mut replies).await;
    assert_eq!(disconnect.code, DisconnectCode::EXPIRED);

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    let seen = close_seen.lock().unwrap().clone().expect("teardown not seen");
    assert_eq!(seen.code, DisconnectCode::EXPIRED);
}

/// Test that a refresh hook error is treated as an expiration
#[tokio::test]
async fn test_refresh_error_fails_closed() {
    let mut server = Server::new();
    server.on_connecting(|_ctx, _event| async move {
        ConnectReply {
            credentials: Some(Credentials {
                user_id: "u-1".to_string(),
                expire_at: Some(SystemTime::now() + Duration::from_millis(100)),
                ..Default::default()
            }),
            ..Default::default()
        }
    });
    server.on_refresh(|_ctx, _event| async move {
        RefreshReply {
            error: Some(Error::from(ErrorCode::INTERNAL)),
            // A renewal next to an error must not win
            expire_at: Some(SystemTime::now() + Duration::from_secs(60)),
            ..Default::default()
        }
    });

    let (commands, mut replies, _handle) = spawn_connection(server, ServeParams::new());
    connect(&commands, &mut replies).await;

    let disconnect = expect_disconnect(&mut replies).await;
    assert_eq!(disconnect.code, DisconnectCode::EXPIRED);
    assert!(disconnect.code.should_reconnect());
}

/// Test that an expired lease closes the connection under steady traffic
#[tokio::test]
async fn test_expiration_fires_under_steady_traffic() {
    let processed = Arc::new(AtomicU32::new(0));

    let mut server = Server::new();
    server.on_connecting(|_ctx, _event| async move {
        ConnectReply {
            credentials: Some(Credentials {
                user_id: "u-1".to_string(),
                expire_at: Some(SystemTime::now() + Duration::from_millis(250)),
                ..Default::default()
            }),
            ..Default::default()
        }
    });
    server.on_refresh(|_ctx, _event| async move {
        RefreshReply {
            expired: true,
            ..Default::default()
        }
    });
    let processed_hook = processed.clone();
    server.on_message(move |_ctx, _event| {
        let processed = processed_hook.clone();
        async move {
            processed.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    });

    let (commands, mut replies, _handle) = spawn_connection(server, ServeParams::new());
    connect(&commands, &mut replies).await;

    // Enough queued messages to keep the incoming stream ready well past
    // the lease
    for _ in 0..200 {
        commands
            .unbounded_send((0, Command::Send(SendRequest { data: vec![1] })))
            .unwrap();
    }

    let disconnect = expect_disconnect(&mut replies).await;
    assert_eq!(disconnect.code, DisconnectCode::EXPIRED);
    // The due lease preempts the backlog instead of waiting it out
    assert!(processed.load(Ordering::SeqCst) < 200);
}

/// Test that a missing refresh hook turns the lease into no expiration
#[tokio::test]
async fn test_missing_refresh_hook_clears_lease() {
    let mut server = Server::new();
    server.on_connecting(|_ctx, _event| async move {
        ConnectReply {
            credentials: Some(Credentials {
                user_id: "u-1".to_string(),
                expire_at: Some(SystemTime::now() + Duration::from_millis(150)),
                ..Default::default()
            }),
            ..Default::default()
        }
    });

    let (commands, mut replies, _handle) = spawn_connection(server, ServeParams::new());
    let result = connect(&commands, &mut replies).await;
    assert!(result.expires);

    // The lease runs out with nobody to renew it, the connection stays
    tokio::time::sleep(Duration::from_millis(400)).await;
    commands.unbounded_send(rpc_command(2, "alive")).unwrap();
    match expect_reply(&mut replies, 2).await {
        Reply::Error(error) => assert_eq!(error.code, ErrorCode::NOT_AVAILABLE),
        other => panic!("expected an error frame, got {:?}", other),
    }
}

/// Test that a confirmed subscription expiry pushes an unsubscribe
#[tokio::test]
async fn test_sub_refresh_expiry_pushes_unsubscribe() {
    let unsubscribed = Arc::new(Mutex::new(Vec::new()));

    let mut server = Server::new();
    server.on_subscribe(|_ctx, event| async move {
        if event.channel == "alpha" {
            SubscribeReply {
                expire_at: Some(SystemTime::now() + Duration::from_millis(150)),
                ..Default::default()
            }
        } else {
            SubscribeReply::default()
        }
    });
    server.on_sub_refresh(|_ctx, _event| async move {
        SubRefreshReply {
            expired: true,
            ..Default::default()
        }
    });
    let unsubscribed_hook = unsubscribed.clone();
    server.on_unsubscribe(move |_ctx, event| {
        let unsubscribed = unsubscribed_hook.clone();
        async move {
            unsubscribed.lock().unwrap().push(event.channel);
        }
    });

    let (commands, mut replies, _handle) = spawn_connection(server, ServeParams::new());
    connect(&commands, &mut replies).await;

    commands.unbounded_send(subscribe_command(2, "alpha")).unwrap();
    match expect_reply(&mut replies, 2).await {
        Reply::Subscribe(result) => {
            assert!(result.expires);
            assert_eq!(result.ttl, 1);
        }
        other => panic!("expected a subscribe result, got {:?}", other),
    }
    commands.unbounded_send(subscribe_command(3, "beta")).unwrap();
    match expect_reply(&mut replies, 3).await {
        Reply::Subscribe(result) => assert!(!result.expires),
        other => panic!("expected a subscribe result, got {:?}", other),
    }

    // The expiry is channel-scoped: a push on frame id 0, the connection
    // and the other subscription stay
    match next_frame(&mut replies).await {
        Ok((0, Reply::Push(push))) => {
            assert_eq!(push.channel, "alpha");
            match push.data {
                PushData::Unsubscribe(unsubscribe) => {
                    assert_eq!(unsubscribe.code, 2501);
                    assert_eq!(unsubscribe.reason, "subscription expired");
                }
                other => panic!("expected an unsubscribe push, got {:?}", other),
            }
        }
        other => panic!("expected a push frame, got {:?}", other),
    }
    assert_eq!(*unsubscribed.lock().unwrap(), vec!["alpha".to_string()]);

    commands.unbounded_send(subscribe_command(4, "beta")).unwrap();
    match expect_reply(&mut replies, 4).await {
        Reply::Error(error) => assert_eq!(error.code, ErrorCode::ALREADY_SUBSCRIBED),
        other => panic!("expected an error frame, got {:?}", other),
    }
    commands.unbounded_send(subscribe_command(5, "alpha")).unwrap();
    match expect_reply(&mut replies, 5).await {
        Reply::Subscribe(_) => {}
        other => panic!("expected a subscribe result, got {:?}", other),
    }
}

/// Test that a sub refresh hook error expires only that subscription
#[tokio::test]
async fn test_sub_refresh_error_expires_subscription() {
    let mut server = Server::new();
    server.on_subscribe(|_ctx, _event| async move {
        SubscribeReply {
            expire_at: Some(SystemTime::now() + Duration::from_millis(100)),
            ..Default::default()
        }
    });
    server.on_sub_refresh(|_ctx, _event| async move {
        SubRefreshReply {
            error: Some(Error::from(ErrorCode::INTERNAL)),
            // A renewal next to an error must not win
            expire_at: Some(SystemTime::now() + Duration::from_secs(60)),
            ..Default::default()
        }
    });

    let (commands, mut replies, _handle) = spawn_connection(server, ServeParams::new());
    connect(&commands, &mut replies).await;

    commands.unbounded_send(subscribe_command(2, "room")).unwrap();
    match expect_reply(&mut replies, 2).await {
        Reply::Subscribe(result) => assert!(result.expires),
        other => panic!("expected a subscribe result, got {:?}", other),
    }

    // The failure is channel-scoped: an unsubscribe push, not a close
    match next_frame(&mut replies).await {
        Ok((0, Reply::Push(push))) => {
            assert_eq!(push.channel, "room");
            match push.data {
                PushData::Unsubscribe(unsubscribe) => {
                    assert_eq!(unsubscribe.code, 2501);
                    assert_eq!(unsubscribe.reason, "subscription expired");
                }
                other => panic!("expected an unsubscribe push, got {:?}", other),
            }
        }
        other => panic!("expected a push frame, got {:?}", other),
    }

    // The connection survives and the channel can be joined again
    commands.unbounded_send(subscribe_command(3, "room")).unwrap();
    match expect_reply(&mut replies, 3).await {
        Reply::Subscribe(_) => {}
        other => panic!("expected a subscribe result, got {:?}", other),
    }
}

/// Test that a missing sub refresh hook turns the lease into no expiration
#[tokio::test]
async fn test_missing_sub_refresh_hook_clears_lease() {
    let mut server = Server::new();
    server.on_subscribe(|_ctx, _event| async move {
        SubscribeReply {
            expire_at: Some(SystemTime::now() + Duration::from_millis(150)),
            ..Default::default()
        }
    });

    let (commands, mut replies, _handle) = spawn_connection(server, ServeParams::new());
    connect(&commands, &mut replies).await;

    commands.unbounded_send(subscribe_command(2, "room")).unwrap();
    match expect_reply(&mut replies, 2).await {
        Reply::Subscribe(result) => assert!(result.expires),
        other => panic!("expected a subscribe result, got {:?}", other),
    }

    // The lease runs out with nobody to renew it, the subscription stays
    tokio::time::sleep(Duration::from_millis(400)).await;
    commands.unbounded_send(subscribe_command(3, "room")).unwrap();
    match expect_reply(&mut replies, 3).await {
        Reply::Error(error) => assert_eq!(error.code, ErrorCode::ALREADY_SUBSCRIBED),
        other => panic!("expected an error frame, got {:?}", other),
    }
}

/// Test that teardown notifies every remaining subscription
#[tokio::test]
async fn test_shutdown_notifies_subscriptions() {
    let unsubscribed = Arc::new(Mutex::new(Vec::new()));
    let close_seen = Arc::new(Mutex::new(None));

    let mut server = Server::new();
    let unsubscribed_hook = unsubscribed.clone();
    server.on_unsubscribe(move |_ctx, event| {
        let unsubscribed = unsubscribed_hook.clone();
        async move {
            unsubscribed.lock().unwrap().push(event.channel);
        }
    });
    let close_hook = close_seen.clone();
    server.on_disconnect(move |event| {
        *close_hook.lock().unwrap() = Some(event.disconnect);
    });

    let (commands, mut replies, handle) = spawn_connection(server, ServeParams::new());
    connect(&commands, &mut replies).await;

    for (id, channel) in [(2, "a"), (3, "b")] {
        commands.unbounded_send(subscribe_command(id, channel)).unwrap();
        match expect_reply(&mut replies, id).await {
            Reply::Subscribe(_) => {}
            other => panic!("expected a subscribe result, got {:?}", other),
        }
    }

    drop(commands);
    let disconnect = expect_disconnect(&mut replies).await;
    assert_eq!(disconnect.code, DisconnectCode::CONNECTION_CLOSED);

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();

    let mut channels = unsubscribed.lock().unwrap().clone();
    channels.sort();
    assert_eq!(channels, vec!["a".to_string(), "b".to_string()]);

    let seen = close_seen.lock().unwrap().clone().expect("teardown not seen");
    assert_eq!(seen.code, DisconnectCode::CONNECTION_CLOSED);
}

/// Test a scripted session driven from a generated stream source
#[tokio::test]
async fn test_scripted_session_stream() {
    let script = Box::pin(async_stream::stream! {
        yield connect_command(1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        yield subscribe_command(2, "updates");
        tokio::time::sleep(Duration::from_millis(20)).await;
        yield (
            3,
            Command::Publish(PublishRequest {
                channel: "updates".to_string(),
                data: b"scripted".to_vec(),
            }),
        );
        yield rpc_command(4, "missing");
        yield (
            5,
            Command::Unsubscribe(UnsubscribeRequest {
                channel: "updates".to_string(),
            }),
        );
    });

    let (replies_tx, mut replies) = mpsc::unbounded();
    let server = Server::new();
    let handle = tokio::spawn(async move {
        server.serve(script, replies_tx, ServeParams::new()).await;
    });

    match expect_reply(&mut replies, 1).await {
        Reply::Connect(_) => {}
        other => panic!("expected a connect result, got {:?}", other),
    }
    match expect_reply(&mut replies, 2).await {
        Reply::Subscribe(_) => {}
        other => panic!("expected a subscribe result, got {:?}", other),
    }
    match expect_reply(&mut replies, 3).await {
        Reply::Publish(_) => {}
        other => panic!("expected a publish result, got {:?}", other),
    }
    match expect_reply(&mut replies, 4).await {
        Reply::Error(error) => assert_eq!(error.code, ErrorCode::NOT_AVAILABLE),
        other => panic!("expected an error, got {:?}", other),
    }
    match expect_reply(&mut replies, 5).await {
        Reply::Unsubscribe(_) => {}
        other => panic!("expected an unsubscribe result, got {:?}", other),
    }

    let disconnect = expect_disconnect(&mut replies).await;
    assert_eq!(disconnect.code, DisconnectCode::CONNECTION_CLOSED);
    assert!(replies.next().await.is_none());

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}
