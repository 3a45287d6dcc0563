use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::channel::mpsc;
use futures::StreamExt;
use tokio_relay::errors::{Error, ErrorCode};
use tokio_relay::events::{ConnectReply, Credentials, PublishReply, RpcReply, SubscribeReply};
use tokio_relay::protocol::{
    Command, ConnectRequest, PublishRequest, RpcRequest, SubscribeRequest, UnsubscribeRequest,
};
use tokio_relay::server::types::ServeParams;
use tokio_relay::server::Server;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            Targets::new()
                .with_default(LevelFilter::INFO)
                .with_target("tokio_relay", LevelFilter::TRACE),
        )
        .init();

    let mut server = Server::new();

    server.on_connecting(|_ctx, event| async move {
        if event.token.is_empty() {
            return ConnectReply {
                error: Some(ErrorCode::UNAUTHORIZED.into()),
                ..Default::default()
            };
        }
        ConnectReply {
            credentials: Some(Credentials {
                user_id: format!("user-{}", event.token),
                expire_at: Some(SystemTime::now() + Duration::from_secs(3600)),
                ..Default::default()
            }),
            channels: vec!["news".to_string()],
            ..Default::default()
        }
    });

    server.on_connected(|_ctx, event| async move {
        log::info!("client {} connected as {}", event.client_id, event.user_id);
    });

    server.on_subscribe(|_ctx, event| async move {
        if !event.channel.starts_with("public:") {
            return SubscribeReply {
                error: Some(ErrorCode::PERMISSION_DENIED.into()),
                ..Default::default()
            };
        }
        SubscribeReply::default()
    });

    server.on_unsubscribe(|_ctx, event| async move {
        log::info!("client {} left {}", event.client_id, event.channel);
    });

    server.on_publish(|_ctx, event| async move {
        log::info!("publication to {}: {} bytes", event.channel, event.data.len());
        PublishReply::default()
    });

    server.with_broker(|channel, publication| async move {
        match std::str::from_utf8(&publication.data) {
            Ok(text) => {
                log::info!("fanout to {}: {}", channel, text);
                Ok(())
            }
            Err(_) => Err(Error::new(ErrorCode::BAD_REQUEST, "payload must be utf-8")),
        }
    });

    server.on_rpc(|_ctx, event| async move {
        match event.method.as_str() {
            "time" => {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default();
                RpcReply {
                    data: now.as_secs().to_string().into_bytes(),
                    ..Default::default()
                }
            }
            _ => RpcReply {
                error: Some(ErrorCode::METHOD_NOT_FOUND.into()),
                ..Default::default()
            },
        }
    });

    server.on_disconnect(|event| {
        log::info!("client {} disconnected: {}", event.client_id, event.disconnect);
    });

    // in-memory endpoints standing in for a transport session
    let (commands_tx, commands_rx) = mpsc::unbounded();
    let (replies_tx, mut replies_rx) = mpsc::unbounded();

    let serve_task = tokio::spawn(async move {
        server
            .serve(commands_rx, replies_tx, ServeParams::new())
            .await;
    });

    let print_task = tokio::spawn(async move {
        while let Some(frame) = replies_rx.next().await {
            match frame {
                Ok((id, reply)) => log::info!("frame {} -> {:?}", id, reply),
                Err(disconnect) => log::info!("closed -> {}", disconnect),
            }
        }
    });

    let script: Vec<(u32, Command)> = vec![
        (
            1,
            Command::Connect(ConnectRequest {
                token: "alice".to_string(),
                name: "demo".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            }),
        ),
        (
            2,
            Command::Subscribe(SubscribeRequest {
                channel: "public:chat".to_string(),
                data: vec![],
            }),
        ),
        (
            3,
            Command::Publish(PublishRequest {
                channel: "public:chat".to_string(),
                data: b"hello from alice".to_vec(),
            }),
        ),
        (
            4,
            Command::Rpc(RpcRequest {
                method: "time".to_string(),
                data: vec![],
            }),
        ),
        (
            5,
            Command::Rpc(RpcRequest {
                method: "weather".to_string(),
                data: vec![],
            }),
        ),
        (
            6,
            Command::Unsubscribe(UnsubscribeRequest {
                channel: "public:chat".to_string(),
            }),
        ),
    ];

    for frame in script {
        commands_tx.unbounded_send(frame).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    drop(commands_tx);
    let _ = tokio::join!(serve_task, print_task);
}
