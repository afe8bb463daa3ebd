// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Shared loopback rig for the RPC scenario tests (spec §8): a real
//! `WebSocketServerTransport` bound to an ephemeral port, exposing a
//! single `Add` service, wired up exactly the way a production server
//! would (`register_handler` + `serve`).

use std::{net::SocketAddr, sync::Arc, time::Duration};

use bytes::Bytes;
use hakoniwa_pdu_rt::{
    buffer::CommunicationBuffer,
    channel::ChannelConfig,
    envelope::WireVersion,
    error::PduError,
    rpc::{client::RpcClient, runner, server::RpcServer},
    transport::{Transport, websocket::{WebSocketClientTransport, WebSocketServerTransport}},
};
use serde_json::{Value, json};

pub const ROBOT: &str = "Service";
pub const SERVICE: &str = "Add";
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct AddServer {
    pub addr: SocketAddr,
    pub server: Arc<RpcServer>,
}

/// Starts the `Add` server: `sum(a, b)`, optionally stalling every reply
/// by `handler_delay` (used by the timeout/cancel scenario).
pub async fn start_add_server(max_clients: usize, handler_delay: Option<Duration>) -> AddServer {
    let channels = Arc::new(ChannelConfig::default());
    let transport = Arc::new(WebSocketServerTransport::new(
        "127.0.0.1:0",
        WireVersion::V2,
        channels,
    ));
    let server = Arc::new(RpcServer::new(vec![(SERVICE.to_owned(), max_clients)]));
    let transport_dyn: Arc<dyn Transport> = transport.clone();

    transport.register_event_handler(runner::register_handler(
        Arc::clone(&server),
        Arc::clone(&transport_dyn),
        ROBOT.to_owned(),
    ));

    let buffer = Arc::new(CommunicationBuffer::new());
    transport.start(Arc::clone(&buffer)).await.expect("server bind");
    let addr = transport.local_addr().await.expect("server bound");

    let serve_server = Arc::clone(&server);
    tokio::spawn(async move {
        runner::serve(
            &serve_server,
            &transport_dyn,
            &buffer,
            ROBOT,
            POLL_INTERVAL,
            move |_request_id, body| {
                let delay = handler_delay;
                async move {
                    if let Some(d) = delay {
                        tokio::time::sleep(d).await;
                    }
                    let req: Value = serde_json::from_slice(&body)
                        .map_err(|e| PduError::MalformedFrame(e.to_string()))?;
                    let a = req["a"].as_i64().unwrap_or(0);
                    let b = req["b"].as_i64().unwrap_or(0);
                    Ok(Bytes::from(json!({"sum": a + b}).to_string()))
                }
            },
        )
        .await;
    });

    AddServer { addr, server }
}

pub struct AddClient {
    pub client: RpcClient,
    pub transport: Arc<WebSocketClientTransport>,
    pub buffer: Arc<CommunicationBuffer>,
}

pub async fn connect_client(addr: SocketAddr, client_name: &str) -> AddClient {
    let channels = Arc::new(ChannelConfig::default());
    let transport = Arc::new(WebSocketClientTransport::new(
        format!("ws://{addr}"),
        WireVersion::V2,
        channels,
    ));
    let buffer = Arc::new(CommunicationBuffer::new());
    transport.start(Arc::clone(&buffer)).await.expect("client connect");
    AddClient {
        client: RpcClient::new(SERVICE, client_name),
        transport,
        buffer,
    }
}

pub async fn call_add(client: &AddClient, request_channel_id: i32, a: i64, b: i64, timeout: Duration) -> Option<Value> {
    let body = runner::call(
        &client.client,
        client.transport.as_ref(),
        &client.buffer,
        ROBOT,
        request_channel_id,
        Bytes::from(json!({"a": a, "b": b}).to_string()),
        POLL_INTERVAL,
        timeout,
    )
    .await?;
    serde_json::from_slice(&body).ok()
}
