// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use futures_util::{
    SinkExt, StreamExt,
    future::BoxFuture,
    stream::{SplitSink, SplitStream},
};
use tokio::{net::TcpStream, sync::Mutex};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    buffer::CommunicationBuffer,
    channel::ChannelConfig,
    envelope::{WireEnvelope, WireVersion},
    error::PduError,
    transport::{EventHandler, Transport, common::io_with_timeout},
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One peer-to-peer WebSocket connection, initiated by us. Holds the
/// split sink behind a `Mutex` the way the teacher's `ClientConnection`
/// holds `writer: Mutex<OwnedWriteHalf>` — a single in-flight writer, many
/// concurrent callers.
pub struct WebSocketClientTransport {
    uri: String,
    version: WireVersion,
    channels: Arc<ChannelConfig>,
    io_timeout: Duration,
    cancel: CancellationToken,
    sink: Mutex<Option<SplitSink<WsStream, Message>>>,
    handler: Mutex<Option<EventHandler>>,
}

impl WebSocketClientTransport {
    pub fn new(uri: impl Into<String>, version: WireVersion, channels: Arc<ChannelConfig>) -> Self {
        Self {
            uri: uri.into(),
            version,
            channels,
            io_timeout: Duration::from_secs(5),
            cancel: CancellationToken::new(),
            sink: Mutex::new(None),
            handler: Mutex::new(None),
        }
    }

    async fn receive_loop(
        version: WireVersion,
        channels: Arc<ChannelConfig>,
        buffer: Arc<CommunicationBuffer>,
        handler: EventHandler,
        mut stream: SplitStream<WsStream>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("websocket client receive loop cancelled");
                    return;
                }
                msg = stream.next() => {
                    match msg {
                        Some(Ok(Message::Binary(raw))) => {
                            if !dispatch_frame(version, &channels, &buffer, &handler, Bytes::from(raw)) {
                                return;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!("websocket client connection closed");
                            return;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "websocket client read error, closing");
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Decodes and routes one inbound frame. Returns `false` on decode
/// failure, signaling the caller to close the connection rather than
/// keep reading past a malformed frame.
fn dispatch_frame(
    version: WireVersion,
    channels: &ChannelConfig,
    buffer: &CommunicationBuffer,
    handler: &EventHandler,
    raw: Bytes,
) -> bool {
    use crate::envelope::MetaRequestType::*;
    match WireEnvelope::decode(raw, version) {
        Ok(frame) => {
            match frame.meta_request_type {
                PduData | PduDataRpcRequest | PduDataRpcReply => {
                    buffer.put_packet(channels, frame);
                },
                DeclarePduForRead | DeclarePduForWrite | RequestPduRead | RegisterRpcClient => {
                    let handler = handler.clone();
                    tokio::spawn(async move { handler(frame).await });
                },
            }
            true
        },
        Err(e) => {
            warn!(error = %e, "malformed frame, closing connection");
            false
        },
    }
}

impl Transport for WebSocketClientTransport {
    fn start<'a>(
        &'a self,
        buffer: Arc<CommunicationBuffer>,
    ) -> BoxFuture<'a, Result<(), PduError>> {
        Box::pin(async move {
            let (ws, _resp) = io_with_timeout(
                "websocket connect",
                async {
                    connect_async(&self.uri)
                        .await
                        .map_err(|e| std::io::Error::other(e.to_string()))
                },
                self.io_timeout,
                &self.cancel,
            )
            .await?;

            let (sink, stream) = ws.split();
            *self.sink.lock().await = Some(sink);

            let handler = self
                .handler
                .lock()
                .await
                .clone()
                .unwrap_or_else(|| Arc::new(|_| Box::pin(async {})));

            tokio::spawn(Self::receive_loop(
                self.version,
                Arc::clone(&self.channels),
                buffer,
                handler,
                stream,
                self.cancel.clone(),
            ));
            info!(uri = %self.uri, "websocket client started");
            Ok(())
        })
    }

    fn stop<'a>(&'a self) -> BoxFuture<'a, Result<(), PduError>> {
        Box::pin(async move {
            self.cancel.cancel();
            if let Some(mut sink) = self.sink.lock().await.take() {
                let _ = sink.close().await;
            }
            Ok(())
        })
    }

    fn send_binary<'a>(&'a self, frame: WireEnvelope) -> BoxFuture<'a, Result<(), PduError>> {
        Box::pin(async move {
            let raw = frame.encode(self.version);
            let mut guard = self.sink.lock().await;
            let sink = guard
                .as_mut()
                .ok_or_else(|| PduError::Transport("not connected".into()))?;
            io_with_timeout(
                "websocket send",
                async {
                    sink.send(Message::Binary(raw.to_vec().into()))
                        .await
                        .map_err(|e| std::io::Error::other(e.to_string()))
                },
                self.io_timeout,
                &self.cancel,
            )
            .await
        })
    }

    fn register_event_handler(&self, handler: EventHandler) {
        if let Ok(mut guard) = self.handler.try_lock() {
            *guard = Some(handler);
        }
    }
}
