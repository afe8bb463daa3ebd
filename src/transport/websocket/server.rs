// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use bytes::Bytes;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt, future::BoxFuture, stream::SplitSink};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::Mutex,
};
use tokio_tungstenite::{WebSocketStream, accept_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    buffer::CommunicationBuffer,
    channel::ChannelConfig,
    envelope::{MetaRequestType, WireEnvelope, WireVersion},
    error::PduError,
    transport::{EventHandler, Transport},
};

type WsStream = WebSocketStream<TcpStream>;
type SessionId = u64;

/// Accepts WebSocket connections and demultiplexes them into a sessions
/// map (spec §4.D: "single-client by default, but multi-session aware
/// internally"). `send_binary` broadcasts to every live session, which is
/// exactly single-client delivery when only one peer is connected.
pub struct WebSocketServerTransport {
    bind_addr: String,
    version: WireVersion,
    channels: Arc<ChannelConfig>,
    cancel: CancellationToken,
    sessions: Arc<DashMap<SessionId, Mutex<SplitSink<WsStream, Message>>>>,
    next_session_id: AtomicU64,
    handler: Mutex<Option<EventHandler>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl WebSocketServerTransport {
    pub fn new(
        bind_addr: impl Into<String>,
        version: WireVersion,
        channels: Arc<ChannelConfig>,
    ) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            version,
            channels,
            cancel: CancellationToken::new(),
            sessions: Arc::new(DashMap::new()),
            next_session_id: AtomicU64::new(0),
            handler: Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    /// The address actually bound after `start()` — useful when
    /// constructed with a `:0` port and the caller needs to know which
    /// port the OS picked (tests, ephemeral services).
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    async fn accept_loop(
        listener: TcpListener,
        version: WireVersion,
        channels: Arc<ChannelConfig>,
        buffer: Arc<CommunicationBuffer>,
        sessions: Arc<DashMap<SessionId, Mutex<SplitSink<WsStream, Message>>>>,
        next_id: Arc<AtomicU64>,
        handler: Mutex<Option<EventHandler>>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                accepted = listener.accept() => {
                    let Ok((stream, peer)) = accepted else { continue };
                    let Ok(ws) = accept_async(stream).await else { continue };
                    let session_id = next_id.fetch_add(1, Ordering::SeqCst);
                    let (sink, mut recv) = ws.split();
                    sessions.insert(session_id, Mutex::new(sink));
                    info!(%peer, session_id, "websocket session accepted");

                    let channels = Arc::clone(&channels);
                    let buffer = Arc::clone(&buffer);
                    let sessions = Arc::clone(&sessions);
                    let handler = handler.lock().await.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        let handler = handler.unwrap_or_else(|| Arc::new(|_| Box::pin(async {})));
                        loop {
                            tokio::select! {
                                _ = cancel.cancelled() => break,
                                msg = recv.next() => {
                                    match msg {
                                        Some(Ok(Message::Binary(raw))) => {
                                            if !dispatch_frame(version, &channels, &buffer, &handler, Bytes::from(raw)) {
                                                break;
                                            }
                                        }
                                        Some(Ok(Message::Close(_))) | None => break,
                                        Some(Ok(_)) => {}
                                        Some(Err(e)) => {
                                            warn!(error = %e, "websocket server read error");
                                            break;
                                        }
                                    }
                                }
                            }
                        }
                        sessions.remove(&session_id);
                        debug!(session_id, "websocket session closed");
                    });
                }
            }
        }
    }
}

/// Decodes and routes one inbound frame. Returns `false` when the frame
/// failed to decode, signaling the caller to close the session (spec:
/// an unknown/malformed frame is discarded and the transport session is
/// closed, not merely logged).
fn dispatch_frame(
    version: WireVersion,
    channels: &ChannelConfig,
    buffer: &CommunicationBuffer,
    handler: &EventHandler,
    raw: Bytes,
) -> bool {
    match WireEnvelope::decode(raw, version) {
        Ok(frame) => {
            match frame.meta_request_type {
                MetaRequestType::PduData
                | MetaRequestType::PduDataRpcRequest
                | MetaRequestType::PduDataRpcReply => buffer.put_packet(channels, frame),
                MetaRequestType::DeclarePduForRead
                | MetaRequestType::DeclarePduForWrite
                | MetaRequestType::RequestPduRead
                | MetaRequestType::RegisterRpcClient => {
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

impl Transport for WebSocketServerTransport {
    fn start<'a>(
        &'a self,
        buffer: Arc<CommunicationBuffer>,
    ) -> BoxFuture<'a, Result<(), PduError>> {
        Box::pin(async move {
            let listener = TcpListener::bind(&self.bind_addr)
                .await
                .map_err(|e| PduError::Transport(format!("bind {}: {e}", self.bind_addr)))?;
            if let Ok(addr) = listener.local_addr() {
                *self.local_addr.lock().await = Some(addr);
            }
            info!(addr = %self.bind_addr, "websocket server listening");

            let handler = Mutex::new(self.handler.lock().await.clone());
            tokio::spawn(Self::accept_loop(
                listener,
                self.version,
                Arc::clone(&self.channels),
                buffer,
                Arc::clone(&self.sessions),
                Arc::new(AtomicU64::new(self.next_session_id.load(Ordering::SeqCst))),
                handler,
                self.cancel.clone(),
            ));
            Ok(())
        })
    }

    fn stop<'a>(&'a self) -> BoxFuture<'a, Result<(), PduError>> {
        Box::pin(async move {
            self.cancel.cancel();
            for mut entry in self.sessions.iter_mut() {
                let _ = entry.value_mut().lock().await.close().await;
            }
            self.sessions.clear();
            Ok(())
        })
    }

    fn send_binary<'a>(&'a self, frame: WireEnvelope) -> BoxFuture<'a, Result<(), PduError>> {
        Box::pin(async move {
            let raw = frame.encode(self.version);
            let mut sent_any = false;
            for entry in self.sessions.iter() {
                let mut sink = entry.value().lock().await;
                if sink.send(Message::Binary(raw.to_vec().into())).await.is_ok() {
                    sent_any = true;
                }
            }
            if sent_any {
                Ok(())
            } else {
                Err(PduError::Transport("no connected sessions".into()))
            }
        })
    }

    fn register_event_handler(&self, handler: EventHandler) {
        if let Ok(mut guard) = self.handler.try_lock() {
            *guard = Some(handler);
        }
    }
}
