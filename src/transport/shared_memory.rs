// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Shared-memory transport (spec §4.D): delegates to the native
//! conductor instead of running a socket receive loop. The "receive
//! loop" becomes a polling task against `Conductor::pdu_read`.

use std::{sync::Arc, time::Duration};

use futures_util::future::BoxFuture;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    buffer::CommunicationBuffer,
    channel::ChannelConfig,
    conductor::Conductor,
    envelope::{MetaRequestType, WireEnvelope},
    error::PduError,
    transport::{EventHandler, Transport},
};

pub struct SharedMemoryTransport {
    conductor: Arc<dyn Conductor>,
    channels: Arc<ChannelConfig>,
    poll_interval: Duration,
    cancel: CancellationToken,
    handler: Mutex<Option<EventHandler>>,
}

impl SharedMemoryTransport {
    pub fn new(conductor: Arc<dyn Conductor>, channels: Arc<ChannelConfig>) -> Self {
        Self {
            conductor,
            channels,
            poll_interval: Duration::from_millis(10),
            cancel: CancellationToken::new(),
            handler: Mutex::new(None),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn poll_loop(
        conductor: Arc<dyn Conductor>,
        channels: Arc<ChannelConfig>,
        buffer: Arc<CommunicationBuffer>,
        interval: Duration,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("shared-memory poll loop cancelled");
                    return;
                }
                _ = ticker.tick() => {
                    for reader in channels.get_shm_pdu_readers() {
                        match conductor.pdu_read(&reader.robot_name, reader.channel_id) {
                            Ok(Some(body)) => {
                                let frame = WireEnvelope::data(
                                    reader.robot_name.clone(),
                                    reader.channel_id,
                                    body,
                                );
                                buffer.put_packet(&channels, frame);
                            }
                            Ok(None) => {}
                            Err(e) => warn!(error = %e, robot = %reader.robot_name, "conductor pdu_read failed"),
                        }
                    }
                }
            }
        }
    }
}

impl Transport for SharedMemoryTransport {
    fn start<'a>(
        &'a self,
        buffer: Arc<CommunicationBuffer>,
    ) -> BoxFuture<'a, Result<(), PduError>> {
        Box::pin(async move {
            tokio::spawn(Self::poll_loop(
                Arc::clone(&self.conductor),
                Arc::clone(&self.channels),
                buffer,
                self.poll_interval,
                self.cancel.clone(),
            ));
            Ok(())
        })
    }

    fn stop<'a>(&'a self) -> BoxFuture<'a, Result<(), PduError>> {
        Box::pin(async move {
            self.cancel.cancel();
            Ok(())
        })
    }

    fn send_binary<'a>(&'a self, frame: WireEnvelope) -> BoxFuture<'a, Result<(), PduError>> {
        Box::pin(async move {
            match frame.meta_request_type {
                MetaRequestType::PduData
                | MetaRequestType::PduDataRpcRequest
                | MetaRequestType::PduDataRpcReply => self.conductor.pdu_write(
                    &frame.robot_name,
                    frame.channel_id,
                    frame.body,
                ),
                MetaRequestType::DeclarePduForRead | MetaRequestType::DeclarePduForWrite => {
                    let pdu_name = self
                        .channels
                        .get_pdu_name(&frame.robot_name, frame.channel_id)
                        .ok_or_else(|| {
                            PduError::Transport(format!(
                                "no channel {} on robot {}",
                                frame.channel_id, frame.robot_name
                            ))
                        })?
                        .to_owned();
                    let size = self.channels.get_pdu_size(&frame.robot_name, &pdu_name);
                    self.conductor
                        .pdu_create(&frame.robot_name, frame.channel_id, size)
                },
                MetaRequestType::RequestPduRead | MetaRequestType::RegisterRpcClient => Ok(()),
            }
        })
    }

    fn register_event_handler(&self, handler: EventHandler) {
        if let Ok(mut guard) = self.handler.try_lock() {
            *guard = Some(handler);
        }
    }
}
