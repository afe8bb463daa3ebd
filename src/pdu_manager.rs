// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! PDU Manager (spec component F): the facade clients and servers build
//! on top of — channel config + communication buffer + one transport.

use std::{
    sync::{Arc, RwLock},
    time::Duration,
};

use bytes::Bytes;
use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::{
    buffer::CommunicationBuffer,
    channel::ChannelConfig,
    envelope::{MetaRequestType, WireEnvelope},
    error::PduError,
    service::ServiceConfig,
    transport::Transport,
};

/// Binds one channel config to one transport. The channel config is
/// copy-on-write: `init_service` swaps in a freshly-merged config before
/// `start()`; after that it is read-only for the manager's lifetime
/// (spec §5 "Shared-resource policy").
pub struct PduManager {
    channels: RwLock<Arc<ChannelConfig>>,
    buffer: Arc<CommunicationBuffer>,
    transport: Arc<dyn Transport>,
}

impl PduManager {
    pub fn new(channels: ChannelConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            channels: RwLock::new(Arc::new(channels)),
            buffer: Arc::new(CommunicationBuffer::new()),
            transport,
        }
    }

    pub fn channels(&self) -> Arc<ChannelConfig> {
        Arc::clone(
            &self
                .channels
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        )
    }

    pub fn buffer(&self) -> Arc<CommunicationBuffer> {
        Arc::clone(&self.buffer)
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// Merges `service_config`'s synthesised per-service and per-node
    /// robots into the channel config. SPEC_FULL §3: both the client and
    /// the server side call this before the registration handshake, not
    /// only the server.
    pub fn init_service(&self, service_config: &ServiceConfig) {
        let synthesized = service_config.synthesize_channel_config();
        let mut guard = self
            .channels
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut updated = ChannelConfig::from_legacy(guard.get_pdudef().clone());
        updated.update_pdudef(synthesized);
        debug!("channel config merged with synthesised service channels");
        *guard = Arc::new(updated);
    }

    pub async fn start(&self) -> Result<(), PduError> {
        self.transport.start(Arc::clone(&self.buffer)).await
    }

    pub async fn stop(&self) -> Result<(), PduError> {
        self.transport.stop().await
    }

    async fn declare(
        &self,
        meta_request_type: MetaRequestType,
        robot_name: &str,
        pdu_name: &str,
    ) -> Result<(), PduError> {
        let channel_id = self.channels().get_pdu_channel_id(robot_name, pdu_name);
        let frame = WireEnvelope::sentinel(meta_request_type, robot_name, channel_id);
        self.transport.send_binary(frame).await
    }

    pub async fn declare_pdu_for_read(&self, robot_name: &str, pdu_name: &str) -> Result<(), PduError> {
        self.declare(MetaRequestType::DeclarePduForRead, robot_name, pdu_name)
            .await
    }

    pub async fn declare_pdu_for_write(&self, robot_name: &str, pdu_name: &str) -> Result<(), PduError> {
        self.declare(MetaRequestType::DeclarePduForWrite, robot_name, pdu_name)
            .await
    }

    pub async fn declare_pdu_for_readwrite(&self, robot_name: &str, pdu_name: &str) -> Result<(), PduError> {
        self.declare_pdu_for_read(robot_name, pdu_name).await?;
        self.declare_pdu_for_write(robot_name, pdu_name).await
    }

    pub async fn publish_pdu(&self, robot_name: &str, channel_id: i32, body: Bytes) -> Result<(), PduError> {
        self.transport.send_data(robot_name, channel_id, body).await
    }

    /// Latest known value, without issuing a fresh read request. Consumes
    /// the value like every other topic read (spec §4.C get/peek split) —
    /// a second call with no intervening publish sees nothing.
    pub fn read_pdu_raw_data(&self, robot_name: &str, pdu_name: &str) -> Option<Bytes> {
        self.buffer.get_buffer(robot_name, pdu_name)
    }

    /// Sends a `REQUEST_PDU_READ` sentinel, then polls the buffer until
    /// `timeout` elapses (spec §4.F).
    pub async fn request_pdu_read(
        &self,
        robot_name: &str,
        pdu_name: &str,
        timeout: Duration,
    ) -> Option<Bytes> {
        let channel_id = self.channels().get_pdu_channel_id(robot_name, pdu_name);
        let frame = WireEnvelope::sentinel(MetaRequestType::RequestPduRead, robot_name, channel_id);
        if self.transport.send_binary(frame).await.is_err() {
            return None;
        }

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(body) = self.buffer.get_buffer(robot_name, pdu_name) {
                return Some(body);
            }
            if Instant::now() >= deadline {
                return None;
            }
            sleep(Duration::from_millis(20)).await;
        }
    }
}
