// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Transport Adapters (spec component D): two interchangeable transports
//! behind one capability set — shared memory (broker-mediated, delegates
//! to the native conductor) and WebSocket (peer-to-peer, client and
//! server variants). Both run an internal receive loop that decodes the
//! wire envelope and dispatches by `meta_request_type`.

pub mod common;
pub mod shared_memory;
pub mod websocket;

use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;

use crate::{buffer::CommunicationBuffer, envelope::WireEnvelope, error::PduError};

/// Invoked for frame types the receive loop does not route into the
/// buffer itself (`DECLARE_PDU_FOR_READ/WRITE`, `REQUEST_PDU_READ`,
/// `REGISTER_RPC_CLIENT`). Must not block the receive loop — the loop
/// spawns it as a fresh task rather than awaiting it inline.
pub type EventHandler =
    Arc<dyn Fn(WireEnvelope) -> BoxFuture<'static, ()> + Send + Sync>;

/// The capability set every transport satisfies (spec §4.D). `start`
/// takes the buffer it feeds and begins the receive loop; `send_data`
/// wraps `body` as a `PDU_DATA` envelope while `send_binary` ships an
/// already-framed envelope (used by the RPC cores and by declare/request
/// sentinels).
pub trait Transport: Send + Sync {
    fn start<'a>(
        &'a self,
        buffer: Arc<CommunicationBuffer>,
    ) -> BoxFuture<'a, Result<(), PduError>>;

    fn stop<'a>(&'a self) -> BoxFuture<'a, Result<(), PduError>>;

    fn send_binary<'a>(&'a self, frame: WireEnvelope) -> BoxFuture<'a, Result<(), PduError>>;

    fn send_data<'a>(
        &'a self,
        robot_name: &'a str,
        channel_id: i32,
        body: Bytes,
    ) -> BoxFuture<'a, Result<(), PduError>> {
        let frame = WireEnvelope::data(robot_name, channel_id, body);
        self.send_binary(frame)
    }

    fn register_event_handler(&self, handler: EventHandler);
}
