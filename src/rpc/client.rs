// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! RPC Client Core (spec component H): registration, request-id
//! bookkeeping, and reply correlation. The cooperative `call()` loop that
//! drives this core lives in `rpc::runner` (spec §4.I keeps the core and
//! the driving loop separate, as the teacher separates `ClientConnection`
//! from the `state_machine` layer that drives it).

use std::sync::atomic::{AtomicU32, Ordering};

use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    buffer::CommunicationBuffer,
    rpc::{
        constants::{ClientEvent, ClientOpcode, ResultCode},
        header::{RequestEnvelopeHeader, ResponseEnvelopeHeader},
        server::ClientHandle,
    },
};

/// One outstanding call's bookkeeping, kept so `cancel()` can re-send the
/// same request with `opcode = CANCEL` (spec §4.H "Cancel").
#[derive(Debug, Clone)]
struct LastRequest {
    request_id: u32,
    poll_interval_msec: u32,
    user_body: Bytes,
}

pub struct RpcClient {
    service_name: String,
    client_name: String,
    handle: Mutex<Option<ClientHandle>>,
    next_request_id: AtomicU32,
    last_request: Mutex<Option<LastRequest>>,
}

impl RpcClient {
    pub fn new(service_name: impl Into<String>, client_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            client_name: client_name.into(),
            handle: Mutex::new(None),
            next_request_id: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    pub async fn handle(&self) -> Option<ClientHandle> {
        *self.handle.lock().await
    }

    pub fn build_register_request(&self) -> (String, String) {
        (self.service_name.clone(), self.client_name.clone())
    }

    /// Parses a `RegisterClientResponsePacket`-equivalent reply (spec
    /// §3). The wire shape for the handle fields is deferred to the
    /// protocol runner's codec; here we accept the already-parsed
    /// `result_code`/`handle` pair.
    pub async fn on_register_reply(&self, result_code: ResultCode, handle: Option<ClientHandle>) -> bool {
        if result_code == ResultCode::Ok {
            *self.handle.lock().await = handle;
            true
        } else {
            false
        }
    }

    /// Allocates the next monotonic `request_id` and builds the framed
    /// request body (spec §4.H step 1-2).
    pub async fn get_request_buffer(&self, poll_interval_msec: u32, user_body: Bytes) -> Bytes {
        let request_id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().await = Some(LastRequest {
            request_id,
            poll_interval_msec,
            user_body: user_body.clone(),
        });
        let header = RequestEnvelopeHeader {
            request_id,
            service_name: self.service_name.clone(),
            client_name: self.client_name.clone(),
            opcode: ClientOpcode::Request,
            status_poll_interval_msec: poll_interval_msec,
        };
        header.encode(&user_body)
    }

    /// Re-encodes the last request with `opcode = CANCEL` (spec §4.H
    /// "Cancel"). Does not itself wait for the cancel to be acknowledged.
    pub async fn build_cancel_buffer(&self) -> Option<Bytes> {
        let last = self.last_request.lock().await.clone()?;
        let header = RequestEnvelopeHeader {
            request_id: last.request_id,
            service_name: self.service_name.clone(),
            client_name: self.client_name.clone(),
            opcode: ClientOpcode::Cancel,
            status_poll_interval_msec: last.poll_interval_msec,
        };
        Some(header.encode(&last.user_body))
    }

    /// Pure buffer inspection (spec §4.H "Between suspension points,
    /// `poll_response` is pure buffer inspection"): no I/O, just checks
    /// the mailbox for a matching reply.
    pub async fn poll_response(&self, buffer: &CommunicationBuffer) -> (ClientEvent, Option<Bytes>) {
        let Some(last_id) = self
            .last_request
            .lock()
            .await
            .as_ref()
            .map(|r| r.request_id)
        else {
            return (ClientEvent::None, None);
        };

        let Some(body) = buffer.get_mailbox(&self.service_name, &self.client_name) else {
            return (ClientEvent::None, None);
        };

        let Ok((header, user_body)) = ResponseEnvelopeHeader::decode(&body) else {
            debug!("malformed response header, discarded");
            return (ClientEvent::None, None);
        };

        if header.request_id != last_id {
            debug!(got = header.request_id, want = last_id, "stale reply discarded");
            return (ClientEvent::None, None);
        }

        if header.result_code == ResultCode::Canceled {
            (ClientEvent::RequestCancelDone, None)
        } else {
            (ClientEvent::ResponseIn, Some(user_body))
        }
    }

    pub async fn clear_last_request(&self) {
        *self.last_request.lock().await = None;
    }
}
