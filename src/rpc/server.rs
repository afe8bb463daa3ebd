// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! RPC Server Core (spec component G): registration, per-client
//! bookkeeping, and the single-in-flight request/response cycle. Mirrors
//! the teacher's `Pool`/`Session` registries (`client/pool_sessions.rs`)
//! in shape — a `DashMap`-backed collection owned by one endpoint.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    buffer::CommunicationBuffer,
    error::PduError,
    rpc::{
        constants::{ApiStatus, ClientOpcode, ResultCode, ServerEvent},
        header::{RequestEnvelopeHeader, ResponseEnvelopeHeader},
    },
};

/// Assigned to a client at registration time (spec §3). `client_id` is
/// the zero-based registration index; channels are always `2·client_id`
/// and `2·client_id + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientHandle {
    pub client_id: u32,
    pub request_channel_id: i32,
    pub response_channel_id: i32,
}

impl ClientHandle {
    fn for_index(client_id: u32) -> Self {
        Self {
            client_id,
            request_channel_id: 2 * client_id as i32,
            response_channel_id: 2 * client_id as i32 + 1,
        }
    }
}

/// One service's client registry, in registration order (poll tie-break
/// is service-declaration order then client-registration order, so the
/// order of this `Vec` is load-bearing, not incidental).
struct ClientRegistry {
    max_clients: usize,
    clients: Vec<(String, ClientHandle)>,
}

impl ClientRegistry {
    fn new(max_clients: usize) -> Self {
        Self {
            max_clients,
            clients: Vec::new(),
        }
    }

    fn find(&self, client_name: &str) -> Option<ClientHandle> {
        self.clients
            .iter()
            .find(|(name, _)| name == client_name)
            .map(|(_, h)| *h)
    }

    fn register(&mut self, client_name: &str) -> Result<ClientHandle, ResultCode> {
        if self.find(client_name).is_some() {
            return Err(ResultCode::Error);
        }
        if self.clients.len() >= self.max_clients {
            return Err(ResultCode::Busy);
        }
        let handle = ClientHandle::for_index(self.clients.len() as u32);
        self.clients.push((client_name.to_owned(), handle));
        Ok(handle)
    }
}

#[derive(Debug, Clone)]
struct CurrentRequest {
    service_name: String,
    client_name: String,
    request_id: u32,
}

/// One server endpoint. Owns the registries for every service it exposes
/// and the single in-flight slot (spec §4.G invariant: at most one
/// `REQUEST_IN` outstanding at a time).
pub struct RpcServer {
    services: Vec<String>,
    registries: std::collections::HashMap<String, Mutex<ClientRegistry>>,
    current: Mutex<Option<CurrentRequest>>,
}

impl RpcServer {
    pub fn new(services: Vec<(String, usize)>) -> Self {
        let mut registries = std::collections::HashMap::new();
        let mut order = Vec::with_capacity(services.len());
        for (name, max_clients) in services {
            registries.insert(name.clone(), Mutex::new(ClientRegistry::new(max_clients)));
            order.push(name);
        }
        Self {
            services: order,
            registries,
            current: Mutex::new(None),
        }
    }

    /// Handles an inbound `REGISTER_RPC_CLIENT` request (spec §4.G
    /// registration protocol steps 2-3). Returns the reply envelope's
    /// header plus an empty body; callers attach handle fields as body
    /// bytes however their wire codec requires.
    pub async fn register_client(
        &self,
        service_name: &str,
        client_name: &str,
    ) -> (ResultCode, Option<ClientHandle>) {
        let Some(registry) = self.registries.get(service_name) else {
            warn!(service = service_name, "registration for unknown service");
            return (ResultCode::Invalid, None);
        };
        let mut registry = registry.lock().await;
        match registry.register(client_name) {
            Ok(handle) => {
                info!(service = service_name, client = client_name, client_id = handle.client_id, "client registered");
                (ResultCode::Ok, Some(handle))
            },
            Err(ResultCode::Busy) => {
                warn!(service = service_name, "service at max_clients");
                (ResultCode::Busy, None)
            },
            Err(_) => {
                warn!(service = service_name, client = client_name, "duplicate registration");
                (ResultCode::Error, None)
            },
        }
    }

    pub async fn client_handle(&self, service_name: &str, client_name: &str) -> Option<ClientHandle> {
        let registry = self.registries.get(service_name)?.lock().await;
        registry.find(client_name)
    }

    /// Scans for the next event. While a request is in flight, only that
    /// request's own mailbox is checked (for a matching `CANCEL`);
    /// everything else reports `None` until `put_response` clears it.
    pub async fn poll_request(&self, buffer: &CommunicationBuffer) -> ServerEvent {
        let mut current = self.current.lock().await;
        if let Some(cur) = current.as_ref() {
            if let Some(body) = buffer.peek_mailbox(&cur.service_name, &cur.client_name) {
                if let Ok((header, _)) = RequestEnvelopeHeader::decode(&body) {
                    if header.opcode == ClientOpcode::Cancel
                        && header.request_id == cur.request_id
                    {
                        buffer.get_mailbox(&cur.service_name, &cur.client_name);
                        return ServerEvent::RequestCancel;
                    }
                }
            }
            return ServerEvent::None;
        }

        for service_name in &self.services {
            let registry = self.registries[service_name].lock().await;
            for (client_name, _) in &registry.clients {
                let Some(body) = buffer.peek_mailbox(service_name, client_name) else {
                    continue;
                };
                match RequestEnvelopeHeader::decode(&body) {
                    Ok((header, _)) => match header.opcode {
                        ClientOpcode::Request => {
                            *current = Some(CurrentRequest {
                                service_name: service_name.clone(),
                                client_name: client_name.clone(),
                                request_id: header.request_id,
                            });
                            return ServerEvent::RequestIn;
                        },
                        ClientOpcode::Cancel => {
                            buffer.get_mailbox(service_name, client_name);
                            *current = Some(CurrentRequest {
                                service_name: service_name.clone(),
                                client_name: client_name.clone(),
                                request_id: header.request_id,
                            });
                            return ServerEvent::RequestCancel;
                        },
                    },
                    Err(e) => {
                        debug!(error = %e, "malformed request header during poll");
                        continue;
                    },
                }
            }
        }
        ServerEvent::None
    }

    /// Drains the current mailbox entry. Must only be called after
    /// `poll_request` returned `RequestIn`.
    pub async fn get_request(
        &self,
        buffer: &CommunicationBuffer,
    ) -> Option<(ClientHandle, u32, Bytes)> {
        let current = self.current.lock().await;
        let cur = current.as_ref()?;
        let body = buffer.get_mailbox(&cur.service_name, &cur.client_name)?;
        let (header, user_body) = RequestEnvelopeHeader::decode(&body).ok()?;
        let registry = self.registries.get(&cur.service_name)?.lock().await;
        let handle = registry.find(&cur.client_name)?;
        Some((handle, header.request_id, user_body))
    }

    fn response_header(
        service_name: &str,
        client_name: &str,
        request_id: u32,
        status: ApiStatus,
        result_code: ResultCode,
    ) -> ResponseEnvelopeHeader {
        ResponseEnvelopeHeader {
            request_id,
            service_name: service_name.to_owned(),
            client_name: client_name.to_owned(),
            status,
            processing_percentage: if status == ApiStatus::Done { 100 } else { 0 },
            result_code,
        }
    }

    /// Builds the reply body (header + user body) and clears the
    /// in-flight slot. Sending it on `handle.response_channel_id` is the
    /// caller's responsibility (the runner owns the transport).
    pub async fn put_response(
        &self,
        status: ApiStatus,
        result_code: ResultCode,
        user_body: &[u8],
    ) -> Option<(ClientHandle, Bytes)> {
        let mut current = self.current.lock().await;
        let cur = current.take()?;
        let registry = self.registries.get(&cur.service_name)?.lock().await;
        let handle = registry.find(&cur.client_name)?;
        let header = Self::response_header(
            &cur.service_name,
            &cur.client_name,
            cur.request_id,
            status,
            result_code,
        );
        Some((handle, header.encode(user_body)))
    }

    /// Synthesises the canonical `CANCELED` reply (spec §3, §9: this is
    /// the behaviour the Python source left unimplemented).
    pub async fn put_cancel_response(&self) -> Option<(ClientHandle, Bytes)> {
        self.put_response(ApiStatus::Done, ResultCode::Canceled, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cancel_request(request_id: u32) -> Bytes {
        RequestEnvelopeHeader {
            request_id,
            service_name: "Add".into(),
            client_name: "Client_1".into(),
            opcode: ClientOpcode::Cancel,
            status_poll_interval_msec: 50,
        }
        .encode(b"")
    }

    /// A `CANCEL` arriving with no request already in flight must be
    /// drained from the mailbox as soon as `poll_request` reports it;
    /// otherwise the next `poll_request` call re-observes the same stale
    /// entry forever and the server spins sending duplicate cancel
    /// replies instead of progressing to the next real request.
    #[tokio::test]
    async fn stray_cancel_is_drained_not_repeated() {
        let server = RpcServer::new(vec![("Add".into(), 1)]);
        server.register_client("Add", "Client_1").await;
        let buffer = CommunicationBuffer::new();
        buffer.put_rpc_packet("Add", "Client_1", cancel_request(3));

        assert_eq!(server.poll_request(&buffer).await, ServerEvent::RequestCancel);
        assert!(server.put_cancel_response().await.is_some());

        assert_eq!(server.poll_request(&buffer).await, ServerEvent::None);
    }

    /// Same invariant when the `CANCEL` arrives for a request already
    /// in flight (the common case: `serve()` processed the `Request`,
    /// `get_request` drained it, and the handler is still running when
    /// `CANCEL` lands).
    #[tokio::test]
    async fn in_flight_cancel_is_drained_not_repeated() {
        let server = RpcServer::new(vec![("Add".into(), 1)]);
        server.register_client("Add", "Client_1").await;
        let buffer = CommunicationBuffer::new();
        buffer.put_rpc_packet(
            "Add",
            "Client_1",
            RequestEnvelopeHeader {
                request_id: 5,
                service_name: "Add".into(),
                client_name: "Client_1".into(),
                opcode: ClientOpcode::Request,
                status_poll_interval_msec: 50,
            }
            .encode(b"1,2"),
        );
        assert_eq!(server.poll_request(&buffer).await, ServerEvent::RequestIn);
        assert!(server.get_request(&buffer).await.is_some());

        buffer.put_rpc_packet("Add", "Client_1", cancel_request(5));
        assert_eq!(server.poll_request(&buffer).await, ServerEvent::RequestCancel);
        assert!(server.put_cancel_response().await.is_some());

        assert_eq!(server.poll_request(&buffer).await, ServerEvent::None);
    }
}
