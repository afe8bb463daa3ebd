// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Protocol Runners (spec component I): the cooperative loops that drive
//! `RpcClient`/`RpcServer` over a `Transport`. One shape only — `call()`
//! and `serve()` are both plain `async fn`s built from `.await` points,
//! the single cooperative model the Design Notes in spec §9 call for
//! instead of duplicating an async/"nowait" API surface. The underlying
//! cores stay pure buffer inspection between these suspension points, the
//! same separation the teacher's `state_machine::common::Transition`
//! keeps between a state's `step()` and the driving loop
//! (`state_machine/nop_states.rs`).

use std::{sync::Arc, time::Duration};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::{
    buffer::CommunicationBuffer,
    envelope::{MetaRequestType, WireEnvelope},
    error::PduError,
    rpc::{
        client::RpcClient,
        constants::{ApiStatus, ClientEvent, ResultCode, ServerEvent},
        header::{RegisterRequestHeader, ResponseEnvelopeHeader},
        server::{ClientHandle, RpcServer},
    },
    transport::{EventHandler, Transport},
};

/// The `ClientHandle` fields as a fixed 12-byte body, carried as the user
/// body of the `ResponseEnvelopeHeader` that answers a `REGISTER_RPC_CLIENT`
/// request (spec §4.G step 3) — registration reuses the ordinary RPC reply
/// header rather than inventing a third wire shape.
fn encode_handle(handle: Option<ClientHandle>) -> Bytes {
    let h = handle.unwrap_or(ClientHandle {
        client_id: 0,
        request_channel_id: -1,
        response_channel_id: -1,
    });
    let mut buf = BytesMut::with_capacity(12);
    buf.put_u32_le(h.client_id);
    buf.put_i32_le(h.request_channel_id);
    buf.put_i32_le(h.response_channel_id);
    buf.freeze()
}

fn decode_handle(mut body: Bytes) -> Option<ClientHandle> {
    if body.len() < 12 {
        return None;
    }
    Some(ClientHandle {
        client_id: body.get_u32_le(),
        request_channel_id: body.get_i32_le(),
        response_channel_id: body.get_i32_le(),
    })
}

/// Drives one `RpcClient::register` (spec §4.H "Registration"): send the
/// `REGISTER_RPC_CLIENT` frame, then poll the client's own mailbox until the
/// reply arrives or `timeout` elapses. Registration has no channel_id of its
/// own yet — it is sent on the sentinel channel `-1` and matched purely by
/// `(service_name, client_name)`, the same key the mailbox uses for every
/// other reply.
pub async fn register(
    client: &RpcClient,
    transport: &dyn Transport,
    buffer: &CommunicationBuffer,
    robot_name: &str,
    poll_interval: Duration,
    timeout: Duration,
) -> bool {
    let (service_name, client_name) = client.build_register_request();
    let req = RegisterRequestHeader {
        service_name: service_name.clone(),
        client_name: client_name.clone(),
    };
    let frame = WireEnvelope::new(MetaRequestType::RegisterRpcClient, robot_name, -1, req.encode());
    if transport.send_binary(frame).await.is_err() {
        return false;
    }

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(body) = buffer.get_mailbox(&service_name, &client_name) {
            return match ResponseEnvelopeHeader::decode(&body) {
                Ok((header, handle_body)) => {
                    let handle = decode_handle(handle_body);
                    client.on_register_reply(header.result_code, handle).await
                },
                Err(e) => {
                    debug!(error = %e, "malformed registration reply, discarded");
                    false
                },
            };
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(poll_interval).await;
    }
}

/// Builds the server-side `EventHandler` that answers `REGISTER_RPC_CLIENT`
/// frames (spec §4.G steps 2-3): decode the request, register the client
/// against `server`, and send back the handle as an ordinary RPC reply.
pub fn register_handler(server: Arc<RpcServer>, transport: Arc<dyn Transport>, robot_name: String) -> EventHandler {
    Arc::new(move |frame: WireEnvelope| {
        let server = Arc::clone(&server);
        let transport = Arc::clone(&transport);
        let robot_name = robot_name.clone();
        Box::pin(async move {
            if frame.meta_request_type != MetaRequestType::RegisterRpcClient {
                return;
            }
            let Ok(req) = RegisterRequestHeader::decode(&frame.body) else {
                warn!("malformed registration request, dropped");
                return;
            };
            let (result_code, handle) = server.register_client(&req.service_name, &req.client_name).await;
            let status = if result_code == ResultCode::Ok {
                ApiStatus::Done
            } else {
                ApiStatus::Error
            };
            let header = ResponseEnvelopeHeader {
                request_id: 0,
                service_name: req.service_name,
                client_name: req.client_name,
                status,
                processing_percentage: if status == ApiStatus::Done { 100 } else { 0 },
                result_code,
            };
            let body = header.encode(&encode_handle(handle));
            let reply = WireEnvelope::new(MetaRequestType::PduDataRpcReply, robot_name, -1, body);
            if let Err(e) = transport.send_binary(reply).await {
                warn!(error = %e, "failed to send registration reply");
            }
        })
    })
}

/// Drives one `RpcClient::call`: send the request, poll until a reply,
/// timeout, or cancel-done, sending a `CANCEL` once the deadline passes.
/// Returns `None` on transport failure, on a canceled/timed-out call, or
/// once cancellation is acknowledged — the caller cannot distinguish
/// these (spec §7: transport and cancellation outcomes collapse to a
/// `null`/`false` result at the public boundary).
pub async fn call(
    client: &RpcClient,
    transport: &dyn Transport,
    buffer: &CommunicationBuffer,
    robot_name: &str,
    request_channel_id: i32,
    user_body: Bytes,
    poll_interval: Duration,
    timeout: Duration,
) -> Option<Bytes> {
    let poll_interval_msec = poll_interval.as_millis().min(u128::from(u32::MAX)) as u32;
    let req_body = client
        .get_request_buffer(poll_interval_msec, user_body)
        .await;
    let frame = WireEnvelope::new(
        MetaRequestType::PduDataRpcRequest,
        robot_name,
        request_channel_id,
        req_body,
    );

    if transport.send_binary(frame).await.is_err() {
        client.clear_last_request().await;
        return None;
    }

    let deadline = Instant::now() + timeout;
    let cancel_grace_deadline = deadline + poll_interval * 4;
    let mut cancel_sent = false;

    loop {
        let (event, body) = client.poll_response(buffer).await;
        match event {
            ClientEvent::ResponseIn => {
                client.clear_last_request().await;
                return body;
            },
            ClientEvent::RequestCancelDone => {
                client.clear_last_request().await;
                return None;
            },
            ClientEvent::None | ClientEvent::RequestTimeout => {
                let now = Instant::now();
                if !cancel_sent && now >= deadline {
                    debug!(%robot_name, "call deadline exceeded, sending cancel");
                    if let Some(cancel_body) = client.build_cancel_buffer().await {
                        let cancel_frame = WireEnvelope::new(
                            MetaRequestType::PduDataRpcRequest,
                            robot_name,
                            request_channel_id,
                            cancel_body,
                        );
                        let _ = transport.send_binary(cancel_frame).await;
                    }
                    cancel_sent = true;
                } else if cancel_sent && now >= cancel_grace_deadline {
                    warn!(%robot_name, "cancel acknowledgement never arrived, giving up");
                    client.clear_last_request().await;
                    return None;
                }
                sleep(poll_interval).await;
            },
        }
    }
}

/// Drives one `RpcServer` forever: poll, dispatch to `handler`, reply.
/// `handler` returning `Err` sends no reply at all (spec §4.G, §9: an
/// acknowledged weakness preserved for behavioural compatibility — the
/// client will observe a timeout rather than an error reply).
pub async fn serve<H, Fut>(
    server: &RpcServer,
    transport: &dyn Transport,
    buffer: &CommunicationBuffer,
    robot_name: &str,
    poll_interval: Duration,
    mut handler: H,
) where
    H: FnMut(u32, Bytes) -> Fut,
    Fut: Future<Output = Result<Bytes, PduError>>,
{
    loop {
        match server.poll_request(buffer).await {
            ServerEvent::RequestIn => {
                let Some((handle, request_id, body)) = server.get_request(buffer).await else {
                    continue;
                };
                match handler(request_id, body).await {
                    Ok(response_body) => {
                        if let Some((_, reply_body)) = server
                            .put_response(ApiStatus::Done, ResultCode::Ok, &response_body)
                            .await
                        {
                            send_reply(transport, robot_name, handle.response_channel_id, reply_body).await;
                        }
                    },
                    Err(e) => {
                        warn!(error = %e, client_id = handle.client_id, "handler failed, no reply sent");
                    },
                }
            },
            ServerEvent::RequestCancel => {
                if let Some((handle, reply_body)) = server.put_cancel_response().await {
                    send_reply(transport, robot_name, handle.response_channel_id, reply_body).await;
                }
            },
            ServerEvent::None => sleep(poll_interval).await,
        }
    }
}

async fn send_reply(transport: &dyn Transport, robot_name: &str, channel_id: i32, body: Bytes) {
    let frame = WireEnvelope::new(MetaRequestType::PduDataRpcReply, robot_name, channel_id, body);
    if let Err(e) = transport.send_binary(frame).await {
        warn!(error = %e, channel_id, "failed to send rpc reply");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_round_trips_through_wire_body() {
        let handle = ClientHandle {
            client_id: 3,
            request_channel_id: 6,
            response_channel_id: 7,
        };
        let encoded = encode_handle(Some(handle));
        assert_eq!(decode_handle(encoded), Some(handle));
    }

    #[test]
    fn missing_handle_decodes_to_sentinel() {
        let encoded = encode_handle(None);
        let decoded = decode_handle(encoded).unwrap();
        assert_eq!(decoded.client_id, 0);
        assert_eq!(decoded.request_channel_id, -1);
    }
}
