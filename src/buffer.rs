// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Communication Buffer (spec component C): the single synchronisation
//! point between a transport's receive path and the RPC cores that read
//! it. Two sub-stores, both keyed through `DashMap` the way the teacher's
//! `ClientConnection` demultiplexes per-tag channels in
//! `client/client.rs` (`sending`/`reciver: DashMap<u32, mpsc::*>`).

use std::collections::VecDeque;

use bytes::Bytes;
use dashmap::DashMap;
use tracing::{debug, trace};

use crate::{
    channel::ChannelConfig,
    envelope::{MetaRequestType, WireEnvelope},
    rpc::header::{RequestEnvelopeHeader, ResponseEnvelopeHeader},
};

type TopicKey = (String, String);
type MailboxKey = (String, String);

/// Thread-safe demux store. `topic_buffers` holds the latest value per
/// `(robot, pdu_name)`; `rpc_mailboxes` holds a FIFO per `(service,
/// client)`. Both maps are locked per-entry by `DashMap`, so a topic write
/// never blocks an unrelated mailbox read.
#[derive(Default)]
pub struct CommunicationBuffer {
    topic_buffers: DashMap<TopicKey, Bytes>,
    rpc_mailboxes: DashMap<MailboxKey, VecDeque<Bytes>>,
}

impl CommunicationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes an inbound envelope: `PDU_DATA` into the topic store,
    /// `PDU_DATA_RPC_REQUEST`/`PDU_DATA_RPC_REPLY` into the mailbox named
    /// by the embedded envelope header. Unrecognised RPC frame bodies
    /// (too short to carry a header) are dropped and logged rather than
    /// panicking the receive loop.
    pub fn put_packet(&self, channels: &ChannelConfig, frame: WireEnvelope) {
        match frame.meta_request_type {
            MetaRequestType::PduData => {
                let Some(name) = channels
                    .get_pdu_name(&frame.robot_name, frame.channel_id)
                    .map(str::to_owned)
                else {
                    trace!(
                        robot = %frame.robot_name,
                        channel_id = frame.channel_id,
                        "topic write for unknown channel, dropped"
                    );
                    return;
                };
                self.topic_buffers
                    .insert((frame.robot_name, name), frame.body);
            },
            MetaRequestType::PduDataRpcRequest => {
                match RequestEnvelopeHeader::decode(&frame.body) {
                    Ok((header, _)) => {
                        self.put_rpc_packet(&header.service_name, &header.client_name, frame.body)
                    },
                    Err(e) => debug!(error = %e, "malformed rpc request header, dropped"),
                }
            },
            MetaRequestType::PduDataRpcReply => {
                match ResponseEnvelopeHeader::decode(&frame.body) {
                    Ok((header, _)) => {
                        self.put_rpc_packet(&header.service_name, &header.client_name, frame.body)
                    },
                    Err(e) => debug!(error = %e, "malformed rpc reply header, dropped"),
                }
            },
            other => {
                trace!(?other, "frame type is not buffer-routed");
            },
        }
    }

    pub fn put_rpc_packet(&self, service_name: &str, client_name: &str, body: Bytes) {
        self.rpc_mailboxes
            .entry((service_name.to_owned(), client_name.to_owned()))
            .or_default()
            .push_back(body);
    }

    pub fn contains_buffer(&self, robot_name: &str, pdu_name: &str) -> bool {
        self.topic_buffers
            .contains_key(&(robot_name.to_owned(), pdu_name.to_owned()))
    }

    pub fn peek_buffer(&self, robot_name: &str, pdu_name: &str) -> Option<Bytes> {
        self.topic_buffers
            .get(&(robot_name.to_owned(), pdu_name.to_owned()))
            .map(|entry| entry.value().clone())
    }

    /// Latest topic value, removing it (so a subsequent `peek`/`get`
    /// observes no value until the next publish).
    pub fn get_buffer(&self, robot_name: &str, pdu_name: &str) -> Option<Bytes> {
        self.topic_buffers
            .remove(&(robot_name.to_owned(), pdu_name.to_owned()))
            .map(|(_, v)| v)
    }

    pub fn peek_mailbox(&self, service_name: &str, client_name: &str) -> Option<Bytes> {
        self.rpc_mailboxes
            .get(&(service_name.to_owned(), client_name.to_owned()))
            .and_then(|q| q.front().cloned())
    }

    pub fn get_mailbox(&self, service_name: &str, client_name: &str) -> Option<Bytes> {
        self.rpc_mailboxes
            .get_mut(&(service_name.to_owned(), client_name.to_owned()))
            .and_then(|mut q| q.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_get_removes_peek_does_not() {
        let buf = CommunicationBuffer::new();
        buf.topic_buffers
            .insert(("drone1".into(), "pos".into()), Bytes::from_static(b"v1"));
        assert_eq!(
            buf.peek_buffer("drone1", "pos"),
            Some(Bytes::from_static(b"v1"))
        );
        assert!(buf.contains_buffer("drone1", "pos"));
        assert_eq!(
            buf.get_buffer("drone1", "pos"),
            Some(Bytes::from_static(b"v1"))
        );
        assert!(!buf.contains_buffer("drone1", "pos"));
    }

    #[test]
    fn mailbox_drains_fifo() {
        let buf = CommunicationBuffer::new();
        buf.put_rpc_packet("Add", "Client_1", Bytes::from_static(b"first"));
        buf.put_rpc_packet("Add", "Client_1", Bytes::from_static(b"second"));
        assert_eq!(
            buf.peek_mailbox("Add", "Client_1"),
            Some(Bytes::from_static(b"first"))
        );
        assert_eq!(
            buf.get_mailbox("Add", "Client_1"),
            Some(Bytes::from_static(b"first"))
        );
        assert_eq!(
            buf.get_mailbox("Add", "Client_1"),
            Some(Bytes::from_static(b"second"))
        );
        assert_eq!(buf.get_mailbox("Add", "Client_1"), None);
    }
}
