// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The native simulation conductor (spec §1 "out of scope", §4.D, §9):
//! an opaque handle exposing `pdu_read`/`pdu_create`/`asset_service_*`.
//! This crate only depends on the shape below; the concrete conductor is
//! injected by the embedding application (an FFI binding, a test double,
//! or a future native crate).

use bytes::Bytes;

use crate::error::PduError;

/// Channel ids the conductor assigned for one RPC client, returned from
/// `asset_service_register` (the broker-assigned mode of spec §4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConductorChannelPair {
    pub request_channel_id: i32,
    pub response_channel_id: i32,
}

/// Capability set the shared-memory transport drives. Every method is
/// synchronous: the conductor is a local library call, not I/O.
pub trait Conductor: Send + Sync {
    fn pdu_create(&self, robot_name: &str, channel_id: i32, pdu_size: i64) -> Result<(), PduError>;

    fn pdu_read(&self, robot_name: &str, channel_id: i32) -> Result<Option<Bytes>, PduError>;

    fn pdu_write(&self, robot_name: &str, channel_id: i32, body: Bytes) -> Result<(), PduError>;

    /// Broker-assigned channel pair for `(service_index, client_index)`
    /// (spec §4.E "Broker-assigned" mode).
    fn asset_service_register(
        &self,
        service_index: usize,
        client_index: usize,
    ) -> Result<ConductorChannelPair, PduError>;

    /// One polling tick; returns any RPC frame body the conductor has
    /// queued for `(service_name, client_name)`, consuming it.
    fn asset_service_poll(
        &self,
        service_name: &str,
        client_name: &str,
    ) -> Result<Option<Bytes>, PduError>;
}
