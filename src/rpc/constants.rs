// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Stable status/result/opcode/event constants (spec §6, §4.G, §4.H).
//! Numeric values are part of the wire contract and must not be
//! renumbered.

use crate::error::PduError;

/// Per-client server-side state (spec §4.G state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ApiStatus {
    None = 0,
    Doing = 1,
    Canceling = 2,
    Done = 3,
    Error = 4,
}

impl TryFrom<u8> for ApiStatus {
    type Error = PduError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Doing),
            2 => Ok(Self::Canceling),
            3 => Ok(Self::Done),
            4 => Ok(Self::Error),
            other => Err(PduError::MalformedFrame(format!(
                "unknown api status {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResultCode {
    Ok = 0,
    Error = 1,
    Canceled = 2,
    Invalid = 3,
    Busy = 4,
}

impl TryFrom<u8> for ResultCode {
    type Error = PduError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Ok),
            1 => Ok(Self::Error),
            2 => Ok(Self::Canceled),
            3 => Ok(Self::Invalid),
            4 => Ok(Self::Busy),
            other => Err(PduError::MalformedFrame(format!(
                "unknown result code {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientOpcode {
    Request = 0,
    Cancel = 1,
}

impl TryFrom<u8> for ClientOpcode {
    type Error = PduError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Request),
            1 => Ok(Self::Cancel),
            other => Err(PduError::MalformedFrame(format!("unknown opcode {other}"))),
        }
    }
}

/// Event returned from `RpcClient::poll_response` (spec §4.H).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent {
    None,
    ResponseIn,
    RequestTimeout,
    RequestCancelDone,
}

/// Event returned from `RpcServer::poll_request` (spec §4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerEvent {
    None,
    RequestIn,
    RequestCancel,
}
