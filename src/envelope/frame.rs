// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Framing for the wire envelope carried by both transports.
//!
//! Layout (v2): `meta_request_type: u32 LE`, `channel_id: i32 LE`,
//! `robot_name_len: u32 LE`, `robot_name: [u8; robot_name_len]`, then the
//! remainder of the buffer is `body`. `v1` omits `meta_request_type` and
//! is always decoded as `PDU_DATA`.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::PduError;

/// Stable magic numbers for `meta_request_type`. Values match the
/// `hakoniwa_pdu` wire protocol and must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MetaRequestType {
    PduData = 0,
    DeclarePduForRead = 1,
    DeclarePduForWrite = 2,
    RequestPduRead = 3,
    RegisterRpcClient = 4,
    PduDataRpcRequest = 5,
    PduDataRpcReply = 6,
}

impl MetaRequestType {
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// A declare/request-read sentinel frame's body: its own magic number,
    /// little-endian, so the frame is self-describing without relying on
    /// `meta_request_type` alone.
    pub fn sentinel_body(self) -> Bytes {
        Bytes::copy_from_slice(&self.as_u32().to_le_bytes())
    }
}

impl TryFrom<u32> for MetaRequestType {
    type Error = PduError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::PduData),
            1 => Ok(Self::DeclarePduForRead),
            2 => Ok(Self::DeclarePduForWrite),
            3 => Ok(Self::RequestPduRead),
            4 => Ok(Self::RegisterRpcClient),
            5 => Ok(Self::PduDataRpcRequest),
            6 => Ok(Self::PduDataRpcReply),
            other => Err(PduError::MalformedFrame(format!(
                "unknown meta_request_type {other}"
            ))),
        }
    }
}

/// Which wire framing a transport is speaking. Both peers of a connection
/// must agree; it is a construction parameter, never negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireVersion {
    /// No `meta_request_type` on the wire; every frame decodes as
    /// `PDU_DATA`.
    V1,
    /// `meta_request_type` prefixed as a little-endian `u32`.
    V2,
}

/// One framed packet: `{meta_request_type, robot_name, channel_id, body}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireEnvelope {
    pub meta_request_type: MetaRequestType,
    pub robot_name: String,
    pub channel_id: i32,
    pub body: Bytes,
}

impl WireEnvelope {
    pub fn new(
        meta_request_type: MetaRequestType,
        robot_name: impl Into<String>,
        channel_id: i32,
        body: Bytes,
    ) -> Self {
        Self {
            meta_request_type,
            robot_name: robot_name.into(),
            channel_id,
            body,
        }
    }

    /// A self-describing declare/request-read sentinel frame.
    pub fn sentinel(
        meta_request_type: MetaRequestType,
        robot_name: impl Into<String>,
        channel_id: i32,
    ) -> Self {
        Self::new(
            meta_request_type,
            robot_name,
            channel_id,
            meta_request_type.sentinel_body(),
        )
    }

    /// A plain topic-data frame wrapping `body` in `PDU_DATA`.
    pub fn data(robot_name: impl Into<String>, channel_id: i32, body: Bytes) -> Self {
        Self::new(MetaRequestType::PduData, robot_name, channel_id, body)
    }

    pub fn encode(&self, version: WireVersion) -> Bytes {
        let robot_bytes = self.robot_name.as_bytes();
        let header_len = match version {
            WireVersion::V1 => 4 + 4 + robot_bytes.len(),
            WireVersion::V2 => 4 + 4 + 4 + robot_bytes.len(),
        };
        let mut buf = BytesMut::with_capacity(header_len + self.body.len());
        if version == WireVersion::V2 {
            buf.put_u32_le(self.meta_request_type.as_u32());
        }
        buf.put_i32_le(self.channel_id);
        buf.put_u32_le(robot_bytes.len() as u32);
        buf.put_slice(robot_bytes);
        buf.put_slice(&self.body);
        buf.freeze()
    }

    pub fn decode(mut bytes: Bytes, version: WireVersion) -> Result<Self, PduError> {
        let meta_request_type = match version {
            WireVersion::V1 => MetaRequestType::PduData,
            WireVersion::V2 => {
                if bytes.len() < 4 {
                    return Err(PduError::MalformedFrame(
                        "truncated meta_request_type".into(),
                    ));
                }
                MetaRequestType::try_from(bytes.get_u32_le())?
            },
        };

        if bytes.len() < 4 {
            return Err(PduError::MalformedFrame("truncated channel_id".into()));
        }
        let channel_id = bytes.get_i32_le();

        if bytes.len() < 4 {
            return Err(PduError::MalformedFrame("truncated robot_name_len".into()));
        }
        let robot_name_len = bytes.get_u32_le() as usize;
        if bytes.len() < robot_name_len {
            return Err(PduError::MalformedFrame("truncated robot_name".into()));
        }
        let robot_name_bytes = bytes.split_to(robot_name_len);
        let robot_name = String::from_utf8(robot_name_bytes.to_vec())
            .map_err(|e| PduError::MalformedFrame(format!("robot_name not utf8: {e}")))?;

        Ok(Self {
            meta_request_type,
            robot_name,
            channel_id,
            body: bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v2_round_trips_every_meta_request_type() {
        let all = [
            MetaRequestType::PduData,
            MetaRequestType::DeclarePduForRead,
            MetaRequestType::DeclarePduForWrite,
            MetaRequestType::RequestPduRead,
            MetaRequestType::RegisterRpcClient,
            MetaRequestType::PduDataRpcRequest,
            MetaRequestType::PduDataRpcReply,
        ];
        for mrt in all {
            let frame = WireEnvelope::new(mrt, "drone1", 7, Bytes::from_static(b"payload"));
            let encoded = frame.encode(WireVersion::V2);
            let decoded = WireEnvelope::decode(encoded, WireVersion::V2).unwrap();
            assert_eq!(frame, decoded);
        }
    }

    #[test]
    fn v1_always_decodes_as_pdu_data() {
        let frame = WireEnvelope::data("drone1", 3, Bytes::from_static(b"x"));
        let encoded = frame.encode(WireVersion::V1);
        let decoded = WireEnvelope::decode(encoded, WireVersion::V1).unwrap();
        assert_eq!(decoded.meta_request_type, MetaRequestType::PduData);
        assert_eq!(decoded.robot_name, "drone1");
    }

    #[test]
    fn truncated_frame_is_malformed() {
        let err = WireEnvelope::decode(Bytes::from_static(b"\x01\x00"), WireVersion::V2)
            .unwrap_err();
        assert!(matches!(err, PduError::MalformedFrame(_)));
    }

    #[test]
    fn unknown_meta_request_type_is_malformed() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(999);
        buf.put_i32_le(0);
        buf.put_u32_le(0);
        let err = WireEnvelope::decode(buf.freeze(), WireVersion::V2).unwrap_err();
        assert!(matches!(err, PduError::MalformedFrame(_)));
    }

    #[test]
    fn sentinel_body_is_self_describing_magic() {
        let frame = WireEnvelope::sentinel(MetaRequestType::DeclarePduForRead, "drone1", -1);
        assert_eq!(
            frame.body,
            Bytes::from_static(&MetaRequestType::DeclarePduForRead.as_u32().to_le_bytes())
        );
    }
}
