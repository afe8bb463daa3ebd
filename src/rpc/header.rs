// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The envelope headers carried inside `PDU_DATA_RPC_REQUEST` /
//! `PDU_DATA_RPC_REPLY` bodies (spec §3). The user's PDU payload follows
//! the header; `decode` returns it as the unconsumed remainder.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    error::PduError,
    rpc::constants::{ClientOpcode, ResultCode},
};

fn put_str(buf: &mut BytesMut, s: &str) {
    buf.put_u32_le(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

fn get_str(bytes: &mut Bytes) -> Result<String, PduError> {
    if bytes.len() < 4 {
        return Err(PduError::MalformedFrame("truncated string length".into()));
    }
    let len = bytes.get_u32_le() as usize;
    if bytes.len() < len {
        return Err(PduError::MalformedFrame("truncated string body".into()));
    }
    let raw = bytes.split_to(len);
    String::from_utf8(raw.to_vec())
        .map_err(|e| PduError::MalformedFrame(format!("string not utf8: {e}")))
}

/// Header of a `PDU_DATA_RPC_REQUEST` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEnvelopeHeader {
    pub request_id: u32,
    pub service_name: String,
    pub client_name: String,
    pub opcode: ClientOpcode,
    pub status_poll_interval_msec: u32,
}

impl RequestEnvelopeHeader {
    pub fn encode(&self, user_body: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(64 + user_body.len());
        buf.put_u32_le(self.request_id);
        put_str(&mut buf, &self.service_name);
        put_str(&mut buf, &self.client_name);
        buf.put_u8(self.opcode as u8);
        buf.put_u32_le(self.status_poll_interval_msec);
        buf.put_slice(user_body);
        buf.freeze()
    }

    /// Returns the parsed header and the unconsumed remainder (the
    /// user's request body).
    pub fn decode(body: &Bytes) -> Result<(Self, Bytes), PduError> {
        let mut bytes = body.clone();
        if bytes.len() < 4 {
            return Err(PduError::MalformedFrame("truncated request_id".into()));
        }
        let request_id = bytes.get_u32_le();
        let service_name = get_str(&mut bytes)?;
        let client_name = get_str(&mut bytes)?;
        if bytes.is_empty() {
            return Err(PduError::MalformedFrame("truncated opcode".into()));
        }
        let opcode = ClientOpcode::try_from(bytes.get_u8())?;
        if bytes.len() < 4 {
            return Err(PduError::MalformedFrame(
                "truncated status_poll_interval_msec".into(),
            ));
        }
        let status_poll_interval_msec = bytes.get_u32_le();
        Ok((
            Self {
                request_id,
                service_name,
                client_name,
                opcode,
                status_poll_interval_msec,
            },
            bytes,
        ))
    }
}

/// Body of a `REGISTER_RPC_CLIENT` frame (spec §4.G registration protocol
/// step 1). The reply travels back as an ordinary `ResponseEnvelopeHeader`
/// whose user body is the encoded `ClientHandle` (see `rpc::runner`) —
/// registration does not need a third header shape on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterRequestHeader {
    pub service_name: String,
    pub client_name: String,
}

impl RegisterRequestHeader {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(32);
        put_str(&mut buf, &self.service_name);
        put_str(&mut buf, &self.client_name);
        buf.freeze()
    }

    pub fn decode(body: &Bytes) -> Result<Self, PduError> {
        let mut bytes = body.clone();
        let service_name = get_str(&mut bytes)?;
        let client_name = get_str(&mut bytes)?;
        Ok(Self {
            service_name,
            client_name,
        })
    }
}

/// Header of a `PDU_DATA_RPC_REPLY` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEnvelopeHeader {
    pub request_id: u32,
    pub service_name: String,
    pub client_name: String,
    pub status: crate::rpc::constants::ApiStatus,
    pub processing_percentage: u8,
    pub result_code: ResultCode,
}

impl ResponseEnvelopeHeader {
    pub fn encode(&self, user_body: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(64 + user_body.len());
        buf.put_u32_le(self.request_id);
        put_str(&mut buf, &self.service_name);
        put_str(&mut buf, &self.client_name);
        buf.put_u8(self.status as u8);
        buf.put_u8(self.processing_percentage);
        buf.put_u8(self.result_code as u8);
        buf.put_slice(user_body);
        buf.freeze()
    }

    pub fn decode(body: &Bytes) -> Result<(Self, Bytes), PduError> {
        let mut bytes = body.clone();
        if bytes.len() < 4 {
            return Err(PduError::MalformedFrame("truncated request_id".into()));
        }
        let request_id = bytes.get_u32_le();
        let service_name = get_str(&mut bytes)?;
        let client_name = get_str(&mut bytes)?;
        if bytes.len() < 3 {
            return Err(PduError::MalformedFrame(
                "truncated status/result fields".into(),
            ));
        }
        let status = crate::rpc::constants::ApiStatus::try_from(bytes.get_u8())?;
        let processing_percentage = bytes.get_u8();
        let result_code = ResultCode::try_from(bytes.get_u8())?;
        Ok((
            Self {
                request_id,
                service_name,
                client_name,
                status,
                processing_percentage,
                result_code,
            },
            bytes,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_header_round_trips_with_body() {
        let header = RequestEnvelopeHeader {
            request_id: 7,
            service_name: "Add".into(),
            client_name: "Client_1".into(),
            opcode: ClientOpcode::Request,
            status_poll_interval_msec: 50,
        };
        let encoded = header.encode(b"payload");
        let (decoded, body) = RequestEnvelopeHeader::decode(&encoded).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(&body[..], b"payload");
    }

    #[test]
    fn response_header_round_trips_with_body() {
        let header = ResponseEnvelopeHeader {
            request_id: 9,
            service_name: "Add".into(),
            client_name: "Client_1".into(),
            status: crate::rpc::constants::ApiStatus::Done,
            processing_percentage: 100,
            result_code: ResultCode::Ok,
        };
        let encoded = header.encode(b"sum:30");
        let (decoded, body) = ResponseEnvelopeHeader::decode(&encoded).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(&body[..], b"sum:30");
    }
}
