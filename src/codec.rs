// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The generated PDU struct encoders/decoders (spec §1 "out of scope"):
//! an injected `(encoder, decoder)` pair per message type. Re-architected
//! per the Design Note in spec §9 as a typed `ServiceDescriptor`, so RPC
//! cores never do runtime string-keyed module lookup the way the Python
//! source's dynamic handler dispatch did.

use bytes::Bytes;

use crate::error::PduError;

/// One service's wire contract: how to turn the user's request/response
/// types into the raw bodies `RpcClient`/`RpcServer` exchange, and back.
/// A code-generation step over the same service JSON used at runtime may
/// produce these from a schema; this crate only consumes the result.
pub struct ServiceDescriptor<Req, Res> {
    pub req_type: String,
    pub res_type: String,
    pub encode_req: Box<dyn Fn(&Req) -> Bytes + Send + Sync>,
    pub decode_req: Box<dyn Fn(&Bytes) -> Result<Req, PduError> + Send + Sync>,
    pub encode_res: Box<dyn Fn(&Res) -> Bytes + Send + Sync>,
    pub decode_res: Box<dyn Fn(&Bytes) -> Result<Res, PduError> + Send + Sync>,
}

impl<Req, Res> ServiceDescriptor<Req, Res> {
    pub fn new(
        req_type: impl Into<String>,
        res_type: impl Into<String>,
        encode_req: impl Fn(&Req) -> Bytes + Send + Sync + 'static,
        decode_req: impl Fn(&Bytes) -> Result<Req, PduError> + Send + Sync + 'static,
        encode_res: impl Fn(&Res) -> Bytes + Send + Sync + 'static,
        decode_res: impl Fn(&Bytes) -> Result<Res, PduError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            req_type: req_type.into(),
            res_type: res_type.into(),
            encode_req: Box::new(encode_req),
            decode_req: Box::new(decode_req),
            encode_res: Box::new(encode_res),
            decode_res: Box::new(decode_res),
        }
    }
}
