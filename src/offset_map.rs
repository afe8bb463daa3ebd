// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The offset-map binary-layout library (spec §1 "out of scope"): here
//! it is consumed purely as an opaque `get_pdu_size(type_name) -> size`
//! lookup, the way spec §4.E/§4.F use it to fill in `baseSize`.

use std::collections::HashMap;

/// `HAKO_BINARY_PATH`-style lookup. The concrete binary-layout reader
/// lives outside this crate's scope; `StaticOffsetMap` is the in-memory
/// test double and the shape a real binding would also satisfy.
pub trait OffsetMap: Send + Sync {
    fn get_pdu_size(&self, type_name: &str) -> Option<i64>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticOffsetMap {
    sizes: HashMap<String, i64>,
}

impl StaticOffsetMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, type_name: impl Into<String>, size: i64) -> Self {
        self.sizes.insert(type_name.into(), size);
        self
    }
}

impl OffsetMap for StaticOffsetMap {
    fn get_pdu_size(&self, type_name: &str) -> Option<i64> {
        self.sizes.get(type_name).copied()
    }
}
