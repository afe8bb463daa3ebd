// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Wire Envelope (spec component B): the framed packet every transport
//! speaks, `{meta_request_type, robot_name, channel_id, body}`.

pub mod frame;

pub use frame::{MetaRequestType, WireEnvelope, WireVersion};
