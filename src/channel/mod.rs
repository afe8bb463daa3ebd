// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Channel Config (spec component A): the PDU channel table shared by
//! topic publish/subscribe and RPC mailbox routing.

pub mod config;
pub mod model;

pub use config::ChannelConfig;
pub use model::{Direction, LegacyPduDef, PduChannel, PduIoInfo, RobotChannels};
