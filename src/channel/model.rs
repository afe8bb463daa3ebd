// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use serde::{Deserialize, Serialize};

/// Read/write direction a channel entry is declared for.
///
/// `Both` is used for topic channels (readable and writable by anyone);
/// service-synthesised `req_k`/`res_k` pseudo-channels are one-directional
/// (`Read` on the server's own request channel, `Write` on its response
/// channel — see `service::config`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Read,
    Write,
    Both,
}

/// One entry in the legacy `shm_pdu_readers`/`shm_pdu_writers` list.
///
/// `channel_id == -1` is reserved for "not yet assigned" (used while a
/// service's synthesised channels are waiting on a broker-assigned id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PduChannel {
    pub robot_name: String,
    pub channel_id: i32,
    /// Short PDU name as declared in the type table (e.g. `"pos"`).
    pub org_name: String,
    /// `"{robot}_{org}"`, the fully-qualified channel name.
    #[serde(default)]
    pub name: String,
    pub pdu_size: i64,
    #[serde(rename = "type")]
    pub pdu_type: String,
    #[serde(default = "default_direction")]
    pub direction: Direction,
}

fn default_direction() -> Direction {
    Direction::Both
}

impl PduChannel {
    pub fn qualified_name(robot_name: &str, org_name: &str) -> String {
        format!("{robot_name}_{org_name}")
    }

    pub(crate) fn dedup_key(&self) -> (String, i32, String) {
        (self.org_name.clone(), self.channel_id, self.pdu_type.clone())
    }
}

/// Plain summary returned by `get_shm_pdu_readers`/`get_shm_pdu_writers`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PduIoInfo {
    pub robot_name: String,
    pub channel_id: i32,
    pub org_name: String,
    pub pdu_size: i64,
    pub pdu_type: String,
}

/// One robot's reader/writer channel lists, in the normalised legacy shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RobotChannels {
    pub name: String,
    #[serde(default)]
    pub shm_pdu_readers: Vec<PduChannel>,
    #[serde(default)]
    pub shm_pdu_writers: Vec<PduChannel>,
}

/// The normalised legacy wire shape: `{"robots": [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LegacyPduDef {
    #[serde(default)]
    pub robots: Vec<RobotChannels>,
}

// --- Compact config shapes (§4.A / §6) -------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CompactPathEntry {
    pub id: String,
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompactRobotEntry {
    pub name: String,
    pub pdutypes_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompactPduDef {
    pub paths: Vec<CompactPathEntry>,
    pub robots: Vec<CompactRobotEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompactPduType {
    pub name: String,
    #[serde(rename = "type")]
    pub pdu_type: String,
    pub channel_id: i32,
    pub pdu_size: i64,
}

/// Output shape of `get_pdudef_compact()`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CompactPduOut {
    pub robots: Vec<CompactRobotOut>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CompactRobotOut {
    pub name: String,
    pub pdus: Vec<CompactPduOut2>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CompactPduOut2 {
    pub name: String,
    #[serde(rename = "type")]
    pub pdu_type: String,
    pub channel_id: i32,
    pub pdu_size: i64,
}
