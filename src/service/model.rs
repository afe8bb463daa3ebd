// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use serde::{Deserialize, Serialize};

/// One side's heap allowance, as the service config JSON carries it
/// (`pduSize.server`/`pduSize.client`). `base_size` starts absent and is
/// filled in by `ServiceConfig::patch_service_base_size`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidePduSize {
    #[serde(rename = "heapSize")]
    pub heap_size: i64,
    #[serde(rename = "baseSize", skip_serializing_if = "Option::is_none")]
    pub base_size: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServicePduSize {
    pub server: SidePduSize,
    pub client: SidePduSize,
}

/// One RPC service declaration (spec §3 **ServiceEntry**, §6 JSON shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(rename = "maxClients")]
    pub max_clients: usize,
    #[serde(rename = "pduSize")]
    pub pdu_size: ServicePduSize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopicPduSize {
    #[serde(rename = "heapSize")]
    pub heap_size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicDef {
    pub topic_name: String,
    #[serde(rename = "type")]
    pub pdu_type: String,
    #[serde(default, rename = "channel_id", skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<i32>,
    #[serde(rename = "pduSize")]
    pub pdu_size: TopicPduSize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDef {
    pub name: String,
    #[serde(default)]
    pub topics: Vec<TopicDef>,
}

/// Top-level service config JSON (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDef {
    #[serde(rename = "pduMetaDataSize")]
    pub pdu_meta_data_size: i64,
    #[serde(default)]
    pub services: Vec<ServiceEntry>,
    #[serde(default)]
    pub nodes: Vec<NodeDef>,
}
