// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Service Config (spec component E): parses the service JSON, patches
//! in base sizes and topic channel ids, and synthesises the per-service
//! and per-node robot entries that get merged into the channel config.

use std::{fs, path::Path};

use tracing::debug;

use crate::{
    channel::model::{Direction, LegacyPduDef, PduChannel, RobotChannels},
    error::ConfigError,
    offset_map::OffsetMap,
    service::model::ServiceDef,
};

pub struct ServiceConfig {
    def: ServiceDef,
}

impl ServiceConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let def: ServiceDef =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Self { def })
    }

    pub fn from_def(def: ServiceDef) -> Self {
        Self { def }
    }

    pub fn def(&self) -> &ServiceDef {
        &self.def
    }

    /// Fills `baseSize` for every service's request/response packet type
    /// from the offset map, looking up `{type}RequestPacket` and
    /// `{type}ResponsePacket`. Only fills absent values — a second call
    /// changes nothing (spec §4.E, §8 idempotence property).
    pub fn patch_service_base_size(&mut self, offsets: &dyn OffsetMap) -> Result<(), ConfigError> {
        for service in &mut self.def.services {
            if service.pdu_size.server.base_size.is_none() {
                let type_name = format!("{}RequestPacket", service.service_type);
                let size = offsets.get_pdu_size(&type_name).ok_or_else(|| {
                    ConfigError::Invalid(format!("offset map has no entry for {type_name}"))
                })?;
                service.pdu_size.server.base_size = Some(size);
            }
            if service.pdu_size.client.base_size.is_none() {
                let type_name = format!("{}ResponsePacket", service.service_type);
                let size = offsets.get_pdu_size(&type_name).ok_or_else(|| {
                    ConfigError::Invalid(format!("offset map has no entry for {type_name}"))
                })?;
                service.pdu_size.client.base_size = Some(size);
            }
        }
        Ok(())
    }

    /// Assigns sequential `channel_id`s to any node topic missing one.
    /// Already-assigned ids are left untouched and never reused, so a
    /// second call is a no-op (spec §4.E).
    pub fn assign_channel_ids(&mut self) {
        for node in &mut self.def.nodes {
            let mut next = 0i32;
            for topic in &mut node.topics {
                match topic.channel_id {
                    Some(id) => next = next.max(id + 1),
                    None => {
                        topic.channel_id = Some(next);
                        next += 1;
                    },
                }
            }
        }
        debug!(nodes = self.def.nodes.len(), "topic channel ids assigned");
    }

    /// Builds the synthetic robots described in spec §3: one per
    /// service, holding `2 * max_clients` `req_k`/`res_k` pseudo-channels
    /// at `channel_id = 2k` / `2k + 1` (the externally-assigned formula;
    /// broker-assigned mode uses the same ids, merely confirmed by the
    /// conductor rather than assumed), plus one per node, holding its
    /// declared topics.
    pub fn synthesize_channel_config(&self) -> LegacyPduDef {
        let mut robots = Vec::with_capacity(self.def.services.len() + self.def.nodes.len());

        for service in &self.def.services {
            let req_type = format!("{}RequestPacket", service.service_type);
            let res_type = format!("{}ResponsePacket", service.service_type);
            let req_base = service.pdu_size.server.base_size.unwrap_or(0);
            let res_base = service.pdu_size.client.base_size.unwrap_or(0);
            let req_size =
                self.def.pdu_meta_data_size + req_base + service.pdu_size.server.heap_size;
            let res_size =
                self.def.pdu_meta_data_size + res_base + service.pdu_size.client.heap_size;

            let mut readers = Vec::with_capacity(service.max_clients);
            let mut writers = Vec::with_capacity(service.max_clients);
            for k in 0..service.max_clients {
                let req_name = format!("req_{k}");
                readers.push(PduChannel {
                    robot_name: service.name.clone(),
                    channel_id: 2 * k as i32,
                    name: PduChannel::qualified_name(&service.name, &req_name),
                    org_name: req_name,
                    pdu_size: req_size,
                    pdu_type: req_type.clone(),
                    direction: Direction::Read,
                });
                let res_name = format!("res_{k}");
                writers.push(PduChannel {
                    robot_name: service.name.clone(),
                    channel_id: 2 * k as i32 + 1,
                    name: PduChannel::qualified_name(&service.name, &res_name),
                    org_name: res_name,
                    pdu_size: res_size,
                    pdu_type: res_type.clone(),
                    direction: Direction::Write,
                });
            }
            robots.push(RobotChannels {
                name: service.name.clone(),
                shm_pdu_readers: readers,
                shm_pdu_writers: writers,
            });
        }

        for node in &self.def.nodes {
            let channels: Vec<PduChannel> = node
                .topics
                .iter()
                .map(|topic| PduChannel {
                    robot_name: node.name.clone(),
                    channel_id: topic.channel_id.unwrap_or(-1),
                    name: PduChannel::qualified_name(&node.name, &topic.topic_name),
                    org_name: topic.topic_name.clone(),
                    pdu_size: self.def.pdu_meta_data_size + topic.pdu_size.heap_size,
                    pdu_type: topic.pdu_type.clone(),
                    direction: Direction::Both,
                })
                .collect();
            robots.push(RobotChannels {
                name: node.name.clone(),
                shm_pdu_readers: channels.clone(),
                shm_pdu_writers: channels,
            });
        }

        LegacyPduDef { robots }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offset_map::StaticOffsetMap;

    fn sample_def() -> ServiceDef {
        serde_json::from_value(serde_json::json!({
            "pduMetaDataSize": 16,
            "services": [{
                "name": "Add",
                "type": "Add",
                "maxClients": 2,
                "pduSize": {
                    "server": {"heapSize": 8},
                    "client": {"heapSize": 12}
                }
            }],
            "nodes": []
        }))
        .unwrap()
    }

    #[test]
    fn patch_service_base_size_is_idempotent() {
        let mut cfg = ServiceConfig::from_def(sample_def());
        let offsets = StaticOffsetMap::new()
            .with("AddRequestPacket", 100)
            .with("AddResponsePacket", 200);
        cfg.patch_service_base_size(&offsets).unwrap();
        let after_first = cfg.def.services[0].pdu_size.clone();
        cfg.patch_service_base_size(&offsets).unwrap();
        assert_eq!(cfg.def.services[0].pdu_size.client, after_first.client);
        assert_eq!(cfg.def.services[0].pdu_size.server, after_first.server);
    }

    #[test]
    fn synthesize_assigns_req_res_channel_ids() {
        let mut cfg = ServiceConfig::from_def(sample_def());
        let offsets = StaticOffsetMap::new()
            .with("AddRequestPacket", 100)
            .with("AddResponsePacket", 200);
        cfg.patch_service_base_size(&offsets).unwrap();
        let legacy = cfg.synthesize_channel_config();
        let robot = &legacy.robots[0];
        assert_eq!(robot.shm_pdu_readers.len(), 2);
        assert_eq!(robot.shm_pdu_readers[0].channel_id, 0);
        assert_eq!(robot.shm_pdu_readers[1].channel_id, 2);
        assert_eq!(robot.shm_pdu_writers[0].channel_id, 1);
        assert_eq!(robot.shm_pdu_writers[1].channel_id, 3);
        // req_k is sized from pdu_size.server (request side), res_k from
        // pdu_size.client (response side) — heap sizes differ (8 vs 12) so
        // a req/res swap would fail this assertion.
        assert_eq!(robot.shm_pdu_readers[0].pdu_size, 16 + 100 + 8);
        assert_eq!(robot.shm_pdu_writers[0].pdu_size, 16 + 200 + 12);
    }
}
