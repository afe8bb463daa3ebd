// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Channel Config (component A): parses and indexes the PDU channel
//! table, in either the legacy or compact wire shape, and answers
//! `(robot, name) <-> (channel_id, size, type)` queries.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use serde_json::Value;
use tracing::debug;

use crate::{
    channel::model::{
        CompactPduDef, CompactPduOut, CompactPduOut2, CompactPduType,
        CompactRobotOut, Direction, LegacyPduDef, PduChannel, PduIoInfo,
        RobotChannels,
    },
    error::ConfigError,
};

#[derive(Default)]
struct Indices {
    name_by_robot_channel: HashMap<(String, i32), String>,
    size_by_robot_name: HashMap<(String, String), i64>,
    type_by_robot_name: HashMap<(String, String), String>,
    channel_by_robot_name: HashMap<(String, String), i32>,
}

/// Thread-unsafe, read-mostly channel table. Mutated only by
/// `update_pdudef` during service initialisation; queried continuously
/// afterward. Callers share it behind an `Arc` (no interior mutability is
/// exposed — mutation requires `&mut self`, so a fresh `Arc` swap is the
/// intended way to publish an update across threads).
#[derive(Default)]
pub struct ChannelConfig {
    def: LegacyPduDef,
    indices: Indices,
}

impl ChannelConfig {
    /// Loads a JSON file in either the compact or legacy shape and
    /// normalises it. Fails loudly on a missing file, malformed JSON, or
    /// an unknown `pdutypes_id` reference.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let raw: Value =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let def = Self::normalize_to_legacy(raw, &base_dir)?;
        Ok(Self::from_legacy(def))
    }

    pub fn from_legacy(def: LegacyPduDef) -> Self {
        let mut cfg = Self {
            def,
            indices: Indices::default(),
        };
        cfg.dedup_all();
        cfg.rebuild_indices();
        cfg
    }

    /// Replaces the channel table with `new`, merging robot-by-robot:
    /// within a robot, a reader/writer entry sharing `channel_id` replaces
    /// the existing one; otherwise it is appended. Robots not present in
    /// `new` are left untouched. Indices are rebuilt afterward — querying
    /// against a stale index is a programming error the compiler prevents
    /// by requiring `&mut self` here.
    pub fn update_pdudef(&mut self, new: LegacyPduDef) {
        for new_robot in new.robots {
            match self
                .def
                .robots
                .iter_mut()
                .find(|r| r.name == new_robot.name)
            {
                Some(existing) => {
                    merge_list(&mut existing.shm_pdu_readers, new_robot.shm_pdu_readers);
                    merge_list(&mut existing.shm_pdu_writers, new_robot.shm_pdu_writers);
                },
                None => self.def.robots.push(new_robot),
            }
        }
        self.dedup_all();
        self.rebuild_indices();
        debug!(
            robots = self.def.robots.len(),
            "channel config updated and reindexed"
        );
    }

    pub fn get_pdu_name(&self, robot_name: &str, channel_id: i32) -> Option<&str> {
        self.indices
            .name_by_robot_channel
            .get(&(robot_name.to_string(), channel_id))
            .map(String::as_str)
    }

    pub fn get_pdu_size(&self, robot_name: &str, pdu_name: &str) -> i64 {
        *self
            .indices
            .size_by_robot_name
            .get(&(robot_name.to_string(), pdu_name.to_string()))
            .unwrap_or(&-1)
    }

    pub fn get_pdu_type(&self, robot_name: &str, pdu_name: &str) -> Option<&str> {
        self.indices
            .type_by_robot_name
            .get(&(robot_name.to_string(), pdu_name.to_string()))
            .map(String::as_str)
    }

    pub fn get_pdu_channel_id(&self, robot_name: &str, pdu_name: &str) -> i32 {
        *self
            .indices
            .channel_by_robot_name
            .get(&(robot_name.to_string(), pdu_name.to_string()))
            .unwrap_or(&-1)
    }

    pub fn get_shm_pdu_readers(&self) -> Vec<PduIoInfo> {
        self.def
            .robots
            .iter()
            .flat_map(|r| {
                r.shm_pdu_readers.iter().map(move |c| PduIoInfo {
                    robot_name: r.name.clone(),
                    channel_id: c.channel_id,
                    org_name: c.org_name.clone(),
                    pdu_size: c.pdu_size,
                    pdu_type: c.pdu_type.clone(),
                })
            })
            .collect()
    }

    pub fn get_shm_pdu_writers(&self) -> Vec<PduIoInfo> {
        self.def
            .robots
            .iter()
            .flat_map(|r| {
                r.shm_pdu_writers.iter().map(move |c| PduIoInfo {
                    robot_name: r.name.clone(),
                    channel_id: c.channel_id,
                    org_name: c.org_name.clone(),
                    pdu_size: c.pdu_size,
                    pdu_type: c.pdu_type.clone(),
                })
            })
            .collect()
    }

    pub fn get_pdudef(&self) -> &LegacyPduDef {
        &self.def
    }

    /// Compact projection used for round-trip equivalence testing between
    /// the legacy and compact config shapes (spec §8 scenario 6).
    pub fn get_pdudef_compact(&self) -> CompactPduOut {
        let robots = self
            .def
            .robots
            .iter()
            .map(|r| {
                let mut seen = std::collections::HashSet::new();
                let mut pdus = Vec::new();
                for ch in r.shm_pdu_readers.iter().chain(r.shm_pdu_writers.iter()) {
                    let key = ch.dedup_key();
                    if !seen.insert(key) {
                        continue;
                    }
                    pdus.push(CompactPduOut2 {
                        name: ch.org_name.clone(),
                        pdu_type: ch.pdu_type.clone(),
                        channel_id: ch.channel_id,
                        pdu_size: ch.pdu_size,
                    });
                }
                CompactRobotOut {
                    name: r.name.clone(),
                    pdus,
                }
            })
            .collect();
        CompactPduOut { robots }
    }

    fn dedup_all(&mut self) {
        for robot in &mut self.def.robots {
            dedup_channels(&mut robot.shm_pdu_readers);
            dedup_channels(&mut robot.shm_pdu_writers);
        }
    }

    fn rebuild_indices(&mut self) {
        let mut indices = Indices::default();
        for robot in &self.def.robots {
            for ch in robot.shm_pdu_readers.iter().chain(robot.shm_pdu_writers.iter())
            {
                indices
                    .name_by_robot_channel
                    .insert((robot.name.clone(), ch.channel_id), ch.org_name.clone());
                indices.size_by_robot_name.insert(
                    (robot.name.clone(), ch.org_name.clone()),
                    ch.pdu_size,
                );
                indices.type_by_robot_name.insert(
                    (robot.name.clone(), ch.org_name.clone()),
                    ch.pdu_type.clone(),
                );
                indices.channel_by_robot_name.insert(
                    (robot.name.clone(), ch.org_name.clone()),
                    ch.channel_id,
                );
            }
        }
        self.indices = indices;
    }

    fn normalize_to_legacy(
        raw: Value,
        base_dir: &Path,
    ) -> Result<LegacyPduDef, ConfigError> {
        if raw.get("paths").is_some() {
            let compact: CompactPduDef = serde_json::from_value(raw).map_err(|e| {
                ConfigError::Invalid(format!("invalid compact pdudef: {e}"))
            })?;
            Self::compact_to_legacy(compact, base_dir)
        } else {
            let legacy: LegacyPduDef = serde_json::from_value(raw).map_err(|e| {
                ConfigError::Invalid(format!("invalid legacy pdudef: {e}"))
            })?;
            Ok(legacy)
        }
    }

    fn compact_to_legacy(
        compact: CompactPduDef,
        base_dir: &Path,
    ) -> Result<LegacyPduDef, ConfigError> {
        let mut pdutypes_map: HashMap<String, Vec<CompactPduType>> = HashMap::new();
        for entry in &compact.paths {
            let resolved = if Path::new(&entry.path).is_absolute() {
                PathBuf::from(&entry.path)
            } else {
                base_dir.join(&entry.path)
            };
            let text = fs::read_to_string(&resolved).map_err(|source| {
                ConfigError::Io {
                    path: resolved.display().to_string(),
                    source,
                }
            })?;
            let types: Vec<CompactPduType> =
                serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                    path: resolved.display().to_string(),
                    source,
                })?;
            pdutypes_map.insert(entry.id.clone(), types);
        }

        let mut robots = Vec::with_capacity(compact.robots.len());
        for robot in compact.robots {
            let types = pdutypes_map.get(&robot.pdutypes_id).ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "unknown pdutypes_id '{}' referenced by robot '{}'",
                    robot.pdutypes_id, robot.name
                ))
            })?;
            let mut seen = std::collections::HashSet::new();
            let mut channels = Vec::new();
            for pdu in types {
                let key = (pdu.name.clone(), pdu.channel_id, pdu.pdu_type.clone());
                if !seen.insert(key) {
                    continue;
                }
                channels.push(PduChannel {
                    robot_name: robot.name.clone(),
                    channel_id: pdu.channel_id,
                    org_name: pdu.name.clone(),
                    name: PduChannel::qualified_name(&robot.name, &pdu.name),
                    pdu_size: pdu.pdu_size,
                    pdu_type: pdu.pdu_type.clone(),
                    direction: Direction::Both,
                });
            }
            robots.push(RobotChannels {
                name: robot.name,
                shm_pdu_readers: channels.clone(),
                shm_pdu_writers: channels,
            });
        }
        Ok(LegacyPduDef { robots })
    }
}

fn dedup_channels(channels: &mut Vec<PduChannel>) {
    let mut seen = std::collections::HashSet::new();
    channels.retain(|c| seen.insert(c.dedup_key()));
}

fn merge_list(existing: &mut Vec<PduChannel>, incoming: Vec<PduChannel>) {
    for new_ch in incoming {
        match existing.iter_mut().find(|c| c.channel_id == new_ch.channel_id) {
            Some(slot) => *slot = new_ch,
            None => existing.push(new_ch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scenario 6 (spec §8): a legacy config file and a compact one
    /// describing the same robot yield byte-identical (here,
    /// structurally-identical) `get_pdudef_compact()` output.
    #[test]
    fn compact_and_legacy_configs_normalise_identically() {
        let dir = std::env::temp_dir().join(format!(
            "hakoniwa-pdu-rt-test-{}-{}",
            std::process::id(),
            line!()
        ));
        fs::create_dir_all(&dir).unwrap();

        let legacy_path = dir.join("legacy.json");
        fs::write(
            &legacy_path,
            serde_json::json!({
                "robots": [{
                    "name": "drone1",
                    "shm_pdu_readers": [{
                        "robot_name": "drone1",
                        "channel_id": 0,
                        "org_name": "pos",
                        "name": "drone1_pos",
                        "pdu_size": 16,
                        "type": "Twist",
                        "direction": "both"
                    }],
                    "shm_pdu_writers": [{
                        "robot_name": "drone1",
                        "channel_id": 0,
                        "org_name": "pos",
                        "name": "drone1_pos",
                        "pdu_size": 16,
                        "type": "Twist",
                        "direction": "both"
                    }]
                }]
            })
            .to_string(),
        )
        .unwrap();

        let types_path = dir.join("drone1_types.json");
        fs::write(
            &types_path,
            serde_json::json!([{
                "name": "pos",
                "type": "Twist",
                "channel_id": 0,
                "pdu_size": 16
            }])
            .to_string(),
        )
        .unwrap();

        let compact_path = dir.join("compact.json");
        fs::write(
            &compact_path,
            serde_json::json!({
                "paths": [{"id": "drone1_types", "path": "drone1_types.json"}],
                "robots": [{"name": "drone1", "pdutypes_id": "drone1_types"}]
            })
            .to_string(),
        )
        .unwrap();

        let legacy_cfg = ChannelConfig::load_from_file(&legacy_path).unwrap();
        let compact_cfg = ChannelConfig::load_from_file(&compact_path).unwrap();

        assert_eq!(
            legacy_cfg.get_pdudef_compact(),
            compact_cfg.get_pdudef_compact()
        );

        fs::remove_dir_all(&dir).ok();
    }
}
