// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

const DEFAULT_OFFSET_BINARY_PATH: &str = "/usr/local/lib/hakoniwa/hako_binary/offset";

/// Process-wide knobs, read from the environment and optionally overridden
/// by a config file (spec/SPEC_FULL §2.2). Unlike the teacher's `Config`,
/// nothing here ever travels over the wire — it only steers this
/// process's own transports and timeouts.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RuntimeConfig {
    /// Directory holding the generated offset/size binaries consulted by
    /// `OffsetMap` implementations. `HAKO_BINARY_PATH`.
    #[serde(default = "default_offset_binary_path")]
    pub offset_binary_path: String,

    /// `HAKO_PDU_DEBUG=1` — forces debug-level logging and enables extra
    /// protocol tracing.
    #[serde(default)]
    pub debug: bool,

    /// Default interval between shared-memory poll ticks and RPC
    /// status polls, expressed in seconds.
    #[serde(rename = "PollIntervalSecs", with = "serde_secs")]
    pub poll_interval: Duration,

    /// Default deadline for a single RPC call, expressed in seconds.
    #[serde(rename = "RpcTimeoutSecs", with = "serde_secs")]
    pub rpc_timeout: Duration,

    /// Default deadline for a single transport I/O operation (connect,
    /// send, accept), expressed in seconds.
    #[serde(rename = "IoTimeoutSecs", with = "serde_secs")]
    pub io_timeout: Duration,
}

fn default_offset_binary_path() -> String {
    DEFAULT_OFFSET_BINARY_PATH.to_owned()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            offset_binary_path: default_offset_binary_path(),
            debug: false,
            poll_interval: Duration::from_millis(100),
            rpc_timeout: Duration::from_secs(30),
            io_timeout: Duration::from_secs(10),
        }
    }
}

impl RuntimeConfig {
    /// Builds the defaults, then applies `HAKO_BINARY_PATH` and
    /// `HAKO_PDU_DEBUG` from the process environment.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(path) = std::env::var("HAKO_BINARY_PATH") {
            cfg.offset_binary_path = path;
        }
        cfg.debug = std::env::var("HAKO_PDU_DEBUG").as_deref() == Ok("1");
        cfg
    }

    /// Loads an override file (YAML or JSON, picked by extension) on top
    /// of `from_env()`'s defaults, then validates the result.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        let mut cfg: Self = if path.extension().and_then(|e| e.to_str()) == Some("json") {
            serde_json::from_str(&text).context("failed to parse config JSON")?
        } else {
            serde_yaml::from_str(&text).context("failed to parse config YAML")?
        };

        if let Ok(path) = std::env::var("HAKO_BINARY_PATH") {
            cfg.offset_binary_path = path;
        }
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants; a malformed override file must fail fast
    /// rather than surface as a confusing timeout later.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(
            !self.offset_binary_path.is_empty(),
            "offset_binary_path must not be empty"
        );
        ensure!(
            self.poll_interval > Duration::ZERO,
            "PollIntervalSecs must be > 0"
        );
        ensure!(self.rpc_timeout > Duration::ZERO, "RpcTimeoutSecs must be > 0");
        ensure!(self.io_timeout > Duration::ZERO, "IoTimeoutSecs must be > 0");
        Ok(())
    }
}

/// Serde helper for representing `Duration` as a number of seconds.
mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let mut cfg = RuntimeConfig::default();
        assert!(cfg.validate_and_normalize().is_ok());
        assert_eq!(cfg.offset_binary_path, DEFAULT_OFFSET_BINARY_PATH);
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let mut cfg = RuntimeConfig::default();
        cfg.poll_interval = Duration::ZERO;
        assert!(cfg.validate_and_normalize().is_err());
    }

    #[test]
    #[serial_test::serial(hako_env)]
    fn from_env_reads_binary_path_and_debug_flag() {
        // SAFETY: serialised by #[serial] — no other test in this process
        // touches these two variables concurrently.
        unsafe {
            std::env::set_var("HAKO_BINARY_PATH", "/tmp/offsets");
            std::env::set_var("HAKO_PDU_DEBUG", "1");
        }
        let cfg = RuntimeConfig::from_env();
        assert_eq!(cfg.offset_binary_path, "/tmp/offsets");
        assert!(cfg.debug);
        unsafe {
            std::env::remove_var("HAKO_BINARY_PATH");
            std::env::remove_var("HAKO_PDU_DEBUG");
        }
    }

    #[test]
    #[serial_test::serial(hako_env)]
    fn from_env_falls_back_to_defaults_when_unset() {
        unsafe {
            std::env::remove_var("HAKO_BINARY_PATH");
            std::env::remove_var("HAKO_PDU_DEBUG");
        }
        let cfg = RuntimeConfig::from_env();
        assert_eq!(cfg.offset_binary_path, DEFAULT_OFFSET_BINARY_PATH);
        assert!(!cfg.debug);
    }
}
