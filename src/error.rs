// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use thiserror::Error;

/// Taxonomy of runtime-level failures that callers may need to match on.
///
/// Transport and handler failures never propagate above the manager
/// boundary as exceptions: they collapse to `bool`/`Option` at the public
/// API (see `rpc::client`, `rpc::server`, `transport`). `PduError` is used
/// internally and at the few seams (registration, config loading) where
/// the caller needs to distinguish cases.
#[derive(Debug, Error)]
pub enum PduError {
    /// The wire envelope was truncated or carried an unknown
    /// `meta_request_type`. The caller must close the transport session.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// `REGISTER_RPC_CLIENT` named a service the server does not know.
    #[error("unknown service: {0}")]
    UnknownService(String),

    /// `REGISTER_RPC_CLIENT` reused a `client_name` already registered for
    /// the service.
    #[error("client '{client}' already registered for service '{service}'")]
    DuplicateClient { service: String, client: String },

    /// A service's client registry is already at `max_clients`.
    #[error("service '{0}' is at max_clients")]
    ServiceFull(String),

    /// Sending or receiving on the transport failed. The connection is
    /// considered lost; the caller must reconnect and re-register.
    #[error("transport error: {0}")]
    Transport(String),

    /// A user request handler returned an error or panicked. No reply was
    /// sent; the client will observe a timeout.
    #[error("handler failure: {0}")]
    HandlerFailure(String),

    /// A reply's `request_id` did not match the in-flight request. The
    /// reply was discarded, not an error to the caller.
    #[error("stale response (request_id mismatch)")]
    StaleResponse,

    /// Channel/service configuration failed to load or parse.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Configuration-loading failures. These are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse JSON in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, PduError>;
