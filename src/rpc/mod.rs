// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! RPC Server Core (G), RPC Client Core (H), and Protocol Runners (I).

pub mod client;
pub mod constants;
pub mod header;
pub mod runner;
pub mod server;

pub use client::RpcClient;
pub use constants::{ApiStatus, ClientEvent, ClientOpcode, ResultCode, ServerEvent};
pub use server::{ClientHandle, RpcServer};
