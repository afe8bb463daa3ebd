// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! WebSocket transport (spec §4.D): peer-to-peer, length-prefixed binary
//! envelope framing over `tokio-tungstenite`.

pub mod client;
pub mod server;

pub use client::WebSocketClientTransport;
pub use server::WebSocketServerTransport;
