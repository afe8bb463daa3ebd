// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Spec §8 scenario 1: register then call over a real loopback WebSocket
//! connection.

use std::time::Duration;

use hakoniwa_pdu_rt::rpc::runner;

use crate::integration_tests::common::{SERVICE, call_add, connect_client, start_add_server};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn register_then_call_returns_sum_within_one_second() {
    let server = start_add_server(1, None).await;
    let client = connect_client(server.addr, "Client_1").await;

    let registered = runner::register(
        &client.client,
        client.transport.as_ref(),
        &client.buffer,
        SERVICE,
        Duration::from_millis(10),
        Duration::from_secs(1),
    )
    .await;
    assert!(registered);

    let handle = client.client.handle().await.expect("handle after registration");
    assert_eq!(handle.request_channel_id, 0);
    assert_eq!(handle.response_channel_id, 1);

    let reply = call_add(&client, handle.request_channel_id, 10, 20, Duration::from_secs(1))
        .await
        .expect("reply within 1s");
    assert_eq!(reply["sum"].as_i64(), Some(30));
}
