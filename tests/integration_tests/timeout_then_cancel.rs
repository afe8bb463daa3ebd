// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Spec §8 scenario 4: a handler that sleeps past the client's deadline
//! causes `call()` to give up and send `CANCEL`; the server answers with
//! the synthesised `CANCELED` reply.

use std::time::Duration;

use hakoniwa_pdu_rt::rpc::runner;

use crate::integration_tests::common::{SERVICE, call_add, connect_client, start_add_server};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_handler_times_out_and_resolves_via_cancel() {
    let server = start_add_server(1, Some(Duration::from_secs(5))).await;
    let client = connect_client(server.addr, "Client_1").await;

    assert!(
        runner::register(
            &client.client,
            client.transport.as_ref(),
            &client.buffer,
            SERVICE,
            Duration::from_millis(10),
            Duration::from_secs(1),
        )
        .await
    );
    let handle = client.client.handle().await.expect("handle after registration");

    let started = tokio::time::Instant::now();
    let reply = call_add(&client, handle.request_channel_id, 1, 2, Duration::from_millis(100)).await;

    assert!(reply.is_none());
    assert!(started.elapsed() < Duration::from_millis(600));
}
