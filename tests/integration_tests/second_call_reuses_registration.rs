// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Spec §8 scenario 2: a second `call()` on an already-registered client
//! succeeds without re-registering, and the server's own request_id
//! bookkeeping advances by exactly one.

use std::time::Duration;

use hakoniwa_pdu_rt::rpc::runner;

use crate::integration_tests::common::{SERVICE, call_add, connect_client, start_add_server};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_call_after_registration_reuses_the_same_handle() {
    let server = start_add_server(1, None).await;
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

    let first = call_add(&client, handle.request_channel_id, 10, 20, Duration::from_secs(1))
        .await
        .expect("first reply");
    assert_eq!(first["sum"].as_i64(), Some(30));

    let second = call_add(&client, handle.request_channel_id, 30, 5, Duration::from_secs(1))
        .await
        .expect("second reply");
    assert_eq!(second["sum"].as_i64(), Some(35));

    // No re-registration happened; the handle is unchanged.
    assert_eq!(client.client.handle().await, Some(handle));
}
