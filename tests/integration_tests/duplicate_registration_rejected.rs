// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Spec §8 scenario 3: a second `REGISTER_RPC_CLIENT` for an already-used
//! client name is rejected and the client core reports no handle.

use std::time::Duration;

use hakoniwa_pdu_rt::rpc::runner;

use crate::integration_tests::common::{SERVICE, connect_client, start_add_server};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn duplicate_client_name_is_rejected() {
    let server = start_add_server(2, None).await;

    let first = connect_client(server.addr, "Client_1").await;
    assert!(
        runner::register(
            &first.client,
            first.transport.as_ref(),
            &first.buffer,
            SERVICE,
            Duration::from_millis(10),
            Duration::from_secs(1),
        )
        .await
    );

    let second = connect_client(server.addr, "Client_1").await;
    let registered = runner::register(
        &second.client,
        second.transport.as_ref(),
        &second.buffer,
        SERVICE,
        Duration::from_millis(10),
        Duration::from_secs(1),
    )
    .await;

    assert!(!registered);
    assert_eq!(second.client.handle().await, None);
}
