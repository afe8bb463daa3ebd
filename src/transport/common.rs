// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::error::PduError;

/// Races `fut` against `io_timeout` and a cancellation token, the way the
/// teacher's `client::common::io_with_timeout` guards reads/writes against
/// a hung peer.
pub(crate) async fn io_with_timeout<F, T>(
    label: &'static str,
    fut: F,
    io_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<T, PduError>
where
    F: Future<Output = std::io::Result<T>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(PduError::Transport(format!("{label} cancelled"))),
        res = timeout(io_timeout, fut) => {
            match res {
                Ok(Ok(v)) => Ok(v),
                Ok(Err(e)) => Err(PduError::Transport(format!("{label}: {e}"))),
                Err(_) => Err(PduError::Transport(format!("{label} timed out"))),
            }
        }
    }
}
