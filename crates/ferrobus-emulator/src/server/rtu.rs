// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Modbus RTU server loop.
//!
//! Generic over the byte stream so the same loop runs on a serial port, a
//! pseudo-terminal or an in-process pipe.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use ferrobus_modbus::codec::rtu;
use ferrobus_modbus::framing::read_rtu_request;
use ferrobus_modbus::ModbusError;

use super::ShutdownSignal;
use crate::dispatcher::RequestDispatcher;

/// Serves requests from `stream` until shutdown or end of stream.
///
/// Frames with a bad CRC are dropped without a reply. `silence` ends frames
/// whose length cannot be predicted from their header, and frames that stall
/// short of the length their header announced.
pub async fn serve_rtu<S>(
    mut stream: S,
    dispatcher: Arc<RequestDispatcher>,
    silence: Duration,
    mut shutdown: ShutdownSignal,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    loop {
        let received = tokio::select! {
            _ = shutdown.recv() => break,
            received = read_rtu_request(&mut stream, silence) => received,
        };

        let adu = match received {
            Ok(Some(adu)) => adu,
            Ok(None) => {
                debug!("RTU stream closed");
                break;
            }
            Err(ModbusError::Protocol(e)) => {
                warn!(error = %e, "Discarding malformed RTU input");
                continue;
            }
            Err(e) => {
                warn!(error = %e, "RTU stream read failed");
                break;
            }
        };

        let frame = match rtu::decode(&adu) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, len = adu.len(), "Dropping RTU frame");
                continue;
            }
        };

        let response = dispatcher.dispatch(frame).await;
        let write = async {
            stream.write_all(&rtu::encode(&response)).await?;
            stream.flush().await
        };
        if let Err(e) = write.await {
            warn!(error = %e, "Failed to send RTU response");
            break;
        }
    }

    info!("Modbus RTU server stopped");
}
