// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Modbus TCP server loop.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use ferrobus_modbus::codec::tcp;
use ferrobus_modbus::framing::read_tcp_adu;
use ferrobus_modbus::ModbusError;

use super::ShutdownCoordinator;
use crate::dispatcher::RequestDispatcher;

/// Accepts connections until shutdown, then waits for every connection task.
pub async fn serve_tcp(
    listener: TcpListener,
    dispatcher: Arc<RequestDispatcher>,
    shutdown: ShutdownCoordinator,
) {
    let mut stop = shutdown.subscribe();
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = stop.recv() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "Accepted Modbus TCP connection");
                    connections.spawn(handle_connection(
                        stream,
                        peer,
                        dispatcher.clone(),
                        shutdown.clone(),
                    ));
                }
                Err(e) => warn!(error = %e, "Failed to accept connection"),
            },
            // Reap finished connections so the set does not grow unbounded.
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    drop(listener);
    while connections.join_next().await.is_some() {}
    info!("Modbus TCP server stopped");
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    dispatcher: Arc<RequestDispatcher>,
    shutdown: ShutdownCoordinator,
) {
    let mut stop = shutdown.subscribe();

    loop {
        let received = tokio::select! {
            _ = stop.recv() => break,
            received = read_tcp_adu(&mut stream) => received,
        };

        let (header, frame) = match received {
            Ok(Some(adu)) => adu,
            Ok(None) => {
                debug!(%peer, "Client disconnected");
                break;
            }
            Err(ModbusError::Protocol(e)) => {
                warn!(%peer, error = %e, "Dropping connection after malformed MBAP header");
                break;
            }
            Err(e) => {
                debug!(%peer, error = %e, "Connection read failed");
                break;
            }
        };

        let response = dispatcher.dispatch(&frame).await;
        let adu = tcp::encode(header.transaction_id, &response);
        if let Err(e) = stream.write_all(&adu).await {
            warn!(%peer, error = %e, "Failed to send response");
            break;
        }
    }
}
