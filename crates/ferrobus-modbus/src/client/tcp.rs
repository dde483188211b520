// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Modbus TCP link.
//!
//! The connection is opened lazily on the first exchange and dropped after
//! any failed exchange, so the next attempt starts from a fresh socket with
//! no stale bytes in flight. Each request carries a new transaction ID and
//! the response must echo it.

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::codec::tcp;
use crate::error::{ConnectionError, ModbusError, ModbusResult, ProtocolError};
use crate::framing::read_tcp_adu;
use crate::types::TcpConfig;

use super::channel::{ChannelTransport, Link};
use super::retry::RetryPolicy;
use super::transport::TransportState;

/// Modbus TCP transport.
pub type TcpTransport = ChannelTransport<TcpLink>;

impl ChannelTransport<TcpLink> {
    /// Creates a TCP transport. No connection is made until the first operation.
    pub fn new(config: TcpConfig) -> Self {
        let retry = RetryPolicy::new(config.max_attempts, config.retry_delay);
        let unit_id = config.slave_id;
        Self::with_link(TcpLink::new(config), unit_id, retry)
    }
}

// =============================================================================
// TcpLink
// =============================================================================

/// A lazily connected TCP socket speaking MBAP.
pub struct TcpLink {
    /// Configuration.
    config: TcpConfig,
    /// Open socket, if any. Held for the whole exchange.
    stream: Mutex<Option<TcpStream>>,
    /// Mirrors `stream.is_some()` for lock-free state queries.
    connected: AtomicBool,
    /// Last transaction ID used.
    transaction_id: AtomicU16,
}

impl TcpLink {
    /// Creates a link for the configured host and port.
    pub fn new(config: TcpConfig) -> Self {
        Self {
            config,
            stream: Mutex::new(None),
            connected: AtomicBool::new(false),
            transaction_id: AtomicU16::new(0),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &TcpConfig {
        &self.config
    }

    fn next_transaction_id(&self) -> u16 {
        self.transaction_id.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    async fn connect(&self) -> ModbusResult<TcpStream> {
        let host = &self.config.host;
        let port = self.config.port;

        let stream = match timeout(self.config.timeout, TcpStream::connect(self.config.socket_addr())).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(ConnectionError::refused_with(host.as_str(), port, e).into()),
            Err(_) => {
                return Err(ConnectionError::timed_out(host.as_str(), port, self.config.timeout).into())
            }
        };
        stream.set_nodelay(true).ok();

        tracing::info!(
            host = %host,
            port = port,
            "Connected to Modbus TCP device"
        );
        Ok(stream)
    }
}

#[async_trait]
impl Link for TcpLink {
    async fn exchange(&self, request: &[u8]) -> ModbusResult<Vec<u8>> {
        let mut guard = self.stream.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect().await?);
            self.connected.store(true, Ordering::Release);
        }
        let stream = guard.as_mut().ok_or_else(ModbusError::not_connected)?;

        let transaction_id = self.next_transaction_id();
        let adu = tcp::encode(transaction_id, request);

        let result = match timeout(self.config.timeout, round_trip(stream, &adu, transaction_id)).await {
            Ok(result) => result,
            Err(_) => Err(ModbusError::response_timeout(self.config.timeout)),
        };

        if let Err(error) = &result {
            tracing::debug!(
                host = %self.config.host,
                port = self.config.port,
                error = %error,
                "Dropping TCP connection after failed exchange"
            );
            *guard = None;
            self.connected.store(false, Ordering::Release);
        }
        result
    }

    async fn shutdown(&self) -> ModbusResult<()> {
        let mut guard = self.stream.lock().await;
        self.connected.store(false, Ordering::Release);
        if let Some(mut stream) = guard.take() {
            stream
                .shutdown()
                .await
                .map_err(|e| ConnectionError::io("TCP shutdown failed", e))?;
        }
        Ok(())
    }

    fn state(&self) -> TransportState {
        if self.connected.load(Ordering::Acquire) {
            TransportState::Connected
        } else {
            TransportState::Disconnected
        }
    }

    fn describe(&self) -> String {
        format!("tcp://{}:{}", self.config.host, self.config.port)
    }
}

/// Writes one ADU and reads the matching response frame.
async fn round_trip<S>(stream: &mut S, adu: &[u8], transaction_id: u16) -> ModbusResult<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(adu).await?;
    stream.flush().await?;

    let (header, frame) = read_tcp_adu(stream)
        .await?
        .ok_or_else(|| ModbusError::from(ConnectionError::closed(None)))?;

    if header.transaction_id != transaction_id {
        return Err(ProtocolError::transaction_id_mismatch(transaction_id, header.transaction_id).into());
    }
    Ok(frame)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::transport::ModbusTransport;
    use crate::codec::tcp::MbapHeader;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn config(port: u16, attempts: u32) -> TcpConfig {
        TcpConfig::builder()
            .host("127.0.0.1")
            .port(port)
            .slave_id(1)
            .timeout(Duration::from_millis(500))
            .max_attempts(attempts)
            .retry_delay(Duration::from_millis(1))
            .build()
            .unwrap()
    }

    /// Answers every read with a single register holding `value`, echoing
    /// the transaction ID offset by `tid_skew`.
    async fn serve(listener: TcpListener, value: u16, tid_skew: u16) {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                while let Ok(Some((header, frame))) = read_tcp_adu(&mut socket).await {
                    let [hi, lo] = value.to_be_bytes();
                    let reply = vec![frame[0], frame[1], 0x02, hi, lo];
                    let adu = tcp::encode(header.transaction_id.wrapping_add(tid_skew), &reply);
                    if socket.write_all(&adu).await.is_err() {
                        break;
                    }
                }
            });
        }
    }

    #[tokio::test]
    async fn test_reads_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(serve(listener, 230, 0));

        let transport = TcpTransport::new(config(port, 1));
        assert_eq!(transport.link().state(), TransportState::Disconnected);

        let data = transport.read_holding_registers(0, 1).await.unwrap();
        assert_eq!(data.as_bytes(), &[0x00, 0xE6]);
        let data = transport.read_input_registers(3, 1).await.unwrap();
        assert_eq!(data.values(), vec![230]);
        assert_eq!(transport.link().state(), TransportState::Connected);

        transport.close().await.unwrap();
        assert_eq!(transport.link().state(), TransportState::Disconnected);
    }

    #[tokio::test]
    async fn test_transaction_id_mismatch() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(serve(listener, 1, 7));

        let transport = TcpTransport::new(config(port, 1));
        let err = transport.read_holding_registers(0, 1).await.unwrap_err();

        assert!(matches!(
            err,
            ModbusError::Protocol(ProtocolError::TransactionIdMismatch { .. })
        ));
        assert_eq!(transport.link().state(), TransportState::Disconnected);
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let transport = TcpTransport::new(config(port, 2));
        let err = transport.read_coils(0, 1).await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_describe_and_ids() {
        let link = TcpLink::new(config(1502, 1));
        assert_eq!(link.describe(), "tcp://127.0.0.1:1502");
        assert_eq!(link.next_transaction_id(), 1);
        assert_eq!(link.next_transaction_id(), 2);

        let header = MbapHeader::parse(&tcp::encode(2, &[0x01, 0x03])).unwrap();
        assert_eq!(header.length, 2);
    }
}
