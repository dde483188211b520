// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Modbus RTU link over a serial port.
//!
//! The port is opened lazily with the configured line settings. Before each
//! request the link waits until the line has been silent for one inter-frame
//! delay, discarding whatever arrives meanwhile, so a late reply to an earlier
//! timed-out request is never read as the next answer. Responses are read
//! until their length is known from the function code, or until the line goes
//! silent for frames of unknown length. The CRC is checked before the frame is
//! handed back.
//!
//! # Example
//!
//! ```rust,ignore
//! use ferrobus_modbus::client::RtuTransport;
//! use ferrobus_modbus::types::RtuConfig;
//!
//! let config = RtuConfig::builder()
//!     .port("/dev/ttyUSB0")
//!     .default_9600_8n1()
//!     .slave_id(1)
//!     .build()?;
//!
//! let transport = RtuTransport::new(config);
//! let values = transport.read_holding_registers(0, 10).await?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_serial::{
    DataBits as SerialDataBits, Parity as SerialParity, SerialPortBuilderExt, SerialStream,
    StopBits as SerialStopBits,
};

use crate::codec::rtu;
use crate::error::{ConnectionError, ModbusError, ModbusResult};
use crate::framing::read_rtu_adu;
use crate::types::{DataBits, Parity, RtuConfig, StopBits};

use super::channel::{ChannelTransport, Link};
use super::retry::RetryPolicy;
use super::transport::TransportState;

/// Modbus RTU transport.
pub type RtuTransport = ChannelTransport<RtuLink>;

impl ChannelTransport<RtuLink> {
    /// Creates an RTU transport. The port is opened on the first operation.
    pub fn new(config: RtuConfig) -> Self {
        let retry = RetryPolicy::new(config.max_attempts, config.retry_delay);
        let unit_id = config.slave_id;
        Self::with_link(RtuLink::new(config), unit_id, retry)
    }
}

/// Byte stream a serial link runs over.
///
/// Implemented for every async duplex stream so tests and bridges can stand
/// in for a real port.
pub trait SerialIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialIo for T {}

// =============================================================================
// RtuLink
// =============================================================================

/// A serial line speaking Modbus RTU.
pub struct RtuLink {
    /// Configuration.
    config: RtuConfig,
    /// Open port, if any. Held for the whole exchange.
    port: Mutex<Option<Box<dyn SerialIo>>>,
    /// Mirrors `port.is_some()` for lock-free state queries.
    connected: AtomicBool,
    /// Bus silence between frames.
    inter_frame_delay: Duration,
}

impl RtuLink {
    /// Creates a link that opens `config.port` on first use.
    pub fn new(config: RtuConfig) -> Self {
        let inter_frame_delay = config.calculated_inter_frame_delay();
        Self {
            config,
            port: Mutex::new(None),
            connected: AtomicBool::new(false),
            inter_frame_delay,
        }
    }

    /// Creates a link over an already open stream.
    ///
    /// If the stream fails the link falls back to opening `config.port`.
    pub fn with_stream(config: RtuConfig, stream: impl SerialIo + 'static) -> Self {
        let link = Self::new(config);
        link.connected.store(true, Ordering::Release);
        Self {
            port: Mutex::new(Some(Box::new(stream))),
            ..link
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RtuConfig {
        &self.config
    }

    /// Returns the inter-frame delay in effect.
    pub fn inter_frame_delay(&self) -> Duration {
        self.inter_frame_delay
    }

    fn open(&self) -> ModbusResult<Box<dyn SerialIo>> {
        Ok(Box::new(open_serial(&self.config)?))
    }
}

/// Opens the serial port described by `config` with its line settings.
pub fn open_serial(config: &RtuConfig) -> ModbusResult<SerialStream> {
    let stream = tokio_serial::new(&config.port, config.baud_rate)
        .data_bits(convert_data_bits(config.data_bits))
        .parity(convert_parity(config.parity))
        .stop_bits(convert_stop_bits(config.stop_bits))
        .timeout(config.timeout)
        .open_native_async()
        .map_err(|e| ConnectionError::serial_open(&config.port, e.to_string()))?;

    tracing::info!(
        port = %config.port,
        baud_rate = config.baud_rate,
        data_bits = config.data_bits.bits(),
        parity = %config.parity.char(),
        stop_bits = config.stop_bits.bits(),
        "Opened Modbus RTU serial port"
    );
    Ok(stream)
}

#[async_trait]
impl Link for RtuLink {
    async fn exchange(&self, request: &[u8]) -> ModbusResult<Vec<u8>> {
        let mut guard = self.port.lock().await;
        if guard.is_none() {
            *guard = Some(self.open()?);
            self.connected.store(true, Ordering::Release);
        }
        let port = guard.as_mut().ok_or_else(ModbusError::not_connected)?;

        let stale = timeout(
            self.config.timeout,
            settle_line(port.as_mut(), self.inter_frame_delay),
        )
        .await
        .map_err(|_| ModbusError::response_timeout(self.config.timeout))?;
        if stale > 0 {
            tracing::debug!(
                port = %self.config.port,
                bytes = stale,
                "Discarded stale input before request"
            );
        }

        let adu = rtu::encode(request);
        let result = match timeout(
            self.config.timeout,
            round_trip(port.as_mut(), &adu, self.inter_frame_delay),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ModbusError::response_timeout(self.config.timeout)),
        };

        if let Err(error) = &result {
            if matches!(error, ModbusError::Connection(_)) {
                tracing::debug!(
                    port = %self.config.port,
                    error = %error,
                    "Releasing serial port after connection failure"
                );
                *guard = None;
                self.connected.store(false, Ordering::Release);
            }
        }
        result
    }

    async fn shutdown(&self) -> ModbusResult<()> {
        let mut guard = self.port.lock().await;
        self.connected.store(false, Ordering::Release);
        if let Some(mut port) = guard.take() {
            port.shutdown()
                .await
                .map_err(|e| ConnectionError::io("serial shutdown failed", e))?;
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
        format!(
            "rtu://{}@{}/{}{}{}",
            self.config.port,
            self.config.baud_rate,
            self.config.data_bits,
            self.config.parity.char(),
            self.config.stop_bits
        )
    }
}

/// Reads until the line stays quiet for `silence`. Returns the number of
/// bytes thrown away.
async fn settle_line<S>(port: &mut S, silence: Duration) -> usize
where
    S: AsyncRead + Unpin + ?Sized,
{
    let mut scratch = [0u8; rtu::MAX_ADU_LEN];
    let mut discarded = 0;
    // End of stream and read errors surface on the following write.
    while let Ok(Ok(n)) = timeout(silence, port.read(&mut scratch)).await {
        if n == 0 {
            break;
        }
        discarded += n;
    }
    discarded
}

/// Writes one ADU and reads back one CRC-checked response frame.
async fn round_trip<S>(port: &mut S, adu: &[u8], silence: Duration) -> ModbusResult<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    port.write_all(adu).await?;
    port.flush().await?;

    let response = read_rtu_adu(port, rtu::response_adu_length, silence)
        .await?
        .ok_or_else(|| ModbusError::from(ConnectionError::closed(None)))?;
    Ok(rtu::decode(&response)?.to_vec())
}

fn convert_data_bits(bits: DataBits) -> SerialDataBits {
    match bits {
        DataBits::Five => SerialDataBits::Five,
        DataBits::Six => SerialDataBits::Six,
        DataBits::Seven => SerialDataBits::Seven,
        DataBits::Eight => SerialDataBits::Eight,
    }
}

fn convert_parity(parity: Parity) -> SerialParity {
    match parity {
        Parity::None => SerialParity::None,
        Parity::Odd => SerialParity::Odd,
        Parity::Even => SerialParity::Even,
    }
}

fn convert_stop_bits(bits: StopBits) -> SerialStopBits {
    match bits {
        StopBits::One => SerialStopBits::One,
        StopBits::Two => SerialStopBits::Two,
    }
}

// =============================================================================
// Tests
// =============================================================================
