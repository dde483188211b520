// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Transport traits and read results.
//!
//! - [`ModbusTransport`]: the data operations every transport offers
//! - [`RawTransport`]: a physical channel whose addressed unit can be switched
//! - [`RequestHandler`]: anything that answers request frames in-process
//! - [`RegisterData`]: register read results as raw bytes and as `u16` values

use std::fmt;

use async_trait::async_trait;

use crate::error::ModbusResult;

// =============================================================================
// TransportState
// =============================================================================

/// Connection state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransportState {
    /// No open connection; the next operation opens one.
    #[default]
    Disconnected,
    /// Connection open.
    Connected,
    /// Closed by its owner; operations fail.
    Closed,
}

impl TransportState {
    /// Connection currently open.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` if the transport accepts operations.
    pub fn is_usable(&self) -> bool {
        !matches!(self, Self::Closed)
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Closed => "closed",
        })
    }
}

// =============================================================================
// RegisterData
// =============================================================================

/// Registers returned by a read, kept in wire order (big-endian).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RegisterData {
    bytes: Vec<u8>,
}

impl RegisterData {
    /// Wraps raw register bytes. An odd trailing byte is ignored by [`values`](Self::values).
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Encodes register values.
    pub fn from_values(values: &[u16]) -> Self {
        Self {
            bytes: values.iter().flat_map(|v| v.to_be_bytes()).collect(),
        }
    }

    /// Returns the raw big-endian bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the data, returning the raw bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Returns the decoded register values.
    pub fn values(&self) -> Vec<u16> {
        self.bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect()
    }

    /// Returns the register at `index`.
    pub fn get(&self, index: usize) -> Option<u16> {
        let pair = self.bytes.get(index * 2..index * 2 + 2)?;
        Some(u16::from_be_bytes([pair[0], pair[1]]))
    }

    /// Number of registers.
    pub fn len(&self) -> usize {
        self.bytes.len() / 2
    }

    /// Returns `true` if no registers were read.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<u16>> for RegisterData {
    fn from(values: Vec<u16>) -> Self {
        Self::from_values(&values)
    }
}

// =============================================================================
// ModbusTransport
// =============================================================================

/// The eight data operations of a Modbus master.
///
/// Implementations are shared across tasks behind `Arc` and take `&self`;
/// any locking is internal. Addresses are 0-based protocol addresses.
///
/// # Implementors
///
/// - [`ChannelTransport`](super::channel::ChannelTransport) over TCP, RTU or memory links
/// - [`SlaveIdTransport`](super::manager::SlaveIdTransport) and
///   [`MutexTransport`](super::manager::MutexTransport), the pool wrappers
#[async_trait]
pub trait ModbusTransport: Send + Sync {
    /// `count` coils from `address` (0x01, up to 2000).
    async fn read_coils(&self, address: u16, count: u16) -> ModbusResult<Vec<bool>>;

    /// `count` discrete inputs from `address` (0x02, up to 2000).
    async fn read_discrete_inputs(&self, address: u16, count: u16) -> ModbusResult<Vec<bool>>;

    /// `count` holding registers from `address` (0x03, up to 125).
    async fn read_holding_registers(&self, address: u16, count: u16) -> ModbusResult<RegisterData>;

    /// `count` input registers from `address` (0x04, up to 125).
    async fn read_input_registers(&self, address: u16, count: u16) -> ModbusResult<RegisterData>;

    /// Sets one coil (0x05).
    async fn write_single_coil(&self, address: u16, value: bool) -> ModbusResult<()>;

    /// Sets one holding register (0x06).
    async fn write_single_register(&self, address: u16, value: u16) -> ModbusResult<()>;

    /// Sets consecutive coils (0x0F, up to 1968).
    async fn write_multiple_coils(&self, address: u16, values: &[bool]) -> ModbusResult<()>;

    /// Sets consecutive holding registers (0x10, up to 123).
    async fn write_multiple_registers(&self, address: u16, values: &[u16]) -> ModbusResult<()>;

    // =========================================================================
    // Lifecycle and Metadata
    // =========================================================================

    /// Closes the transport. Never retried.
    async fn close(&self) -> ModbusResult<()>;

    /// Returns the unit ID (slave address) requests are sent to.
    fn unit_id(&self) -> u8;

    /// Endpoint and unit for logs, e.g. `tcp://10.0.0.5:502 (unit 1)`.
    fn display_name(&self) -> String;
}

/// A physical channel shared by several units.
///
/// The addressed unit is mutable so that one connection can serve every
/// device on a bus; callers must hold the channel's lock across
/// `set_unit_id` and the following operation.
pub trait RawTransport: ModbusTransport {
    /// Sets the unit ID used by subsequent operations.
    fn set_unit_id(&self, unit_id: u8);

    /// Returns the connection state.
    fn state(&self) -> TransportState;
}

// =============================================================================
// RequestHandler Trait
// =============================================================================

/// Answers Modbus request frames without a wire in between.
///
/// Both frames are `[unit_id, function_code, data...]`. A handler always
/// answers, using an exception frame for failures.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Handles one request frame.
    async fn handle_request(&self, frame: &[u8]) -> Vec<u8>;
}

// =============================================================================
// Tests
// =============================================================================
