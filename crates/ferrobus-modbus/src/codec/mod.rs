// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Modbus frame codec.
//!
//! A *frame* is `[unit_id, function_code, data...]`: the RTU ADU without its
//! CRC, or the TCP ADU without its MBAP header. Everything here is pure and
//! shared by the client transports and the emulator.
//!
//! - [`request`]: build request frames (client) and parse them (server)
//! - [`response`]: build response frames (server) and parse them (client)
//! - [`rtu`]: CRC-16 envelope and frame length prediction
//! - [`tcp`]: MBAP envelope
//!
//! Coil and discrete input bits are packed MSB-first within each byte.

pub mod request;
pub mod response;
pub mod rtu;
pub mod tcp;

use std::fmt;

// =============================================================================
// Limits
// =============================================================================

/// Maximum registers per read request (0x03, 0x04).
pub const MAX_READ_REGISTERS: u16 = 125;

/// Maximum bits per read request (0x01, 0x02).
pub const MAX_READ_BITS: u16 = 2000;

/// Maximum registers per write request (0x10).
pub const MAX_WRITE_REGISTERS: u16 = 123;

/// Maximum coils per write request (0x0F).
pub const MAX_WRITE_COILS: u16 = 1968;

/// Number of entries in each address space.
pub const ADDRESS_SPACE_SIZE: u32 = 0x1_0000;

/// Bit set in the function code of an exception response.
pub const EXCEPTION_FLAG: u8 = 0x80;

/// Single-coil value meaning ON.
pub const COIL_ON: u16 = 0xFF00;

/// Single-coil value meaning OFF.
pub const COIL_OFF: u16 = 0x0000;

// =============================================================================
// FunctionCode
// =============================================================================

/// The function codes this crate speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum FunctionCode {
    /// Read Coils.
    ReadCoils = 0x01,
    /// Read Discrete Inputs.
    ReadDiscreteInputs = 0x02,
    /// Read Holding Registers.
    ReadHoldingRegisters = 0x03,
    /// Read Input Registers.
    ReadInputRegisters = 0x04,
    /// Write Single Coil.
    WriteSingleCoil = 0x05,
    /// Write Single Register.
    WriteSingleRegister = 0x06,
    /// Write Multiple Coils.
    WriteMultipleCoils = 0x0F,
    /// Write Multiple Registers.
    WriteMultipleRegisters = 0x10,
}

impl FunctionCode {
    /// All supported function codes in ascending order.
    pub const ALL: [FunctionCode; 8] = [
        Self::ReadCoils,
        Self::ReadDiscreteInputs,
        Self::ReadHoldingRegisters,
        Self::ReadInputRegisters,
        Self::WriteSingleCoil,
        Self::WriteSingleRegister,
        Self::WriteMultipleCoils,
        Self::WriteMultipleRegisters,
    ];

    /// Parses a raw function code.
    pub const fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::ReadCoils),
            0x02 => Some(Self::ReadDiscreteInputs),
            0x03 => Some(Self::ReadHoldingRegisters),
            0x04 => Some(Self::ReadInputRegisters),
            0x05 => Some(Self::WriteSingleCoil),
            0x06 => Some(Self::WriteSingleRegister),
            0x0F => Some(Self::WriteMultipleCoils),
            0x10 => Some(Self::WriteMultipleRegisters),
            _ => None,
        }
    }

    /// Returns the raw code.
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns the code with the exception flag set.
    #[inline]
    pub const fn exception_code(self) -> u8 {
        self as u8 | EXCEPTION_FLAG
    }

    /// Returns `true` for the four read functions.
    pub const fn is_read(self) -> bool {
        matches!(
            self,
            Self::ReadCoils
                | Self::ReadDiscreteInputs
                | Self::ReadHoldingRegisters
                | Self::ReadInputRegisters
        )
    }

    /// Returns `true` for functions that address single bits.
    pub const fn is_bit_access(self) -> bool {
        matches!(
            self,
            Self::ReadCoils | Self::ReadDiscreteInputs | Self::WriteSingleCoil | Self::WriteMultipleCoils
        )
    }

    /// Quantity limits `(min, max)` for functions that carry a quantity field.
    pub const fn quantity_limits(self) -> Option<(u16, u16)> {
        match self {
            Self::ReadCoils | Self::ReadDiscreteInputs => Some((1, MAX_READ_BITS)),
            Self::ReadHoldingRegisters | Self::ReadInputRegisters => Some((1, MAX_READ_REGISTERS)),
            Self::WriteMultipleCoils => Some((1, MAX_WRITE_COILS)),
            Self::WriteMultipleRegisters => Some((1, MAX_WRITE_REGISTERS)),
            Self::WriteSingleCoil | Self::WriteSingleRegister => None,
        }
    }

    /// Minimum request frame length, including unit ID and function code.
    pub const fn min_request_len(self) -> usize {
        match self {
            Self::WriteMultipleCoils | Self::WriteMultipleRegisters => 7,
            _ => 6,
        }
    }

    /// Human-readable name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::ReadCoils => "Read Coils",
            Self::ReadDiscreteInputs => "Read Discrete Inputs",
            Self::ReadHoldingRegisters => "Read Holding Registers",
            Self::ReadInputRegisters => "Read Input Registers",
            Self::WriteSingleCoil => "Write Single Coil",
            Self::WriteSingleRegister => "Write Single Register",
            Self::WriteMultipleCoils => "Write Multiple Coils",
            Self::WriteMultipleRegisters => "Write Multiple Registers",
        }
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#04x})", self.name(), self.as_u8())
    }
}

// =============================================================================
// ExceptionCode
// =============================================================================

/// Exception codes the emulator produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ExceptionCode {
    /// Function code not supported.
    IllegalFunction = 0x01,
    /// Address range not available.
    IllegalDataAddress = 0x02,
    /// Malformed request or value out of range.
    IllegalDataValue = 0x03,
    /// Addressed unit did not respond.
    GatewayTargetFailed = 0x0B,
}

impl ExceptionCode {
    /// Returns the raw code.
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parses a raw exception code.
    pub const fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::IllegalFunction),
            0x02 => Some(Self::IllegalDataAddress),
            0x03 => Some(Self::IllegalDataValue),
            0x0B => Some(Self::GatewayTargetFailed),
            _ => None,
        }
    }

    /// Human-readable name.
    pub const fn description(self) -> &'static str {
        match self {
            Self::IllegalFunction => "Illegal Function",
            Self::IllegalDataAddress => "Illegal Data Address",
            Self::IllegalDataValue => "Illegal Data Value",
            Self::GatewayTargetFailed => "Gateway Target Device Failed to Respond",
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::IllegalFunction => "ILLEGAL_FUNCTION",
            Self::IllegalDataAddress => "ILLEGAL_DATA_ADDRESS",
            Self::IllegalDataValue => "ILLEGAL_DATA_VALUE",
            Self::GatewayTargetFailed => "GATEWAY_TARGET_FAILED",
        };
        write!(f, "{name}")
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Reads a big-endian u16 at `offset`, if present.
#[inline]
pub fn read_u16(frame: &[u8], offset: usize) -> Option<u16> {
    match frame.get(offset..offset + 2) {
        Some(&[hi, lo]) => Some(u16::from_be_bytes([hi, lo])),
        _ => None,
    }
}

/// Returns `true` when `address + quantity` stays inside the address space.
#[inline]
pub fn range_fits(address: u16, quantity: usize) -> bool {
    u32::from(address) + quantity as u32 <= ADDRESS_SPACE_SIZE
}

/// Packs bits MSB-first: the first bit lands in bit 7 of the first byte.
pub fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; bits.len().div_ceil(8)];
    for (i, _) in bits.iter().enumerate().filter(|(_, bit)| **bit) {
        bytes[i / 8] |= 0x80 >> (i % 8);
    }
    bytes
}

/// Unpacks `count` bits packed by [`pack_bits`].
///
/// Missing bytes read as `false`.
pub fn unpack_bits(bytes: &[u8], count: usize) -> Vec<bool> {
    (0..count)
        .map(|i| {
            bytes
                .get(i / 8)
                .is_some_and(|byte| byte & (0x80 >> (i % 8)) != 0)
        })
        .collect()
}

/// Builds an exception frame `[unit, function_code | 0x80, code]`.
pub fn exception_frame(unit_id: u8, function_code: u8, code: ExceptionCode) -> Vec<u8> {
    vec![unit_id, function_code | EXCEPTION_FLAG, code.as_u8()]
}

// =============================================================================
// Tests
// =============================================================================
