// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! RTU envelope: frame followed by CRC-16/MODBUS, low byte first.

use super::FunctionCode;
use crate::error::{ModbusResult, ProtocolError};

/// CRC length in bytes.
pub const CRC_LEN: usize = 2;

/// Maximum RTU ADU size.
pub const MAX_ADU_LEN: usize = 256;

/// Computes CRC-16/MODBUS (reflected poly 0xA001, init 0xFFFF).
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Appends the CRC to a frame.
pub fn encode(frame: &[u8]) -> Vec<u8> {
    let mut adu = Vec::with_capacity(frame.len() + CRC_LEN);
    adu.extend_from_slice(frame);
    adu.extend_from_slice(&crc16(frame).to_le_bytes());
    adu
}

/// Checks the CRC and returns the frame without it.
pub fn decode(adu: &[u8]) -> ModbusResult<&[u8]> {
    if adu.len() < 2 + CRC_LEN {
        return Err(ProtocolError::frame_too_short(2 + CRC_LEN, adu.len()).into());
    }

    let (frame, crc) = adu.split_at(adu.len() - CRC_LEN);
    let received = u16::from_le_bytes([crc[0], crc[1]]);
    let computed = crc16(frame);
    if received != computed {
        return Err(ProtocolError::crc_mismatch(computed, received).into());
    }
    Ok(frame)
}

// =============================================================================
// Frame length prediction
// =============================================================================

/// How much of an ADU has arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AduLength {
    /// Not enough bytes to tell.
    NeedMore,
    /// Total ADU length including CRC.
    Complete(usize),
    /// Length cannot be derived; fall back to inter-frame silence.
    Unknown,
}

/// Predicts the total length of a request ADU from its first bytes.
pub fn request_adu_length(buf: &[u8]) -> AduLength {
    let Some(&fc) = buf.get(1) else {
        return AduLength::NeedMore;
    };
    match FunctionCode::from_u8(fc) {
        Some(FunctionCode::WriteMultipleCoils | FunctionCode::WriteMultipleRegisters) => {
            match buf.get(6) {
                Some(&byte_count) => AduLength::Complete(7 + usize::from(byte_count) + CRC_LEN),
                None => AduLength::NeedMore,
            }
        }
        Some(_) => AduLength::Complete(6 + CRC_LEN),
        None => AduLength::Unknown,
    }
}

/// Predicts the total length of a response ADU from its first bytes.
pub fn response_adu_length(buf: &[u8]) -> AduLength {
    let Some(&fc) = buf.get(1) else {
        return AduLength::NeedMore;
    };
    if fc & super::EXCEPTION_FLAG != 0 {
        return AduLength::Complete(3 + CRC_LEN);
    }
    match FunctionCode::from_u8(fc) {
        Some(f) if f.is_read() => match buf.get(2) {
            Some(&byte_count) => AduLength::Complete(3 + usize::from(byte_count) + CRC_LEN),
            None => AduLength::NeedMore,
        },
        Some(_) => AduLength::Complete(6 + CRC_LEN),
        None => AduLength::Unknown,
    }
}

// =============================================================================
// Tests
// =============================================================================
