// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! TCP envelope: a six-byte MBAP prefix followed by the frame.
//!
//! The MBAP unit identifier is the first byte of the frame, so the prefix
//! carries transaction ID, protocol ID (always 0) and the frame length.

use crate::error::{ModbusResult, ProtocolError};

/// MBAP prefix length (without the unit identifier).
pub const MBAP_PREFIX_LEN: usize = 6;

/// Largest frame an MBAP length field may announce (unit + PDU).
pub const MAX_FRAME_LEN: usize = 254;

/// Parsed MBAP prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    /// Transaction identifier echoed by the server.
    pub transaction_id: u16,
    /// Protocol identifier; 0 for Modbus.
    pub protocol_id: u16,
    /// Number of frame bytes that follow.
    pub length: u16,
}

impl MbapHeader {
    /// Parses and validates a prefix.
    pub fn parse(bytes: &[u8]) -> ModbusResult<Self> {
        if bytes.len() < MBAP_PREFIX_LEN {
            return Err(ProtocolError::frame_too_short(MBAP_PREFIX_LEN, bytes.len()).into());
        }

        let header = Self {
            transaction_id: u16::from_be_bytes([bytes[0], bytes[1]]),
            protocol_id: u16::from_be_bytes([bytes[2], bytes[3]]),
            length: u16::from_be_bytes([bytes[4], bytes[5]]),
        };

        if header.protocol_id != 0 {
            return Err(ProtocolError::invalid_mbap(format!(
                "protocol id {} is not Modbus",
                header.protocol_id
            ))
            .into());
        }
        if header.length == 0 || usize::from(header.length) > MAX_FRAME_LEN {
            return Err(ProtocolError::invalid_mbap(format!(
                "length {} outside 1-{MAX_FRAME_LEN}",
                header.length
            ))
            .into());
        }
        Ok(header)
    }

    /// Serializes the prefix.
    pub fn to_bytes(&self) -> [u8; MBAP_PREFIX_LEN] {
        let [t0, t1] = self.transaction_id.to_be_bytes();
        let [p0, p1] = self.protocol_id.to_be_bytes();
        let [l0, l1] = self.length.to_be_bytes();
        [t0, t1, p0, p1, l0, l1]
    }
}

/// Wraps a frame in an MBAP prefix.
pub fn encode(transaction_id: u16, frame: &[u8]) -> Vec<u8> {
    let header = MbapHeader {
        transaction_id,
        protocol_id: 0,
        length: frame.len() as u16,
    };
    let mut adu = Vec::with_capacity(MBAP_PREFIX_LEN + frame.len());
    adu.extend_from_slice(&header.to_bytes());
    adu.extend_from_slice(frame);
    adu
}

/// Parses the prefix of a complete ADU.
pub fn decode_header(adu: &[u8]) -> ModbusResult<MbapHeader> {
    MbapHeader::parse(adu)
}

/// Splits a complete ADU into its header and frame.
pub fn decode(adu: &[u8]) -> ModbusResult<(MbapHeader, &[u8])> {
    let header = decode_header(adu)?;
    let frame = &adu[MBAP_PREFIX_LEN..];
    if frame.len() != usize::from(header.length) {
        return Err(ProtocolError::invalid_mbap(format!(
            "length field {} but {} bytes follow",
            header.length,
            frame.len()
        ))
        .into());
    }
    Ok((header, frame))
}
