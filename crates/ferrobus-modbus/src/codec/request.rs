// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Request frames.
//!
//! Builders return [`ModbusResult`] where the request can be invalid; parsers
//! used by the emulator return the [`ExceptionCode`] to answer with.

use super::{
    pack_bits, range_fits, read_u16, unpack_bits, ExceptionCode, FunctionCode, COIL_OFF, COIL_ON,
};
use crate::error::{ModbusResult, OperationError};

// =============================================================================
// Builders
// =============================================================================

fn check_quantity(function: FunctionCode, address: u16, quantity: usize) -> ModbusResult<u16> {
    if let Some((min, max)) = function.quantity_limits() {
        if quantity < usize::from(min) || quantity > usize::from(max) {
            return Err(OperationError::quantity_out_of_range(
                function.as_u8(),
                quantity,
                usize::from(min),
                usize::from(max),
            )
            .into());
        }
    }
    if !range_fits(address, quantity) {
        return Err(OperationError::address_overflow(address, quantity).into());
    }
    Ok(quantity as u16)
}

fn header(unit_id: u8, function: FunctionCode, address: u16, word: u16) -> Vec<u8> {
    let [addr_hi, addr_lo] = address.to_be_bytes();
    let [word_hi, word_lo] = word.to_be_bytes();
    vec![unit_id, function.as_u8(), addr_hi, addr_lo, word_hi, word_lo]
}

/// Builds a read request `[unit, fc, addr, count]` for one of the four read functions.
pub fn read(unit_id: u8, function: FunctionCode, address: u16, count: u16) -> ModbusResult<Vec<u8>> {
    debug_assert!(function.is_read());
    let count = check_quantity(function, address, usize::from(count))?;
    Ok(header(unit_id, function, address, count))
}

/// Builds a write-single-register request.
pub fn write_single_register(unit_id: u8, address: u16, value: u16) -> Vec<u8> {
    header(unit_id, FunctionCode::WriteSingleRegister, address, value)
}

/// Builds a write-single-coil request with the `0xFF00` / `0x0000` sentinel.
pub fn write_single_coil(unit_id: u8, address: u16, value: bool) -> Vec<u8> {
    let raw = if value { COIL_ON } else { COIL_OFF };
    header(unit_id, FunctionCode::WriteSingleCoil, address, raw)
}

/// Builds a write-multiple-registers request.
pub fn write_multiple_registers(unit_id: u8, address: u16, values: &[u16]) -> ModbusResult<Vec<u8>> {
    let count = check_quantity(FunctionCode::WriteMultipleRegisters, address, values.len())?;

    let mut frame = header(unit_id, FunctionCode::WriteMultipleRegisters, address, count);
    frame.push((values.len() * 2) as u8);
    frame.extend(values.iter().flat_map(|v| v.to_be_bytes()));
    Ok(frame)
}

/// Builds a write-multiple-coils request.
pub fn write_multiple_coils(unit_id: u8, address: u16, values: &[bool]) -> ModbusResult<Vec<u8>> {
    let count = check_quantity(FunctionCode::WriteMultipleCoils, address, values.len())?;

    let packed = pack_bits(values);
    let mut frame = header(unit_id, FunctionCode::WriteMultipleCoils, address, count);
    frame.push(packed.len() as u8);
    frame.extend_from_slice(&packed);
    Ok(frame)
}

// =============================================================================
// Parsers
// =============================================================================

/// A parsed read request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    /// Start address.
    pub address: u16,
    /// Number of registers or bits.
    pub quantity: u16,
}

/// A parsed single write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSingle<T> {
    /// Target address.
    pub address: u16,
    /// Value to write.
    pub value: T,
}

/// A parsed multiple write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteMultiple<T> {
    /// Start address.
    pub address: u16,
    /// Values in address order.
    pub values: Vec<T>,
}

fn validate_quantity(function: FunctionCode, address: u16, quantity: u16) -> Result<(), ExceptionCode> {
    if let Some((min, max)) = function.quantity_limits() {
        if quantity < min || quantity > max {
            return Err(ExceptionCode::IllegalDataValue);
        }
    }
    if !range_fits(address, usize::from(quantity)) {
        return Err(ExceptionCode::IllegalDataAddress);
    }
    Ok(())
}

fn address_and_word(frame: &[u8], function: FunctionCode) -> Result<(u16, u16), ExceptionCode> {
    if frame.len() < function.min_request_len() {
        return Err(ExceptionCode::IllegalDataValue);
    }
    match (read_u16(frame, 2), read_u16(frame, 4)) {
        (Some(address), Some(word)) => Ok((address, word)),
        _ => Err(ExceptionCode::IllegalDataValue),
    }
}

/// Parses a read request for `function`.
pub fn parse_read(frame: &[u8], function: FunctionCode) -> Result<ReadRequest, ExceptionCode> {
    let (address, quantity) = address_and_word(frame, function)?;
    validate_quantity(function, address, quantity)?;
    Ok(ReadRequest { address, quantity })
}

/// Parses a write-single-register request.
pub fn parse_write_single_register(frame: &[u8]) -> Result<WriteSingle<u16>, ExceptionCode> {
    let (address, value) = address_and_word(frame, FunctionCode::WriteSingleRegister)?;
    Ok(WriteSingle { address, value })
}

/// Parses a write-single-coil request; only `0xFF00` and `0x0000` are accepted.
pub fn parse_write_single_coil(frame: &[u8]) -> Result<WriteSingle<bool>, ExceptionCode> {
    let (address, raw) = address_and_word(frame, FunctionCode::WriteSingleCoil)?;
    let value = match raw {
        COIL_ON => true,
        COIL_OFF => false,
        _ => return Err(ExceptionCode::IllegalDataValue),
    };
    Ok(WriteSingle { address, value })
}

/// Validates a multiple-write header and returns `(address, quantity, payload)`.
fn multiple_payload(
    frame: &[u8],
    function: FunctionCode,
    bytes_for: impl Fn(usize) -> usize,
) -> Result<(u16, u16, &[u8]), ExceptionCode> {
    let (address, quantity) = address_and_word(frame, function)?;
    let byte_count = usize::from(frame[6]);
    let payload = &frame[7..];

    if payload.len() != byte_count {
        return Err(ExceptionCode::IllegalDataValue);
    }
    validate_quantity(function, address, quantity)?;
    if byte_count != bytes_for(usize::from(quantity)) {
        return Err(ExceptionCode::IllegalDataValue);
    }
    Ok((address, quantity, payload))
}

/// Parses a write-multiple-registers request.
pub fn parse_write_multiple_registers(frame: &[u8]) -> Result<WriteMultiple<u16>, ExceptionCode> {
    let (address, _, payload) =
        multiple_payload(frame, FunctionCode::WriteMultipleRegisters, |q| q * 2)?;
    let values = payload
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    Ok(WriteMultiple { address, values })
}

/// Parses a write-multiple-coils request.
pub fn parse_write_multiple_coils(frame: &[u8]) -> Result<WriteMultiple<bool>, ExceptionCode> {
    let (address, quantity, payload) =
        multiple_payload(frame, FunctionCode::WriteMultipleCoils, |q| q.div_ceil(8))?;
    Ok(WriteMultiple {
        address,
        values: unpack_bits(payload, usize::from(quantity)),
    })
}

/// Returns the quantity field of reads and multiple writes.
///
/// `None` for single writes, unknown functions and truncated frames.
pub fn quantity(frame: &[u8]) -> Option<u16> {
    let function = FunctionCode::from_u8(*frame.get(1)?)?;
    function.quantity_limits()?;
    read_u16(frame, 4)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModbusError;

    #[test]
    fn test_read_request_layout() {
        let frame = read(1, FunctionCode::ReadHoldingRegisters, 0x006B, 3).unwrap();
        assert_eq!(frame, vec![0x01, 0x03, 0x00, 0x6B, 0x00, 0x03]);
    }

    #[test]
    fn test_read_quantity_limits() {
        assert!(read(1, FunctionCode::ReadHoldingRegisters, 0, 125).is_ok());
        assert!(matches!(
            read(1, FunctionCode::ReadHoldingRegisters, 0, 126),
            Err(ModbusError::Operation(OperationError::QuantityOutOfRange { .. }))
        ));
        assert!(read(1, FunctionCode::ReadCoils, 0, 0).is_err());
        assert!(matches!(
            read(1, FunctionCode::ReadCoils, 65000, 1000),
            Err(ModbusError::Operation(OperationError::AddressOverflow { .. }))
        ));
    }

    #[test]
    fn test_write_single_coil_sentinel() {
        assert_eq!(write_single_coil(1, 0x00AC, true), vec![0x01, 0x05, 0x00, 0xAC, 0xFF, 0x00]);
        assert_eq!(write_single_coil(1, 0x00AC, false), vec![0x01, 0x05, 0x00, 0xAC, 0x00, 0x00]);
    }

    #[test]
    fn test_write_multiple_registers_layout() {
        let frame = write_multiple_registers(1, 0, &[500, 100, 200]).unwrap();
        assert_eq!(
            frame,
            vec![0x01, 0x10, 0x00, 0x00, 0x00, 0x03, 0x06, 0x01, 0xF4, 0x00, 0x64, 0x00, 0xC8]
        );
        assert!(write_multiple_registers(1, 0, &[]).is_err());
    }

    #[test]
    fn test_write_multiple_coils_layout() {
        let coils = [true, false, true, true, false, false, true, true, true, false];
        let frame = write_multiple_coils(1, 0x0013, &coils).unwrap();
        assert_eq!(frame, vec![0x01, 0x0F, 0x00, 0x13, 0x00, 0x0A, 0x02, 0xB3, 0x80]);

        let parsed = parse_write_multiple_coils(&frame).unwrap();
        assert_eq!(parsed.address, 0x0013);
        assert_eq!(parsed.values, coils);
    }

    #[test]
    fn test_parse_read_short_frame() {
        assert_eq!(
            parse_read(&[0x01, 0x03, 0x00], FunctionCode::ReadHoldingRegisters),
            Err(ExceptionCode::IllegalDataValue)
        );
    }

    #[test]
    fn test_parse_read_address_overflow() {
        let frame = [0x01, 0x03, 0xFF, 0xFF, 0x00, 0x02];
        assert_eq!(
            parse_read(&frame, FunctionCode::ReadHoldingRegisters),
            Err(ExceptionCode::IllegalDataAddress)
        );
    }

    #[test]
    fn test_parse_write_single_coil_rejects_other_values() {
        let frame = [0x01, 0x05, 0x00, 0x01, 0x12, 0x34];
        assert_eq!(parse_write_single_coil(&frame), Err(ExceptionCode::IllegalDataValue));
    }

    #[test]
    fn test_parse_write_multiple_byte_count_mismatch() {
        // Declares 4 bytes, carries 2
        let frame = [0x01, 0x10, 0x00, 0x00, 0x00, 0x02, 0x04, 0x00, 0x01];
        assert_eq!(
            parse_write_multiple_registers(&frame),
            Err(ExceptionCode::IllegalDataValue)
        );

        // Byte count consistent with payload but not with quantity
        let frame = [0x01, 0x10, 0x00, 0x00, 0x00, 0x02, 0x02, 0x00, 0x01];
        assert_eq!(
            parse_write_multiple_registers(&frame),
            Err(ExceptionCode::IllegalDataValue)
        );
    }

    #[test]
    fn test_quantity_field() {
        assert_eq!(quantity(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x0A]), Some(10));
        assert_eq!(quantity(&[0x01, 0x06, 0x00, 0x00, 0x00, 0x0A]), None);
        assert_eq!(quantity(&[0x01, 0x03, 0x00]), None);
        assert_eq!(quantity(&[0x01, 0x99, 0x00, 0x00, 0x00, 0x01]), None);
    }
}
