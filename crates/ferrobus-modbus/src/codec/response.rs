// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Response frames.

use super::{pack_bits, read_u16, unpack_bits, FunctionCode, EXCEPTION_FLAG};
use crate::error::{ModbusResult, ProtocolError};

// =============================================================================
// Builders
// =============================================================================

/// Builds a register read response `[unit, fc, byte_count, data...]`.
pub fn read_registers(unit_id: u8, function: FunctionCode, values: &[u16]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(3 + values.len() * 2);
    frame.extend_from_slice(&[unit_id, function.as_u8(), (values.len() * 2) as u8]);
    frame.extend(values.iter().flat_map(|v| v.to_be_bytes()));
    frame
}

/// Builds a bit read response with MSB-first packing.
pub fn read_bits(unit_id: u8, function: FunctionCode, bits: &[bool]) -> Vec<u8> {
    let packed = pack_bits(bits);
    let mut frame = Vec::with_capacity(3 + packed.len());
    frame.extend_from_slice(&[unit_id, function.as_u8(), packed.len() as u8]);
    frame.extend_from_slice(&packed);
    frame
}

/// Builds a multiple-write acknowledgement `[unit, fc, addr, quantity]`.
pub fn write_multiple(unit_id: u8, function: FunctionCode, address: u16, quantity: u16) -> Vec<u8> {
    let [addr_hi, addr_lo] = address.to_be_bytes();
    let [qty_hi, qty_lo] = quantity.to_be_bytes();
    vec![unit_id, function.as_u8(), addr_hi, addr_lo, qty_hi, qty_lo]
}

/// Builds a single-write acknowledgement: the first six bytes of the request.
pub fn echo(request: &[u8]) -> Vec<u8> {
    request[..request.len().min(6)].to_vec()
}

// =============================================================================
// Parsers
// =============================================================================

/// Verifies unit ID and function code echo and returns the bytes after them.
///
/// Exception frames become [`ProtocolError::ExceptionResponse`].
pub fn check(frame: &[u8], unit_id: u8, function: FunctionCode) -> ModbusResult<&[u8]> {
    if frame.len() < 2 {
        return Err(ProtocolError::frame_too_short(2, frame.len()).into());
    }
    if frame[0] != unit_id {
        return Err(ProtocolError::unit_id_mismatch(unit_id, frame[0]).into());
    }

    let fc = frame[1];
    if fc == function.as_u8() | EXCEPTION_FLAG {
        let code = *frame
            .get(2)
            .ok_or_else(|| ProtocolError::frame_too_short(3, frame.len()))?;
        return Err(ProtocolError::exception_response(function.as_u8(), code).into());
    }
    if fc != function.as_u8() {
        return Err(ProtocolError::function_code_mismatch(function.as_u8(), fc).into());
    }
    Ok(&frame[2..])
}

fn counted_payload(data: &[u8], expected: usize) -> ModbusResult<&[u8]> {
    let (&byte_count, payload) = data
        .split_first()
        .ok_or_else(|| ProtocolError::frame_too_short(3, 2))?;
    let byte_count = usize::from(byte_count);

    if payload.len() != byte_count {
        return Err(ProtocolError::byte_count_mismatch(byte_count, payload.len()).into());
    }
    if byte_count != expected {
        return Err(ProtocolError::byte_count_mismatch(expected, byte_count).into());
    }
    Ok(payload)
}

/// Parses a register read response into its raw big-endian bytes.
pub fn parse_read_registers(
    frame: &[u8],
    unit_id: u8,
    function: FunctionCode,
    count: u16,
) -> ModbusResult<Vec<u8>> {
    let data = check(frame, unit_id, function)?;
    Ok(counted_payload(data, usize::from(count) * 2)?.to_vec())
}

/// Parses a bit read response.
pub fn parse_read_bits(
    frame: &[u8],
    unit_id: u8,
    function: FunctionCode,
    count: u16,
) -> ModbusResult<Vec<bool>> {
    let data = check(frame, unit_id, function)?;
    let payload = counted_payload(data, usize::from(count).div_ceil(8))?;
    Ok(unpack_bits(payload, usize::from(count)))
}

/// Parses a single-write response, which must echo the request.
pub fn parse_echo(frame: &[u8], request: &[u8]) -> ModbusResult<()> {
    let function = request
        .get(1)
        .copied()
        .and_then(FunctionCode::from_u8)
        .ok_or_else(|| ProtocolError::unexpected("request carries no known function code"))?;
    check(frame, request[0], function)?;

    if frame != request {
        return Err(ProtocolError::unexpected("write response does not echo the request").into());
    }
    Ok(())
}

/// Parses a multiple-write acknowledgement.
pub fn parse_write_multiple(
    frame: &[u8],
    unit_id: u8,
    function: FunctionCode,
    address: u16,
    quantity: u16,
) -> ModbusResult<()> {
    let data = check(frame, unit_id, function)?;
    match (read_u16(data, 0), read_u16(data, 2)) {
        (Some(a), Some(q)) if a == address && q == quantity => Ok(()),
        (Some(a), Some(q)) => Err(ProtocolError::unexpected(format!(
            "acknowledged {q} values at {a}, requested {quantity} at {address}"
        ))
        .into()),
        _ => Err(ProtocolError::frame_too_short(6, frame.len()).into()),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModbusError;

    #[test]
    fn test_read_registers_layout() {
        let frame = read_registers(1, FunctionCode::ReadHoldingRegisters, &[230, 0]);
        assert_eq!(frame, vec![0x01, 0x03, 0x04, 0x00, 0xE6, 0x00, 0x00]);

        let bytes =
            parse_read_registers(&frame, 1, FunctionCode::ReadHoldingRegisters, 2).unwrap();
        assert_eq!(bytes, vec![0x00, 0xE6, 0x00, 0x00]);
    }

    #[test]
    fn test_read_bits_layout() {
        let frame = read_bits(1, FunctionCode::ReadCoils, &[true, false, true]);
        assert_eq!(frame, vec![0x01, 0x01, 0x01, 0xA0]);
        assert_eq!(
            parse_read_bits(&frame, 1, FunctionCode::ReadCoils, 3).unwrap(),
            vec![true, false, true]
        );
    }

    #[test]
    fn test_exception_becomes_protocol_error() {
        let error = parse_read_registers(&[0x01, 0x83, 0x02], 1, FunctionCode::ReadHoldingRegisters, 1)
            .unwrap_err();
        assert_eq!(error.exception_code(), Some(0x02));
    }

    #[test]
    fn test_unit_and_function_mismatch() {
        let frame = read_registers(2, FunctionCode::ReadHoldingRegisters, &[1]);
        assert!(matches!(
            parse_read_registers(&frame, 1, FunctionCode::ReadHoldingRegisters, 1),
            Err(ModbusError::Protocol(ProtocolError::UnitIdMismatch { expected: 1, actual: 2 }))
        ));
        assert!(matches!(
            parse_read_registers(&frame, 2, FunctionCode::ReadInputRegisters, 1),
            Err(ModbusError::Protocol(ProtocolError::FunctionCodeMismatch { .. }))
        ));
    }

    #[test]
    fn test_byte_count_mismatch() {
        // Declares 4 bytes, carries 2
        let frame = [0x01, 0x03, 0x04, 0x00, 0x01];
        assert!(matches!(
            parse_read_registers(&frame, 1, FunctionCode::ReadHoldingRegisters, 2),
            Err(ModbusError::Protocol(ProtocolError::ByteCountMismatch { .. }))
        ));

        // Well-formed but answers a different quantity
        let frame = read_registers(1, FunctionCode::ReadHoldingRegisters, &[1]);
        assert!(parse_read_registers(&frame, 1, FunctionCode::ReadHoldingRegisters, 2).is_err());
    }

    #[test]
    fn test_echo() {
        let request = [0x01, 0x06, 0x00, 0x01, 0x00, 0x03];
        assert_eq!(echo(&request), request.to_vec());
        assert!(parse_echo(&request, &request).is_ok());
        assert!(parse_echo(&[0x01, 0x06, 0x00, 0x01, 0x00, 0x04], &request).is_err());
    }

    #[test]
    fn test_write_multiple_ack() {
        let frame = write_multiple(1, FunctionCode::WriteMultipleRegisters, 0, 3);
        assert_eq!(frame, vec![0x01, 0x10, 0x00, 0x00, 0x00, 0x03]);
        assert!(parse_write_multiple(&frame, 1, FunctionCode::WriteMultipleRegisters, 0, 3).is_ok());
        assert!(parse_write_multiple(&frame, 1, FunctionCode::WriteMultipleRegisters, 0, 4).is_err());
    }

    #[test]
    fn test_short_frames() {
        assert!(check(&[0x01], 1, FunctionCode::ReadCoils).is_err());
        assert!(check(&[0x01, 0x81], 1, FunctionCode::ReadCoils).is_err());
    }
}
