// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the Modbus client side.
//!
//! ```text
//! ModbusError
//! ├── Connection    - socket / serial channel failures
//! ├── Timeout       - connect or response deadline exceeded
//! ├── Protocol      - exception responses and malformed frames
//! ├── Operation     - request rejected before it reached the wire
//! └── Configuration - transport configuration that cannot be routed
//! ```
//!
//! `Connection` and `Timeout` together form the transport category: these are
//! the failures the retry policy is built for. Everything else surfaces at the
//! point of misuse.
//!
//! # Examples
//!
//! ```
//! use ferrobus_modbus::error::ModbusError;
//!
//! let err = ModbusError::not_connected();
//! assert!(err.is_transport());
//! assert_eq!(err.category(), "connection");
//! ```

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::codec::ExceptionCode;

/// Result alias used throughout the crate.
pub type ModbusResult<T> = Result<T, ModbusError>;

// =============================================================================
// ModbusError
// =============================================================================

/// Any failure of a client-side Modbus operation.
#[derive(Debug, Error)]
pub enum ModbusError {
    /// The channel could not be opened, or broke mid-exchange.
    #[error("{0}")]
    Connection(#[from] ConnectionError),

    /// The device answered, but not with what was asked for.
    #[error("{0}")]
    Protocol(#[from] ProtocolError),

    /// The request never left the client.
    #[error("{0}")]
    Operation(#[from] OperationError),

    /// The transport configuration is unusable.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// A deadline passed.
    #[error("{0}")]
    Timeout(#[from] TimeoutError),
}

impl ModbusError {
    /// The channel has no open connection.
    pub fn not_connected() -> Self {
        ConnectionError::NotConnected.into()
    }

    /// The transport was closed on purpose.
    pub fn closed(reason: impl Into<String>) -> Self {
        ConnectionError::closed(Some(reason.into())).into()
    }

    /// No response within `duration`.
    pub fn response_timeout(duration: Duration) -> Self {
        TimeoutError::response(duration).into()
    }

    /// The device answered `function_code` with an exception.
    pub fn exception(function_code: u8, exception_code: u8) -> Self {
        ProtocolError::exception_response(function_code, exception_code).into()
    }

    /// Returns `true` for connection and timeout failures.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_))
    }

    /// Returns `true` when a later attempt has a chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(e) => e.is_retryable(),
            Self::Protocol(e) => e.is_retryable(),
            Self::Timeout(_) => true,
            Self::Operation(_) | Self::Configuration(_) => false,
        }
    }

    /// Exception code carried by an exception response.
    pub fn exception_code(&self) -> Option<u8> {
        match self {
            Self::Protocol(ProtocolError::ExceptionResponse { exception_code, .. }) => {
                Some(*exception_code)
            }
            _ => None,
        }
    }

    /// How loudly this error should be reported.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Connection(e) => e.severity(),
            Self::Protocol(e) => e.severity(),
            Self::Timeout(_) => ErrorSeverity::Warning,
            Self::Operation(_) => ErrorSeverity::Error,
            Self::Configuration(_) => ErrorSeverity::Critical,
        }
    }

    /// Short category name used as a log field.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Timeout(_) => "timeout",
            Self::Protocol(_) => "protocol",
            Self::Operation(_) => "operation",
            Self::Configuration(_) => "configuration",
        }
    }

    /// Emits this error through `tracing` at its severity.
    pub fn log(&self, context: &str) {
        let category = self.category();
        let retryable = self.is_retryable();
        match self.severity() {
            ErrorSeverity::Critical | ErrorSeverity::Error => {
                tracing::error!(category, retryable, context, "{self}")
            }
            ErrorSeverity::Warning => tracing::warn!(category, retryable, context, "{self}"),
            ErrorSeverity::Info => tracing::info!(category, retryable, context, "{self}"),
        }
    }
}

impl From<io::Error> for ModbusError {
    fn from(error: io::Error) -> Self {
        Self::Connection(error.into())
    }
}

// =============================================================================
// ConnectionError
// =============================================================================

/// Failures of the underlying socket or serial port.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The TCP peer refused the connection.
    #[error("Connection refused to {host}:{port}")]
    Refused {
        /// Host dialled.
        host: String,
        /// Port dialled.
        port: u16,
        /// OS error, when there is one.
        #[source]
        source: Option<io::Error>,
    },

    /// The TCP handshake did not finish in time.
    #[error("Connection to {host}:{port} not established within {duration:?}")]
    TimedOut {
        /// Host dialled.
        host: String,
        /// Port dialled.
        port: u16,
        /// Connect deadline.
        duration: Duration,
    },

    /// The serial device could not be opened.
    #[error("Failed to open serial port '{port}': {message}")]
    SerialOpenFailed {
        /// Device path.
        port: String,
        /// Driver message.
        message: String,
    },

    /// The channel is gone. `reason` is set when the owner closed it.
    #[error("Connection closed{}", closed_suffix(.reason))]
    Closed {
        /// Why the owner closed it.
        reason: Option<String>,
    },

    /// No connection is open.
    #[error("Not connected to Modbus device")]
    NotConnected,

    /// Any other I/O failure.
    #[error("I/O error: {message}")]
    Io {
        /// Context.
        message: String,
        /// OS error.
        #[source]
        source: io::Error,
    },
}

impl ConnectionError {
    /// The peer refused `host:port`, keeping the OS error.
    pub fn refused_with(host: impl Into<String>, port: u16, source: io::Error) -> Self {
        Self::Refused {
            host: host.into(),
            port,
            source: Some(source),
        }
    }

    /// Connecting to `host:port` took longer than `duration`.
    pub fn timed_out(host: impl Into<String>, port: u16, duration: Duration) -> Self {
        Self::TimedOut {
            host: host.into(),
            port,
            duration,
        }
    }

    /// Opening serial device `port` failed.
    pub fn serial_open(port: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SerialOpenFailed {
            port: port.into(),
            message: message.into(),
        }
    }

    /// The channel closed. `None` means the peer hung up.
    pub fn closed(reason: Option<String>) -> Self {
        Self::Closed { reason }
    }

    /// Generic I/O failure with context.
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Returns `true` unless the failure is permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            // A transport closed by its owner stays closed.
            Self::Closed { reason } => reason.is_none(),
            Self::Io { source, .. } => !matches!(
                source.kind(),
                io::ErrorKind::PermissionDenied | io::ErrorKind::InvalidInput
            ),
            Self::Refused { .. }
            | Self::TimedOut { .. }
            | Self::SerialOpenFailed { .. }
            | Self::NotConnected => true,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::SerialOpenFailed { .. } => ErrorSeverity::Critical,
            Self::NotConnected | Self::Closed { .. } => ErrorSeverity::Warning,
            Self::Refused { .. } | Self::TimedOut { .. } | Self::Io { .. } => ErrorSeverity::Error,
        }
    }
}

fn closed_suffix(reason: &Option<String>) -> String {
    reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default()
}

/// Hang-ups become [`ConnectionError::Closed`]; everything else is kept as I/O.
impl From<io::Error> for ConnectionError {
    fn from(error: io::Error) -> Self {
        use io::ErrorKind::*;

        match error.kind() {
            UnexpectedEof | ConnectionReset | ConnectionAborted | BrokenPipe => {
                Self::Closed { reason: None }
            }
            _ => Self::Io {
                message: error.to_string(),
                source: error,
            },
        }
    }
}

// =============================================================================
// ProtocolError
// =============================================================================

/// A response arrived but could not be accepted.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The device returned an exception frame.
    #[error("Modbus exception: function code {function_code:#04x}, exception {exception_code} ({exception_name})")]
    ExceptionResponse {
        /// Function code of the request, without the error bit.
        function_code: u8,
        /// Raw exception code.
        exception_code: u8,
        /// Name of the exception code.
        exception_name: &'static str,
    },

    /// RTU checksum does not match.
    #[error("CRC check failed: expected {expected:#06x}, got {actual:#06x}")]
    CrcMismatch {
        /// CRC computed over the received frame.
        expected: u16,
        /// CRC carried by the frame.
        actual: u16,
    },

    /// Fewer bytes than the frame layout needs.
    #[error("Frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Minimum length.
        expected: usize,
        /// Received length.
        actual: usize,
    },

    /// The response names a different unit.
    #[error("Unit ID mismatch: expected {expected}, got {actual}")]
    UnitIdMismatch {
        /// Unit addressed.
        expected: u8,
        /// Unit that answered.
        actual: u8,
    },

    /// The response function code does not echo the request.
    #[error("Function code mismatch: expected {expected:#04x}, got {actual:#04x}")]
    FunctionCodeMismatch {
        /// Function code sent.
        expected: u8,
        /// Function code received.
        actual: u8,
    },

    /// A byte count disagrees with the payload or the requested quantity.
    #[error("Byte count mismatch: expected {expected}, got {actual}")]
    ByteCountMismatch {
        /// Derived from the request.
        expected: usize,
        /// Found in the response.
        actual: usize,
    },

    /// MBAP transaction id does not match the request.
    #[error("Transaction ID mismatch: expected {expected}, got {actual}")]
    TransactionIdMismatch {
        /// Id sent.
        expected: u16,
        /// Id received.
        actual: u16,
    },

    /// MBAP header with a wrong protocol id or length.
    #[error("Invalid MBAP header: {message}")]
    InvalidMbapHeader {
        /// What was wrong.
        message: String,
    },

    /// Anything else that does not parse.
    #[error("Unexpected response: {message}")]
    UnexpectedResponse {
        /// What was wrong.
        message: String,
    },
}

impl ProtocolError {
    /// The device answered `function_code` with `exception_code`.
    pub fn exception_response(function_code: u8, exception_code: u8) -> Self {
        Self::ExceptionResponse {
            function_code,
            exception_code,
            exception_name: Self::exception_name(exception_code),
        }
    }

    /// Human-readable name of an exception code.
    ///
    /// The codes the emulator produces are named by [`ExceptionCode`]; the
    /// remaining standard codes are only ever received.
    pub fn exception_name(code: u8) -> &'static str {
        if let Some(known) = ExceptionCode::from_u8(code) {
            return known.description();
        }
        match code {
            0x04 => "Slave Device Failure",
            0x05 => "Acknowledge",
            0x06 => "Slave Device Busy",
            0x08 => "Memory Parity Error",
            0x0A => "Gateway Path Unavailable",
            _ => "Unknown Exception",
        }
    }

    /// RTU checksum mismatch.
    pub fn crc_mismatch(expected: u16, actual: u16) -> Self {
        Self::CrcMismatch { expected, actual }
    }

    /// Frame shorter than `expected` bytes.
    pub fn frame_too_short(expected: usize, actual: usize) -> Self {
        Self::FrameTooShort { expected, actual }
    }

    /// Wrong unit answered.
    pub fn unit_id_mismatch(expected: u8, actual: u8) -> Self {
        Self::UnitIdMismatch { expected, actual }
    }

    /// Function code not echoed.
    pub fn function_code_mismatch(expected: u8, actual: u8) -> Self {
        Self::FunctionCodeMismatch { expected, actual }
    }

    /// Byte count disagreement.
    pub fn byte_count_mismatch(expected: usize, actual: usize) -> Self {
        Self::ByteCountMismatch { expected, actual }
    }

    /// MBAP transaction id disagreement.
    pub fn transaction_id_mismatch(expected: u16, actual: u16) -> Self {
        Self::TransactionIdMismatch { expected, actual }
    }

    /// Malformed MBAP header.
    pub fn invalid_mbap(message: impl Into<String>) -> Self {
        Self::InvalidMbapHeader {
            message: message.into(),
        }
    }

    /// Any other malformed response.
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            message: message.into(),
        }
    }

    /// Corrupted frames and "busy"-style exceptions may clear up; any other
    /// exception is the device's definitive answer.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ExceptionResponse { exception_code, .. } => {
                matches!(exception_code, 0x05 | 0x06 | 0x0B)
            }
            Self::CrcMismatch { .. }
            | Self::FrameTooShort { .. }
            | Self::TransactionIdMismatch { .. }
            | Self::InvalidMbapHeader { .. } => true,
            Self::UnitIdMismatch { .. }
            | Self::FunctionCodeMismatch { .. }
            | Self::ByteCountMismatch { .. }
            | Self::UnexpectedResponse { .. } => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::ExceptionResponse {
                exception_code: 0x05 | 0x06,
                ..
            } => ErrorSeverity::Info,
            Self::ExceptionResponse {
                exception_code: 0x0B,
                ..
            }
            | Self::CrcMismatch { .. }
            | Self::TransactionIdMismatch { .. } => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }
}

// =============================================================================
// OperationError
// =============================================================================

/// Errors raised while building a request, before any I/O takes place.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    /// Quantity outside the limit for the function code.
    #[error("Quantity {quantity} out of range for function {function_code:#04x} (allowed {min}-{max})")]
    QuantityOutOfRange {
        /// Function code of the request.
        function_code: u8,
        /// Requested quantity.
        quantity: usize,
        /// Lower limit.
        min: usize,
        /// Upper limit.
        max: usize,
    },

    /// Address range runs past the end of the 16-bit address space.
    #[error("Address range {address}+{quantity} exceeds the 65536-entry address space")]
    AddressOverflow {
        /// Start address.
        address: u16,
        /// Requested quantity.
        quantity: usize,
    },
}

impl OperationError {
    /// Quantity outside `min..=max` for `function_code`.
    pub fn quantity_out_of_range(function_code: u8, quantity: usize, min: usize, max: usize) -> Self {
        Self::QuantityOutOfRange {
            function_code,
            quantity,
            min,
            max,
        }
    }

    /// `address + quantity` past 65536.
    pub fn address_overflow(address: u16, quantity: usize) -> Self {
        Self::AddressOverflow { address, quantity }
    }
}

// =============================================================================
// ConfigurationError
// =============================================================================

/// A transport configuration that cannot be routed or opened.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// A field the transport kind requires is absent.
    #[error("Missing required field '{field}' for {transport} transport")]
    MissingField {
        /// `"rtu"` or `"tcp"`.
        transport: &'static str,
        /// Missing field.
        field: String,
    },

    /// Both a host and a serial port path were given.
    #[error("Ambiguous transport configuration: {message}")]
    Ambiguous {
        /// Explanation.
        message: String,
    },

    /// Neither a host nor a serial port path was given.
    #[error("Cannot determine transport type: {message}")]
    UnknownTransport {
        /// Explanation.
        message: String,
    },

    /// Unit ID outside 1-247.
    #[error("Invalid unit ID: {unit_id} (must be 1-247)")]
    InvalidUnitId {
        /// Offending ID.
        unit_id: u8,
    },

    /// A field value the transport cannot use.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Offending field.
        field: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl ConfigurationError {
    /// `field` is required for `transport`.
    pub fn missing_field(transport: &'static str, field: impl Into<String>) -> Self {
        Self::MissingField {
            transport,
            field: field.into(),
        }
    }

    /// Both RTU and TCP keys present.
    pub fn ambiguous(message: impl Into<String>) -> Self {
        Self::Ambiguous {
            message: message.into(),
        }
    }

    /// No routing key present.
    pub fn unknown_transport(message: impl Into<String>) -> Self {
        Self::UnknownTransport {
            message: message.into(),
        }
    }

    /// Unit ID out of range.
    pub fn invalid_unit_id(unit_id: u8) -> Self {
        Self::InvalidUnitId { unit_id }
    }

    /// `field` rejected for `reason`.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// TimeoutError
// =============================================================================

/// A deadline passed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeoutError {
    /// Opening the channel took too long.
    #[error("Connection timed out after {duration:?}")]
    Connection {
        /// Deadline.
        duration: Duration,
    },

    /// No complete response within the deadline.
    #[error("Response timed out after {duration:?}")]
    Response {
        /// Deadline.
        duration: Duration,
    },
}

impl TimeoutError {
    /// Connect deadline passed.
    pub fn connection(duration: Duration) -> Self {
        Self::Connection { duration }
    }

    /// Response deadline passed.
    pub fn response(duration: Duration) -> Self {
        Self::Response { duration }
    }

    /// The deadline that passed.
    pub fn duration(&self) -> Duration {
        match self {
            Self::Connection { duration } | Self::Response { duration } => *duration,
        }
    }
}

// =============================================================================
// ErrorSeverity
// =============================================================================

/// Log level bucket for an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    /// Expected during normal polling (device busy).
    Info,
    /// Transient; usually recovers on its own.
    Warning,
    /// The operation failed.
    Error,
    /// Nothing will work until the setup is fixed.
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
