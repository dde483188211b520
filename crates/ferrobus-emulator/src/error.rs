// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the device emulator.
//!
//! These errors only reach callers of the emulator's management API
//! (adding devices, seeding registers, starting bindings). Requests arriving
//! over a binding never fail: every problem becomes an exception frame.

use std::fmt;
use std::io;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type EmulatorResult<T> = Result<T, EmulatorError>;

// =============================================================================
// EmulatorError
// =============================================================================

/// The main error type for emulator management.
#[derive(Debug, Error)]
pub enum EmulatorError {
    /// Register address or value out of range.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// No device registered for the unit ID.
    #[error("No device with unit ID {unit_id}")]
    DeviceNotFound {
        /// Requested unit ID.
        unit_id: u8,
    },

    /// A device with the unit ID already exists.
    #[error("Device with unit ID {unit_id} already exists")]
    DuplicateDevice {
        /// Conflicting unit ID.
        unit_id: u8,
    },

    /// Unit ID outside 1-247.
    #[error("Invalid unit ID {unit_id}: must be 1-247")]
    InvalidUnitId {
        /// Rejected unit ID.
        unit_id: u8,
    },

    /// `start` called on a running emulator.
    #[error("Emulator is already running")]
    AlreadyRunning,

    /// Operation needs a started emulator.
    #[error("Emulator is not running")]
    NotRunning,

    /// TCP listener could not be bound.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        /// Requested listen address.
        address: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Serial device could not be opened.
    #[error("Failed to open serial device {path}: {message}")]
    Serial {
        /// Device path.
        path: String,
        /// Error details.
        message: String,
    },
}

impl EmulatorError {
    /// Creates a device not found error.
    pub fn device_not_found(unit_id: u8) -> Self {
        Self::DeviceNotFound { unit_id }
    }

    /// Creates a duplicate device error.
    pub fn duplicate_device(unit_id: u8) -> Self {
        Self::DuplicateDevice { unit_id }
    }

    /// Creates an invalid unit ID error.
    pub fn invalid_unit_id(unit_id: u8) -> Self {
        Self::InvalidUnitId { unit_id }
    }

    /// Creates a bind error.
    pub fn bind(address: impl Into<String>, source: io::Error) -> Self {
        Self::Bind {
            address: address.into(),
            source,
        }
    }

    /// Creates a serial error.
    pub fn serial(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Serial {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns the error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::DeviceNotFound { .. } | Self::DuplicateDevice { .. } | Self::InvalidUnitId { .. } => {
                "device"
            }
            Self::AlreadyRunning | Self::NotRunning => "lifecycle",
            Self::Bind { .. } | Self::Serial { .. } => "binding",
        }
    }
}

// =============================================================================
// ValidationError
// =============================================================================

/// Register space a validation failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressSpace {
    /// Read-write 16-bit registers.
    HoldingRegisters,
    /// Read-only 16-bit registers.
    InputRegisters,
    /// Read-write bits.
    Coils,
    /// Read-only bits.
    DiscreteInputs,
}

impl fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::HoldingRegisters => "holding register",
            Self::InputRegisters => "input register",
            Self::Coils => "coil",
            Self::DiscreteInputs => "discrete input",
        };
        write!(f, "{s}")
    }
}

/// Which part of a write was out of range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationField {
    /// The address.
    Address,
    /// The register value.
    Value,
}

impl fmt::Display for ValidationField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address => write!(f, "address"),
            Self::Value => write!(f, "value"),
        }
    }
}

/// Which bound was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bound {
    /// Below the minimum.
    Lower,
    /// Above the maximum.
    Upper,
}

/// A register write rejected before mutating the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{space} {field} {value} out of range {min}-{max}")]
pub struct ValidationError {
    /// Address space written.
    pub space: AddressSpace,
    /// Field that failed.
    pub field: ValidationField,
    /// Bound violated.
    pub bound: Bound,
    /// Rejected value.
    pub value: i64,
    /// Inclusive minimum.
    pub min: i64,
    /// Inclusive maximum.
    pub max: i64,
}

impl ValidationError {
    /// Checks `value` against `[min, max]`.
    pub fn check(
        space: AddressSpace,
        field: ValidationField,
        value: i64,
        min: i64,
        max: i64,
    ) -> Result<(), Self> {
        let bound = if value < min {
            Bound::Lower
        } else if value > max {
            Bound::Upper
        } else {
            return Ok(());
        };
        Err(Self {
            space,
            field,
            bound,
            value,
            min,
            max,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_bounds() {
        let space = AddressSpace::HoldingRegisters;
        assert!(ValidationError::check(space, ValidationField::Address, 0, 0, 65535).is_ok());
        assert!(ValidationError::check(space, ValidationField::Address, 65535, 0, 65535).is_ok());

        let low = ValidationError::check(space, ValidationField::Value, -1, 0, 65535).unwrap_err();
        assert_eq!(low.bound, Bound::Lower);
        assert_eq!(low.field, ValidationField::Value);

        let high = ValidationError::check(space, ValidationField::Address, 65536, 0, 65535).unwrap_err();
        assert_eq!(high.bound, Bound::Upper);
        assert_eq!(high.to_string(), "holding register address 65536 out of range 0-65535");
    }

    #[test]
    fn test_error_display_and_category() {
        assert_eq!(
            EmulatorError::invalid_unit_id(0).to_string(),
            "Invalid unit ID 0: must be 1-247"
        );
        assert_eq!(EmulatorError::device_not_found(9).category(), "device");
        assert_eq!(EmulatorError::AlreadyRunning.category(), "lifecycle");

        let err: EmulatorError = ValidationError::check(
            AddressSpace::Coils,
            ValidationField::Address,
            -1,
            0,
            65535,
        )
        .unwrap_err()
        .into();
        assert_eq!(err.category(), "validation");
    }
}
