// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # ferrobus-emulator
//!
//! Software Modbus devices for tests and development rigs.
//!
//! - **Devices**: per-unit register stores with four independent address
//!   spaces, seeded from configuration
//! - **Dispatch**: function codes 1-6, 15 and 16 through a fixed handler
//!   table; every failure answers with an exception frame
//! - **Timing**: optional detection, processing, per-register and
//!   transmission delays per device
//! - **Bindings**: Modbus TCP listener, RTU over a serial port or any byte
//!   stream, and direct in-process calls
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ferrobus_emulator::{DeviceConfig, EmulatorBinding, ModbusEmulator, RegisterSeed};
//! use ferrobus_modbus::{MemoryConfig, MemoryTransport, ModbusTransport};
//!
//! let emulator = Arc::new(ModbusEmulator::new(EmulatorBinding::Memory));
//! emulator.add_device(
//!     DeviceConfig::new(1).with_registers(RegisterSeed::new().holding_register(0, 230)),
//! )?;
//!
//! let client = MemoryTransport::new(emulator.clone(), MemoryConfig::new(1));
//! assert_eq!(client.read_holding_registers(0, 1).await?.values(), vec![230]);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod device;
pub mod dispatcher;
pub mod emulator;
pub mod error;
pub mod server;
pub mod store;
pub mod timing;

// =============================================================================
// Re-exports
// =============================================================================

pub use device::{DeviceConfig, DeviceRegistry, EmulatedDevice};
pub use dispatcher::{supported_function_codes, RequestDispatcher};
pub use emulator::{EmulatorBinding, EmulatorConfig, ModbusEmulator};
pub use error::{
    AddressSpace, Bound, EmulatorError, EmulatorResult, ValidationError, ValidationField,
};
pub use store::{RegisterSeed, RegisterStore, StoreCounts};
pub use timing::{
    DelaySpec, Sleeper, TimingBreakdown, TimingConfig, TimingSimulator, TokioSleeper,
    TransmissionConfig,
};

// =============================================================================
// Crate Info
// =============================================================================

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
