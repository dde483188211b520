// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # ferrobus-modbus
//!
//! Modbus RTU/TCP client transports with connection pooling.
//!
//! - **Codec**: frame builders and parsers for function codes 1-6, 15 and 16,
//!   MBAP and CRC-16 envelopes
//! - **Transports**: TCP, serial RTU and in-process links behind one
//!   [`ModbusTransport`] trait
//! - **Retry**: fixed-delay bounded retry around every exchange
//! - **Pooling**: one physical channel per serial line or TCP endpoint, shared
//!   by every unit behind it through a FIFO lock
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ferrobus_modbus::client::{ModbusTransport, TransportManager};
//! use ferrobus_modbus::types::TcpConfig;
//!
//! let manager = TransportManager::default();
//! let plc = manager.get_transport(&TcpConfig::new("192.168.1.100", 1).into())?;
//!
//! let values = plc.read_holding_registers(0, 10).await?;
//! plc.write_single_register(100, 42).await?;
//!
//! manager.close_all().await;
//! ```
//!
//! ### Error Handling
//!
//! ```rust,ignore
//! use ferrobus_modbus::error::ModbusError;
//!
//! match plc.read_coils(0, 8).await {
//!     Err(e) if e.exception_code() == Some(0x02) => tracing::warn!("no such coil"),
//!     Err(e) => e.log("polling coils"),
//!     Ok(bits) => println!("{bits:?}"),
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod client;
pub mod codec;
pub mod error;
pub mod framing;
pub mod types;

// =============================================================================
// Re-exports - Error Module
// =============================================================================

pub use error::{
    // Main error type
    ModbusError,
    ModbusResult,
    // Error categories
    ConfigurationError,
    ConnectionError,
    OperationError,
    ProtocolError,
    TimeoutError,
    // Error metadata
    ErrorSeverity,
};

// =============================================================================
// Re-exports - Types Module
// =============================================================================

pub use types::{
    ConnectionKey, DataBits, MemoryConfig, Parity, PortSpec, RtuConfig, StopBits, TcpConfig,
    TransportConfig, TransportKind, TransportSpec, MAX_UNIT_ID,
};

// =============================================================================
// Re-exports - Client Module
// =============================================================================

pub use client::{
    ChannelFactory, MemoryTransport, ModbusTransport, PoolStats, PooledTransport, RawTransport,
    RegisterData, RequestHandler, RetryPolicy, RtuTransport, TcpTransport, TransportManager,
    TransportState,
};

pub use codec::{ExceptionCode, FunctionCode};

// =============================================================================
// Crate Info
// =============================================================================

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
