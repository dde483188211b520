// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Modbus client transports.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     TransportManager                            │
//! │        (one pooled channel per serial line / TCP endpoint)      │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │ PooledTransport
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │            MutexTransport<SlaveIdTransport>                     │
//! │        (FIFO lock per channel, unit ID per handle)              │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  ChannelTransport<L: Link>                      │
//! │          (request building, retry, response parsing)            │
//! └─────────────────────────────────────────────────────────────────┘
//!            │                     │                     │
//!            ▼                     ▼                     ▼
//! ┌───────────────────┐ ┌───────────────────┐ ┌───────────────────┐
//! │      TcpLink      │ │      RtuLink      │ │    MemoryLink     │
//! │       (MBAP)      │ │  (CRC, silences)  │ │ (RequestHandler)  │
//! └───────────────────┘ └───────────────────┘ └───────────────────┘
//! ```

pub mod channel;
pub mod manager;
pub mod memory;
pub mod mutex;
pub mod retry;
pub mod rtu;
pub mod tcp;
pub mod transport;

pub use channel::{ChannelTransport, Link};
pub use manager::{
    ChannelFactory, DefaultChannelFactory, MutexTransport, PoolStats, PooledTransport,
    SlaveIdTransport, TransportManager,
};
pub use memory::{MemoryLink, MemoryTransport};
pub use mutex::{FifoMutex, MutexGuard};
pub use retry::{RetryObserver, RetryPolicy};
pub use rtu::{open_serial, RtuLink, RtuTransport, SerialIo};
pub use tcp::{TcpLink, TcpTransport};
pub use transport::{ModbusTransport, RawTransport, RegisterData, RequestHandler, TransportState};
