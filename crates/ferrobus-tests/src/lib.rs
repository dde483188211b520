// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Ferrobus Integration Tests
//!
//! Cross-crate tests that drive the client transports against the device
//! emulator over every binding.
//!
//! ## Module Structure
//!
//! - [`common`]: shared helpers
//!   - `fixtures`: emulators, clients and configuration documents
//!   - `mocks`: counting channel factory, scripted channels, flaky handlers
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p ferrobus-tests
//! cargo test -p ferrobus-tests --test integration_manager
//! RUST_LOG=ferrobus=trace cargo test -p ferrobus-tests -- --nocapture
//! ```
//!
//! ## Test Suites
//!
//! - `integration_emulator.rs`: dispatch semantics through the memory transport
//! - `integration_transport.rs`: TCP and RTU end to end
//! - `integration_manager.rs`: pooling, unit binding and lock ordering
//! - `integration_retry.rs`: retry policy behaviour
//! - `integration_config.rs`: configuration routing from JSON

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod common;

/// Re-export commonly used items for convenience.
pub mod prelude {
    pub use crate::common::fixtures::*;
    pub use crate::common::init_test_logging;
    pub use crate::common::mocks::*;
}
