// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Fixtures
//!
//! Pre-built emulators, client configurations and JSON documents.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ferrobus_emulator::{DeviceConfig, EmulatorBinding, ModbusEmulator, RegisterSeed};
use ferrobus_modbus::{MemoryConfig, MemoryTransport, RtuConfig, TcpConfig};

/// Retry delay used by fixture clients.
pub const FAST_RETRY: Duration = Duration::from_millis(5);

/// Response timeout used by fixture clients.
pub const FAST_TIMEOUT: Duration = Duration::from_millis(500);

// =============================================================================
// Device Fixtures
// =============================================================================

/// Fixture providing device configurations.
pub struct DeviceFixtures;

impl DeviceFixtures {
    /// A power meter on unit 1: voltage 230 at holding 0, two alarm coils.
    pub fn power_meter() -> DeviceConfig {
        DeviceConfig::new(1).with_registers(
            RegisterSeed::new()
                .holding_register(0, 230)
                .holding_register(1, 50)
                .input_register(0, 1234)
                .coil(0, true)
                .coil(3, true)
                .discrete_input(2, true),
        )
    }

    /// An empty device on `unit_id`.
    pub fn blank(unit_id: u8) -> DeviceConfig {
        DeviceConfig::new(unit_id)
    }

    /// A device on `unit_id` whose holding register 0 holds `marker`.
    pub fn marked(unit_id: u8, marker: i64) -> DeviceConfig {
        DeviceConfig::new(unit_id).with_registers(RegisterSeed::new().holding_register(0, marker))
    }
}

// =============================================================================
// Emulator Fixtures
// =============================================================================

/// Fixture providing emulators.
pub struct EmulatorFixtures;

impl EmulatorFixtures {
    /// In-memory emulator hosting [`DeviceFixtures::power_meter`].
    pub fn memory() -> Arc<ModbusEmulator> {
        let emulator = ModbusEmulator::new(EmulatorBinding::Memory);
        emulator
            .add_device(DeviceFixtures::power_meter())
            .expect("power meter fixture is valid");
        Arc::new(emulator)
    }

    /// Started TCP emulator on an ephemeral loopback port hosting `devices`.
    pub async fn tcp(devices: Vec<DeviceConfig>) -> (Arc<ModbusEmulator>, SocketAddr) {
        let emulator = ModbusEmulator::new(EmulatorBinding::tcp("127.0.0.1", 0));
        for device in devices {
            emulator.add_device(device).expect("device fixture is valid");
        }
        emulator.start().await.expect("loopback bind succeeds");
        let addr = emulator.local_addr().expect("TCP binding has an address");
        (Arc::new(emulator), addr)
    }
}

// =============================================================================
// Client Fixtures
// =============================================================================

/// Fixture providing client configurations.
pub struct ClientFixtures;

impl ClientFixtures {
    /// Memory transport to `emulator` for `unit_id` with fast retries.
    pub fn memory(emulator: Arc<ModbusEmulator>, unit_id: u8) -> MemoryTransport {
        MemoryTransport::new(
            emulator,
            MemoryConfig::new(unit_id)
                .with_timeout(FAST_TIMEOUT)
                .with_retry_delay(FAST_RETRY),
        )
    }

    /// TCP configuration for a loopback emulator.
    pub fn tcp(addr: SocketAddr, unit_id: u8) -> TcpConfig {
        let mut config = TcpConfig::new(addr.ip().to_string(), unit_id);
        config.port = addr.port();
        config.timeout = FAST_TIMEOUT;
        config.retry_delay = FAST_RETRY;
        config
    }

    /// RTU configuration for an in-process stream.
    pub fn rtu(unit_id: u8) -> RtuConfig {
        let mut config = RtuConfig::new("/dev/ferrobus-pipe", 115_200, unit_id);
        config.timeout = FAST_TIMEOUT;
        config.retry_delay = FAST_RETRY;
        config
    }
}

// =============================================================================
// JSON Fixtures
// =============================================================================

/// Fixture providing configuration documents.
pub struct JsonFixtures;

impl JsonFixtures {
    /// A complete RTU transport entry.
    pub fn rtu_transport() -> &'static str {
        r#"{
            "port": "/dev/ttyUSB0",
            "baud_rate": 19200,
            "data_bits": 8,
            "parity": "even",
            "stop_bits": 1,
            "slave_id": 5,
            "timeout": "250ms"
        }"#
    }

    /// A TCP transport entry without a port.
    pub fn tcp_transport() -> &'static str {
        r#"{ "host": "192.168.1.100", "slave_id": 2 }"#
    }

    /// A transport entry with both host and serial path.
    pub fn ambiguous_transport() -> &'static str {
        r#"{ "host": "192.168.1.100", "port": "/dev/ttyUSB0", "slave_id": 1 }"#
    }

    /// A transport entry with neither host nor port.
    pub fn empty_transport() -> &'static str {
        r#"{ "slave_id": 1 }"#
    }

    /// An emulator with two devices on a memory binding.
    pub fn emulator() -> &'static str {
        r#"{
            "binding": { "type": "memory" },
            "devices": [
                { "unit_id": 1, "registers": { "holding_registers": { "0": 230, "1": 50 } } },
                {
                    "unit_id": 2,
                    "registers": { "coils": { "0": true } },
                    "timing": { "processing_delay": 20, "per_register_delay_ms": 1 }
                }
            ]
        }"#
    }
}
