// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration documents: transport entries and emulator setups.

use std::sync::Arc;
use std::time::Duration;

use ferrobus_emulator::{EmulatorBinding, EmulatorConfig};
use ferrobus_modbus::{
    ConfigurationError, ModbusError, ModbusTransport, Parity, PortSpec, TransportConfig, TransportKind,
    TransportManager, TransportSpec,
};
use ferrobus_tests::prelude::*;

// =============================================================================
// Transport entries
// =============================================================================

#[test]
fn test_rtu_entry_parses() {
    init_test_logging();
    let config: TransportConfig = serde_json::from_str(JsonFixtures::rtu_transport()).unwrap();

    let rtu = config.as_rtu().expect("rtu entry");
    assert_eq!(rtu.port, "/dev/ttyUSB0");
    assert_eq!(rtu.baud_rate, 19200);
    assert_eq!(rtu.parity, Parity::Even);
    assert_eq!(rtu.slave_id, 5);
    assert_eq!(rtu.timeout, Duration::from_millis(250));
    assert_eq!(config.kind(), TransportKind::Rtu);
}

#[test]
fn test_tcp_entry_defaults_port() {
    let config: TransportConfig = serde_json::from_str(JsonFixtures::tcp_transport()).unwrap();

    let tcp = config.as_tcp().expect("tcp entry");
    assert_eq!(tcp.host, "192.168.1.100");
    assert_eq!(tcp.port, 502);
    assert_eq!(config.slave_id(), 2);
}

#[test]
fn test_unroutable_entries_rejected() {
    assert!(serde_json::from_str::<TransportConfig>(JsonFixtures::ambiguous_transport()).is_err());
    assert!(serde_json::from_str::<TransportConfig>(JsonFixtures::empty_transport()).is_err());

    let spec: TransportSpec = serde_json::from_str(JsonFixtures::ambiguous_transport()).unwrap();
    assert!(matches!(
        TransportConfig::try_from(spec),
        Err(ConfigurationError::Ambiguous { .. })
    ));
    let spec: TransportSpec = serde_json::from_str(JsonFixtures::empty_transport()).unwrap();
    assert!(matches!(
        TransportConfig::try_from(spec),
        Err(ConfigurationError::UnknownTransport { .. })
    ));
}

#[test]
fn test_rtu_entry_missing_line_settings() {
    let spec = TransportSpec {
        port: Some(PortSpec::Path("/dev/ttyUSB0".into())),
        slave_id: Some(1),
        ..Default::default()
    };

    let err = TransportConfig::try_from(spec).unwrap_err();
    assert!(err.to_string().contains("baud_rate"), "{err}");
}

#[tokio::test]
async fn test_manager_routes_specs() {
    let factory = Arc::new(CountingChannelFactory::default());
    let manager = TransportManager::new(factory.clone());

    let rtu: TransportSpec = serde_json::from_str(JsonFixtures::rtu_transport()).unwrap();
    let tcp: TransportSpec = serde_json::from_str(JsonFixtures::tcp_transport()).unwrap();
    let handle = manager.get_transport_from_spec(rtu).unwrap();
    manager.get_transport_from_spec(tcp).unwrap();

    assert_eq!(handle.unit_id(), 5);
    assert_eq!(manager.get_stats().rtu, 1);
    assert_eq!(manager.get_stats().tcp, 1);

    let bad: TransportSpec = serde_json::from_str(JsonFixtures::empty_transport()).unwrap();
    let err = manager.get_transport_from_spec(bad).unwrap_err();
    assert!(matches!(err, ModbusError::Configuration(_)));
    assert_eq!(factory.calls(), 2);
}

// =============================================================================
// Emulator documents
// =============================================================================

#[test]
fn test_emulator_bindings_parse() {
    let tcp: EmulatorConfig =
        serde_json::from_str(r#"{ "binding": { "type": "tcp", "port": 1502 } }"#).unwrap();
    assert_eq!(tcp.binding, EmulatorBinding::tcp("127.0.0.1", 1502));
    assert!(tcp.devices.is_empty());

    let rtu: EmulatorConfig = serde_json::from_str(
        r#"{ "binding": { "type": "rtu", "path": "/dev/ttyS1", "baud_rate": 9600 } }"#,
    )
    .unwrap();
    assert_eq!(rtu.binding, EmulatorBinding::rtu("/dev/ttyS1", 9600));

    let empty: EmulatorConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(empty.binding, EmulatorBinding::Memory);
}

#[test]
fn test_emulator_document_devices() {
    let config: EmulatorConfig = serde_json::from_str(JsonFixtures::emulator()).unwrap();

    assert_eq!(config.devices.len(), 2);
    assert_eq!(config.devices[0].unit_id, 1);
    assert!(config.devices[0].timing.is_none());
    let timing = config.devices[1].timing.as_ref().expect("timing");
    assert_eq!(timing.per_register_delay_ms, 1.0);
}
