// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Emulated devices and the unit ID registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::error::{EmulatorError, EmulatorResult};
use crate::store::{RegisterSeed, RegisterStore};
use crate::timing::{TimingConfig, TimingSimulator};

/// Lowest assignable unit ID.
pub const MIN_UNIT_ID: u8 = 1;

/// Highest assignable unit ID.
pub const MAX_UNIT_ID: u8 = 247;

// =============================================================================
// DeviceConfig
// =============================================================================

/// Configuration of one emulated device.
///
/// ```json
/// {
///   "unit_id": 1,
///   "registers": { "holding_registers": { "0": 230 } },
///   "timing": { "processing_delay": [5, 15] }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Modbus unit ID (1-247).
    pub unit_id: u8,

    /// Initial register contents.
    #[serde(default)]
    pub registers: RegisterSeed,

    /// Response latency; none means the device answers immediately.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<TimingConfig>,
}

impl DeviceConfig {
    /// Creates a config with empty registers and no timing.
    pub fn new(unit_id: u8) -> Self {
        Self {
            unit_id,
            registers: RegisterSeed::default(),
            timing: None,
        }
    }

    /// Sets the initial register contents.
    pub fn with_registers(mut self, registers: RegisterSeed) -> Self {
        self.registers = registers;
        self
    }

    /// Sets the response latency.
    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = Some(timing);
        self
    }
}

// =============================================================================
// EmulatedDevice
// =============================================================================

/// One device behind the emulator: a unit ID, its registers and its latency.
#[derive(Debug)]
pub struct EmulatedDevice {
    unit_id: u8,
    store: Mutex<RegisterStore>,
    timing: Option<TimingSimulator>,
}

impl EmulatedDevice {
    /// Builds a device, validating the unit ID and the register seed.
    pub fn new(config: DeviceConfig) -> EmulatorResult<Self> {
        if !(MIN_UNIT_ID..=MAX_UNIT_ID).contains(&config.unit_id) {
            return Err(EmulatorError::invalid_unit_id(config.unit_id));
        }
        let store = RegisterStore::from_seed(&config.registers)?;
        Ok(Self {
            unit_id: config.unit_id,
            store: Mutex::new(store),
            timing: config.timing.map(TimingSimulator::new),
        })
    }

    /// Returns the unit ID.
    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    /// Returns the timing simulator, if any.
    pub fn timing(&self) -> Option<&TimingSimulator> {
        self.timing.as_ref()
    }

    /// Runs `f` with exclusive access to the store.
    ///
    /// The lock is synchronous; `f` must not block.
    pub fn with_store<R>(&self, f: impl FnOnce(&mut RegisterStore) -> R) -> R {
        f(&mut self.store.lock())
    }

    /// Sets a holding register.
    pub fn set_holding_register(&self, address: i64, value: i64) -> EmulatorResult<()> {
        self.with_store(|s| s.set_holding_register(address, value))
    }

    /// Returns a holding register.
    pub fn get_holding_register(&self, address: u16) -> u16 {
        self.with_store(|s| s.get_holding_register(address))
    }

    /// Sets an input register.
    pub fn set_input_register(&self, address: i64, value: i64) -> EmulatorResult<()> {
        self.with_store(|s| s.set_input_register(address, value))
    }

    /// Returns an input register.
    pub fn get_input_register(&self, address: u16) -> u16 {
        self.with_store(|s| s.get_input_register(address))
    }

    /// Sets a coil.
    pub fn set_coil(&self, address: i64, value: bool) -> EmulatorResult<()> {
        self.with_store(|s| s.set_coil(address, value))
    }

    /// Returns a coil.
    pub fn get_coil(&self, address: u16) -> bool {
        self.with_store(|s| s.get_coil(address))
    }

    /// Sets a discrete input.
    pub fn set_discrete_input(&self, address: i64, value: bool) -> EmulatorResult<()> {
        self.with_store(|s| s.set_discrete_input(address, value))
    }

    /// Returns a discrete input.
    pub fn get_discrete_input(&self, address: u16) -> bool {
        self.with_store(|s| s.get_discrete_input(address))
    }
}

// =============================================================================
// DeviceRegistry
// =============================================================================

/// Devices keyed by unit ID.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<u8, Arc<EmulatedDevice>>>,
}

impl DeviceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a device. Fails if the unit ID is taken.
    pub fn insert(&self, device: Arc<EmulatedDevice>) -> EmulatorResult<()> {
        let mut devices = self.devices.write();
        let unit_id = device.unit_id();
        if devices.contains_key(&unit_id) {
            return Err(EmulatorError::duplicate_device(unit_id));
        }
        devices.insert(unit_id, device);
        Ok(())
    }

    /// Removes and returns a device.
    pub fn remove(&self, unit_id: u8) -> Option<Arc<EmulatedDevice>> {
        self.devices.write().remove(&unit_id)
    }

    /// Looks up a device.
    pub fn get(&self, unit_id: u8) -> Option<Arc<EmulatedDevice>> {
        self.devices.read().get(&unit_id).cloned()
    }

    /// Registered unit IDs in ascending order.
    pub fn ids(&self) -> Vec<u8> {
        let mut ids: Vec<u8> = self.devices.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of registered devices.
    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    /// Returns `true` if no device is registered.
    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_id_range() {
        assert!(matches!(
            EmulatedDevice::new(DeviceConfig::new(0)),
            Err(EmulatorError::InvalidUnitId { unit_id: 0 })
        ));
        assert!(EmulatedDevice::new(DeviceConfig::new(248)).is_err());
        assert!(EmulatedDevice::new(DeviceConfig::new(1)).is_ok());
        assert!(EmulatedDevice::new(DeviceConfig::new(247)).is_ok());
    }

    #[test]
    fn test_seeded_device() {
        let config = DeviceConfig::new(5)
            .with_registers(RegisterSeed::new().holding_register(0, 230).coil(2, true));
        let device = EmulatedDevice::new(config).unwrap();

        assert_eq!(device.get_holding_register(0), 230);
        assert!(device.get_coil(2));
        assert!(device.timing().is_none());

        device.set_input_register(4, 9).unwrap();
        assert_eq!(device.get_input_register(4), 9);
        assert!(device.set_discrete_input(70000, true).is_err());
    }

    #[test]
    fn test_invalid_seed_rejected() {
        let config =
            DeviceConfig::new(1).with_registers(RegisterSeed::new().holding_register(-1, 0));
        assert!(matches!(
            EmulatedDevice::new(config),
            Err(EmulatorError::Validation(_))
        ));
    }

    #[test]
    fn test_registry() {
        let registry = DeviceRegistry::new();
        assert!(registry.is_empty());

        for id in [7, 2, 40] {
            let device = EmulatedDevice::new(DeviceConfig::new(id)).unwrap();
            registry.insert(Arc::new(device)).unwrap();
        }
        assert_eq!(registry.ids(), vec![2, 7, 40]);

        let dup = Arc::new(EmulatedDevice::new(DeviceConfig::new(7)).unwrap());
        assert!(matches!(
            registry.insert(dup),
            Err(EmulatorError::DuplicateDevice { unit_id: 7 })
        ));

        assert!(registry.remove(7).is_some());
        assert!(registry.get(7).is_none());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_config_from_json() {
        let config: DeviceConfig = serde_json::from_str(
            r#"{
                "unit_id": 3,
                "registers": { "input_registers": { "10": 77 } },
                "timing": { "processing_delay": [5, 15] }
            }"#,
        )
        .unwrap();

        assert_eq!(config.unit_id, 3);
        let device = EmulatedDevice::new(config).unwrap();
        assert_eq!(device.get_input_register(10), 77);
        assert!(device.timing().is_some());
    }
}
