// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Sparse per-device register storage.
//!
//! Four independent address spaces, each a map from address to value.
//! Unset addresses read as `0` / `false`; nothing is preallocated. Setters
//! take wide integers so out-of-range input is rejected with a
//! [`ValidationError`] instead of being truncated.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{AddressSpace, EmulatorResult, ValidationError, ValidationField};

/// Highest register address.
pub const MAX_ADDRESS: i64 = 65535;

/// Highest register value.
pub const MAX_REGISTER_VALUE: i64 = 65535;

// =============================================================================
// RegisterSeed
// =============================================================================

/// Initial register contents, keyed by address.
///
/// ```json
/// { "holding_registers": { "0": 230, "1": 500 }, "coils": { "3": true } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterSeed {
    /// Holding register values.
    pub holding_registers: BTreeMap<i64, i64>,
    /// Input register values.
    pub input_registers: BTreeMap<i64, i64>,
    /// Coil states.
    pub coils: BTreeMap<i64, bool>,
    /// Discrete input states.
    pub discrete_inputs: BTreeMap<i64, bool>,
}

impl RegisterSeed {
    /// Creates an empty seed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a holding register value.
    pub fn holding_register(mut self, address: i64, value: i64) -> Self {
        self.holding_registers.insert(address, value);
        self
    }

    /// Adds an input register value.
    pub fn input_register(mut self, address: i64, value: i64) -> Self {
        self.input_registers.insert(address, value);
        self
    }

    /// Adds a coil state.
    pub fn coil(mut self, address: i64, value: bool) -> Self {
        self.coils.insert(address, value);
        self
    }

    /// Adds a discrete input state.
    pub fn discrete_input(mut self, address: i64, value: bool) -> Self {
        self.discrete_inputs.insert(address, value);
        self
    }
}

// =============================================================================
// RegisterStore
// =============================================================================

/// Population of each address space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    /// Set holding registers.
    pub holding_registers: usize,
    /// Set input registers.
    pub input_registers: usize,
    /// Set coils.
    pub coils: usize,
    /// Set discrete inputs.
    pub discrete_inputs: usize,
}

/// Register storage of one emulated device.
#[derive(Debug, Clone, Default)]
pub struct RegisterStore {
    holding_registers: HashMap<u16, u16>,
    input_registers: HashMap<u16, u16>,
    coils: HashMap<u16, bool>,
    discrete_inputs: HashMap<u16, bool>,
}

fn check_address(space: AddressSpace, address: i64) -> Result<u16, ValidationError> {
    ValidationError::check(space, ValidationField::Address, address, 0, MAX_ADDRESS)?;
    Ok(address as u16)
}

fn check_value(space: AddressSpace, value: i64) -> Result<u16, ValidationError> {
    ValidationError::check(space, ValidationField::Value, value, 0, MAX_REGISTER_VALUE)?;
    Ok(value as u16)
}

impl RegisterStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store populated from `seed`, validating every entry.
    pub fn from_seed(seed: &RegisterSeed) -> EmulatorResult<Self> {
        let mut store = Self::new();
        for (&address, &value) in &seed.holding_registers {
            store.set_holding_register(address, value)?;
        }
        for (&address, &value) in &seed.input_registers {
            store.set_input_register(address, value)?;
        }
        for (&address, &value) in &seed.coils {
            store.set_coil(address, value)?;
        }
        for (&address, &value) in &seed.discrete_inputs {
            store.set_discrete_input(address, value)?;
        }
        Ok(store)
    }

    // =========================================================================
    // Single values
    // =========================================================================

    /// Returns a holding register, `0` if unset.
    pub fn get_holding_register(&self, address: u16) -> u16 {
        self.holding_registers.get(&address).copied().unwrap_or(0)
    }

    /// Sets a holding register.
    pub fn set_holding_register(&mut self, address: i64, value: i64) -> EmulatorResult<()> {
        let space = AddressSpace::HoldingRegisters;
        let address = check_address(space, address)?;
        let value = check_value(space, value)?;
        self.holding_registers.insert(address, value);
        Ok(())
    }

    /// Returns an input register, `0` if unset.
    pub fn get_input_register(&self, address: u16) -> u16 {
        self.input_registers.get(&address).copied().unwrap_or(0)
    }

    /// Sets an input register.
    pub fn set_input_register(&mut self, address: i64, value: i64) -> EmulatorResult<()> {
        let space = AddressSpace::InputRegisters;
        let address = check_address(space, address)?;
        let value = check_value(space, value)?;
        self.input_registers.insert(address, value);
        Ok(())
    }

    /// Returns a coil, `false` if unset.
    pub fn get_coil(&self, address: u16) -> bool {
        self.coils.get(&address).copied().unwrap_or(false)
    }

    /// Sets a coil.
    pub fn set_coil(&mut self, address: i64, value: bool) -> EmulatorResult<()> {
        let address = check_address(AddressSpace::Coils, address)?;
        self.coils.insert(address, value);
        Ok(())
    }

    /// Returns a discrete input, `false` if unset.
    pub fn get_discrete_input(&self, address: u16) -> bool {
        self.discrete_inputs.get(&address).copied().unwrap_or(false)
    }

    /// Sets a discrete input.
    pub fn set_discrete_input(&mut self, address: i64, value: bool) -> EmulatorResult<()> {
        let address = check_address(AddressSpace::DiscreteInputs, address)?;
        self.discrete_inputs.insert(address, value);
        Ok(())
    }

    // =========================================================================
    // Ranges
    // =========================================================================

    /// Reads `count` holding registers. Addresses past 65535 read as `0`.
    pub fn holding_registers(&self, address: u16, count: u16) -> Vec<u16> {
        range(address, count)
            .map(|a| a.map_or(0, |a| self.get_holding_register(a)))
            .collect()
    }

    /// Reads `count` input registers.
    pub fn input_registers(&self, address: u16, count: u16) -> Vec<u16> {
        range(address, count)
            .map(|a| a.map_or(0, |a| self.get_input_register(a)))
            .collect()
    }

    /// Reads `count` coils.
    pub fn coils(&self, address: u16, count: u16) -> Vec<bool> {
        range(address, count)
            .map(|a| a.is_some_and(|a| self.get_coil(a)))
            .collect()
    }

    /// Reads `count` discrete inputs.
    pub fn discrete_inputs(&self, address: u16, count: u16) -> Vec<bool> {
        range(address, count)
            .map(|a| a.is_some_and(|a| self.get_discrete_input(a)))
            .collect()
    }

    /// Writes consecutive holding registers. Nothing is written if any
    /// address is out of range.
    pub fn write_holding_registers(&mut self, address: u16, values: &[u16]) -> EmulatorResult<()> {
        if values.is_empty() {
            return Ok(());
        }
        check_address(AddressSpace::HoldingRegisters, i64::from(address) + values.len() as i64 - 1)?;
        for (offset, &value) in values.iter().enumerate() {
            self.holding_registers.insert(address + offset as u16, value);
        }
        Ok(())
    }

    /// Writes consecutive coils. Nothing is written if any address is out of range.
    pub fn write_coils(&mut self, address: u16, values: &[bool]) -> EmulatorResult<()> {
        if values.is_empty() {
            return Ok(());
        }
        check_address(AddressSpace::Coils, i64::from(address) + values.len() as i64 - 1)?;
        for (offset, &value) in values.iter().enumerate() {
            self.coils.insert(address + offset as u16, value);
        }
        Ok(())
    }

    /// Returns how many addresses are set in each space.
    pub fn counts(&self) -> StoreCounts {
        StoreCounts {
            holding_registers: self.holding_registers.len(),
            input_registers: self.input_registers.len(),
            coils: self.coils.len(),
            discrete_inputs: self.discrete_inputs.len(),
        }
    }
}

/// Yields `count` addresses from `address`; `None` past the end of the space.
fn range(address: u16, count: u16) -> impl Iterator<Item = Option<u16>> {
    (0..count).map(move |offset| address.checked_add(offset))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Bound, EmulatorError};

    fn validation(err: EmulatorError) -> ValidationError {
        match err {
            EmulatorError::Validation(v) => v,
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_unset_reads_default() {
        let store = RegisterStore::new();
        assert_eq!(store.get_holding_register(100), 0);
        assert!(!store.get_coil(65535));
        assert_eq!(store.holding_registers(0, 3), vec![0, 0, 0]);
        assert_eq!(store.counts(), StoreCounts::default());
    }

    #[test]
    fn test_register_bounds() {
        let mut store = RegisterStore::new();

        store.set_holding_register(0, 0).unwrap();
        store.set_holding_register(65535, 65535).unwrap();
        assert_eq!(store.get_holding_register(65535), 65535);

        let err = validation(store.set_holding_register(-1, 5).unwrap_err());
        assert_eq!((err.field, err.bound), (ValidationField::Address, Bound::Lower));

        let err = validation(store.set_holding_register(65536, 5).unwrap_err());
        assert_eq!((err.field, err.bound), (ValidationField::Address, Bound::Upper));

        let err = validation(store.set_input_register(1, -1).unwrap_err());
        assert_eq!((err.field, err.bound), (ValidationField::Value, Bound::Lower));
        assert_eq!(err.space, AddressSpace::InputRegisters);

        let err = validation(store.set_input_register(1, 65536).unwrap_err());
        assert_eq!((err.field, err.bound), (ValidationField::Value, Bound::Upper));

        assert_eq!(store.counts().holding_registers, 2);
        assert_eq!(store.counts().input_registers, 0);
    }

    #[test]
    fn test_bit_bounds() {
        let mut store = RegisterStore::new();
        store.set_coil(7, true).unwrap();
        store.set_discrete_input(7, true).unwrap();
        assert!(store.set_coil(65536, true).is_err());
        assert!(store.set_discrete_input(-1, true).is_err());
        assert_eq!(store.coils(6, 3), vec![false, true, false]);
    }

    #[test]
    fn test_spaces_are_independent() {
        let mut store = RegisterStore::new();
        store.set_holding_register(5, 11).unwrap();
        store.set_input_register(5, 22).unwrap();
        store.set_coil(5, true).unwrap();

        assert_eq!(store.get_holding_register(5), 11);
        assert_eq!(store.get_input_register(5), 22);
        assert!(store.get_coil(5));
        assert!(!store.get_discrete_input(5));
    }

    #[test]
    fn test_bulk_writes() {
        let mut store = RegisterStore::new();
        store.write_holding_registers(0, &[500, 100, 200]).unwrap();
        assert_eq!(store.holding_registers(0, 3), vec![500, 100, 200]);

        assert!(store.write_holding_registers(65535, &[1, 2]).is_err());
        assert_eq!(store.get_holding_register(65535), 0);

        store.write_coils(65534, &[true, true]).unwrap();
        assert_eq!(store.coils(65534, 2), vec![true, true]);
    }

    #[test]
    fn test_seed_from_json() {
        let seed: RegisterSeed = serde_json::from_str(
            r#"{ "holding_registers": { "0": 230, "1": 500 }, "coils": { "3": true } }"#,
        )
        .unwrap();
        let store = RegisterStore::from_seed(&seed).unwrap();

        assert_eq!(store.holding_registers(0, 2), vec![230, 500]);
        assert!(store.get_coil(3));

        let bad = RegisterSeed::new().input_register(0, 70000);
        assert!(RegisterStore::from_seed(&bad).is_err());
    }
}
