// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Request dispatch.
//!
//! ```text
//! frame ──► length check ──► device lookup ──► handler table ──► timing ──► response
//!              │                  │                 │
//!              ▼                  ▼                 ▼
//!        0x03 exception     0x0B exception    0x01 / 0x02 / 0x03 exception
//! ```
//!
//! The dispatcher never fails: every problem becomes an exception frame.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, warn};

use ferrobus_modbus::codec::{exception_frame, request, response, ExceptionCode, FunctionCode};

use crate::device::{DeviceRegistry, EmulatedDevice};
use crate::store::RegisterStore;
use crate::timing::{Sleeper, TokioSleeper};

/// Handler signature: `(store, unit_id, request) -> response`.
pub type Handler = fn(&mut RegisterStore, u8, &[u8]) -> Result<Vec<u8>, ExceptionCode>;

// =============================================================================
// Handler table
// =============================================================================

const HANDLERS: [(FunctionCode, Handler); 8] = [
    (FunctionCode::ReadCoils, read_coils),
    (FunctionCode::ReadDiscreteInputs, read_discrete_inputs),
    (FunctionCode::ReadHoldingRegisters, read_holding_registers),
    (FunctionCode::ReadInputRegisters, read_input_registers),
    (FunctionCode::WriteSingleCoil, write_single_coil),
    (FunctionCode::WriteSingleRegister, write_single_register),
    (FunctionCode::WriteMultipleCoils, write_multiple_coils),
    (FunctionCode::WriteMultipleRegisters, write_multiple_registers),
];

/// Function codes with a handler, in ascending order.
pub fn supported_function_codes() -> Vec<FunctionCode> {
    HANDLERS.iter().map(|(fc, _)| *fc).collect()
}

fn handler_for(function_code: u8) -> Option<Handler> {
    HANDLERS
        .iter()
        .find(|(fc, _)| fc.as_u8() == function_code)
        .map(|(_, handler)| *handler)
}

fn read_coils(store: &mut RegisterStore, unit: u8, frame: &[u8]) -> Result<Vec<u8>, ExceptionCode> {
    let fc = FunctionCode::ReadCoils;
    let req = request::parse_read(frame, fc)?;
    Ok(response::read_bits(unit, fc, &store.coils(req.address, req.quantity)))
}

fn read_discrete_inputs(
    store: &mut RegisterStore,
    unit: u8,
    frame: &[u8],
) -> Result<Vec<u8>, ExceptionCode> {
    let fc = FunctionCode::ReadDiscreteInputs;
    let req = request::parse_read(frame, fc)?;
    Ok(response::read_bits(unit, fc, &store.discrete_inputs(req.address, req.quantity)))
}

fn read_holding_registers(
    store: &mut RegisterStore,
    unit: u8,
    frame: &[u8],
) -> Result<Vec<u8>, ExceptionCode> {
    let fc = FunctionCode::ReadHoldingRegisters;
    let req = request::parse_read(frame, fc)?;
    Ok(response::read_registers(unit, fc, &store.holding_registers(req.address, req.quantity)))
}

fn read_input_registers(
    store: &mut RegisterStore,
    unit: u8,
    frame: &[u8],
) -> Result<Vec<u8>, ExceptionCode> {
    let fc = FunctionCode::ReadInputRegisters;
    let req = request::parse_read(frame, fc)?;
    Ok(response::read_registers(unit, fc, &store.input_registers(req.address, req.quantity)))
}

fn write_single_coil(store: &mut RegisterStore, _unit: u8, frame: &[u8]) -> Result<Vec<u8>, ExceptionCode> {
    let req = request::parse_write_single_coil(frame)?;
    store
        .set_coil(i64::from(req.address), req.value)
        .map_err(|_| ExceptionCode::IllegalDataAddress)?;
    Ok(response::echo(frame))
}

fn write_single_register(
    store: &mut RegisterStore,
    _unit: u8,
    frame: &[u8],
) -> Result<Vec<u8>, ExceptionCode> {
    let req = request::parse_write_single_register(frame)?;
    store
        .set_holding_register(i64::from(req.address), i64::from(req.value))
        .map_err(|_| ExceptionCode::IllegalDataValue)?;
    Ok(response::echo(frame))
}

fn write_multiple_coils(
    store: &mut RegisterStore,
    unit: u8,
    frame: &[u8],
) -> Result<Vec<u8>, ExceptionCode> {
    let fc = FunctionCode::WriteMultipleCoils;
    let req = request::parse_write_multiple_coils(frame)?;
    store
        .write_coils(req.address, &req.values)
        .map_err(|_| ExceptionCode::IllegalDataAddress)?;
    Ok(response::write_multiple(unit, fc, req.address, req.values.len() as u16))
}

fn write_multiple_registers(
    store: &mut RegisterStore,
    unit: u8,
    frame: &[u8],
) -> Result<Vec<u8>, ExceptionCode> {
    let fc = FunctionCode::WriteMultipleRegisters;
    let req = request::parse_write_multiple_registers(frame)?;
    store
        .write_holding_registers(req.address, &req.values)
        .map_err(|_| ExceptionCode::IllegalDataAddress)?;
    Ok(response::write_multiple(unit, fc, req.address, req.values.len() as u16))
}

// =============================================================================
// RequestDispatcher
// =============================================================================

/// Routes request frames to devices.
pub struct RequestDispatcher {
    registry: Arc<DeviceRegistry>,
    sleeper: Arc<dyn Sleeper>,
}

impl RequestDispatcher {
    /// Creates a dispatcher that waits out delays on the tokio timer.
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self::with_sleeper(registry, Arc::new(TokioSleeper))
    }

    /// Creates a dispatcher with a custom sleeper.
    pub fn with_sleeper(registry: Arc<DeviceRegistry>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { registry, sleeper }
    }

    /// Returns the device registry.
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Answers one request frame.
    pub async fn dispatch(&self, frame: &[u8]) -> Vec<u8> {
        let (unit_id, function_code) = match *frame {
            [unit_id, function_code, ..] => (unit_id, function_code),
            _ => {
                debug!(len = frame.len(), "Request frame too short");
                let unit_id = frame.first().copied().unwrap_or(0);
                return exception_frame(unit_id, 0, ExceptionCode::IllegalDataValue);
            }
        };

        let Some(device) = self.registry.get(unit_id) else {
            debug!(unit_id, function_code, "No device for unit ID");
            return exception_frame(unit_id, function_code, ExceptionCode::GatewayTargetFailed);
        };

        let response = match handler_for(function_code) {
            Some(handler) => run_handler(&device, handler, frame),
            None => {
                debug!(unit_id, function_code, "Unsupported function code");
                exception_frame(unit_id, function_code, ExceptionCode::IllegalFunction)
            }
        };

        if let Some(timing) = device.timing() {
            let delay = timing.compute(frame);
            debug!(unit_id, delay_ms = delay.total_ms(), "Simulating response delay");
            self.sleeper.sleep(delay.total()).await;
        }

        response
    }
}

impl std::fmt::Debug for RequestDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDispatcher")
            .field("devices", &self.registry.ids())
            .finish()
    }
}

/// Runs `handler` under the device's store lock. Failures and panics become
/// exception frames.
fn run_handler(device: &EmulatedDevice, handler: Handler, frame: &[u8]) -> Vec<u8> {
    let unit_id = device.unit_id();
    let function_code = frame[1];

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        device.with_store(|store| handler(store, unit_id, frame))
    }));

    match outcome {
        Ok(Ok(response)) => {
            debug!(unit_id, function_code, "Request handled");
            response
        }
        Ok(Err(code)) => {
            debug!(unit_id, function_code, exception = code.as_u8(), "Request rejected");
            exception_frame(unit_id, function_code, code)
        }
        Err(_) => {
            warn!(unit_id, function_code, "Handler panicked");
            exception_frame(unit_id, function_code, ExceptionCode::IllegalDataValue)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceConfig;
    use crate::store::RegisterSeed;
    use crate::timing::{DelaySpec, TimingConfig};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSleeper {
        calls: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.calls.lock().push(duration);
        }
    }

    fn dispatcher_with(configs: Vec<DeviceConfig>) -> (RequestDispatcher, Arc<RecordingSleeper>) {
        let registry = Arc::new(DeviceRegistry::new());
        for config in configs {
            registry
                .insert(Arc::new(EmulatedDevice::new(config).unwrap()))
                .unwrap();
        }
        let sleeper = Arc::new(RecordingSleeper::default());
        (RequestDispatcher::with_sleeper(registry, sleeper.clone()), sleeper)
    }

    fn unit_one() -> RequestDispatcher {
        let seed = RegisterSeed::new().holding_register(0, 230).discrete_input(1, true);
        dispatcher_with(vec![DeviceConfig::new(1).with_registers(seed)]).0
    }

    #[test]
    fn test_supported_function_codes() {
        assert_eq!(supported_function_codes(), FunctionCode::ALL.to_vec());
    }

    #[tokio::test]
    async fn test_read_holding_registers() {
        let d = unit_one();
        let resp = d.dispatch(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x02]).await;
        assert_eq!(resp, vec![0x01, 0x03, 0x04, 0x00, 0xE6, 0x00, 0x00]);
    }

    #[tokio::test]
    async fn test_read_discrete_inputs() {
        let d = unit_one();
        let resp = d.dispatch(&[0x01, 0x02, 0x00, 0x00, 0x00, 0x03]).await;
        assert_eq!(resp, vec![0x01, 0x02, 0x01, 0b0100_0000]);
    }

    #[tokio::test]
    async fn test_write_single_register_echo() {
        let d = unit_one();
        let req = [0x01, 0x06, 0x00, 0x05, 0x01, 0x2C];
        assert_eq!(d.dispatch(&req).await, req.to_vec());
        assert_eq!(d.dispatch(&req).await, req.to_vec());

        let device = d.registry().get(1).unwrap();
        assert_eq!(device.get_holding_register(5), 300);
    }

    #[tokio::test]
    async fn test_write_multiple_registers() {
        let d = unit_one();
        let req = [0x01, 0x10, 0x00, 0x00, 0x00, 0x03, 0x06, 0x01, 0xF4, 0x00, 0x64, 0x00, 0xC8];
        assert_eq!(
            d.dispatch(&req).await,
            vec![0x01, 0x10, 0x00, 0x00, 0x00, 0x03]
        );
        let device = d.registry().get(1).unwrap();
        assert_eq!(device.with_store(|s| s.holding_registers(0, 3)), vec![500, 100, 200]);
    }

    #[tokio::test]
    async fn test_write_coils() {
        let d = unit_one();
        let req = [0x01, 0x05, 0x00, 0x09, 0xFF, 0x00];
        assert_eq!(d.dispatch(&req).await, req.to_vec());

        let req = [0x01, 0x0F, 0x00, 0x00, 0x00, 0x0A, 0x02, 0b1010_0000, 0b0100_0000];
        assert_eq!(
            d.dispatch(&req).await,
            vec![0x01, 0x0F, 0x00, 0x00, 0x00, 0x0A]
        );

        let device = d.registry().get(1).unwrap();
        assert!(device.get_coil(0));
        assert!(!device.get_coil(1));
        assert!(device.get_coil(2));
        assert!(device.get_coil(9));
    }

    #[tokio::test]
    async fn test_exceptions() {
        let d = unit_one();

        assert_eq!(d.dispatch(&[0x01, 0x03, 0x00]).await, vec![0x01, 0x83, 0x03]);
        assert_eq!(d.dispatch(&[0x01, 0x99, 0x00, 0x00]).await, vec![0x01, 0x99, 0x01]);
        assert_eq!(
            d.dispatch(&[0x09, 0x03, 0x00, 0x00, 0x00, 0x01]).await,
            vec![0x09, 0x83, 0x0B]
        );
        assert_eq!(
            d.dispatch(&[0x01, 0x03, 0xFF, 0xFF, 0x00, 0x02]).await,
            vec![0x01, 0x83, 0x02]
        );
        assert_eq!(
            d.dispatch(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x7E]).await,
            vec![0x01, 0x83, 0x03]
        );
        assert_eq!(
            d.dispatch(&[0x01, 0x05, 0x00, 0x00, 0x12, 0x34]).await,
            vec![0x01, 0x85, 0x03]
        );
    }

    #[tokio::test]
    async fn test_short_frames() {
        let d = unit_one();
        assert_eq!(d.dispatch(&[]).await, vec![0x00, 0x80, 0x03]);
        assert_eq!(d.dispatch(&[0x07]).await, vec![0x07, 0x80, 0x03]);
    }

    #[test]
    fn test_panicking_handler_becomes_exception() {
        fn boom(_: &mut RegisterStore, _: u8, _: &[u8]) -> Result<Vec<u8>, ExceptionCode> {
            panic!("handler failure");
        }

        let device = EmulatedDevice::new(DeviceConfig::new(4)).unwrap();
        let resp = run_handler(&device, boom, &[0x04, 0x03, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(resp, vec![0x04, 0x83, 0x03]);

        device.set_holding_register(0, 1).unwrap();
        assert_eq!(device.get_holding_register(0), 1);
    }

    #[tokio::test]
    async fn test_timing_applied() {
        let timing = TimingConfig {
            processing_delay: Some(DelaySpec::Fixed(10.0)),
            per_register_delay_ms: 1.0,
            ..Default::default()
        };
        let (d, sleeper) = dispatcher_with(vec![
            DeviceConfig::new(1).with_timing(timing),
            DeviceConfig::new(2),
        ]);

        d.dispatch(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x05]).await;
        d.dispatch(&[0x02, 0x03, 0x00, 0x00, 0x00, 0x05]).await;
        d.dispatch(&[0x03, 0x03, 0x00, 0x00, 0x00, 0x05]).await;

        assert_eq!(*sleeper.calls.lock(), vec![Duration::from_millis(15)]);
    }
}
