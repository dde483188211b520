// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The emulator facade: devices, a binding and its lifecycle.
//!
//! # Example
//!
//! ```ignore
//! use ferrobus_emulator::{DeviceConfig, EmulatorBinding, ModbusEmulator, RegisterSeed};
//!
//! let emulator = ModbusEmulator::new(EmulatorBinding::tcp("127.0.0.1", 0));
//! emulator.add_device(
//!     DeviceConfig::new(1).with_registers(RegisterSeed::new().holding_register(0, 230)),
//! )?;
//! emulator.start().await?;
//! println!("listening on {:?}", emulator.local_addr());
//! emulator.stop().await;
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use ferrobus_modbus::client::open_serial;
use ferrobus_modbus::{DataBits, Parity, RequestHandler, RtuConfig, StopBits};

use crate::device::{DeviceConfig, DeviceRegistry, EmulatedDevice};
use crate::dispatcher::RequestDispatcher;
use crate::error::{EmulatorError, EmulatorResult};
use crate::server::{serve_rtu, serve_tcp, ShutdownCoordinator};
use crate::timing::Sleeper;

/// Frame silence for streams attached without serial line settings.
pub const DEFAULT_FRAME_SILENCE: Duration = Duration::from_millis(4);

// =============================================================================
// Configuration
// =============================================================================

/// How requests reach the emulator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EmulatorBinding {
    /// Modbus TCP listener. Port `0` picks an ephemeral port.
    Tcp {
        /// Listen address.
        #[serde(default = "default_host")]
        host: String,
        /// Listen port.
        #[serde(default = "default_port")]
        port: u16,
    },

    /// Modbus RTU on a serial device.
    Rtu {
        /// Device path.
        path: String,
        /// Baud rate.
        baud_rate: u32,
        /// Data bits.
        #[serde(default)]
        data_bits: DataBits,
        /// Parity.
        #[serde(default)]
        parity: Parity,
        /// Stop bits.
        #[serde(default)]
        stop_bits: StopBits,
    },

    /// No wire; requests arrive through [`ModbusEmulator::handle_request`].
    #[default]
    Memory,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    502
}

impl EmulatorBinding {
    /// Creates a TCP binding.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Creates an 8N1 RTU binding.
    pub fn rtu(path: impl Into<String>, baud_rate: u32) -> Self {
        Self::Rtu {
            path: path.into(),
            baud_rate,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }

    /// Serial settings of an RTU binding.
    fn serial_config(&self) -> Option<RtuConfig> {
        match self {
            Self::Rtu {
                path,
                baud_rate,
                data_bits,
                parity,
                stop_bits,
            } => Some(line_config(path, *baud_rate, *data_bits, *parity, *stop_bits)),
            _ => None,
        }
    }
}

fn line_config(
    path: &str,
    baud_rate: u32,
    data_bits: DataBits,
    parity: Parity,
    stop_bits: StopBits,
) -> RtuConfig {
    let mut config = RtuConfig::new(path, baud_rate, 1);
    config.data_bits = data_bits;
    config.parity = parity;
    config.stop_bits = stop_bits;
    config
}

/// A binding plus its devices.
///
/// ```json
/// {
///   "binding": { "type": "tcp", "host": "0.0.0.0", "port": 5020 },
///   "devices": [{ "unit_id": 1, "registers": { "holding_registers": { "0": 230 } } }]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmulatorConfig {
    /// Binding; in-memory when omitted.
    #[serde(default)]
    pub binding: EmulatorBinding,

    /// Devices to create.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

// =============================================================================
// ModbusEmulator
// =============================================================================

/// Software Modbus server hosting any number of devices.
pub struct ModbusEmulator {
    binding: EmulatorBinding,
    registry: Arc<DeviceRegistry>,
    dispatcher: Arc<RequestDispatcher>,
    running: AtomicBool,
    /// Held for the whole of `start` and `stop`.
    lifecycle: tokio::sync::Mutex<()>,
    shutdown: Mutex<Option<ShutdownCoordinator>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl ModbusEmulator {
    /// Creates an emulator with no devices.
    pub fn new(binding: EmulatorBinding) -> Self {
        let registry = Arc::new(DeviceRegistry::new());
        let dispatcher = Arc::new(RequestDispatcher::new(registry.clone()));
        Self::assemble(binding, registry, dispatcher)
    }

    /// Creates an emulator whose response delays go through `sleeper`.
    pub fn with_sleeper(binding: EmulatorBinding, sleeper: Arc<dyn Sleeper>) -> Self {
        let registry = Arc::new(DeviceRegistry::new());
        let dispatcher = Arc::new(RequestDispatcher::with_sleeper(registry.clone(), sleeper));
        Self::assemble(binding, registry, dispatcher)
    }

    /// Creates an emulator and all configured devices.
    pub fn from_config(config: EmulatorConfig) -> EmulatorResult<Self> {
        let emulator = Self::new(config.binding);
        for device in config.devices {
            emulator.add_device(device)?;
        }
        Ok(emulator)
    }

    fn assemble(
        binding: EmulatorBinding,
        registry: Arc<DeviceRegistry>,
        dispatcher: Arc<RequestDispatcher>,
    ) -> Self {
        Self {
            binding,
            registry,
            dispatcher,
            running: AtomicBool::new(false),
            lifecycle: tokio::sync::Mutex::new(()),
            shutdown: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
            local_addr: Mutex::new(None),
        }
    }

    /// Returns the binding.
    pub fn binding(&self) -> &EmulatorBinding {
        &self.binding
    }

    // =========================================================================
    // Devices
    // =========================================================================

    /// Adds a device. Works whether or not the emulator is running.
    pub fn add_device(&self, config: DeviceConfig) -> EmulatorResult<Arc<EmulatedDevice>> {
        let device = Arc::new(EmulatedDevice::new(config)?);
        self.registry.insert(device.clone())?;
        info!(unit_id = device.unit_id(), "Added emulated device");
        Ok(device)
    }

    /// Removes a device; later requests for its unit ID get a gateway exception.
    pub fn remove_device(&self, unit_id: u8) -> EmulatorResult<Arc<EmulatedDevice>> {
        let device = self
            .registry
            .remove(unit_id)
            .ok_or_else(|| EmulatorError::device_not_found(unit_id))?;
        info!(unit_id, "Removed emulated device");
        Ok(device)
    }

    /// Looks up a device.
    pub fn get_device(&self, unit_id: u8) -> Option<Arc<EmulatedDevice>> {
        self.registry.get(unit_id)
    }

    /// Unit IDs of all devices, ascending.
    pub fn device_ids(&self) -> Vec<u8> {
        self.registry.ids()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Starts the binding.
    ///
    /// TCP binds its listener and RTU opens its serial device before this
    /// returns; failures leave the emulator stopped.
    pub async fn start(&self) -> EmulatorResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.running.load(Ordering::SeqCst) {
            return Err(EmulatorError::AlreadyRunning);
        }

        let shutdown = ShutdownCoordinator::new();
        let task = self.spawn_binding(&shutdown).await?;

        self.tasks.lock().extend(task);
        *self.shutdown.lock() = Some(shutdown);
        self.running.store(true, Ordering::SeqCst);
        info!(
            binding = ?self.binding,
            devices = self.registry.len(),
            "Modbus emulator started"
        );
        Ok(())
    }

    async fn spawn_binding(
        &self,
        shutdown: &ShutdownCoordinator,
    ) -> EmulatorResult<Option<JoinHandle<()>>> {
        match &self.binding {
            EmulatorBinding::Tcp { host, port } => {
                let address = format!("{host}:{port}");
                let listener = TcpListener::bind(address.as_str())
                    .await
                    .map_err(|e| EmulatorError::bind(address.as_str(), e))?;
                let local = listener
                    .local_addr()
                    .map_err(|e| EmulatorError::bind(address.as_str(), e))?;
                *self.local_addr.lock() = Some(local);
                info!(%local, "Modbus TCP emulator listening");

                Ok(Some(tokio::spawn(serve_tcp(
                    listener,
                    self.dispatcher.clone(),
                    shutdown.clone(),
                ))))
            }
            EmulatorBinding::Rtu {
                path,
                baud_rate,
                data_bits,
                parity,
                stop_bits,
            } => {
                let config = line_config(path, *baud_rate, *data_bits, *parity, *stop_bits);
                let stream = open_serial(&config)
                    .map_err(|e| EmulatorError::serial(path.as_str(), e.to_string()))?;

                Ok(Some(tokio::spawn(serve_rtu(
                    stream,
                    self.dispatcher.clone(),
                    config.calculated_inter_frame_delay(),
                    shutdown.subscribe(),
                ))))
            }
            EmulatorBinding::Memory => Ok(None),
        }
    }

    /// Serves RTU requests from an arbitrary byte stream, such as a
    /// pseudo-terminal or an in-process pipe. The loop ends on [`stop`](Self::stop)
    /// or when the stream closes.
    pub fn serve_stream<S>(&self, stream: S) -> EmulatorResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let signal = self
            .shutdown
            .lock()
            .as_ref()
            .map(ShutdownCoordinator::subscribe)
            .ok_or(EmulatorError::NotRunning)?;

        let silence = self
            .binding
            .serial_config()
            .map_or(DEFAULT_FRAME_SILENCE, |c| c.calculated_inter_frame_delay());

        let task = tokio::spawn(serve_rtu(stream, self.dispatcher.clone(), silence, signal));
        self.tasks.lock().push(task);
        Ok(())
    }

    /// Stops all server tasks and waits for them. No-op when not running.
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(shutdown) = self.shutdown.lock().take() {
            shutdown.initiate();
        }

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Emulator task ended abnormally");
            }
        }

        *self.local_addr.lock() = None;
        info!("Modbus emulator stopped");
    }

    /// Returns `true` between `start` and `stop`.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Bound address of a running TCP binding.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Answers one request frame directly. Works whether or not the emulator
    /// is running.
    pub async fn handle_request(&self, frame: &[u8]) -> Vec<u8> {
        self.dispatcher.dispatch(frame).await
    }
}

#[async_trait]
impl RequestHandler for ModbusEmulator {
    async fn handle_request(&self, frame: &[u8]) -> Vec<u8> {
        self.dispatcher.dispatch(frame).await
    }
}

impl Drop for ModbusEmulator {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.get_mut().take() {
            shutdown.initiate();
        }
    }
}

impl std::fmt::Debug for ModbusEmulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModbusEmulator")
            .field("binding", &self.binding)
            .field("devices", &self.registry.ids())
            .field("running", &self.is_running())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
