// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Connection pooling.
//!
//! Devices that share a serial line or a TCP endpoint must share one
//! physical connection. [`TransportManager`] keeps one raw channel per
//! [`ConnectionKey`] and hands out lightweight [`PooledTransport`] handles:
//!
//! ```text
//! PooledTransport = MutexTransport<SlaveIdTransport>
//!                        │               │
//!                        │               └─ sets the unit ID before each call
//!                        └─ holds the channel's FIFO lock around each call
//! ```
//!
//! Closing a handle does not close the shared channel; only
//! [`TransportManager::close_all`] does.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{ModbusError, ModbusResult};
use crate::types::{ConnectionKey, TransportConfig, TransportKind, TransportSpec};

use super::mutex::FifoMutex;
use super::rtu::RtuTransport;
use super::tcp::TcpTransport;
use super::transport::{ModbusTransport, RawTransport, RegisterData};

// =============================================================================
// ChannelFactory
// =============================================================================

/// Creates raw channels for the pool.
pub trait ChannelFactory: Send + Sync {
    /// Creates a channel for `config`. Must not perform I/O.
    fn create(&self, config: &TransportConfig) -> ModbusResult<Arc<dyn RawTransport>>;
}

/// Creates [`TcpTransport`] and [`RtuTransport`] channels.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultChannelFactory;

impl ChannelFactory for DefaultChannelFactory {
    fn create(&self, config: &TransportConfig) -> ModbusResult<Arc<dyn RawTransport>> {
        let channel: Arc<dyn RawTransport> = match config {
            TransportConfig::Tcp(c) => Arc::new(TcpTransport::new(c.clone())),
            TransportConfig::Rtu(c) => Arc::new(RtuTransport::new(c.clone())),
        };
        Ok(channel)
    }
}

// =============================================================================
// SlaveIdTransport
// =============================================================================

/// Addresses a fixed unit over a shared channel.
///
/// Must run under the channel's lock, since the unit ID it sets is shared
/// state of the channel.
#[derive(Clone)]
pub struct SlaveIdTransport {
    inner: Arc<dyn RawTransport>,
    unit_id: u8,
}

impl SlaveIdTransport {
    /// Wraps `inner` for `unit_id`.
    pub fn new(inner: Arc<dyn RawTransport>, unit_id: u8) -> Self {
        Self { inner, unit_id }
    }

    /// Returns the shared channel.
    pub fn channel(&self) -> &Arc<dyn RawTransport> {
        &self.inner
    }

    fn target(&self) -> &dyn RawTransport {
        self.inner.set_unit_id(self.unit_id);
        self.inner.as_ref()
    }
}

#[async_trait]
impl ModbusTransport for SlaveIdTransport {
    async fn read_coils(&self, address: u16, count: u16) -> ModbusResult<Vec<bool>> {
        self.target().read_coils(address, count).await
    }

    async fn read_discrete_inputs(&self, address: u16, count: u16) -> ModbusResult<Vec<bool>> {
        self.target().read_discrete_inputs(address, count).await
    }

    async fn read_holding_registers(&self, address: u16, count: u16) -> ModbusResult<RegisterData> {
        self.target().read_holding_registers(address, count).await
    }

    async fn read_input_registers(&self, address: u16, count: u16) -> ModbusResult<RegisterData> {
        self.target().read_input_registers(address, count).await
    }

    async fn write_single_coil(&self, address: u16, value: bool) -> ModbusResult<()> {
        self.target().write_single_coil(address, value).await
    }

    async fn write_single_register(&self, address: u16, value: u16) -> ModbusResult<()> {
        self.target().write_single_register(address, value).await
    }

    async fn write_multiple_coils(&self, address: u16, values: &[bool]) -> ModbusResult<()> {
        self.target().write_multiple_coils(address, values).await
    }

    async fn write_multiple_registers(&self, address: u16, values: &[u16]) -> ModbusResult<()> {
        self.target().write_multiple_registers(address, values).await
    }

    async fn close(&self) -> ModbusResult<()> {
        tracing::debug!(
            channel = %self.inner.display_name(),
            unit_id = self.unit_id,
            "Releasing pooled handle; shared channel stays open"
        );
        Ok(())
    }

    fn unit_id(&self) -> u8 {
        self.unit_id
    }

    fn display_name(&self) -> String {
        format!("{} -> unit {}", self.inner.display_name(), self.unit_id)
    }
}

impl fmt::Debug for SlaveIdTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlaveIdTransport")
            .field("channel", &self.inner.display_name())
            .field("unit_id", &self.unit_id)
            .finish()
    }
}

// =============================================================================
// MutexTransport
// =============================================================================

/// Serializes every operation of `inner` through a [`FifoMutex`].
#[derive(Clone)]
pub struct MutexTransport<T> {
    inner: T,
    mutex: FifoMutex,
}

impl<T> MutexTransport<T> {
    /// Wraps `inner`; all wrappers sharing `mutex` are mutually exclusive.
    pub fn new(inner: T, mutex: FifoMutex) -> Self {
        Self { inner, mutex }
    }

    /// Returns the wrapped transport.
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Returns the lock shared with other handles.
    pub fn mutex(&self) -> &FifoMutex {
        &self.mutex
    }
}

#[async_trait]
impl<T: ModbusTransport> ModbusTransport for MutexTransport<T> {
    async fn read_coils(&self, address: u16, count: u16) -> ModbusResult<Vec<bool>> {
        let _guard = self.mutex.acquire().await;
        self.inner.read_coils(address, count).await
    }

    async fn read_discrete_inputs(&self, address: u16, count: u16) -> ModbusResult<Vec<bool>> {
        let _guard = self.mutex.acquire().await;
        self.inner.read_discrete_inputs(address, count).await
    }

    async fn read_holding_registers(&self, address: u16, count: u16) -> ModbusResult<RegisterData> {
        let _guard = self.mutex.acquire().await;
        self.inner.read_holding_registers(address, count).await
    }

    async fn read_input_registers(&self, address: u16, count: u16) -> ModbusResult<RegisterData> {
        let _guard = self.mutex.acquire().await;
        self.inner.read_input_registers(address, count).await
    }

    async fn write_single_coil(&self, address: u16, value: bool) -> ModbusResult<()> {
        let _guard = self.mutex.acquire().await;
        self.inner.write_single_coil(address, value).await
    }

    async fn write_single_register(&self, address: u16, value: u16) -> ModbusResult<()> {
        let _guard = self.mutex.acquire().await;
        self.inner.write_single_register(address, value).await
    }

    async fn write_multiple_coils(&self, address: u16, values: &[bool]) -> ModbusResult<()> {
        let _guard = self.mutex.acquire().await;
        self.inner.write_multiple_coils(address, values).await
    }

    async fn write_multiple_registers(&self, address: u16, values: &[u16]) -> ModbusResult<()> {
        let _guard = self.mutex.acquire().await;
        self.inner.write_multiple_registers(address, values).await
    }

    async fn close(&self) -> ModbusResult<()> {
        let _guard = self.mutex.acquire().await;
        self.inner.close().await
    }

    fn unit_id(&self) -> u8 {
        self.inner.unit_id()
    }

    fn display_name(&self) -> String {
        self.inner.display_name()
    }
}

impl<T: fmt::Debug> fmt::Debug for MutexTransport<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutexTransport")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

/// Handle returned by [`TransportManager::get_transport`].
pub type PooledTransport = MutexTransport<SlaveIdTransport>;

// =============================================================================
// TransportManager
// =============================================================================

/// Pool occupancy by transport kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Pooled serial channels.
    pub rtu: usize,
    /// Pooled TCP channels.
    pub tcp: usize,
}

impl PoolStats {
    /// Total pooled channels.
    pub fn total(&self) -> usize {
        self.rtu + self.tcp
    }
}

struct PoolEntry {
    channel: Arc<dyn RawTransport>,
    mutex: FifoMutex,
}

/// Shares one physical channel among all devices behind the same connection.
///
/// # Example
///
/// ```rust,ignore
/// use ferrobus_modbus::client::TransportManager;
/// use ferrobus_modbus::types::{RtuConfig, TransportConfig};
///
/// let manager = TransportManager::default();
/// let meter = manager.get_transport(&RtuConfig::new("/dev/ttyUSB0", 9600, 1).into())?;
/// let relay = manager.get_transport(&RtuConfig::new("/dev/ttyUSB0", 9600, 2).into())?;
/// // Both handles share one serial port and take turns on it.
/// ```
pub struct TransportManager {
    factory: Arc<dyn ChannelFactory>,
    pool: Mutex<HashMap<ConnectionKey, PoolEntry>>,
}

impl TransportManager {
    /// Creates an empty pool that builds channels with `factory`.
    pub fn new(factory: Arc<dyn ChannelFactory>) -> Self {
        Self {
            factory,
            pool: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a handle addressing `config.slave_id()` over the pooled
    /// channel for `config`, creating the channel on first use.
    pub fn get_transport(&self, config: &TransportConfig) -> ModbusResult<PooledTransport> {
        config.validate()?;
        let key = config.connection_key();

        let mut pool = self.pool.lock();
        let entry = match pool.entry(key) {
            Entry::Occupied(occupied) => occupied.into_mut(),
            Entry::Vacant(vacant) => {
                let channel = self.factory.create(config)?;
                tracing::info!(key = %vacant.key(), "Created pooled channel");
                vacant.insert(PoolEntry {
                    channel,
                    mutex: FifoMutex::new(),
                })
            }
        };

        Ok(MutexTransport::new(
            SlaveIdTransport::new(Arc::clone(&entry.channel), config.slave_id()),
            entry.mutex.clone(),
        ))
    }

    /// Routes a flat [`TransportSpec`] to RTU or TCP, then calls [`get_transport`](Self::get_transport).
    pub fn get_transport_from_spec(&self, spec: TransportSpec) -> ModbusResult<PooledTransport> {
        let config = TransportConfig::try_from(spec).map_err(ModbusError::from)?;
        self.get_transport(&config)
    }

    /// Counts pooled channels by kind.
    pub fn get_stats(&self) -> PoolStats {
        self.pool
            .lock()
            .keys()
            .fold(PoolStats::default(), |mut stats, key| {
                match key.kind() {
                    TransportKind::Rtu => stats.rtu += 1,
                    TransportKind::Tcp => stats.tcp += 1,
                }
                stats
            })
    }

    /// Closes every pooled channel and empties the pool.
    ///
    /// Each channel is closed while holding its lock, after any queued
    /// operations. Close failures are logged and do not stop the sweep.
    pub async fn close_all(&self) {
        let entries: Vec<(ConnectionKey, PoolEntry)> = self.pool.lock().drain().collect();

        for (key, entry) in entries {
            let guard = entry.mutex.acquire().await;
            match entry.channel.close().await {
                Ok(()) => tracing::info!(key = %key, "Closed pooled channel"),
                Err(e) => e.log(&format!("closing pooled channel {key}")),
            }
            guard.release();
        }
    }
}

impl Default for TransportManager {
    fn default() -> Self {
        Self::new(Arc::new(DefaultChannelFactory))
    }
}

impl fmt::Debug for TransportManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportManager")
            .field("stats", &self.get_stats())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PortSpec, RtuConfig, TcpConfig};
    use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
    use tracing_test::traced_test;

    /// Records the unit ID seen by each read and counts closes.
    #[derive(Default)]
    struct RecordingChannel {
        unit_id: AtomicU8,
        seen: Mutex<Vec<u8>>,
        closes: AtomicUsize,
        fail_close: AtomicBool,
    }

    #[async_trait]
    impl ModbusTransport for RecordingChannel {
        async fn read_coils(&self, _address: u16, count: u16) -> ModbusResult<Vec<bool>> {
            self.seen.lock().push(self.unit_id());
            Ok(vec![false; usize::from(count)])
        }
        async fn read_discrete_inputs(&self, address: u16, count: u16) -> ModbusResult<Vec<bool>> {
            self.read_coils(address, count).await
        }
        async fn read_holding_registers(&self, _address: u16, count: u16) -> ModbusResult<RegisterData> {
            self.seen.lock().push(self.unit_id());
            Ok(RegisterData::from_values(&vec![0; usize::from(count)]))
        }
        async fn read_input_registers(&self, address: u16, count: u16) -> ModbusResult<RegisterData> {
            self.read_holding_registers(address, count).await
        }
        async fn write_single_coil(&self, _address: u16, _value: bool) -> ModbusResult<()> {
            Ok(())
        }
        async fn write_single_register(&self, _address: u16, _value: u16) -> ModbusResult<()> {
            Ok(())
        }
        async fn write_multiple_coils(&self, _address: u16, _values: &[bool]) -> ModbusResult<()> {
            Ok(())
        }
        async fn write_multiple_registers(&self, _address: u16, _values: &[u16]) -> ModbusResult<()> {
            Ok(())
        }
        async fn close(&self) -> ModbusResult<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail_close.load(Ordering::SeqCst) {
                return Err(ModbusError::from(std::io::Error::other("port vanished")));
            }
            Ok(())
        }
        fn unit_id(&self) -> u8 {
            self.unit_id.load(Ordering::SeqCst)
        }
        fn display_name(&self) -> String {
            "recording".to_string()
        }
    }

    impl RawTransport for RecordingChannel {
        fn set_unit_id(&self, unit_id: u8) {
            self.unit_id.store(unit_id, Ordering::SeqCst);
        }
        fn state(&self) -> crate::client::TransportState {
            crate::client::TransportState::Connected
        }
    }

    #[derive(Default)]
    struct RecordingFactory {
        created: Mutex<Vec<Arc<RecordingChannel>>>,
    }

    impl ChannelFactory for RecordingFactory {
        fn create(&self, _config: &TransportConfig) -> ModbusResult<Arc<dyn RawTransport>> {
            let channel = Arc::new(RecordingChannel::default());
            self.created.lock().push(Arc::clone(&channel));
            Ok(channel)
        }
    }

    fn manager() -> (Arc<RecordingFactory>, TransportManager) {
        let factory = Arc::new(RecordingFactory::default());
        let manager = TransportManager::new(factory.clone());
        (factory, manager)
    }

    #[tokio::test]
    async fn test_same_line_shares_one_channel() {
        let (factory, manager) = manager();
        let a = manager.get_transport(&RtuConfig::new("/dev/ttyUSB0", 9600, 1).into()).unwrap();
        let b = manager.get_transport(&RtuConfig::new("/dev/ttyUSB0", 9600, 2).into()).unwrap();

        assert_eq!(factory.created.lock().len(), 1);
        assert_eq!(manager.get_stats(), PoolStats { rtu: 1, tcp: 0 });

        a.read_coils(0, 1).await.unwrap();
        b.read_holding_registers(0, 1).await.unwrap();
        a.read_coils(0, 1).await.unwrap();

        let channel = factory.created.lock()[0].clone();
        assert_eq!(*channel.seen.lock(), vec![1, 2, 1]);
    }

    #[tokio::test]
    async fn test_different_line_settings_get_separate_channels() {
        let (factory, manager) = manager();
        manager.get_transport(&RtuConfig::new("/dev/ttyUSB0", 9600, 1).into()).unwrap();
        manager.get_transport(&RtuConfig::new("/dev/ttyUSB0", 19200, 1).into()).unwrap();
        manager.get_transport(&TcpConfig::new("10.0.0.5", 1).into()).unwrap();

        assert_eq!(factory.created.lock().len(), 3);
        let stats = manager.get_stats();
        assert_eq!((stats.rtu, stats.tcp, stats.total()), (2, 1, 3));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_before_pooling() {
        let (factory, manager) = manager();
        let result = manager.get_transport(&TcpConfig::new("10.0.0.5", 0).into());

        assert!(matches!(result, Err(ModbusError::Configuration(_))));
        assert!(factory.created.lock().is_empty());
    }

    #[tokio::test]
    async fn test_structural_routing() {
        let (_, manager) = manager();
        let spec = TransportSpec {
            host: Some("10.0.0.5".into()),
            port: Some(PortSpec::Path("/dev/ttyUSB0".into())),
            slave_id: Some(1),
            ..Default::default()
        };
        assert!(matches!(
            manager.get_transport_from_spec(spec),
            Err(ModbusError::Configuration(_))
        ));

        let spec = TransportSpec {
            host: Some("10.0.0.5".into()),
            slave_id: Some(4),
            ..Default::default()
        };
        let handle = manager.get_transport_from_spec(spec).unwrap();
        assert_eq!(handle.unit_id(), 4);
        assert_eq!(manager.get_stats().tcp, 1);
    }

    #[tokio::test]
    async fn test_handle_close_keeps_channel_open() {
        let (factory, manager) = manager();
        let handle = manager.get_transport(&TcpConfig::new("10.0.0.5", 1).into()).unwrap();

        handle.close().await.unwrap();
        assert_eq!(factory.created.lock()[0].closes.load(Ordering::SeqCst), 0);

        manager.close_all().await;
        assert_eq!(factory.created.lock()[0].closes.load(Ordering::SeqCst), 1);
        assert_eq!(manager.get_stats().total(), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_close_failure_is_logged_and_sweep_continues() {
        let (factory, manager) = manager();
        manager.get_transport(&TcpConfig::new("10.0.0.5", 1).into()).unwrap();
        manager.get_transport(&TcpConfig::new("10.0.0.6", 1).into()).unwrap();
        factory.created.lock()[0].fail_close.store(true, Ordering::SeqCst);

        manager.close_all().await;

        for channel in factory.created.lock().iter() {
            assert_eq!(channel.closes.load(Ordering::SeqCst), 1);
        }
        assert_eq!(manager.get_stats().total(), 0);
        assert!(logs_contain("closing pooled channel"));
        assert!(logs_contain("port vanished"));
    }

    #[tokio::test]
    async fn test_pooled_handle_debug() {
        let (_, manager) = manager();
        let handle = manager.get_transport(&RtuConfig::new("/dev/ttyUSB0", 9600, 3).into()).unwrap();

        let debug = format!("{handle:?}");
        assert!(debug.contains("MutexTransport"), "{debug}");
        assert!(debug.contains("unit_id: 3"), "{debug}");
        assert!(debug.contains("recording"), "{debug}");
    }
}
