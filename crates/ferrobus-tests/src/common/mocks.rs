// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Mock Implementations
//!
//! Doubles that record their interactions for verification.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use ferrobus_emulator::Sleeper;
use ferrobus_modbus::codec::exception_frame;
use ferrobus_modbus::{
    ChannelFactory, ConnectionError, ExceptionCode, ModbusResult, ModbusTransport, RawTransport,
    RegisterData, RequestHandler, TransportConfig, TransportState,
};

// =============================================================================
// Scripted Channel
// =============================================================================

/// One observation made by a [`ScriptedChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
    /// An operation started for the unit.
    Begin(u8),
    /// The operation for the unit finished.
    End(u8),
    /// The channel was closed.
    Closed,
}

/// Event log shared by every channel of a factory.
pub type EventLog = Arc<Mutex<Vec<ChannelEvent>>>;

/// A raw channel that takes `latency` per operation and logs each one.
#[derive(Debug)]
pub struct ScriptedChannel {
    unit_id: AtomicU8,
    latency: Duration,
    fail_next: AtomicU32,
    fail_close: AtomicBool,
    operations: AtomicUsize,
    closes: AtomicUsize,
    log: EventLog,
}

impl ScriptedChannel {
    /// Creates a channel logging into `log`.
    pub fn new(latency: Duration, log: EventLog) -> Self {
        Self {
            unit_id: AtomicU8::new(0),
            latency,
            fail_next: AtomicU32::new(0),
            fail_close: AtomicBool::new(false),
            operations: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            log,
        }
    }

    /// Makes the next `count` operations fail with a connection error.
    pub fn fail_next(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Makes every `close` fail after logging it.
    pub fn fail_on_close(&self) {
        self.fail_close.store(true, Ordering::SeqCst);
    }

    /// Number of `close` calls, failed ones included.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Number of data operations started.
    pub fn operations(&self) -> usize {
        self.operations.load(Ordering::SeqCst)
    }

    async fn operate(&self) -> ModbusResult<()> {
        let unit = self.unit_id();
        self.operations.fetch_add(1, Ordering::SeqCst);
        self.log.lock().push(ChannelEvent::Begin(unit));
        tokio::time::sleep(self.latency).await;
        self.log.lock().push(ChannelEvent::End(unit));

        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ConnectionError::closed(Some("scripted failure".into())).into());
        }
        Ok(())
    }
}

#[async_trait]
impl ModbusTransport for ScriptedChannel {
    async fn read_coils(&self, _address: u16, count: u16) -> ModbusResult<Vec<bool>> {
        self.operate().await?;
        Ok(vec![false; usize::from(count)])
    }

    async fn read_discrete_inputs(&self, address: u16, count: u16) -> ModbusResult<Vec<bool>> {
        self.read_coils(address, count).await
    }

    async fn read_holding_registers(&self, _address: u16, count: u16) -> ModbusResult<RegisterData> {
        self.operate().await?;
        let unit = u16::from(self.unit_id());
        Ok(RegisterData::from_values(&vec![unit; usize::from(count)]))
    }

    async fn read_input_registers(&self, address: u16, count: u16) -> ModbusResult<RegisterData> {
        self.read_holding_registers(address, count).await
    }

    async fn write_single_coil(&self, _address: u16, _value: bool) -> ModbusResult<()> {
        self.operate().await
    }

    async fn write_single_register(&self, _address: u16, _value: u16) -> ModbusResult<()> {
        self.operate().await
    }

    async fn write_multiple_coils(&self, _address: u16, _values: &[bool]) -> ModbusResult<()> {
        self.operate().await
    }

    async fn write_multiple_registers(&self, _address: u16, _values: &[u16]) -> ModbusResult<()> {
        self.operate().await
    }

    async fn close(&self) -> ModbusResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.log.lock().push(ChannelEvent::Closed);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(ConnectionError::io(
                "scripted close failure",
                std::io::Error::other("device unplugged"),
            )
            .into());
        }
        Ok(())
    }

    fn unit_id(&self) -> u8 {
        self.unit_id.load(Ordering::SeqCst)
    }

    fn display_name(&self) -> String {
        "scripted".to_string()
    }
}

impl RawTransport for ScriptedChannel {
    fn set_unit_id(&self, unit_id: u8) {
        self.unit_id.store(unit_id, Ordering::SeqCst);
    }

    fn state(&self) -> TransportState {
        TransportState::Connected
    }
}

// =============================================================================
// Counting Channel Factory
// =============================================================================

/// Channel factory that counts calls and hands out [`ScriptedChannel`]s.
#[derive(Debug, Default)]
pub struct CountingChannelFactory {
    latency: Duration,
    log: EventLog,
    created: Mutex<Vec<(TransportConfig, Arc<ScriptedChannel>)>>,
}

impl CountingChannelFactory {
    /// Creates a factory whose channels take `latency` per operation.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Number of `create` calls.
    pub fn calls(&self) -> usize {
        self.created.lock().len()
    }

    /// The `index`-th channel created.
    pub fn channel(&self, index: usize) -> Option<Arc<ScriptedChannel>> {
        self.created.lock().get(index).map(|(_, c)| c.clone())
    }

    /// The configuration passed to the `index`-th `create` call.
    pub fn config(&self, index: usize) -> Option<TransportConfig> {
        self.created.lock().get(index).map(|(c, _)| c.clone())
    }

    /// Snapshot of all events logged by this factory's channels.
    pub fn events(&self) -> Vec<ChannelEvent> {
        self.log.lock().clone()
    }
}

impl ChannelFactory for CountingChannelFactory {
    fn create(&self, config: &TransportConfig) -> ModbusResult<Arc<dyn RawTransport>> {
        let channel = Arc::new(ScriptedChannel::new(self.latency, self.log.clone()));
        self.created.lock().push((config.clone(), channel.clone()));
        Ok(channel)
    }
}

// =============================================================================
// Flaky Handler
// =============================================================================

/// Request handler that answers the first `failures` requests with an
/// exception and forwards the rest.
pub struct FlakyHandler {
    inner: Arc<dyn RequestHandler>,
    failures_left: AtomicU32,
    calls: AtomicU32,
}

impl FlakyHandler {
    /// Wraps `inner`, failing the first `failures` requests.
    pub fn new(inner: Arc<dyn RequestHandler>, failures: u32) -> Self {
        Self {
            inner,
            failures_left: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
        }
    }

    /// Requests received so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RequestHandler for FlakyHandler {
    async fn handle_request(&self, frame: &[u8]) -> Vec<u8> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            let unit = frame.first().copied().unwrap_or(0);
            let function = frame.get(1).copied().unwrap_or(0);
            return exception_frame(unit, function, ExceptionCode::GatewayTargetFailed);
        }
        self.inner.handle_request(frame).await
    }
}

// =============================================================================
// Recording Sleeper
// =============================================================================

/// Sleeper that records requested delays and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Delays requested so far.
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().push(duration);
    }
}
