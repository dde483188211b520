// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Link-generic channel transport.
//!
//! A [`Link`] moves one request frame to a device and brings one response
//! frame back; it knows nothing about function codes. [`ChannelTransport`]
//! puts the Modbus operations on top of any link: it builds the request,
//! validates it, runs the exchange and the response parse under the retry
//! policy, and decodes the result.
//!
//! Request validation happens once, before the first attempt. Every failure
//! after that, including exception responses, is retried until the attempt
//! limit is reached.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use async_trait::async_trait;

use crate::codec::{request, response, FunctionCode};
use crate::error::{ModbusError, ModbusResult};

use super::retry::RetryPolicy;
use super::transport::{ModbusTransport, RawTransport, RegisterData, TransportState};

// =============================================================================
// Link Trait
// =============================================================================

/// One request/response exchange over some medium.
///
/// Frames are `[unit_id, function_code, data...]`; the link adds and strips
/// its own envelope (MBAP prefix, CRC). Links serialize their own exchanges.
#[async_trait]
pub trait Link: Send + Sync {
    /// Sends `request` and returns the response frame.
    async fn exchange(&self, request: &[u8]) -> ModbusResult<Vec<u8>>;

    /// Releases the underlying connection, if any.
    async fn shutdown(&self) -> ModbusResult<()>;

    /// Returns the connection state of the medium.
    fn state(&self) -> TransportState;

    /// Short description of the medium, e.g. `tcp://10.0.0.5:502`.
    fn describe(&self) -> String;
}

// =============================================================================
// ChannelTransport
// =============================================================================

/// Modbus operations over a [`Link`].
pub struct ChannelTransport<L> {
    link: L,
    unit_id: AtomicU8,
    retry: RetryPolicy,
    closed: AtomicBool,
}

impl<L: Link> ChannelTransport<L> {
    /// Wraps a link.
    pub fn with_link(link: L, unit_id: u8, retry: RetryPolicy) -> Self {
        Self {
            link,
            unit_id: AtomicU8::new(unit_id),
            retry,
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the underlying link.
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Returns the retry policy.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Returns `true` once [`close`](ModbusTransport::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> ModbusResult<()> {
        if self.is_closed() {
            return Err(ModbusError::closed(format!("{} was closed", self.link.describe())));
        }
        Ok(())
    }

    /// Runs one exchange plus parse under the retry policy.
    ///
    /// `parse` receives the response frame and the request frame.
    async fn transact<T, P>(&self, request: Vec<u8>, parse: P) -> ModbusResult<T>
    where
        T: Send,
        P: Fn(&[u8], &[u8]) -> ModbusResult<T> + Send + Sync,
    {
        self.ensure_open()?;

        let link = &self.link;
        let request = &request;
        let parse = &parse;

        self.retry
            .execute(|| async move {
                let frame = link.exchange(request).await?;
                parse(&frame, request)
            })
            .await
            .map_err(|error| {
                error.log(&self.display_name());
                error
            })
    }

    async fn read_bits(&self, function: FunctionCode, address: u16, count: u16) -> ModbusResult<Vec<bool>> {
        let unit = self.unit_id();
        let request = request::read(unit, function, address, count)?;
        self.transact(request, |frame, _| {
            response::parse_read_bits(frame, unit, function, count)
        })
        .await
    }

    async fn read_registers(
        &self,
        function: FunctionCode,
        address: u16,
        count: u16,
    ) -> ModbusResult<RegisterData> {
        let unit = self.unit_id();
        let request = request::read(unit, function, address, count)?;
        let bytes = self
            .transact(request, |frame, _| {
                response::parse_read_registers(frame, unit, function, count)
            })
            .await?;
        Ok(RegisterData::from_bytes(bytes))
    }
}

#[async_trait]
impl<L: Link> ModbusTransport for ChannelTransport<L> {
    async fn read_coils(&self, address: u16, count: u16) -> ModbusResult<Vec<bool>> {
        self.read_bits(FunctionCode::ReadCoils, address, count).await
    }

    async fn read_discrete_inputs(&self, address: u16, count: u16) -> ModbusResult<Vec<bool>> {
        self.read_bits(FunctionCode::ReadDiscreteInputs, address, count).await
    }

    async fn read_holding_registers(&self, address: u16, count: u16) -> ModbusResult<RegisterData> {
        self.read_registers(FunctionCode::ReadHoldingRegisters, address, count)
            .await
    }

    async fn read_input_registers(&self, address: u16, count: u16) -> ModbusResult<RegisterData> {
        self.read_registers(FunctionCode::ReadInputRegisters, address, count)
            .await
    }

    async fn write_single_coil(&self, address: u16, value: bool) -> ModbusResult<()> {
        let request = request::write_single_coil(self.unit_id(), address, value);
        self.transact(request, response::parse_echo).await
    }

    async fn write_single_register(&self, address: u16, value: u16) -> ModbusResult<()> {
        let request = request::write_single_register(self.unit_id(), address, value);
        self.transact(request, response::parse_echo).await
    }

    async fn write_multiple_coils(&self, address: u16, values: &[bool]) -> ModbusResult<()> {
        let unit = self.unit_id();
        let quantity = values.len() as u16;
        let request = request::write_multiple_coils(unit, address, values)?;
        self.transact(request, |frame, _| {
            response::parse_write_multiple(frame, unit, FunctionCode::WriteMultipleCoils, address, quantity)
        })
        .await
    }

    async fn write_multiple_registers(&self, address: u16, values: &[u16]) -> ModbusResult<()> {
        let unit = self.unit_id();
        let quantity = values.len() as u16;
        let request = request::write_multiple_registers(unit, address, values)?;
        self.transact(request, |frame, _| {
            response::parse_write_multiple(
                frame,
                unit,
                FunctionCode::WriteMultipleRegisters,
                address,
                quantity,
            )
        })
        .await
    }

    async fn close(&self) -> ModbusResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::info!(channel = %self.link.describe(), "Closing channel");
        self.link.shutdown().await
    }

    fn unit_id(&self) -> u8 {
        self.unit_id.load(Ordering::Acquire)
    }

    fn display_name(&self) -> String {
        format!("{} (unit {})", self.link.describe(), self.unit_id())
    }
}

impl<L: Link> RawTransport for ChannelTransport<L> {
    fn set_unit_id(&self, unit_id: u8) {
        self.unit_id.store(unit_id, Ordering::Release);
    }

    fn state(&self) -> TransportState {
        if self.is_closed() {
            TransportState::Closed
        } else {
            self.link.state()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::exception_frame;
    use crate::codec::ExceptionCode;
    use crate::error::{OperationError, ProtocolError};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tracing_test::traced_test;

    /// Replays canned responses and records every request it sees.
    #[derive(Default)]
    struct ScriptedLink {
        responses: Mutex<VecDeque<ModbusResult<Vec<u8>>>>,
        requests: Mutex<Vec<Vec<u8>>>,
        shutdowns: Mutex<u32>,
    }

    impl ScriptedLink {
        fn with(responses: Vec<ModbusResult<Vec<u8>>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl Link for ScriptedLink {
        async fn exchange(&self, request: &[u8]) -> ModbusResult<Vec<u8>> {
            self.requests.lock().push(request.to_vec());
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(ModbusError::not_connected()))
        }

        async fn shutdown(&self) -> ModbusResult<()> {
            *self.shutdowns.lock() += 1;
            Ok(())
        }

        fn state(&self) -> TransportState {
            TransportState::Connected
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    fn transport(responses: Vec<ModbusResult<Vec<u8>>>) -> ChannelTransport<ScriptedLink> {
        ChannelTransport::with_link(
            ScriptedLink::with(responses),
            1,
            RetryPolicy::new(3, Duration::from_millis(10)),
        )
    }

    #[tokio::test]
    async fn test_read_holding_registers() {
        let t = transport(vec![Ok(vec![0x01, 0x03, 0x02, 0x00, 0xE6])]);

        let data = t.read_holding_registers(0, 1).await.unwrap();

        assert_eq!(data.as_bytes(), &[0x00, 0xE6]);
        assert_eq!(t.link().requests.lock()[0], vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x01]);
    }

    #[tokio::test]
    async fn test_read_coils_unpacks_bits() {
        let t = transport(vec![Ok(vec![0x01, 0x01, 0x01, 0b1010_0000])]);
        let bits = t.read_coils(10, 3).await.unwrap();
        assert_eq!(bits, vec![true, false, true]);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_exception_is_retried_then_returned() {
        let exception = || Ok(exception_frame(1, 0x03, ExceptionCode::IllegalDataAddress));
        let t = transport(vec![exception(), exception(), exception()]);

        let err = t.read_holding_registers(0, 1).await.unwrap_err();

        assert_eq!(err.exception_code(), Some(0x02));
        assert_eq!(t.link().requests.lock().len(), 3);
        assert!(logs_contain("scripted (unit 1)"));
        assert!(logs_contain("retryable=false"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failure() {
        let t = transport(vec![
            Err(ModbusError::response_timeout(Duration::from_millis(100))),
            Ok(vec![0x01, 0x06, 0x00, 0x05, 0x00, 0x07]),
        ]);

        t.write_single_register(5, 7).await.unwrap();
        assert_eq!(t.link().requests.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_quantity_is_not_sent() {
        let t = transport(vec![]);

        let err = t.read_holding_registers(0, 126).await.unwrap_err();

        assert!(matches!(
            err,
            ModbusError::Operation(OperationError::QuantityOutOfRange { .. })
        ));
        assert!(t.link().requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_write_multiple_registers_acknowledged() {
        let t = transport(vec![Ok(vec![0x01, 0x10, 0x00, 0x00, 0x00, 0x03])]);

        t.write_multiple_registers(0, &[500, 100, 200]).await.unwrap();

        let sent = t.link().requests.lock()[0].clone();
        assert_eq!(
            sent,
            vec![0x01, 0x10, 0x00, 0x00, 0x00, 0x03, 0x06, 0x01, 0xF4, 0x00, 0x64, 0x00, 0xC8]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_unit_in_response_is_rejected() {
        let reply = || Ok(vec![0x02, 0x03, 0x02, 0x00, 0x01]);
        let t = transport(vec![reply(), reply(), reply()]);

        let err = t.read_holding_registers(0, 1).await.unwrap_err();
        assert!(matches!(
            err,
            ModbusError::Protocol(ProtocolError::UnitIdMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_set_unit_id_changes_requests() {
        let t = transport(vec![Ok(vec![0x07, 0x04, 0x02, 0x00, 0x01])]);
        t.set_unit_id(7);

        t.read_input_registers(0, 1).await.unwrap();

        assert_eq!(t.unit_id(), 7);
        assert_eq!(t.link().requests.lock()[0][0], 7);
        assert_eq!(t.display_name(), "scripted (unit 7)");
    }

    #[tokio::test]
    async fn test_closed_channel_rejects_operations() {
        let t = transport(vec![]);

        t.close().await.unwrap();
        t.close().await.unwrap();

        assert_eq!(*t.link().shutdowns.lock(), 1);
        assert_eq!(t.state(), TransportState::Closed);
        let err = t.read_coils(0, 1).await.unwrap_err();
        assert!(matches!(err, ModbusError::Connection(_)));
        assert!(t.link().requests.lock().is_empty());
    }
}
