// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! In-process link to a [`RequestHandler`].
//!
//! Frames go straight to the handler with no envelope. The configured
//! timeout still bounds each exchange, so a slow handler (for example an
//! emulator simulating device latency) behaves like a slow device.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use crate::error::{ModbusError, ModbusResult};
use crate::types::MemoryConfig;

use super::channel::{ChannelTransport, Link};
use super::retry::RetryPolicy;
use super::transport::{RequestHandler, TransportState};

/// Transport wired directly to a request handler.
pub type MemoryTransport = ChannelTransport<MemoryLink>;

impl ChannelTransport<MemoryLink> {
    /// Creates a transport that sends every frame to `handler`.
    pub fn new(handler: Arc<dyn RequestHandler>, config: MemoryConfig) -> Self {
        let retry = RetryPolicy::new(config.max_attempts, config.retry_delay);
        Self::with_link(MemoryLink::new(handler, config.timeout), config.slave_id, retry)
    }
}

/// Link that calls a [`RequestHandler`] in place of a wire.
pub struct MemoryLink {
    handler: Arc<dyn RequestHandler>,
    timeout: Duration,
}

impl MemoryLink {
    /// Creates a link with a per-exchange timeout.
    pub fn new(handler: Arc<dyn RequestHandler>, timeout: Duration) -> Self {
        Self { handler, timeout }
    }
}

#[async_trait]
impl Link for MemoryLink {
    async fn exchange(&self, request: &[u8]) -> ModbusResult<Vec<u8>> {
        timeout(self.timeout, self.handler.handle_request(request))
            .await
            .map_err(|_| ModbusError::response_timeout(self.timeout))
    }

    async fn shutdown(&self) -> ModbusResult<()> {
        Ok(())
    }

    fn state(&self) -> TransportState {
        TransportState::Connected
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
