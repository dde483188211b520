// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Wire bindings for the emulator.
//!
//! - [`tcp`]: MBAP over a TCP listener, one task per connection
//! - [`rtu`]: CRC-framed requests over any byte stream (serial port, pty, pipe)
//!
//! Both loops stop when their [`ShutdownSignal`] fires.

pub mod rtu;
pub mod tcp;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

pub use rtu::serve_rtu;
pub use tcp::serve_tcp;

// =============================================================================
// Shutdown
// =============================================================================

/// Fans a single stop request out to every server task.
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    sender: broadcast::Sender<()>,
    initiated: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    /// Creates a coordinator.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender,
            initiated: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns a signal that fires on [`initiate`](Self::initiate).
    ///
    /// Signals created after shutdown was initiated fire immediately.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.sender.subscribe(),
            initiated: self.initiated.clone(),
        }
    }

    /// Notifies every subscriber. Later calls are no-ops.
    pub fn initiate(&self) {
        if self
            .initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let _ = self.sender.send(());
        }
    }

    /// Returns `true` once shutdown was initiated.
    pub fn is_initiated(&self) -> bool {
        self.initiated.load(Ordering::SeqCst)
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of a [`ShutdownCoordinator`].
#[derive(Debug)]
pub struct ShutdownSignal {
    receiver: broadcast::Receiver<()>,
    initiated: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// Resolves once shutdown is initiated or the coordinator is dropped.
    pub async fn recv(&mut self) {
        if self.initiated.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.receiver.recv().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_signal_fires_for_all_subscribers() {
        let coordinator = ShutdownCoordinator::new();
        let mut a = coordinator.subscribe();
        let mut b = coordinator.subscribe();

        coordinator.initiate();
        coordinator.initiate();

        tokio::time::timeout(Duration::from_secs(1), a.recv()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), b.recv()).await.unwrap();
        assert!(coordinator.is_initiated());
    }

    #[tokio::test]
    async fn test_late_subscriber_fires_immediately() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.initiate();

        let mut late = coordinator.subscribe();
        tokio::time::timeout(Duration::from_secs(1), late.recv()).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_pending_until_initiated() {
        let coordinator = ShutdownCoordinator::new();
        let mut signal = coordinator.subscribe();

        let pending = tokio::time::timeout(Duration::from_millis(10), signal.recv()).await;
        assert!(pending.is_err());
    }
}
