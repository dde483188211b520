// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Synthetic response latency.
//!
//! The delay for one request is the sum of four terms:
//!
//! | Term         | Source                                                        |
//! |--------------|---------------------------------------------------------------|
//! | detection    | `detection_delay`, else uniform in `[0, polling_interval_ms]` |
//! | processing   | `processing_delay`                                            |
//! | per-register | `per_register_delay_ms * register count`                      |
//! | transmission | `frame bytes * 11 / (baud_rate / 1000)`, when enabled         |
//!
//! All values are milliseconds. Delays deserialize from a number (fixed) or a
//! `[min, max]` pair (sampled uniformly on every request).

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};

use ferrobus_modbus::codec::{request, FunctionCode};

/// Bits on the wire per byte: start, 8 data, parity, stop.
pub const BITS_PER_BYTE: f64 = 11.0;

// =============================================================================
// DelaySpec
// =============================================================================

/// A delay in milliseconds, fixed or uniformly sampled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DelaySpec {
    /// Always this many milliseconds.
    Fixed(f64),
    /// Uniform in `[min, max]` milliseconds.
    Range([f64; 2]),
}

impl DelaySpec {
    /// Draws one delay in milliseconds. Never negative.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let ms = match *self {
            Self::Fixed(ms) => ms,
            Self::Range([min, max]) if max > min => rng.gen_range(min..=max),
            Self::Range([min, _]) => min,
        };
        ms.max(0.0)
    }
}

impl From<f64> for DelaySpec {
    fn from(ms: f64) -> Self {
        Self::Fixed(ms)
    }
}

// =============================================================================
// TimingConfig
// =============================================================================

/// Wire-time model; off unless `enabled`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransmissionConfig {
    /// Whether transmission delay is added.
    #[serde(default)]
    pub enabled: bool,

    /// Line speed used for the estimate (default: 9600).
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

fn default_baud_rate() -> u32 {
    9600
}

impl Default for TransmissionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            baud_rate: default_baud_rate(),
        }
    }
}

/// Latency parameters of one emulated device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Time until the device notices a request. Takes precedence over
    /// `polling_interval_ms`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection_delay: Option<DelaySpec>,

    /// Polling period of a device that checks its input periodically.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polling_interval_ms: Option<f64>,

    /// Time to compute the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_delay: Option<DelaySpec>,

    /// Extra time per register touched.
    #[serde(default)]
    pub per_register_delay_ms: f64,

    /// Wire-time model.
    #[serde(default)]
    pub transmission: TransmissionConfig,
}

// =============================================================================
// TimingSimulator
// =============================================================================

/// The terms of one computed delay, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimingBreakdown {
    /// Detection term.
    pub detection_ms: f64,
    /// Processing term.
    pub processing_ms: f64,
    /// Per-register term.
    pub per_register_ms: f64,
    /// Transmission term.
    pub transmission_ms: f64,
}

impl TimingBreakdown {
    /// Sum of all terms in milliseconds.
    pub fn total_ms(&self) -> f64 {
        self.detection_ms + self.processing_ms + self.per_register_ms + self.transmission_ms
    }

    /// Sum of all terms.
    pub fn total(&self) -> Duration {
        Duration::from_nanos((self.total_ms().max(0.0) * 1_000_000.0).round() as u64)
    }
}

/// Computes per-request delays from a [`TimingConfig`].
#[derive(Debug, Clone)]
pub struct TimingSimulator {
    config: TimingConfig,
}

impl TimingSimulator {
    /// Creates a simulator.
    pub fn new(config: TimingConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &TimingConfig {
        &self.config
    }

    /// Computes the delay for `request` using the thread-local RNG.
    pub fn compute(&self, request: &[u8]) -> TimingBreakdown {
        self.compute_with(request, &mut rand::thread_rng())
    }

    /// Computes the delay for `request` using `rng` for ranged terms.
    pub fn compute_with<R: Rng + ?Sized>(&self, request: &[u8], rng: &mut R) -> TimingBreakdown {
        let detection_ms = match (&self.config.detection_delay, self.config.polling_interval_ms) {
            (Some(delay), _) => delay.sample(rng),
            (None, Some(interval)) => DelaySpec::Range([0.0, interval]).sample(rng),
            (None, None) => 0.0,
        };

        let processing_ms = self
            .config
            .processing_delay
            .map_or(0.0, |delay| delay.sample(rng));

        let per_register_ms = self.config.per_register_delay_ms * f64::from(register_count(request));

        let transmission = &self.config.transmission;
        let transmission_ms = if transmission.enabled && transmission.baud_rate > 0 {
            request.len() as f64 * BITS_PER_BYTE / (f64::from(transmission.baud_rate) / 1000.0)
        } else {
            0.0
        };

        TimingBreakdown {
            detection_ms,
            processing_ms,
            per_register_ms,
            transmission_ms,
        }
    }
}

/// Registers touched by a request: the quantity field of reads and multiple
/// writes, `1` for everything else.
pub fn register_count(frame: &[u8]) -> u16 {
    let single_write = matches!(
        frame.get(1).copied().and_then(FunctionCode::from_u8),
        Some(FunctionCode::WriteSingleCoil | FunctionCode::WriteSingleRegister)
    );
    if single_write {
        return 1;
    }
    request::quantity(frame).unwrap_or(1)
}

// =============================================================================
// Sleeper
// =============================================================================

/// Waits out computed delays. Replaceable so tests can record instead of wait.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Waits for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
