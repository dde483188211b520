// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Transport configuration types.
//!
//! - **TcpConfig** / **RtuConfig** / **MemoryConfig**: per-channel settings with builders
//! - **TransportConfig**: RTU or TCP, routed from the structural shape of a raw
//!   [`TransportSpec`] (string `port` without `host` is RTU, `host` is TCP)
//! - **ConnectionKey**: identity of a physical bus connection
//!
//! # Examples
//!
//! ```
//! use ferrobus_modbus::types::{TransportConfig, TransportKind};
//!
//! let config: TransportConfig = serde_json::from_str(
//!     r#"{ "host": "192.168.1.100", "slave_id": 3 }"#,
//! ).unwrap();
//!
//! assert_eq!(config.kind(), TransportKind::Tcp);
//! assert_eq!(config.slave_id(), 3);
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, ModbusError, ModbusResult};

/// Highest assignable unit ID. 0 is broadcast and 248-255 are reserved.
pub const MAX_UNIT_ID: u8 = 247;

fn default_port() -> u16 {
    502
}

fn default_timeout() -> Duration {
    Duration::from_millis(1000)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_millis(100)
}

fn validate_unit_id(unit_id: u8) -> ModbusResult<()> {
    if unit_id == 0 || unit_id > MAX_UNIT_ID {
        return Err(ConfigurationError::invalid_unit_id(unit_id).into());
    }
    Ok(())
}

fn validate_timeout(timeout: Duration) -> ModbusResult<()> {
    if timeout.is_zero() {
        return Err(ConfigurationError::invalid_value("timeout", "must be greater than zero").into());
    }
    Ok(())
}

// =============================================================================
// TcpConfig
// =============================================================================

/// Configuration for a Modbus TCP channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpConfig {
    /// Target host address.
    pub host: String,

    /// Target port (default: 502).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Unit ID addressed by requests on this channel.
    pub slave_id: u8,

    /// Connect and response timeout (default: 1s).
    #[serde(default = "default_timeout")]
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Attempts per operation, including the first (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between attempts (default: 100ms).
    #[serde(default = "default_retry_delay")]
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
}

impl TcpConfig {
    /// Creates a new builder.
    pub fn builder() -> TcpConfigBuilder {
        TcpConfigBuilder::default()
    }

    /// Creates a configuration with defaults for everything but host and unit.
    pub fn new(host: impl Into<String>, slave_id: u8) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            slave_id,
            timeout: default_timeout(),
            max_attempts: default_max_attempts(),
            retry_delay: default_retry_delay(),
        }
    }

    /// Returns the `host:port` socket address string.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validates this configuration.
    pub fn validate(&self) -> ModbusResult<()> {
        if self.host.trim().is_empty() {
            return Err(ConfigurationError::missing_field("tcp", "host").into());
        }
        if self.port == 0 {
            return Err(ConfigurationError::invalid_value("port", "must be non-zero").into());
        }
        validate_unit_id(self.slave_id)?;
        validate_timeout(self.timeout)
    }
}

/// Builder for [`TcpConfig`].
#[derive(Debug, Default)]
pub struct TcpConfigBuilder {
    host: Option<String>,
    port: Option<u16>,
    slave_id: Option<u8>,
    timeout: Option<Duration>,
    max_attempts: Option<u32>,
    retry_delay: Option<Duration>,
}

impl TcpConfigBuilder {
    /// Sets the host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the unit ID.
    pub fn slave_id(mut self, slave_id: u8) -> Self {
        self.slave_id = Some(slave_id);
        self
    }

    /// Sets the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the attempt limit.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Sets the retry delay.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> ModbusResult<TcpConfig> {
        let host = self
            .host
            .ok_or_else(|| ModbusError::from(ConfigurationError::missing_field("tcp", "host")))?;
        let slave_id = self
            .slave_id
            .ok_or_else(|| ModbusError::from(ConfigurationError::missing_field("tcp", "slave_id")))?;

        let config = TcpConfig {
            host,
            port: self.port.unwrap_or_else(default_port),
            slave_id,
            timeout: self.timeout.unwrap_or_else(default_timeout),
            max_attempts: self.max_attempts.unwrap_or_else(default_max_attempts),
            retry_delay: self.retry_delay.unwrap_or_else(default_retry_delay),
        };

        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// RtuConfig
// =============================================================================

/// Configuration for a Modbus RTU channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtuConfig {
    /// Serial port path (e.g., "/dev/ttyUSB0" or "COM1").
    pub port: String,

    /// Baud rate.
    pub baud_rate: u32,

    /// Data bits.
    pub data_bits: DataBits,

    /// Parity.
    pub parity: Parity,

    /// Stop bits.
    pub stop_bits: StopBits,

    /// Unit ID addressed by requests on this channel.
    pub slave_id: u8,

    /// Response timeout (default: 1s).
    #[serde(default = "default_timeout")]
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Attempts per operation, including the first (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between attempts (default: 100ms).
    #[serde(default = "default_retry_delay")]
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,

    /// Inter-frame silence. Calculated from the line settings when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(with = "humantime_serde")]
    pub inter_frame_delay: Option<Duration>,
}

impl RtuConfig {
    /// Creates a new builder.
    pub fn builder() -> RtuConfigBuilder {
        RtuConfigBuilder::default()
    }

    /// Creates an 8N1 configuration at the given baud rate.
    pub fn new(port: impl Into<String>, baud_rate: u32, slave_id: u8) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            slave_id,
            timeout: default_timeout(),
            max_attempts: default_max_attempts(),
            retry_delay: default_retry_delay(),
            inter_frame_delay: None,
        }
    }

    /// Bits on the wire per character (start + data + parity + stop).
    pub fn bits_per_char(&self) -> u32 {
        1 + u32::from(self.data_bits.bits())
            + u32::from(self.parity.bits())
            + u32::from(self.stop_bits.bits())
    }

    /// Calculates the inter-frame delay based on baud rate.
    ///
    /// Modbus RTU frames are separated by at least 3.5 character times of
    /// silence. At 9600 baud with 11 bits per character this is about 4ms.
    pub fn calculated_inter_frame_delay(&self) -> Duration {
        if let Some(delay) = self.inter_frame_delay {
            return delay;
        }

        let baud = f64::from(self.baud_rate.max(1));
        let delay_us = (3.5 * f64::from(self.bits_per_char()) / baud * 1_000_000.0) as u64;

        // Minimum 1ms to account for OS scheduling
        Duration::from_micros(delay_us.max(1000))
    }

    /// Validates this configuration.
    pub fn validate(&self) -> ModbusResult<()> {
        if self.port.trim().is_empty() {
            return Err(ConfigurationError::missing_field("rtu", "port").into());
        }
        if self.baud_rate == 0 {
            return Err(ConfigurationError::invalid_value("baud_rate", "must be non-zero").into());
        }
        validate_unit_id(self.slave_id)?;
        validate_timeout(self.timeout)
    }
}

/// Builder for [`RtuConfig`].
#[derive(Debug, Default)]
pub struct RtuConfigBuilder {
    port: Option<String>,
    baud_rate: Option<u32>,
    data_bits: Option<DataBits>,
    parity: Option<Parity>,
    stop_bits: Option<StopBits>,
    slave_id: Option<u8>,
    timeout: Option<Duration>,
    max_attempts: Option<u32>,
    retry_delay: Option<Duration>,
    inter_frame_delay: Option<Duration>,
}

impl RtuConfigBuilder {
    /// Sets the serial port.
    pub fn port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    /// Sets the baud rate.
    pub fn baud_rate(mut self, rate: u32) -> Self {
        self.baud_rate = Some(rate);
        self
    }

    /// Sets the data bits.
    pub fn data_bits(mut self, bits: DataBits) -> Self {
        self.data_bits = Some(bits);
        self
    }

    /// Sets the parity.
    pub fn parity(mut self, parity: Parity) -> Self {
        self.parity = Some(parity);
        self
    }

    /// Sets the stop bits.
    pub fn stop_bits(mut self, bits: StopBits) -> Self {
        self.stop_bits = Some(bits);
        self
    }

    /// Sets the unit ID.
    pub fn slave_id(mut self, id: u8) -> Self {
        self.slave_id = Some(id);
        self
    }

    /// Sets the response timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the attempt limit.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Sets the retry delay.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Overrides the inter-frame delay.
    pub fn inter_frame_delay(mut self, delay: Duration) -> Self {
        self.inter_frame_delay = Some(delay);
        self
    }

    /// Sets common RTU parameters: 9600/8/N/1.
    pub fn default_9600_8n1(self) -> Self {
        self.baud_rate(9600)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
    }

    /// Builds the configuration.
    ///
    /// Unlike the serde route, the builder fills in 8N1 when line settings
    /// are omitted; only port, baud rate and unit ID are mandatory.
    pub fn build(self) -> ModbusResult<RtuConfig> {
        let missing = |field: &'static str| ModbusError::from(ConfigurationError::missing_field("rtu", field));

        let config = RtuConfig {
            port: self.port.ok_or_else(|| missing("port"))?,
            baud_rate: self.baud_rate.ok_or_else(|| missing("baud_rate"))?,
            data_bits: self.data_bits.unwrap_or_default(),
            parity: self.parity.unwrap_or_default(),
            stop_bits: self.stop_bits.unwrap_or_default(),
            slave_id: self.slave_id.ok_or_else(|| missing("slave_id"))?,
            timeout: self.timeout.unwrap_or_else(default_timeout),
            max_attempts: self.max_attempts.unwrap_or_else(default_max_attempts),
            retry_delay: self.retry_delay.unwrap_or_else(default_retry_delay),
            inter_frame_delay: self.inter_frame_delay,
        };

        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// MemoryConfig
// =============================================================================

/// Configuration for an in-process loopback channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Unit ID addressed by requests on this channel.
    pub slave_id: u8,

    /// Response timeout (default: 1s).
    #[serde(default = "default_timeout")]
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Attempts per operation (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between attempts (default: 100ms).
    #[serde(default = "default_retry_delay")]
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
}

impl MemoryConfig {
    /// Creates a configuration with default timing.
    pub fn new(slave_id: u8) -> Self {
        Self {
            slave_id,
            timeout: default_timeout(),
            max_attempts: default_max_attempts(),
            retry_delay: default_retry_delay(),
        }
    }

    /// Sets the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the attempt limit.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the retry delay.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

// =============================================================================
// Serial Port Settings
// =============================================================================

/// Data bits configuration. Serialized as the bit count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "u8", into = "u8")]
pub enum DataBits {
    /// 5 data bits.
    Five,
    /// 6 data bits.
    Six,
    /// 7 data bits.
    Seven,
    /// 8 data bits (default).
    #[default]
    Eight,
}

impl DataBits {
    /// Returns the number of bits.
    pub const fn bits(&self) -> u8 {
        match self {
            Self::Five => 5,
            Self::Six => 6,
            Self::Seven => 7,
            Self::Eight => 8,
        }
    }
}

impl TryFrom<u8> for DataBits {
    type Error = ConfigurationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            5 => Ok(Self::Five),
            6 => Ok(Self::Six),
            7 => Ok(Self::Seven),
            8 => Ok(Self::Eight),
            other => Err(ConfigurationError::invalid_value(
                "data_bits",
                format!("{other} (expected 5-8)"),
            )),
        }
    }
}

impl From<DataBits> for u8 {
    fn from(value: DataBits) -> Self {
        value.bits()
    }
}

impl fmt::Display for DataBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

/// Parity configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    /// No parity (default).
    #[default]
    None,
    /// Odd parity.
    Odd,
    /// Even parity.
    Even,
}

impl Parity {
    /// Returns the number of parity bits.
    pub const fn bits(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::Odd | Self::Even => 1,
        }
    }

    /// Returns the short character representation.
    pub const fn char(&self) -> char {
        match self {
            Self::None => 'N',
            Self::Odd => 'O',
            Self::Even => 'E',
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.char())
    }
}

/// Stop bits configuration. Serialized as the bit count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "u8", into = "u8")]
pub enum StopBits {
    /// 1 stop bit (default).
    #[default]
    One,
    /// 2 stop bits.
    Two,
}

impl StopBits {
    /// Returns the number of stop bits.
    pub const fn bits(&self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }
}

impl TryFrom<u8> for StopBits {
    type Error = ConfigurationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            other => Err(ConfigurationError::invalid_value(
                "stop_bits",
                format!("{other} (expected 1 or 2)"),
            )),
        }
    }
}

impl From<StopBits> for u8 {
    fn from(value: StopBits) -> Self {
        value.bits()
    }
}

impl fmt::Display for StopBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

// =============================================================================
// ConnectionKey
// =============================================================================

/// Identity of a physical connection.
///
/// Two configurations with equal keys share one channel, whatever their
/// unit IDs or timeouts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConnectionKey {
    /// A serial line.
    Rtu {
        /// Serial port path.
        port: String,
        /// Baud rate.
        baud_rate: u32,
        /// Data bits.
        data_bits: DataBits,
        /// Parity.
        parity: Parity,
        /// Stop bits.
        stop_bits: StopBits,
    },
    /// A TCP endpoint.
    Tcp {
        /// Host.
        host: String,
        /// Port.
        port: u16,
    },
}

impl ConnectionKey {
    /// Returns the transport kind of this key.
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Rtu { .. } => TransportKind::Rtu,
            Self::Tcp { .. } => TransportKind::Tcp,
        }
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rtu {
                port,
                baud_rate,
                data_bits,
                parity,
                stop_bits,
            } => write!(f, "rtu:{port}@{baud_rate}/{data_bits}{parity}{stop_bits}"),
            Self::Tcp { host, port } => write!(f, "tcp:{host}:{port}"),
        }
    }
}

/// Kind of pooled transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Serial line.
    Rtu,
    /// TCP socket.
    Tcp,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rtu => write!(f, "rtu"),
            Self::Tcp => write!(f, "tcp"),
        }
    }
}

// =============================================================================
// TransportConfig
// =============================================================================

/// A routable transport configuration.
///
/// Deserializes from the flat [`TransportSpec`] shape and rejects anything
/// that is neither clearly RTU nor clearly TCP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TransportSpec", into = "TransportSpec")]
pub enum TransportConfig {
    /// Modbus RTU over a serial line.
    Rtu(RtuConfig),
    /// Modbus TCP.
    Tcp(TcpConfig),
}

impl TransportConfig {
    /// Returns the transport kind.
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Rtu(_) => TransportKind::Rtu,
            Self::Tcp(_) => TransportKind::Tcp,
        }
    }

    /// Returns the configured unit ID.
    pub fn slave_id(&self) -> u8 {
        match self {
            Self::Rtu(c) => c.slave_id,
            Self::Tcp(c) => c.slave_id,
        }
    }

    /// Returns the response timeout.
    pub fn timeout(&self) -> Duration {
        match self {
            Self::Rtu(c) => c.timeout,
            Self::Tcp(c) => c.timeout,
        }
    }

    /// Returns the key of the physical connection this configuration targets.
    pub fn connection_key(&self) -> ConnectionKey {
        match self {
            Self::Rtu(c) => ConnectionKey::Rtu {
                port: c.port.clone(),
                baud_rate: c.baud_rate,
                data_bits: c.data_bits,
                parity: c.parity,
                stop_bits: c.stop_bits,
            },
            Self::Tcp(c) => ConnectionKey::Tcp {
                host: c.host.clone(),
                port: c.port,
            },
        }
    }

    /// Validates this configuration.
    pub fn validate(&self) -> ModbusResult<()> {
        match self {
            Self::Rtu(c) => c.validate(),
            Self::Tcp(c) => c.validate(),
        }
    }

    /// Returns the RTU configuration, if any.
    pub fn as_rtu(&self) -> Option<&RtuConfig> {
        match self {
            Self::Rtu(c) => Some(c),
            Self::Tcp(_) => None,
        }
    }

    /// Returns the TCP configuration, if any.
    pub fn as_tcp(&self) -> Option<&TcpConfig> {
        match self {
            Self::Tcp(c) => Some(c),
            Self::Rtu(_) => None,
        }
    }
}

impl From<RtuConfig> for TransportConfig {
    fn from(config: RtuConfig) -> Self {
        Self::Rtu(config)
    }
}

impl From<TcpConfig> for TransportConfig {
    fn from(config: TcpConfig) -> Self {
        Self::Tcp(config)
    }
}

// =============================================================================
// TransportSpec
// =============================================================================

/// A serial path or a TCP port number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortSpec {
    /// Numeric TCP port.
    Number(u16),
    /// Serial device path.
    Path(String),
}

/// Flat, loosely-typed transport configuration as found in config files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportSpec {
    /// TCP host. Presence selects TCP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Serial path (RTU) or TCP port number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<PortSpec>,
    /// RTU baud rate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baud_rate: Option<u32>,
    /// RTU data bits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_bits: Option<DataBits>,
    /// RTU parity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parity: Option<Parity>,
    /// RTU stop bits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_bits: Option<StopBits>,
    /// Unit ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slave_id: Option<u8>,
    /// Response timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
    /// Attempts per operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    /// Delay between attempts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(with = "humantime_serde")]
    pub retry_delay: Option<Duration>,
}

impl TransportSpec {
    fn into_rtu(self, port: String) -> Result<RtuConfig, ConfigurationError> {
        let missing = |field: &'static str| ConfigurationError::missing_field("rtu", field);

        Ok(RtuConfig {
            port,
            baud_rate: self.baud_rate.ok_or_else(|| missing("baud_rate"))?,
            data_bits: self.data_bits.ok_or_else(|| missing("data_bits"))?,
            parity: self.parity.ok_or_else(|| missing("parity"))?,
            stop_bits: self.stop_bits.ok_or_else(|| missing("stop_bits"))?,
            slave_id: self.slave_id.ok_or_else(|| missing("slave_id"))?,
            timeout: self.timeout.unwrap_or_else(default_timeout),
            max_attempts: self.max_attempts.unwrap_or_else(default_max_attempts),
            retry_delay: self.retry_delay.unwrap_or_else(default_retry_delay),
            inter_frame_delay: None,
        })
    }

    fn into_tcp(self, host: String, port: u16) -> Result<TcpConfig, ConfigurationError> {
        Ok(TcpConfig {
            host,
            port,
            slave_id: self
                .slave_id
                .ok_or_else(|| ConfigurationError::missing_field("tcp", "slave_id"))?,
            timeout: self.timeout.unwrap_or_else(default_timeout),
            max_attempts: self.max_attempts.unwrap_or_else(default_max_attempts),
            retry_delay: self.retry_delay.unwrap_or_else(default_retry_delay),
        })
    }
}

impl TryFrom<TransportSpec> for TransportConfig {
    type Error = ConfigurationError;

    fn try_from(spec: TransportSpec) -> Result<Self, Self::Error> {
        match (spec.host.clone(), spec.port.clone()) {
            (Some(_), Some(PortSpec::Path(path))) => Err(ConfigurationError::ambiguous(format!(
                "both host and serial port '{path}' given"
            ))),
            (Some(host), Some(PortSpec::Number(port))) => Ok(Self::Tcp(spec.into_tcp(host, port)?)),
            (Some(host), None) => Ok(Self::Tcp(spec.into_tcp(host, default_port())?)),
            (None, Some(PortSpec::Path(path))) => Ok(Self::Rtu(spec.into_rtu(path)?)),
            (None, Some(PortSpec::Number(port))) => Err(ConfigurationError::unknown_transport(
                format!("numeric port {port} without host"),
            )),
            (None, None) => Err(ConfigurationError::unknown_transport(
                "neither host nor serial port given",
            )),
        }
    }
}

impl From<TransportConfig> for TransportSpec {
    fn from(config: TransportConfig) -> Self {
        match config {
            TransportConfig::Rtu(c) => Self {
                host: None,
                port: Some(PortSpec::Path(c.port)),
                baud_rate: Some(c.baud_rate),
                data_bits: Some(c.data_bits),
                parity: Some(c.parity),
                stop_bits: Some(c.stop_bits),
                slave_id: Some(c.slave_id),
                timeout: Some(c.timeout),
                max_attempts: Some(c.max_attempts),
                retry_delay: Some(c.retry_delay),
            },
            TransportConfig::Tcp(c) => Self {
                host: Some(c.host),
                port: Some(PortSpec::Number(c.port)),
                slave_id: Some(c.slave_id),
                timeout: Some(c.timeout),
                max_attempts: Some(c.max_attempts),
                retry_delay: Some(c.retry_delay),
                ..Default::default()
            },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<TransportConfig, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[test]
    fn test_rtu_routing() {
        let config = parse(
            r#"{ "port": "/dev/ttyUSB0", "baud_rate": 9600, "data_bits": 8,
                 "parity": "none", "stop_bits": 1, "slave_id": 2, "timeout": "500ms" }"#,
        )
        .unwrap();

        let rtu = config.as_rtu().unwrap();
        assert_eq!(rtu.port, "/dev/ttyUSB0");
        assert_eq!(rtu.data_bits, DataBits::Eight);
        assert_eq!(rtu.timeout, Duration::from_millis(500));
        assert_eq!(rtu.max_attempts, 3);
        assert_eq!(config.slave_id(), 2);
    }

    #[test]
    fn test_tcp_routing_defaults() {
        let config = parse(r#"{ "host": "10.0.0.5", "slave_id": 1 }"#).unwrap();
        let tcp = config.as_tcp().unwrap();
        assert_eq!(tcp.port, 502);
        assert_eq!(tcp.timeout, Duration::from_millis(1000));
        assert_eq!(tcp.retry_delay, Duration::from_millis(100));
    }

    #[test]
    fn test_tcp_with_numeric_port() {
        let config = parse(r#"{ "host": "localhost", "port": 1502, "slave_id": 9 }"#).unwrap();
        assert_eq!(
            config.connection_key(),
            ConnectionKey::Tcp {
                host: "localhost".into(),
                port: 1502
            }
        );
    }

    #[test]
    fn test_ambiguous_and_unknown_rejected() {
        assert!(parse(r#"{ "host": "localhost", "port": "/dev/ttyS0", "slave_id": 1 }"#).is_err());
        assert!(parse(r#"{ "slave_id": 1 }"#).is_err());
        assert!(parse(r#"{ "port": 502, "slave_id": 1 }"#).is_err());
    }

    #[test]
    fn test_rtu_missing_field() {
        let spec = TransportSpec {
            port: Some(PortSpec::Path("/dev/ttyS0".into())),
            baud_rate: Some(9600),
            data_bits: Some(DataBits::Eight),
            parity: Some(Parity::Even),
            slave_id: Some(1),
            ..Default::default()
        };

        let error = TransportConfig::try_from(spec).unwrap_err();
        assert_eq!(error, ConfigurationError::missing_field("rtu", "stop_bits"));
    }

    #[test]
    fn test_connection_key_ignores_unit_and_timeout() {
        let a = TransportConfig::Rtu(RtuConfig::new("/dev/ttyUSB0", 9600, 1));
        let mut b = RtuConfig::new("/dev/ttyUSB0", 9600, 7);
        b.timeout = Duration::from_secs(3);
        let b = TransportConfig::Rtu(b);

        assert_eq!(a.connection_key(), b.connection_key());
        assert_eq!(a.connection_key().to_string(), "rtu:/dev/ttyUSB0@9600/8N1");

        let c = TransportConfig::Rtu(RtuConfig::new("/dev/ttyUSB0", 19200, 1));
        assert_ne!(a.connection_key(), c.connection_key());
    }

    #[test]
    fn test_builders() {
        let tcp = TcpConfig::builder().host("plc").slave_id(4).build().unwrap();
        assert_eq!(tcp.socket_addr(), "plc:502");

        assert!(TcpConfig::builder().host("plc").slave_id(0).build().is_err());
        assert!(RtuConfig::builder().port("/dev/ttyS1").slave_id(1).build().is_err());

        let rtu = RtuConfig::builder()
            .port("/dev/ttyS1")
            .default_9600_8n1()
            .slave_id(1)
            .build()
            .unwrap();
        assert_eq!(rtu.bits_per_char(), 10);
    }

    #[test]
    fn test_inter_frame_delay() {
        let mut config = RtuConfig::new("/dev/ttyS0", 9600, 1);
        config.parity = Parity::Even;
        // 3.5 * 11 / 9600 s
        assert_eq!(config.calculated_inter_frame_delay(), Duration::from_micros(4010));

        config.baud_rate = 115_200;
        assert_eq!(config.calculated_inter_frame_delay(), Duration::from_millis(1));
    }

    #[test]
    fn test_serial_settings_serde() {
        assert!(serde_json::from_str::<DataBits>("9").is_err());
        assert_eq!(serde_json::to_string(&StopBits::Two).unwrap(), "2");
        assert_eq!(serde_json::from_str::<Parity>("\"odd\"").unwrap(), Parity::Odd);
    }

    #[test]
    fn test_config_round_trip_through_spec() {
        let config = TransportConfig::Tcp(TcpConfig::new("plc", 5));
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(parse(&json).unwrap(), config);
    }
}
