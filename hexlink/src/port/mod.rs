//! Channel abstraction for the serial link to the target device.
//!
//! The transfer engine never talks to a serial port directly. It drives a
//! [`Channel`], which adds the one operation a line/ack protocol needs on top
//! of plain [`Read`] + [`Write`]: a bounded wait for the device to answer.
//!
//! ```text
//! +------------------+
//! |  Transfer Engine |
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! |   Channel Trait  |
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! | Native SerialPort|
//! |   (serialport)   |
//! +------------------+
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use hexlink::port::{Channel, Readiness};
//!
//! fn ping<C: Channel>(channel: &mut C) -> hexlink::Result<bool> {
//!     channel.write_all_bytes(b":00000001FF\n")?;
//!     Ok(channel.wait_readable(Duration::from_secs(1))? == Readiness::Ready)
//! }
//! ```

#[cfg(feature = "native")]
pub mod native;

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use crate::error::Result;

/// Device path the uploader talks to when nothing else is configured.
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";

/// Line rate expected by the target's loader.
pub const DEFAULT_BAUD: u32 = 9600;

/// Serial port configuration.
///
/// Defaults describe the link the target expects: 9600 baud, 8 data bits,
/// no parity, 1 stop bit, no flow control.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Timeout for a single blocking read or write.
    pub timeout: Duration,
    /// Data bits (typically 8).
    pub data_bits: DataBits,
    /// Parity (typically None).
    pub parity: Parity,
    /// Stop bits (typically One).
    pub stop_bits: StopBits,
    /// Flow control (typically None).
    pub flow_control: FlowControl,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: DEFAULT_PORT.to_string(),
            baud_rate: DEFAULT_BAUD,
            timeout: Duration::from_millis(1000),
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Number of data bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataBits {
    /// 5 data bits.
    Five,
    /// 6 data bits.
    Six,
    /// 7 data bits.
    Seven,
    /// 8 data bits.
    #[default]
    Eight,
}

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    /// No parity.
    #[default]
    None,
    /// Odd parity.
    Odd,
    /// Even parity.
    Even,
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopBits {
    /// 1 stop bit.
    #[default]
    One,
    /// 2 stop bits.
    Two,
}

/// Flow control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowControl {
    /// No flow control.
    #[default]
    None,
    /// Hardware flow control (RTS/CTS).
    Hardware,
    /// Software flow control (XON/XOFF).
    Software,
}

/// Result of a bounded wait on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// At least one byte can be read without blocking.
    Ready,
    /// The deadline passed with nothing to read.
    TimedOut,
}

/// Duplex byte channel to the target device.
///
/// A failed wait is reported as `Err`, distinct from [`Readiness::TimedOut`].
pub trait Channel: Read + Write + Send {
    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Block until the device has sent something or `timeout` elapses.
    fn wait_readable(&mut self, timeout: Duration) -> Result<Readiness>;

    /// Clear input/output buffers.
    fn clear_buffers(&mut self) -> Result<()>;

    /// Close the port and release resources.
    ///
    /// After calling this method, the channel cannot be used for further I/O.
    fn close(&mut self) -> Result<()>;

    /// Write all bytes, blocking until complete.
    fn write_all_bytes(&mut self, buf: &[u8]) -> Result<()> {
        std::io::Write::write_all(self, buf)?;
        std::io::Write::flush(self)?;
        Ok(())
    }

    /// Read whatever reply bytes are available, up to `buf.len()`.
    ///
    /// A read that times out or would block yields `Ok(0)`.
    fn read_reply(&mut self, buf: &mut [u8]) -> Result<usize> {
        match std::io::Read::read(self, buf) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(feature = "native")]
pub use native::NativePort;
