//! Native serial port implementation using the `serialport` crate.
//!
//! `serialport` opens POSIX ports with the receiver enabled and modem
//! control lines ignored (`CREAD | CLOCAL`), which is what the target
//! loader expects alongside the framing from [`SerialConfig`].

use {
    crate::{
        error::{Error, Result},
        port::{Channel, DataBits, FlowControl, Parity, Readiness, SerialConfig, StopBits},
    },
    log::{debug, trace},
    serialport::ClearBuffer,
    std::{
        io::{Read, Write},
        thread,
        time::{Duration, Instant},
    },
};

/// Interval between input queue checks while waiting for a reply.
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Native serial port implementation.
pub struct NativePort {
    port: Option<Box<dyn serialport::SerialPort>>,
    name: String,
}

impl NativePort {
    /// Open a serial port with the given configuration.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        debug!(
            "Opening {} at {} baud ({:?}, {:?}, {:?}, {:?})",
            config.port_name,
            config.baud_rate,
            config.data_bits,
            config.parity,
            config.stop_bits,
            config.flow_control
        );

        let port = serialport::new(&config.port_name, config.baud_rate)
            .timeout(config.timeout)
            .data_bits(
                config
                    .data_bits
                    .into(),
            )
            .parity(
                config
                    .parity
                    .into(),
            )
            .stop_bits(
                config
                    .stop_bits
                    .into(),
            )
            .flow_control(
                config
                    .flow_control
                    .into(),
            )
            .open()?;

        Ok(Self {
            port: Some(port),
            name: config
                .port_name
                .clone(),
        })
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn serialport::SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| Error::Channel(format!("{} is closed", self.name)))
    }
}

impl Channel for NativePort {
    fn name(&self) -> &str {
        &self.name
    }

    fn wait_readable(&mut self, timeout: Duration) -> Result<Readiness> {
        let start = Instant::now();
        let port = self.port_mut()?;

        loop {
            let queued = port.bytes_to_read()?;
            if queued > 0 {
                trace!("{queued} byte(s) ready after {:?}", start.elapsed());
                return Ok(Readiness::Ready);
            }
            if start.elapsed() >= timeout {
                return Ok(Readiness::TimedOut);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn clear_buffers(&mut self) -> Result<()> {
        self.port_mut()?
            .clear(ClearBuffer::All)?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the boxed port closes the descriptor
        if self
            .port
            .take()
            .is_some()
        {
            debug!("Closed {}", self.name);
        }
        Ok(())
    }
}

impl Read for NativePort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.port
            .as_mut()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotConnected, "port closed"))
            .and_then(|p| p.read(buf))
    }
}

impl Write for NativePort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.port
            .as_mut()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotConnected, "port closed"))
            .and_then(|p| p.write(buf))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.port
            .as_mut()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotConnected, "port closed"))
            .and_then(std::io::Write::flush)
    }
}

// Type conversions from our types to serialport types

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => Self::Five,
            DataBits::Six => Self::Six,
            DataBits::Seven => Self::Seven,
            DataBits::Eight => Self::Eight,
        }
    }
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => Self::None,
            Parity::Odd => Self::Odd,
            Parity::Even => Self::Even,
        }
    }
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => Self::One,
            StopBits::Two => Self::Two,
        }
    }
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => Self::None,
            FlowControl::Hardware => Self::Hardware,
            FlowControl::Software => Self::Software,
        }
    }
}
