use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, SerialPort};

use crate::error::TransportError;

/// Byte transport the negotiator and acquisition loop talk to.
///
/// Reads are expected to block for at most the configured timeout and report
/// an elapsed timeout as [`io::ErrorKind::TimedOut`] (or `WouldBlock`).
pub trait DeviceTransport: Read + Write + Send {
    /// Human-readable port name for logs
    fn name(&self) -> &str;

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), TransportError>;

    /// Discard everything received but not yet read
    fn clear_input(&mut self) -> Result<(), TransportError>;

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), TransportError>;
}

impl<T: DeviceTransport + ?Sized> DeviceTransport for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), TransportError> {
        (**self).set_baud_rate(baud_rate)
    }

    fn clear_input(&mut self) -> Result<(), TransportError> {
        (**self).clear_input()
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        (**self).set_read_timeout(timeout)
    }
}

/// True for the error kinds a timed-out read produces
pub fn is_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// A real serial port opened through `serialport`
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    name: String,
}

impl SerialTransport {
    pub fn open(name: &str, baud_rate: u32, timeout: Duration) -> Result<Self, TransportError> {
        let port = serialport::new(name, baud_rate)
            .timeout(timeout)
            .open()
            .map_err(|source| TransportError::Open {
                port: name.to_string(),
                source,
            })?;

        Ok(Self {
            port,
            name: name.to_string(),
        })
    }
}

impl Read for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl DeviceTransport for SerialTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), TransportError> {
        Ok(self.port.set_baud_rate(baud_rate)?)
    }

    fn clear_input(&mut self) -> Result<(), TransportError> {
        Ok(self.port.clear(ClearBuffer::Input)?)
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        Ok(self.port.set_timeout(timeout)?)
    }
}
