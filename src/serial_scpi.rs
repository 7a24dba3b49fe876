use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use crate::transport::{ScpiTransport, TransportError};

pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Poll timeout of the underlying port. Reads never wait longer than this.
pub const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// How long a query may take to produce its response line.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(1);

const TERMINATOR: u8 = b'\n';

/// SCPI over a serial line (RS-232 or USB CDC).
pub struct SerialScpi {
    serial: Box<dyn SerialPort>,
    query_timeout: Duration,
}

impl std::fmt::Debug for SerialScpi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialScpi")
            .field("port", &self.serial.name())
            .field("query_timeout", &self.query_timeout)
            .finish()
    }
}

impl SerialScpi {
    /// Open `port` and discard anything left in its buffers.
    pub fn open(port: &str, baud_rate: u32) -> Result<Self, TransportError> {
        log::debug!("Opening SCPI serial port {} at {} baud", port, baud_rate);
        let serial = serialport::new(port, baud_rate)
            .timeout(READ_TIMEOUT)
            .open()?;

        let mut transport = Self::from_port(serial);
        transport.flush()?;
        Ok(transport)
    }

    /// Wrap an already opened port.
    pub fn from_port(serial: Box<dyn SerialPort>) -> Self {
        Self {
            serial,
            query_timeout: QUERY_TIMEOUT,
        }
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Ask the instrument to identify itself.
    pub fn identify(&mut self) -> Result<String, TransportError> {
        self.query_string("*IDN?")
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.serial.clear(serialport::ClearBuffer::All)?;
        Ok(())
    }

    fn pending(&self) -> Result<usize, TransportError> {
        Ok(self.serial.bytes_to_read()? as usize)
    }

    fn read_line(&mut self, command: &str) -> Result<String, TransportError> {
        let mut response = Vec::new();
        let start = Instant::now();

        loop {
            let mut byte = [0u8; 1];
            match self.serial.read(&mut byte) {
                Ok(1) => {
                    if byte[0] == TERMINATOR {
                        break;
                    }
                    response.push(byte[0]);
                }
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::TimedOut => {}
                Err(e) => return Err(e.into()),
            }

            if start.elapsed() >= self.query_timeout {
                return Err(TransportError::Timeout {
                    command: command.to_string(),
                    partial: String::from_utf8_lossy(&response).to_string(),
                });
            }
        }

        let response = String::from_utf8(response)?;
        Ok(response.trim_end_matches('\r').to_string())
    }
}

impl ScpiTransport for SerialScpi {
    fn send(&mut self, command: &str) -> Result<(), TransportError> {
        log::trace!("Sending '{}'", command);
        let command_with_newline = format!("{}\n", command);
        self.serial.write_all(command_with_newline.as_bytes())?;
        Ok(())
    }

    fn read_begin(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn read_data(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let pending = self.pending()?;
        if pending == 0 || buf.is_empty() {
            return Ok(0);
        }

        let len = pending.min(buf.len());
        match self.serial.read(&mut buf[..len]) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn read_complete(&mut self) -> bool {
        self.pending().map_or(true, |pending| pending == 0)
    }

    fn query(&mut self, command: &str) -> Result<String, TransportError> {
        self.send(command)?;
        let response = self.read_line(command)?;
        log::trace!("'{}' -> '{}'", command, response);
        Ok(response)
    }
}
