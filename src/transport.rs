/// Errors raised by a command/response transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout waiting for response to '{command}', got '{partial}' so far")]
    Timeout { command: String, partial: String },

    #[error("Invalid response to '{command}': '{response}'")]
    InvalidResponse { command: String, response: String },

    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Transport closed")]
    Closed,
}

/// Command/response link to a SCPI instrument.
///
/// Every method returns promptly. `read_data` hands back whatever is
/// available right now, which may be nothing.
pub trait ScpiTransport {
    /// Send one command line.
    fn send(&mut self, command: &str) -> Result<(), TransportError>;

    /// Prepare for reading a (possibly binary) response to the last command.
    fn read_begin(&mut self) -> Result<(), TransportError>;

    /// Read up to `buf.len()` bytes of the pending response.
    fn read_data(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Whether the pending response has been consumed entirely.
    fn read_complete(&mut self) -> bool;

    /// Send `command` and return its response line without the terminator.
    fn query(&mut self, command: &str) -> Result<String, TransportError>;

    fn query_string(&mut self, command: &str) -> Result<String, TransportError> {
        self.query(command).map(|r| r.trim().to_string())
    }

    fn query_float(&mut self, command: &str) -> Result<f32, TransportError> {
        let response = self.query_string(command)?;
        response
            .parse::<f32>()
            .map_err(|_| TransportError::InvalidResponse {
                command: command.to_string(),
                response,
            })
    }

    fn query_int(&mut self, command: &str) -> Result<i32, TransportError> {
        let response = self.query_string(command)?;
        response
            .parse::<i32>()
            .map_err(|_| TransportError::InvalidResponse {
                command: command.to_string(),
                response,
            })
    }

    fn query_bool(&mut self, command: &str) -> Result<bool, TransportError> {
        let response = self.query_string(command)?;
        match response.to_ascii_uppercase().as_str() {
            "1" | "ON" => Ok(true),
            "0" | "OFF" => Ok(false),
            _ => Err(TransportError::InvalidResponse {
                command: command.to_string(),
                response,
            }),
        }
    }

    /// Wait for the instrument to report "operation complete".
    fn get_opc(&mut self) -> Result<(), TransportError> {
        let response = self.query_string("*OPC?")?;
        if response == "1" {
            Ok(())
        } else {
            Err(TransportError::InvalidResponse {
                command: "*OPC?".to_string(),
                response,
            })
        }
    }

    /// Send a configuration command and confirm it with `*OPC?`.
    fn config_set(&mut self, command: &str) -> Result<(), TransportError> {
        self.send(command)?;
        self.get_opc()
    }
}

impl<T: ScpiTransport + ?Sized> ScpiTransport for &mut T {
    fn send(&mut self, command: &str) -> Result<(), TransportError> {
        (**self).send(command)
    }

    fn read_begin(&mut self) -> Result<(), TransportError> {
        (**self).read_begin()
    }

    fn read_data(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        (**self).read_data(buf)
    }

    fn read_complete(&mut self) -> bool {
        (**self).read_complete()
    }

    fn query(&mut self, command: &str) -> Result<String, TransportError> {
        (**self).query(command)
    }
}
