use crate::transport::{ScpiTransport, TransportError};

/// Payload progress of one block whose length is already known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockReader {
    length: usize,
    read: usize,
}

impl BlockReader {
    pub fn new(length: usize) -> Self {
        Self { length, read: 0 }
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn bytes_read(&self) -> usize {
        self.read
    }

    pub fn remaining(&self) -> usize {
        self.length - self.read
    }

    pub fn is_complete(&self) -> bool {
        self.read == self.length
    }

    /// Read the next chunk of payload into `buf`.
    ///
    /// Asks for at most `min(remaining, buf.len())` bytes and returns how
    /// many arrived; zero means nothing was available yet. Nothing is
    /// requested from the transport once the block is complete.
    pub fn read_chunk<T: ScpiTransport + ?Sized>(
        &mut self,
        transport: &mut T,
        buf: &mut [u8],
    ) -> Result<usize, TransportError> {
        let want = self.remaining().min(buf.len());
        if want == 0 {
            return Ok(0);
        }

        log::debug!("Requesting read of {} bytes", want);
        let n = transport.read_data(&mut buf[..want])?;
        self.read += n;

        if n > 0 {
            log::debug!("Received {} bytes.", n);
        }
        if !self.is_complete() {
            log::debug!("{} of {} block bytes read", self.read, self.length);
        }
        Ok(n)
    }

    /// Consume the linefeed that trails every block.
    ///
    /// A missing delimiter is only logged.
    pub fn discard_delimiter<T: ScpiTransport + ?Sized>(transport: &mut T) {
        let mut delimiter = [0u8; 1];
        match transport.read_data(&mut delimiter) {
            Ok(1) if delimiter[0] == b'\n' => {}
            Ok(1) => log::warn!(
                "Expected block delimiter after data block, got 0x{:02x}",
                delimiter[0]
            ),
            Ok(_) => log::warn!("Block delimiter not available after data block"),
            Err(e) => log::warn!("Failed to read block delimiter: {}", e),
        }
    }
}
