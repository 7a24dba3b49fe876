//! Incremental decoder for the IEEE 488.2 definite-length block header.
//!
//! Every waveform block starts with a header such as `#9000001400`:
//!
//! ```text
//! '#'  <n: one ASCII digit 1-9>  <n ASCII decimal digits: payload length>
//! ```
//!
//! The header may arrive one byte per readiness event, so the decoder keeps
//! the bytes it has seen between calls and only ever asks the transport for
//! the bytes still missing from the header. It never reads into the payload.

use crate::transport::{ScpiTransport, TransportError};

pub const BLOCK_MARKER: u8 = b'#';

/// Longest possible header: marker, digit count and nine length digits.
pub const MAX_HEADER_LEN: usize = 2 + 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub digit_count: u8,
    pub declared_length: usize,
}

impl BlockHeader {
    /// Total header size in bytes.
    pub fn header_len(&self) -> usize {
        2 + self.digit_count as usize
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("Received invalid data block header '{header}'")]
    InvalidPrefix { header: String },

    #[error("Received invalid data block length '{digits}'")]
    InvalidLength { digits: String },
}

#[derive(Debug, thiserror::Error)]
pub enum HeaderError {
    #[error(transparent)]
    Framing(#[from] FramingError),

    #[error("Read error while reading data header: {0}")]
    Transport(#[from] TransportError),
}

/// Header assembly state that survives between readiness events.
#[derive(Debug, Default)]
pub struct BlockHeaderDecoder {
    buf: [u8; MAX_HEADER_LEN],
    bytes_read: usize,
}

impl BlockHeaderDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of header bytes collected so far.
    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }

    pub fn reset(&mut self) {
        self.bytes_read = 0;
    }

    /// Advance header assembly by at most one read per header part.
    ///
    /// Returns `Ok(None)` while the header is incomplete. On success the
    /// decoder is reset and ready for the next block. A framing error leaves
    /// the collected bytes in place for inspection; callers reset before
    /// reusing the decoder.
    pub fn poll<T: ScpiTransport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> Result<Option<BlockHeader>, HeaderError> {
        if self.bytes_read < 2 {
            self.fill(transport, 2)?;
        }
        if self.bytes_read < 2 {
            return Ok(None);
        }

        let digit_count = self.check_prefix()?;
        let header_len = 2 + digit_count as usize;

        if self.bytes_read < header_len {
            self.fill(transport, header_len)?;
        }
        if self.bytes_read < header_len {
            return Ok(None);
        }

        let declared_length = Self::parse_length(&self.buf[2..header_len])?;
        log::debug!(
            "Received data block header: '{}' -> block length {}",
            String::from_utf8_lossy(&self.buf[..header_len]),
            declared_length
        );

        self.reset();
        Ok(Some(BlockHeader {
            digit_count,
            declared_length,
        }))
    }

    fn fill<T: ScpiTransport + ?Sized>(
        &mut self,
        transport: &mut T,
        target: usize,
    ) -> Result<(), TransportError> {
        let n = transport.read_data(&mut self.buf[self.bytes_read..target])?;
        self.bytes_read += n;
        Ok(())
    }

    fn check_prefix(&self) -> Result<u8, FramingError> {
        let marker = self.buf[0];
        let digit = self.buf[1];
        if marker != BLOCK_MARKER || !(b'1'..=b'9').contains(&digit) {
            return Err(FramingError::InvalidPrefix {
                header: String::from_utf8_lossy(&self.buf[..2]).to_string(),
            });
        }
        Ok(digit - b'0')
    }

    fn parse_length(digits: &[u8]) -> Result<usize, FramingError> {
        let invalid = || FramingError::InvalidLength {
            digits: String::from_utf8_lossy(digits).to_string(),
        };

        if !digits.iter().all(u8::is_ascii_digit) {
            return Err(invalid());
        }
        let text = std::str::from_utf8(digits).map_err(|_| invalid())?;
        let length = text.parse::<i32>().map_err(|_| invalid())?;
        usize::try_from(length).map_err(|_| invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedTransport;

    fn decode_in_pieces(bytes: &[u8], piece: usize) -> (Result<Option<BlockHeader>, HeaderError>, usize) {
        let mut transport = ScriptedTransport::new().data_in_pieces(bytes, piece);
        let mut decoder = BlockHeaderDecoder::new();
        let mut polls = 0;
        loop {
            polls += 1;
            transport.tick();
            match decoder.poll(&mut transport) {
                Ok(None) if polls < 100 => continue,
                other => return (other, polls),
            }
        }
    }

    #[test]
    fn test_decode_whole_header() {
        let mut transport = ScriptedTransport::new().data(b"#41400");
        let mut decoder = BlockHeaderDecoder::new();
        transport.tick();

        let header = decoder.poll(&mut transport).unwrap().unwrap();
        assert_eq!(
            header,
            BlockHeader {
                digit_count: 4,
                declared_length: 1400
            }
        );
        assert_eq!(header.header_len(), 6);
        assert_eq!(decoder.bytes_read(), 0);
    }

    #[test]
    fn test_length_independent_of_chunking() {
        let headers: [(&[u8], usize); 5] = [
            (b"#10", 0),
            (b"#17", 7),
            (b"#3512", 512),
            (b"#9000001400", 1400),
            (b"#9999999999", 999_999_999),
        ];

        for (bytes, expected) in headers {
            for piece in 1..=bytes.len() {
                let (result, _) = decode_in_pieces(bytes, piece);
                let header = result.unwrap().unwrap();
                assert_eq!(header.declared_length, expected, "piece size {piece}");
            }
        }
    }

    #[test]
    fn test_does_not_read_past_header() {
        let mut transport = ScriptedTransport::new().data(b"#15abcde\n");
        let mut decoder = BlockHeaderDecoder::new();
        transport.tick();

        let header = decoder.poll(&mut transport).unwrap().unwrap();
        assert_eq!(header.declared_length, 5);

        let mut rest = [0u8; 16];
        let n = transport.read_data(&mut rest).unwrap();
        assert_eq!(&rest[..n], b"abcde\n");
    }

    #[test]
    fn test_partial_header_waits_without_error() {
        let mut transport = ScriptedTransport::new().data(b"#");
        let mut decoder = BlockHeaderDecoder::new();
        transport.tick();

        assert!(decoder.poll(&mut transport).unwrap().is_none());
        assert_eq!(decoder.bytes_read(), 1);
        assert!(decoder.poll(&mut transport).unwrap().is_none());
        assert_eq!(decoder.bytes_read(), 1);
    }

    #[test]
    fn test_one_byte_per_event() {
        let (result, polls) = decode_in_pieces(b"#9000001400", 1);
        assert_eq!(result.unwrap().unwrap().declared_length, 1400);
        assert_eq!(polls, 11);
    }

    #[test]
    fn test_bad_marker() {
        for bytes in [&b"$41400"[..], b"141400", b"\n#41400"] {
            let (result, _) = decode_in_pieces(bytes, 1);
            assert!(matches!(
                result,
                Err(HeaderError::Framing(FramingError::InvalidPrefix { .. }))
            ));
        }
    }

    #[test]
    fn test_bad_digit_count() {
        for bytes in [&b"#0"[..], b"#A123", b"# 12", b"#:"] {
            let (result, _) = decode_in_pieces(bytes, 2);
            assert!(matches!(
                result,
                Err(HeaderError::Framing(FramingError::InvalidPrefix { .. }))
            ));
        }
    }

    #[test]
    fn test_zero_digit_count_reports_raw_bytes() {
        let mut transport = ScriptedTransport::new().data(b"#0");
        let mut decoder = BlockHeaderDecoder::new();
        transport.tick();
        let err = decoder.poll(&mut transport).unwrap_err();
        assert_eq!(err.to_string(), "Received invalid data block header '#0'");
    }

    #[test]
    fn test_non_numeric_length() {
        for bytes in [&b"#4 100"[..], b"#4+100", b"#412a4", b"#2-1"] {
            let (result, _) = decode_in_pieces(bytes, 1);
            assert!(matches!(
                result,
                Err(HeaderError::Framing(FramingError::InvalidLength { .. }))
            ));
        }
    }

    #[test]
    fn test_read_error_propagates() {
        let mut transport = ScriptedTransport::new().data(b"#").read_error();
        let mut decoder = BlockHeaderDecoder::new();
        transport.tick();
        assert!(decoder.poll(&mut transport).unwrap().is_none());
        transport.tick();
        assert!(matches!(
            decoder.poll(&mut transport),
            Err(HeaderError::Transport(_))
        ));
    }
}
