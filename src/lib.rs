//! # SCPI Block Acquisition
//!
//! A Rust library for pulling waveform data out of SCPI oscilloscopes that
//! transfer samples as IEEE 488.2 definite-length binary blocks.
//!
//! The library drives the capture sequence (trigger, per-channel setup,
//! data request) across all enabled analog channels and digital pods, decodes
//! the `#<n><length>` block framing incrementally as bytes trickle in, and
//! turns raw sample bytes into volts using calibration constants read from
//! the instrument once per session.
//!
//! ## Features
//!
//! - **Non-blocking state machine**: [`Acquisition::on_readable`] does one step
//!   per readiness event and never waits for data
//! - **Incremental block decoding**: headers and payloads may arrive in
//!   arbitrarily small pieces
//! - **Bounded memory**: payloads are read and forwarded in fixed-size chunks
//! - **Calibrated output**: analog bytes become volts, digital pod bytes pass
//!   through untouched
//! - **Serial transport**: [`SerialScpi`] talks SCPI over `serialport`
//! - **DataFrame output**: [`FrameCollector`] gathers frames into `polars`
//!   DataFrames
//!
//! ## Examples
//!
//! ### Capturing frames over a serial link
//!
//! ```rust,no_run
//! use scpi_block_acq::{
//!     Acquisition, AcquisitionConfig, AcquisitionState, ChannelDescriptor, FrameCollector,
//!     SerialScpi,
//! };
//! use std::time::Duration;
//!
//! let mut scope = SerialScpi::open("/dev/ttyUSB0", 115_200)?;
//! let channels: Vec<ChannelDescriptor> = ["CH1", "CH2", "D0"]
//!     .iter()
//!     .map(|name| name.parse())
//!     .collect::<Result<_, _>>()?;
//!
//! let mut acquisition = Acquisition::new(&channels, AcquisitionConfig::default().with_frame_limit(3))?;
//! let mut collector = FrameCollector::new();
//!
//! acquisition.start(&mut scope, &mut collector)?;
//! while acquisition.state() != AcquisitionState::Idle {
//!     acquisition.on_readable(&mut scope, &mut collector)?;
//!     std::thread::sleep(Duration::from_millis(1));
//! }
//!
//! for frame in collector.frames() {
//!     println!("{}", frame.to_dataframe()?);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Consuming packets directly
//!
//! Any `FnMut(Packet)` closure is a [`PacketSink`]:
//!
//! ```rust
//! use scpi_block_acq::{Packet, PacketSink};
//!
//! let mut volts = Vec::new();
//! let mut sink = |packet: Packet<'_>| {
//!     if let Packet::Analog(analog) = packet {
//!         volts.extend_from_slice(analog.values);
//!     }
//! };
//! sink.send(Packet::FrameBegin);
//! sink.send(Packet::FrameEnd);
//! assert!(volts.is_empty());
//! ```

pub mod acquisition;
pub mod block_header;
pub mod block_reader;
pub mod channel;
pub mod frame_collector;
pub mod packet;
pub mod sample_converter;
mod sequencer;
pub mod serial_scpi;
pub mod transport;

#[cfg(test)]
mod test_support;

// Re-export the main types for convenience
pub use acquisition::{
    Acquisition, AcquisitionConfig, AcquisitionError, AcquisitionState, ACQ_BUFFER_SIZE,
};

pub use block_header::{BlockHeader, BlockHeaderDecoder, FramingError, HeaderError};

pub use block_reader::BlockReader;

pub use channel::{enabled_sequence, ChannelDescriptor, ChannelKind, ChannelParseError, WaveformSource};

pub use frame_collector::{CapturedFrame, FrameCollector};

pub use packet::{AnalogPacket, LogicPacket, Packet, PacketSink, Unit};

pub use sample_converter::{convert_analog, convert_logic, CalibrationSet};

pub use serial_scpi::SerialScpi;

pub use transport::{ScpiTransport, TransportError};
