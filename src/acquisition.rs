//! The capture state machine.
//!
//! An [`Acquisition`] owns all per-session state: the ordered channel
//! sequence, the cursor into it, frame counters, cached calibration and the
//! progress of the block currently being received. It never blocks; an
//! external poll loop calls [`Acquisition::on_readable`] whenever the
//! transport may have data (or on a periodic tick), and every call does at
//! most one step of work before returning.
//!
//! ```text
//!            start()                *OPC? reply
//!   Idle ─────────────> Digitizing ─────────────────> ReadingData ──┐
//!    ^                      ^                             │  ^      │ header step,
//!    │   frame limit /      │  next frame                 │  └──────┘ chunk read,
//!    │   fatal error        └─────────────────────────────┤           next channel
//!    └────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use crate::block_header::{BlockHeaderDecoder, FramingError, HeaderError};
use crate::block_reader::BlockReader;
use crate::channel::{enabled_sequence, ChannelDescriptor, ChannelKind};
use crate::packet::{AnalogPacket, LogicPacket, Packet, PacketSink, Unit};
use crate::sample_converter::{convert_analog, convert_logic, CalibrationSet};
use crate::transport::{ScpiTransport, TransportError};

/// Size of the raw chunk buffer and the largest single payload read.
pub const ACQ_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionConfig {
    /// Number of frames to capture, 0 for no limit.
    pub frame_limit: u64,
    /// Largest payload chunk requested from the transport per step.
    pub chunk_size: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            frame_limit: 0,
            chunk_size: ACQ_BUFFER_SIZE,
        }
    }
}

impl AcquisitionConfig {
    pub fn with_frame_limit(mut self, frame_limit: u64) -> Self {
        self.frame_limit = frame_limit;
        self
    }

    /// A chunk size of zero selects [`ACQ_BUFFER_SIZE`].
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = if chunk_size == 0 {
            ACQ_BUFFER_SIZE
        } else {
            chunk_size
        };
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquisitionState {
    /// No transfer in progress.
    #[default]
    Idle,
    /// Capture triggered, waiting for the instrument to confirm it.
    Digitizing,
    /// Block header or payload of the current channel is being consumed.
    ReadingData,
}

#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration command '{command}' failed: {source}")]
    Config {
        command: String,
        #[source]
        source: TransportError,
    },

    #[error("No channels enabled for acquisition")]
    NoEnabledChannels,

    #[error("No calibration available for {channel}")]
    MissingCalibration { channel: ChannelDescriptor },

    #[error("Acquisition is already running")]
    NotIdle,
}

impl From<HeaderError> for AcquisitionError {
    fn from(e: HeaderError) -> Self {
        match e {
            HeaderError::Framing(e) => Self::Framing(e),
            HeaderError::Transport(e) => Self::Transport(e),
        }
    }
}

/// Session state of one capture.
#[derive(Debug)]
pub struct Acquisition {
    pub(crate) config: AcquisitionConfig,
    pub(crate) state: AcquisitionState,
    pub(crate) channels: Vec<ChannelDescriptor>,
    pub(crate) cursor: usize,
    pub(crate) num_frames: u64,
    pub(crate) frame_open: bool,
    pub(crate) calibration: HashMap<usize, CalibrationSet>,
    pub(crate) channel_bytes_total: usize,
    pub(crate) channel_bytes_read: usize,
    pub(crate) header: BlockHeaderDecoder,
    pub(crate) block: Option<BlockReader>,
    pub(crate) trigger_reply: Vec<u8>,
    buffer: Vec<u8>,
    data: Vec<f32>,
}

impl Acquisition {
    /// Create an idle acquisition over the enabled entries of `channels`.
    ///
    /// The transfer order is the order of `channels`, with digital bits
    /// collapsed to one transfer per pod.
    pub fn new(
        channels: &[ChannelDescriptor],
        config: AcquisitionConfig,
    ) -> Result<Self, AcquisitionError> {
        let channels = enabled_sequence(channels);
        if channels.is_empty() {
            return Err(AcquisitionError::NoEnabledChannels);
        }
        let config = config.with_chunk_size(config.chunk_size);

        Ok(Self {
            config,
            state: AcquisitionState::Idle,
            channels,
            cursor: 0,
            num_frames: 0,
            frame_open: false,
            calibration: HashMap::new(),
            channel_bytes_total: 0,
            channel_bytes_read: 0,
            header: BlockHeaderDecoder::new(),
            block: None,
            trigger_reply: Vec::new(),
            buffer: vec![0; config.chunk_size],
            data: Vec::with_capacity(config.chunk_size),
        })
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// Enabled channels in transfer order.
    pub fn channels(&self) -> &[ChannelDescriptor] {
        &self.channels
    }

    pub fn current_channel(&self) -> ChannelDescriptor {
        self.channels[self.cursor]
    }

    /// Frames closed so far in this session.
    pub fn frames_completed(&self) -> u64 {
        self.num_frames
    }

    pub fn calibration(&self, analog_index: usize) -> Option<&CalibrationSet> {
        self.calibration.get(&analog_index)
    }

    /// Bytes received and expected for the current channel.
    pub fn channel_progress(&self) -> (usize, usize) {
        (self.channel_bytes_read, self.channel_bytes_total)
    }

    /// Payload progress of the current block, `None` while awaiting a header.
    pub fn block_progress(&self) -> Option<BlockReader> {
        self.block
    }

    pub fn header_bytes_read(&self) -> usize {
        self.header.bytes_read()
    }

    /// Start a new capture session and open its first frame.
    ///
    /// Calibration from a previous session is discarded.
    pub fn start<T, S>(&mut self, transport: &mut T, sink: &mut S) -> Result<(), AcquisitionError>
    where
        T: ScpiTransport + ?Sized,
        S: PacketSink + ?Sized,
    {
        if self.state != AcquisitionState::Idle {
            return Err(AcquisitionError::NotIdle);
        }

        log::debug!(
            "Starting acquisition of {} channel(s): {:?}",
            self.channels.len(),
            self.channels.iter().map(ChannelDescriptor::name).collect::<Vec<_>>()
        );
        self.num_frames = 0;
        self.cursor = 0;
        self.calibration.clear();
        self.reset_progress();

        if let Err(e) = self.start_frame(transport) {
            return Err(self.abort(sink, e));
        }
        self.open_frame(sink);
        Ok(())
    }

    /// Abandon the capture. Nothing is drained from the transport.
    ///
    /// A frame that was open is closed with [`Packet::FrameEnd`], so the
    /// samples delivered before the stop still form a complete frame.
    pub fn stop<S: PacketSink + ?Sized>(&mut self, sink: &mut S) {
        if self.state != AcquisitionState::Idle {
            log::debug!(
                "Stopping acquisition during {} after {} frame(s)",
                self.current_channel(),
                self.num_frames
            );
        }
        self.close_frame_packet(sink);
        self.state = AcquisitionState::Idle;
        self.reset_progress();
    }

    /// Do one step of work in response to a readiness event.
    ///
    /// Fatal errors close the current frame with [`Packet::FrameEnd`], leave
    /// the acquisition idle and are returned to the caller. There is no
    /// automatic retry; a new session must be started explicitly.
    pub fn on_readable<T, S>(
        &mut self,
        transport: &mut T,
        sink: &mut S,
    ) -> Result<(), AcquisitionError>
    where
        T: ScpiTransport + ?Sized,
        S: PacketSink + ?Sized,
    {
        #[cfg(feature = "cpu-profiling")]
        let _span = tracy_client::Client::running()
            .map(|client| client.span(tracy_client::span_location!("on_readable"), 0));

        let result = match self.state {
            AcquisitionState::Idle => Ok(()),
            AcquisitionState::Digitizing => self.digitize_step(transport),
            AcquisitionState::ReadingData => self.read_step(transport, sink),
        };

        result.map_err(|e| self.abort(sink, e))
    }

    fn read_step<T, S>(&mut self, transport: &mut T, sink: &mut S) -> Result<(), AcquisitionError>
    where
        T: ScpiTransport + ?Sized,
        S: PacketSink + ?Sized,
    {
        let Some(mut block) = self.block else {
            if self.header.bytes_read() == 0 {
                log::debug!("New block header expected");
            }
            if let Some(header) = self.header.poll(transport)? {
                self.block = Some(BlockReader::new(header.declared_length));
            }
            return Ok(());
        };

        let len = block.read_chunk(transport, &mut self.buffer)?;
        self.block = Some(block);

        if len > 0 {
            self.emit_chunk(len, sink)?;
            self.channel_bytes_read += len;
        }

        if !block.is_complete() {
            return Ok(());
        }

        log::debug!("Block has been completed");
        BlockReader::discard_delimiter(transport);
        self.block = None;
        self.header.reset();

        if self.channel_bytes_read < self.channel_bytes_total {
            // More blocks follow for this channel.
            return Ok(());
        }
        if self.channel_bytes_read > self.channel_bytes_total {
            log::warn!(
                "Received {} bytes for {} but {} were announced",
                self.channel_bytes_read,
                self.current_channel(),
                self.channel_bytes_total
            );
        }
        if self.is_last_channel() && !transport.read_complete() {
            log::error!("Read should have been completed");
        }

        self.finish_channel(transport, sink)
    }

    fn emit_chunk<S>(&mut self, len: usize, sink: &mut S) -> Result<(), AcquisitionError>
    where
        S: PacketSink + ?Sized,
    {
        let channel = self.current_channel();
        let raw = &self.buffer[..len];

        match channel.kind {
            ChannelKind::Analog => {
                let calibration = *self
                    .calibration
                    .get(&channel.index)
                    .ok_or(AcquisitionError::MissingCalibration { channel })?;
                convert_analog(raw, &calibration, &mut self.data);
                sink.send(Packet::Analog(AnalogPacket {
                    channel,
                    values: &self.data,
                    unit: Unit::Volt,
                    significant_digits: calibration.significant_digits(),
                }));
            }
            ChannelKind::Digital => {
                // Only one pod is transferred at a time, so a sample is one byte.
                sink.send(Packet::Logic(LogicPacket {
                    channel,
                    data: convert_logic(raw),
                    unit_size: 1,
                }));
            }
        }
        Ok(())
    }

    pub(crate) fn is_last_channel(&self) -> bool {
        self.cursor + 1 >= self.channels.len()
    }

    pub(crate) fn open_frame<S: PacketSink + ?Sized>(&mut self, sink: &mut S) {
        sink.send(Packet::FrameBegin);
        self.frame_open = true;
    }

    pub(crate) fn close_frame_packet<S: PacketSink + ?Sized>(&mut self, sink: &mut S) {
        if self.frame_open {
            sink.send(Packet::FrameEnd);
            self.frame_open = false;
        }
    }

    pub(crate) fn reset_progress(&mut self) {
        self.channel_bytes_read = 0;
        self.header.reset();
        self.block = None;
        self.trigger_reply.clear();
    }

    fn abort<S: PacketSink + ?Sized>(&mut self, sink: &mut S, e: AcquisitionError) -> AcquisitionError {
        log::error!("{}, aborting capture.", e);
        if let Some(block) = self.block {
            log::error!(
                "Aborted {} after {} of {} block bytes ({} of {} channel bytes)",
                self.current_channel(),
                block.bytes_read(),
                block.length(),
                self.channel_bytes_read,
                self.channel_bytes_total
            );
        }
        self.close_frame_packet(sink);
        self.state = AcquisitionState::Idle;
        self.reset_progress();
        e
    }
}
