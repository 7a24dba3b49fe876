//! Channel and frame sequencing for [`Acquisition`].
//!
//! A frame is one sweep over the enabled channels. Each channel transfer
//! selects the waveform source, performs one-time setup during the first
//! frame of a session, asks for the byte count and requests the data.

use crate::acquisition::{Acquisition, AcquisitionError, AcquisitionState};
use crate::packet::PacketSink;
use crate::sample_converter::CalibrationSet;
use crate::transport::{ScpiTransport, TransportError};

const CMD_DIGITIZE: &str = ":DIGitize;*OPC?";
const CMD_FORMAT_BYTE: &str = ":WAV:FORM BYTE";
const CMD_POINTS_MODE_NORMAL: &str = ":WAV:POIN:MODE NORM";
// Required for digital data
const CMD_UNSIGNED_ON: &str = ":WAV:UNS ON";
const CMD_POINTS: &str = ":WAV:POIN?";
const CMD_DATA: &str = ":WAV:DATA?";

/// Longest reply line accepted for the trigger's `*OPC?`.
const MAX_TRIGGER_REPLY: usize = 16;

fn configure<T: ScpiTransport + ?Sized>(
    transport: &mut T,
    command: &str,
) -> Result<(), AcquisitionError> {
    transport
        .config_set(command)
        .map_err(|source| AcquisitionError::Config {
            command: command.to_string(),
            source,
        })
}

impl Acquisition {
    fn is_first_frame(&self) -> bool {
        self.num_frames == 0
    }

    /// Trigger a new capture on the instrument.
    pub(crate) fn start_frame<T>(&mut self, transport: &mut T) -> Result<(), AcquisitionError>
    where
        T: ScpiTransport + ?Sized,
    {
        let limit = self.config.frame_limit;
        if limit == 0 {
            log::debug!("Starting data capture for frameset {}", self.num_frames + 1);
        } else {
            log::debug!(
                "Starting data capture for frameset {} of {}",
                self.num_frames + 1,
                limit
            );
        }

        self.trigger_reply.clear();
        transport.send(CMD_DIGITIZE)?;
        self.state = AcquisitionState::Digitizing;
        Ok(())
    }

    /// Wait for the trigger's `*OPC?` reply, then set up the first channel.
    ///
    /// The reply shares the byte stream with block data, so it is consumed
    /// here one byte at a time and never read past its linefeed. Until the
    /// whole line has arrived the acquisition stays in `Digitizing`.
    pub(crate) fn digitize_step<T>(&mut self, transport: &mut T) -> Result<(), AcquisitionError>
    where
        T: ScpiTransport + ?Sized,
    {
        let mut byte = [0u8; 1];
        loop {
            if transport.read_data(&mut byte)? == 0 {
                return Ok(());
            }
            if byte[0] == b'\n' {
                break;
            }
            self.trigger_reply.push(byte[0]);
            if self.trigger_reply.len() > MAX_TRIGGER_REPLY {
                return Err(self.trigger_failure());
            }
        }

        let reply = String::from_utf8_lossy(&self.trigger_reply).trim().to_string();
        if reply != "1" {
            return Err(self.trigger_failure());
        }
        self.trigger_reply.clear();
        log::debug!("Capture complete, reading channels");
        self.start_channel(transport)
    }

    fn trigger_failure(&mut self) -> AcquisitionError {
        let response = String::from_utf8_lossy(&self.trigger_reply).trim().to_string();
        self.trigger_reply.clear();
        AcquisitionError::Config {
            command: CMD_DIGITIZE.to_string(),
            source: TransportError::InvalidResponse {
                command: "*OPC?".to_string(),
                response,
            },
        }
    }

    /// Set up and request the transfer of the channel under the cursor.
    pub(crate) fn start_channel<T>(&mut self, transport: &mut T) -> Result<(), AcquisitionError>
    where
        T: ScpiTransport + ?Sized,
    {
        let channel = self.current_channel();
        log::debug!("Starting reading data from channel {}", channel);

        configure(transport, &format!(":WAV:SOUR {}", channel.waveform_source()))?;

        if self.is_first_frame() {
            configure(transport, CMD_FORMAT_BYTE)?;
            configure(transport, CMD_POINTS_MODE_NORMAL)?;
            configure(transport, CMD_UNSIGNED_ON)?;

            if channel.is_analog() {
                let calibration = CalibrationSet::query(transport, channel.index + 1)
                    .map_err(|(command, source)| AcquisitionError::Config { command, source })?;
                self.calibration.insert(channel.index, calibration);
            }
        }

        let points = transport
            .query_int(CMD_POINTS)
            .map_err(|source| AcquisitionError::Config {
                command: CMD_POINTS.to_string(),
                source,
            })?;
        self.channel_bytes_total =
            usize::try_from(points).map_err(|_| AcquisitionError::Config {
                command: CMD_POINTS.to_string(),
                source: TransportError::InvalidResponse {
                    command: CMD_POINTS.to_string(),
                    response: points.to_string(),
                },
            })?;
        log::debug!("Expecting {} bytes for {}", self.channel_bytes_total, channel);

        self.reset_progress();

        transport.send(CMD_DATA)?;
        transport.read_begin()?;

        self.state = AcquisitionState::ReadingData;
        Ok(())
    }

    /// Move on after the current channel has delivered all its bytes.
    pub(crate) fn finish_channel<T, S>(
        &mut self,
        transport: &mut T,
        sink: &mut S,
    ) -> Result<(), AcquisitionError>
    where
        T: ScpiTransport + ?Sized,
        S: PacketSink + ?Sized,
    {
        if !self.is_last_channel() {
            self.cursor += 1;
            return self.start_channel(transport);
        }

        log::debug!("Frame {} complete", self.num_frames + 1);
        self.close_frame_packet(sink);
        self.state = AcquisitionState::Idle;
        self.num_frames += 1;
        self.cursor = 0;

        let limit = self.config.frame_limit;
        if limit != 0 && self.num_frames >= limit {
            log::debug!("Frame limit {} reached, acquisition finished", limit);
            return Ok(());
        }

        self.start_frame(transport)?;
        self.open_frame(sink);
        Ok(())
    }
}
