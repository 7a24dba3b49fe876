use crate::transport::{ScpiTransport, TransportError};

/// Per-channel constants that turn raw sample bytes into volts.
///
/// Read once per session from the instrument the first time the channel is
/// transferred.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationSet {
    /// Volts per LSB (`:WAV:YINC?`).
    pub vertical_increment: f32,
    /// Volts (`:WAV:YOR?`).
    pub vertical_origin: f32,
    /// Code of the screen centre (`:WAV:YREF?`).
    pub vertical_reference: i32,
    /// Channel offset in volts (`:CHAN<n>:OFFS?`), informational only.
    pub vertical_offset: f32,
}

impl CalibrationSet {
    pub fn new(vertical_increment: f32, vertical_origin: f32, vertical_reference: i32) -> Self {
        Self {
            vertical_increment,
            vertical_origin,
            vertical_reference,
            vertical_offset: 0.0,
        }
    }

    pub fn with_offset(mut self, vertical_offset: f32) -> Self {
        self.vertical_offset = vertical_offset;
        self
    }

    /// Query the waveform constants for the currently selected source.
    ///
    /// `channel_number` is one-based and only used for the offset query.
    pub fn query<T: ScpiTransport + ?Sized>(
        transport: &mut T,
        channel_number: usize,
    ) -> Result<Self, (String, TransportError)> {
        let ask_float = |transport: &mut T, command: String| {
            transport.query_float(&command).map_err(|e| (command, e))
        };

        let vertical_increment = ask_float(&mut *transport, ":WAV:YINC?".to_string())?;
        let vertical_origin = ask_float(&mut *transport, ":WAV:YOR?".to_string())?;
        let vertical_reference = transport
            .query_int(":WAV:YREF?")
            .map_err(|e| (":WAV:YREF?".to_string(), e))?;
        let vertical_offset = ask_float(&mut *transport, format!(":CHAN{channel_number}:OFFS?"))?;

        let calibration = Self {
            vertical_increment,
            vertical_origin,
            vertical_reference,
            vertical_offset,
        };
        if !(vertical_increment.is_finite() && vertical_increment > 0.0) {
            log::warn!(
                "CH{} reports vertical increment {}, samples will not scale",
                channel_number,
                vertical_increment
            );
        }
        log::debug!("CH{} calibration: {:?}", channel_number, calibration);
        Ok(calibration)
    }

    pub fn to_volts(&self, raw: u8) -> f32 {
        ((i32::from(raw) - self.vertical_reference) as f32 - self.vertical_origin)
            * self.vertical_increment
    }

    /// Inverse of [`CalibrationSet::to_volts`], clamped to the byte range.
    pub fn to_raw(&self, volts: f32) -> u8 {
        let raw = volts / self.vertical_increment
            + self.vertical_reference as f32
            + self.vertical_origin;
        raw.round().clamp(0.0, 255.0) as u8
    }

    /// Number of decimal digits worth displaying for this channel.
    ///
    /// An increment that is not a finite positive number gives 0.
    pub fn significant_digits(&self) -> i32 {
        if !(self.vertical_increment.is_finite() && self.vertical_increment > 0.0) {
            return 0;
        }
        let log = self.vertical_increment.log10();
        -(log as i32) + i32::from(log < 0.0)
    }
}

/// Convert raw analog bytes into `out`, replacing its previous contents.
pub fn convert_analog(raw: &[u8], calibration: &CalibrationSet, out: &mut Vec<f32>) {
    out.clear();
    out.extend(raw.iter().map(|&b| calibration.to_volts(b)));
}

/// Digital pod bytes are forwarded untouched; each byte is one sample of
/// eight bit channels.
pub fn convert_logic(raw: &[u8]) -> &[u8] {
    raw
}
