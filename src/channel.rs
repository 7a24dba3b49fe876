use std::fmt;
use std::str::FromStr;

/// Number of digital bit channels grouped into one pod.
pub const POD_WIDTH: usize = 8;

/// Highest digital bit channel index (two pods).
pub const MAX_DIGITAL_CHANNELS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Analog,
    Digital,
}

/// An instrument channel as seen by the acquisition.
///
/// Analog channels are zero-based (`index` 0 is `CH1`). Digital channels are
/// bit channels `D0..D15`; each byte the instrument transfers for a pod
/// carries eight of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelDescriptor {
    pub index: usize,
    pub kind: ChannelKind,
    pub enabled: bool,
}

impl ChannelDescriptor {
    pub fn analog(index: usize) -> Self {
        Self {
            index,
            kind: ChannelKind::Analog,
            enabled: true,
        }
    }

    pub fn digital(index: usize) -> Self {
        Self {
            index,
            kind: ChannelKind::Digital,
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn is_analog(&self) -> bool {
        self.kind == ChannelKind::Analog
    }

    /// Pod number (1 or 2) holding this digital channel.
    pub fn pod(&self) -> u8 {
        if self.index < POD_WIDTH {
            1
        } else {
            2
        }
    }

    /// The `:WAV:SOUR` argument that selects this channel's data.
    pub fn waveform_source(&self) -> WaveformSource {
        match self.kind {
            ChannelKind::Analog => WaveformSource::Channel(self.index + 1),
            ChannelKind::Digital => WaveformSource::Pod(self.pod()),
        }
    }

    /// Display name, `CH1` for analog index 0 or `D3` for digital bit 3.
    pub fn name(&self) -> String {
        match self.kind {
            ChannelKind::Analog => format!("CH{}", self.index + 1),
            ChannelKind::Digital => format!("D{}", self.index),
        }
    }
}

impl fmt::Display for ChannelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChannelParseError {
    #[error("Unknown channel name '{0}' (expected CH<n> or D<n>)")]
    UnknownName(String),

    #[error("Channel index out of range in '{0}'")]
    OutOfRange(String),
}

impl FromStr for ChannelDescriptor {
    type Err = ChannelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let upper = trimmed.to_ascii_uppercase();

        let parse_index = |digits: &str| -> Result<usize, ChannelParseError> {
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ChannelParseError::UnknownName(trimmed.to_string()));
            }
            digits
                .parse::<usize>()
                .map_err(|_| ChannelParseError::OutOfRange(trimmed.to_string()))
        };

        if let Some(digits) = upper.strip_prefix("CH") {
            let number = parse_index(digits)?;
            if number == 0 {
                return Err(ChannelParseError::OutOfRange(trimmed.to_string()));
            }
            Ok(Self::analog(number - 1))
        } else if let Some(digits) = upper.strip_prefix('D') {
            let index = parse_index(digits)?;
            if index >= MAX_DIGITAL_CHANNELS {
                return Err(ChannelParseError::OutOfRange(trimmed.to_string()));
            }
            Ok(Self::digital(index))
        } else {
            Err(ChannelParseError::UnknownName(trimmed.to_string()))
        }
    }
}

/// Data source selected with `:WAV:SOUR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveformSource {
    /// One-based analog channel number.
    Channel(usize),
    /// Pod 1 carries D0-D7, pod 2 carries D8-D15.
    Pod(u8),
}

impl fmt::Display for WaveformSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel(n) => write!(f, "CHAN{n}"),
            Self::Pod(n) => write!(f, "POD{n}"),
        }
    }
}

/// Build the ordered transfer sequence from a channel list.
///
/// Disabled channels are dropped. Enabled digital channels of the same pod
/// are collapsed into one entry, placed where the pod's first enabled bit
/// appears, because the instrument only ever transfers whole pods.
pub fn enabled_sequence(channels: &[ChannelDescriptor]) -> Vec<ChannelDescriptor> {
    let mut sequence: Vec<ChannelDescriptor> = Vec::with_capacity(channels.len());

    for channel in channels.iter().filter(|c| c.enabled) {
        let duplicate = match channel.kind {
            ChannelKind::Analog => sequence
                .iter()
                .any(|c| c.is_analog() && c.index == channel.index),
            ChannelKind::Digital => sequence
                .iter()
                .any(|c| !c.is_analog() && c.pod() == channel.pod()),
        };
        if !duplicate {
            sequence.push(*channel);
        }
    }

    sequence
}
