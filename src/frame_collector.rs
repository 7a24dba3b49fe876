use polars::prelude::*;

use crate::channel::{ChannelDescriptor, POD_WIDTH};
use crate::packet::{Packet, PacketSink};

const SAMPLE_COLUMN_NAME: &str = "sample";

/// All samples received between one `FrameBegin`/`FrameEnd` pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapturedFrame {
    /// Volts per analog channel, in transfer order.
    pub analog: Vec<(ChannelDescriptor, Vec<f32>)>,
    /// Raw bytes per pod (1 or 2), in transfer order.
    pub logic: Vec<(u8, Vec<u8>)>,
}

impl CapturedFrame {
    pub fn is_empty(&self) -> bool {
        self.analog.is_empty() && self.logic.is_empty()
    }

    fn analog_mut(&mut self, channel: ChannelDescriptor) -> &mut Vec<f32> {
        let position = match self.analog.iter().position(|(c, _)| *c == channel) {
            Some(position) => position,
            None => {
                self.analog.push((channel, Vec::new()));
                self.analog.len() - 1
            }
        };
        &mut self.analog[position].1
    }

    fn logic_mut(&mut self, pod: u8) -> &mut Vec<u8> {
        let position = match self.logic.iter().position(|(p, _)| *p == pod) {
            Some(position) => position,
            None => {
                self.logic.push((pod, Vec::new()));
                self.logic.len() - 1
            }
        };
        &mut self.logic[position].1
    }

    /// Tabulate the frame: a `sample` index, one `Float32` column per
    /// analog channel and one boolean column per digital bit.
    ///
    /// Fails if the channels delivered different sample counts.
    pub fn to_dataframe(&self) -> Result<DataFrame, PolarsError> {
        let mut columns: Vec<Column> = Vec::new();

        for (channel, values) in &self.analog {
            let column: Column = Series::new(channel.name().into(), values.as_slice()).into();
            columns.push(column);
        }

        for (pod, bytes) in &self.logic {
            let first_bit = (*pod as usize).saturating_sub(1) * POD_WIDTH;
            for bit in 0..POD_WIDTH {
                let values: Vec<bool> = bytes.iter().map(|b| (b >> bit) & 1 == 1).collect();
                let column: Column =
                    Series::new(format!("D{}", first_bit + bit).into(), values).into();
                columns.push(column);
            }
        }

        DataFrame::new(columns)?
            .lazy()
            .with_row_index(SAMPLE_COLUMN_NAME, Some(0))
            .collect()
    }
}

/// Packet sink that assembles complete frames.
#[derive(Debug, Default)]
pub struct FrameCollector {
    current: Option<CapturedFrame>,
    frames: Vec<CapturedFrame>,
}

impl FrameCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames closed so far.
    pub fn frames(&self) -> &[CapturedFrame] {
        &self.frames
    }

    /// Remove and return the frames closed so far.
    pub fn take_frames(&mut self) -> Vec<CapturedFrame> {
        std::mem::take(&mut self.frames)
    }

    pub fn in_frame(&self) -> bool {
        self.current.is_some()
    }
}

impl PacketSink for FrameCollector {
    fn send(&mut self, packet: Packet<'_>) {
        match packet {
            Packet::FrameBegin => {
                if self.current.replace(CapturedFrame::default()).is_some() {
                    log::warn!("Frame begin while a frame was open, discarding the open frame");
                }
            }
            Packet::FrameEnd => match self.current.take() {
                Some(frame) => self.frames.push(frame),
                None => log::warn!("Frame end without a frame"),
            },
            Packet::Analog(analog) => match self.current.as_mut() {
                Some(frame) => frame.analog_mut(analog.channel).extend_from_slice(analog.values),
                None => log::warn!("Dropping analog samples outside of a frame"),
            },
            Packet::Logic(logic) => match self.current.as_mut() {
                Some(frame) => frame.logic_mut(logic.channel.pod()).extend_from_slice(logic.data),
                None => log::warn!("Dropping logic samples outside of a frame"),
            },
        }
    }
}
