use crate::channel::ChannelDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Volt,
}

/// Calibrated samples from one chunk of an analog channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalogPacket<'a> {
    pub channel: ChannelDescriptor,
    pub values: &'a [f32],
    pub unit: Unit,
    /// Display precision derived from the channel's vertical increment.
    pub significant_digits: i32,
}

/// Raw pod bytes from one chunk of a digital transfer, one byte per sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicPacket<'a> {
    pub channel: ChannelDescriptor,
    pub data: &'a [u8],
    pub unit_size: usize,
}

/// Everything the acquisition hands downstream.
///
/// Data packets borrow the acquisition's reusable buffers and are only valid
/// for the duration of [`PacketSink::send`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Packet<'a> {
    FrameBegin,
    FrameEnd,
    Analog(AnalogPacket<'a>),
    Logic(LogicPacket<'a>),
}

pub trait PacketSink {
    fn send(&mut self, packet: Packet<'_>);
}

impl<F> PacketSink for F
where
    F: FnMut(Packet<'_>),
{
    fn send(&mut self, packet: Packet<'_>) {
        self(packet);
    }
}
