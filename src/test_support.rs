//! Fakes shared by the unit tests.

use std::collections::{HashMap, VecDeque};

use crate::channel::ChannelDescriptor;
use crate::packet::{Packet, PacketSink};
use crate::transport::{ScpiTransport, TransportError};

enum Arrival {
    Bytes(Vec<u8>),
    Failure,
}

/// A transport whose data only becomes readable when the test calls
/// [`ScriptedTransport::tick`], one scripted arrival per tick.
#[derive(Default)]
pub struct ScriptedTransport {
    answers: HashMap<String, String>,
    failing_sends: Vec<String>,
    manual_replies: Vec<String>,
    arrivals: VecDeque<Arrival>,
    available: VecDeque<u8>,
    failing: bool,
    sent: Vec<String>,
    requested: Vec<usize>,
    read_begins: usize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default().answer("*OPC?", "1")
    }

    pub fn answer(mut self, command: &str, response: &str) -> Self {
        self.answers.insert(command.to_string(), response.to_string());
        self
    }

    pub fn failing_send(mut self, command: &str) -> Self {
        self.failing_sends.push(command.to_string());
        self
    }

    /// Do not queue the reply to `command` when it is sent; the test scripts
    /// it as data arrivals instead.
    pub fn manual_reply(mut self, command: &str) -> Self {
        self.manual_replies.push(command.to_string());
        self
    }

    /// Script one arrival carrying all of `bytes`.
    pub fn data(mut self, bytes: &[u8]) -> Self {
        self.arrivals.push_back(Arrival::Bytes(bytes.to_vec()));
        self
    }

    pub fn data_in_pieces(mut self, bytes: &[u8], piece: usize) -> Self {
        for chunk in bytes.chunks(piece.max(1)) {
            self.arrivals.push_back(Arrival::Bytes(chunk.to_vec()));
        }
        self
    }

    /// Script an arrival after which reads fail once the readable bytes
    /// are used up.
    pub fn read_error(mut self) -> Self {
        self.arrivals.push_back(Arrival::Failure);
        self
    }

    /// Make the next scripted arrival readable.
    pub fn tick(&mut self) {
        match self.arrivals.pop_front() {
            Some(Arrival::Bytes(bytes)) => self.available.extend(bytes),
            Some(Arrival::Failure) => self.failing = true,
            None => {}
        }
    }

    pub fn has_pending_arrivals(&self) -> bool {
        !self.arrivals.is_empty()
    }

    pub fn sent(&self) -> &[String] {
        &self.sent
    }

    pub fn sent_count(&self, command: &str) -> usize {
        self.sent.iter().filter(|c| c.as_str() == command).count()
    }

    /// Sizes of every `read_data` request, in order.
    pub fn requested(&self) -> &[usize] {
        &self.requested
    }

    pub fn read_begins(&self) -> usize {
        self.read_begins
    }

    pub fn available(&self) -> usize {
        self.available.len()
    }
}

impl ScriptedTransport {
    fn record(&mut self, command: &str) -> Result<(), TransportError> {
        self.sent.push(command.to_string());
        if self.failing_sends.iter().any(|c| c == command) {
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}

/// Reply to `command`, falling back to its last `;`-separated part so that
/// `:DIGitize;*OPC?` is answered like `*OPC?`.
fn lookup(answers: &HashMap<String, String>, command: &str) -> Option<String> {
    answers
        .get(command)
        .or_else(|| command.rsplit(';').next().and_then(|last| answers.get(last)))
        .cloned()
}

impl ScpiTransport for ScriptedTransport {
    /// Queries written with a plain `send` get their reply line queued
    /// behind the bytes already readable.
    fn send(&mut self, command: &str) -> Result<(), TransportError> {
        self.record(command)?;
        if command.ends_with('?') && !self.manual_replies.iter().any(|c| c == command) {
            if let Some(reply) = lookup(&self.answers, command) {
                self.available.extend(reply.bytes());
                self.available.push_back(b'\n');
            }
        }
        Ok(())
    }

    fn read_begin(&mut self) -> Result<(), TransportError> {
        self.read_begins += 1;
        Ok(())
    }

    fn read_data(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.requested.push(buf.len());
        if self.failing && self.available.is_empty() {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "scripted read failure",
            )));
        }
        let n = buf.len().min(self.available.len());
        for (slot, byte) in buf.iter_mut().zip(self.available.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn read_complete(&mut self) -> bool {
        self.available.is_empty() && self.arrivals.is_empty()
    }

    fn query(&mut self, command: &str) -> Result<String, TransportError> {
        self.record(command)?;
        lookup(&self.answers, command).ok_or_else(|| TransportError::Timeout {
            command: command.to_string(),
            partial: String::new(),
        })
    }
}

/// A line-oriented instrument: every reply line and every data block is
/// appended to one byte stream, which queries and block reads share.
#[derive(Default)]
pub struct LineScope {
    answers: HashMap<String, String>,
    blocks: VecDeque<Vec<u8>>,
    stream: VecDeque<u8>,
    sent: Vec<String>,
}

impl LineScope {
    pub fn new() -> Self {
        Self::default().answer("*OPC?", "1")
    }

    pub fn answer(mut self, command: &str, response: &str) -> Self {
        self.answers.insert(command.to_string(), response.to_string());
        self
    }

    /// Queue the block returned by the next `:WAV:DATA?`.
    pub fn block(mut self, payload: &[u8]) -> Self {
        self.blocks.push_back(block(payload));
        self
    }

    pub fn sent_count(&self, command: &str) -> usize {
        self.sent.iter().filter(|c| c.as_str() == command).count()
    }

    pub fn pending(&self) -> usize {
        self.stream.len()
    }
}

impl ScpiTransport for LineScope {
    fn send(&mut self, command: &str) -> Result<(), TransportError> {
        self.sent.push(command.to_string());
        if command == ":WAV:DATA?" {
            if let Some(bytes) = self.blocks.pop_front() {
                self.stream.extend(bytes);
            }
        } else if command.ends_with('?') {
            if let Some(reply) = lookup(&self.answers, command) {
                self.stream.extend(reply.bytes());
                self.stream.push_back(b'\n');
            }
        }
        Ok(())
    }

    fn read_begin(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn read_data(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let n = buf.len().min(self.stream.len());
        for (slot, byte) in buf.iter_mut().zip(self.stream.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn read_complete(&mut self) -> bool {
        self.stream.is_empty()
    }

    fn query(&mut self, command: &str) -> Result<String, TransportError> {
        self.send(command)?;
        let Some(end) = self.stream.iter().position(|b| *b == b'\n') else {
            return Err(TransportError::Timeout {
                command: command.to_string(),
                partial: String::from_utf8_lossy(&self.stream.iter().copied().collect::<Vec<_>>())
                    .to_string(),
            });
        };
        let line: Vec<u8> = self.stream.drain(..=end).collect();
        Ok(String::from_utf8(line[..end].to_vec())?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    FrameBegin,
    FrameEnd,
    Analog {
        channel: ChannelDescriptor,
        values: Vec<f32>,
        significant_digits: i32,
    },
    Logic {
        channel: ChannelDescriptor,
        data: Vec<u8>,
    },
}

/// Sink that keeps an owned copy of every packet.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub packets: Vec<Recorded>,
}

impl RecordingSink {
    pub fn count(&self, wanted: &Recorded) -> usize {
        self.packets.iter().filter(|p| *p == wanted).count()
    }

    /// Channels of the data packets, consecutive repeats collapsed.
    pub fn transfer_order(&self) -> Vec<ChannelDescriptor> {
        let mut order: Vec<ChannelDescriptor> = Vec::new();
        for packet in &self.packets {
            let channel = match packet {
                Recorded::Analog { channel, .. } | Recorded::Logic { channel, .. } => *channel,
                Recorded::FrameBegin | Recorded::FrameEnd => continue,
            };
            if order.last() != Some(&channel) {
                order.push(channel);
            }
        }
        order
    }
}

impl PacketSink for RecordingSink {
    fn send(&mut self, packet: Packet<'_>) {
        self.packets.push(match packet {
            Packet::FrameBegin => Recorded::FrameBegin,
            Packet::FrameEnd => Recorded::FrameEnd,
            Packet::Analog(analog) => Recorded::Analog {
                channel: analog.channel,
                values: analog.values.to_vec(),
                significant_digits: analog.significant_digits,
            },
            Packet::Logic(logic) => Recorded::Logic {
                channel: logic.channel,
                data: logic.data.to_vec(),
            },
        });
    }
}

/// Encode `payload` as a definite-length block with its trailing linefeed.
pub fn block(payload: &[u8]) -> Vec<u8> {
    let digits = payload.len().to_string();
    let mut bytes = format!("#{}{}", digits.len(), digits).into_bytes();
    bytes.extend_from_slice(payload);
    bytes.push(b'\n');
    bytes
}
