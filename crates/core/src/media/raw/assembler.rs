use std::collections::HashSet;

use super::{LineGeometry, LineHeader};
use crate::error::Result;
use crate::media::rtp::RtpPacket;

/// Result of the packet that completed a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletedFrame {
    pub timestamp: u32,
    /// Every segment of the frame was written before the marker arrived.
    pub complete: bool,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    timestamp: u32,
    bytes: usize,
}

/// Reassembles scanline packets into a single frame buffer.
///
/// Rules:
/// - Packets are grouped by RTP timestamp. A new timestamp starts a new
///   frame and abandons any partial one; only one frame is ever in flight.
/// - Segments are written at their absolute offset, so reordering inside
///   a frame is harmless.
/// - One missing sequence number is tolerated. A larger forward jump
///   inside the in-flight frame abandons it and skips the rest of that
///   timestamp. A jump that lands on a new timestamp starts the new frame
///   from that packet.
/// - The marker packet delivers the frame even when bytes are missing;
///   gaps keep whatever the buffer held before. Repeated segments count
///   once towards completeness.
#[derive(Debug)]
pub struct FrameAssembler {
    geometry: LineGeometry,
    buffer: Vec<u8>,
    current: Option<InFlight>,
    /// `(line, offset)` of every segment written for the in-flight frame.
    segments: HashSet<(u16, u16)>,
    last_sequence: Option<u16>,
    /// Timestamp whose remaining packets are ignored (delivered or damaged).
    skip_timestamp: Option<u32>,
}

impl FrameAssembler {
    pub fn new(geometry: LineGeometry) -> Self {
        Self {
            buffer: vec![0; geometry.frame_size()],
            geometry,
            current: None,
            segments: HashSet::new(),
            last_sequence: None,
            skip_timestamp: None,
        }
    }

    /// The frame buffer. Holds the last delivered frame after a completion.
    pub fn frame(&self) -> &[u8] {
        &self.buffer
    }

    /// Feed one datagram. Malformed packets return an error and leave the
    /// state untouched.
    pub fn push(&mut self, datagram: &[u8]) -> Result<Option<CompletedFrame>> {
        let packet = RtpPacket::parse(datagram)?;
        let (line, data) = LineHeader::parse(packet.payload)?;

        if !self.check_sequence(packet.sequence, packet.timestamp) {
            return Ok(None);
        }

        if self.skip_timestamp == Some(packet.timestamp) {
            return Ok(None);
        }

        let mut current = match self.current {
            Some(frame) if frame.timestamp == packet.timestamp => frame,
            previous => {
                if let Some(partial) = previous {
                    tracing::debug!(
                        timestamp = partial.timestamp,
                        bytes = partial.bytes,
                        "partial frame abandoned for newer timestamp"
                    );
                }
                self.skip_timestamp = None;
                self.segments.clear();
                InFlight {
                    timestamp: packet.timestamp,
                    bytes: 0,
                }
            }
        };

        let line_no = line.line as usize;
        let end = line.offset as usize + data.len();
        if line_no < self.geometry.lines && end <= self.geometry.line_bytes {
            let start = line_no * self.geometry.line_bytes + line.offset as usize;
            self.buffer[start..start + data.len()].copy_from_slice(data);
            if self.segments.insert((line.line, line.offset)) {
                current.bytes += data.len();
            }
        } else {
            tracing::debug!(
                line = line_no,
                offset = line.offset,
                len = data.len(),
                "segment outside frame dropped"
            );
        }

        if packet.marker {
            self.current = None;
            self.skip_timestamp = Some(current.timestamp);
            let complete = current.bytes >= self.geometry.frame_size();
            if !complete {
                tracing::debug!(
                    timestamp = current.timestamp,
                    received = current.bytes,
                    expected = self.geometry.frame_size(),
                    "delivering incomplete frame"
                );
            }
            return Ok(Some(CompletedFrame {
                timestamp: current.timestamp,
                complete,
            }));
        }

        self.current = Some(current);
        Ok(None)
    }

    /// Track the sequence number. Returns false when the packet must be
    /// ignored because the stream is resynchronizing.
    fn check_sequence(&mut self, sequence: u16, timestamp: u32) -> bool {
        let Some(last) = self.last_sequence else {
            self.last_sequence = Some(sequence);
            return true;
        };

        let distance = sequence.wrapping_sub(last);
        match distance {
            // Duplicate or late (reordered) packet: write it, keep the high-water mark.
            0 => true,
            d if d >= 0x8000 => true,
            1 | 2 => {
                if distance == 2 {
                    tracing::trace!(expected = last.wrapping_add(1), got = sequence, "single packet lost");
                }
                self.last_sequence = Some(sequence);
                true
            }
            _ => {
                self.last_sequence = Some(sequence);
                let damaged = self.current.is_some_and(|frame| frame.timestamp == timestamp)
                    || self.skip_timestamp == Some(timestamp);
                tracing::debug!(
                    expected = last.wrapping_add(1),
                    got = sequence,
                    timestamp,
                    damaged,
                    "sequence gap, resynchronizing"
                );
                self.current = None;
                self.segments.clear();
                if damaged {
                    self.skip_timestamp = Some(timestamp);
                    return false;
                }
                // The loss ended the previous frame; this packet opens a new one.
                self.skip_timestamp = None;
                true
            }
        }
    }
}
