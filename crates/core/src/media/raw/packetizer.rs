use std::time::Instant;

use rand::RngExt;

use super::{LINE_HEADER_LEN, LineGeometry, LineHeader};
use crate::media::rtp::{RTP_HEADER_LEN, RtpSequencer, VIDEO_CLOCK_RATE};

/// Splits raw frames into scanline RTP packets.
///
/// Each scanline becomes one packet, or several when it does not fit in
/// `mtu - 6` bytes. Fragments are cut on pixel-group boundaries and carry
/// the continuation bit on all but the last fragment of a line.
///
/// The timestamp comes from a monotonic 90 kHz clock sampled once per
/// frame, offset by a random base (RFC 3550 §5.1).
#[derive(Debug)]
pub struct RawPacketizer {
    rtp: RtpSequencer,
    mtu: usize,
    epoch: Instant,
    timestamp_base: u32,
    last_timestamp: Option<u32>,
}

impl RawPacketizer {
    /// Create with explicit payload type, SSRC and initial sequence.
    pub fn new(pt: u8, ssrc: u32, sequence: u16, mtu: usize) -> Self {
        Self {
            rtp: RtpSequencer::new(pt, ssrc, sequence),
            mtu,
            epoch: Instant::now(),
            timestamp_base: 0,
            last_timestamp: None,
        }
    }

    /// Create with random SSRC, initial sequence and timestamp base.
    pub fn with_random_ssrc(pt: u8, mtu: usize) -> Self {
        Self {
            rtp: RtpSequencer::random(pt),
            mtu,
            epoch: Instant::now(),
            timestamp_base: rand::rng().random::<u32>(),
            last_timestamp: None,
        }
    }

    pub fn ssrc(&self) -> u32 {
        self.rtp.ssrc()
    }

    /// Sequence number of the next packet.
    pub fn next_sequence(&self) -> u16 {
        self.rtp.next_sequence()
    }

    /// Largest segment that fits one packet, rounded down to whole pixel groups.
    fn max_segment(&self, group_bytes: usize) -> usize {
        let room = self.mtu.saturating_sub(LINE_HEADER_LEN).max(group_bytes);
        (room / group_bytes * group_bytes).max(group_bytes)
    }

    /// Sample the 90 kHz clock. Consecutive frames never share a timestamp.
    fn sample_clock(&mut self) -> u32 {
        let ticks = self.epoch.elapsed().as_micros() * VIDEO_CLOCK_RATE as u128 / 1_000_000;
        let mut timestamp = self.timestamp_base.wrapping_add(ticks as u32);
        if self.last_timestamp == Some(timestamp) {
            timestamp = timestamp.wrapping_add(1);
        }
        self.last_timestamp = Some(timestamp);
        timestamp
    }

    /// Packetize one frame. `frame` must hold exactly `geometry.frame_size()` bytes.
    pub fn packetize(&mut self, frame: &[u8], geometry: &LineGeometry) -> Vec<Vec<u8>> {
        debug_assert_eq!(frame.len(), geometry.frame_size());

        let timestamp = self.sample_clock();
        self.rtp.begin_frame(timestamp);

        let segment = self.max_segment(geometry.group_bytes);
        let mut packets = Vec::with_capacity(geometry.lines * geometry.line_bytes.div_ceil(segment));

        for (line, scanline) in frame.chunks_exact(geometry.line_bytes).enumerate() {
            let last_line = line + 1 == geometry.lines;
            let mut offset = 0usize;

            while offset < scanline.len() {
                let len = segment.min(scanline.len() - offset);
                let continuation = offset + len < scanline.len();
                let marker = last_line && !continuation;

                let line_header = LineHeader {
                    length: len as u16,
                    field: false,
                    continuation,
                    line: line as u16,
                    offset: offset as u16,
                };

                let mut packet = Vec::with_capacity(RTP_HEADER_LEN + LINE_HEADER_LEN + len);
                self.rtp.append_header(&mut packet, marker);
                packet.extend_from_slice(&line_header.write());
                packet.extend_from_slice(&scanline[offset..offset + len]);
                packets.push(packet);

                offset += len;
            }
        }

        tracing::trace!(
            rtp_packets = packets.len(),
            frame_bytes = frame.len(),
            seq = self.rtp.next_sequence(),
            ts = timestamp,
            "frame packetized"
        );

        packets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::raw::LineHeader;
    use crate::media::rtp::RtpPacket;
    use crate::stream::{ColourspaceType, Resolution};

    fn geometry(height: u32, width: u32, cs: ColourspaceType) -> LineGeometry {
        LineGeometry::new(Resolution::new(height, width), cs).unwrap()
    }

    #[test]
    fn one_packet_per_short_line() {
        let g = geometry(4, 8, ColourspaceType::Rgb24);
        let mut p = RawPacketizer::new(96, 0x1234, 100, 1400);
        let packets = p.packetize(&vec![7u8; g.frame_size()], &g);
        assert_eq!(packets.len(), 4);

        for (i, pkt) in packets.iter().enumerate() {
            let rtp = RtpPacket::parse(pkt).unwrap();
            let (line, data) = LineHeader::parse(rtp.payload).unwrap();
            assert_eq!(line.line as usize, i);
            assert_eq!(line.offset, 0);
            assert!(!line.continuation);
            assert_eq!(data.len(), 24);
            assert_eq!(rtp.marker, i == 3);
        }
    }

    #[test]
    fn long_lines_fragment_on_pixel_groups() {
        let g = geometry(2, 640, ColourspaceType::Rgb24);
        let mut p = RawPacketizer::new(96, 0x1234, 0, 1400);
        let packets = p.packetize(&vec![0u8; g.frame_size()], &g);

        // 1920-byte lines with a 1392-byte segment limit: 1392 + 528
        assert_eq!(packets.len(), 4);
        let first = RtpPacket::parse(&packets[0]).unwrap();
        let (h0, d0) = LineHeader::parse(first.payload).unwrap();
        assert!(h0.continuation);
        assert_eq!(d0.len() % 3, 0);
        assert_eq!(d0.len(), 1392);

        let second = RtpPacket::parse(&packets[1]).unwrap();
        let (h1, d1) = LineHeader::parse(second.payload).unwrap();
        assert!(!h1.continuation);
        assert_eq!(h1.offset as usize, 1392);
        assert_eq!(d1.len(), 528);
        assert!(packets.iter().all(|p| p.len() <= RTP_HEADER_LEN + 1400));
    }

    #[test]
    fn sequence_consecutive_and_marker_last() {
        let g = geometry(16, 640, ColourspaceType::Yuv422);
        let mut p = RawPacketizer::new(96, 0x1234, u16::MAX - 3, 1400);
        let packets = p.packetize(&vec![0u8; g.frame_size()], &g);

        let parsed: Vec<_> = packets.iter().map(|p| RtpPacket::parse(p).unwrap()).collect();
        for pair in parsed.windows(2) {
            assert_eq!(pair[1].sequence, pair[0].sequence.wrapping_add(1));
            assert_eq!(pair[1].timestamp, pair[0].timestamp);
        }
        let markers = parsed.iter().filter(|p| p.marker).count();
        assert_eq!(markers, 1);
        assert!(parsed.last().unwrap().marker);
    }

    #[test]
    fn frames_get_distinct_timestamps() {
        let g = geometry(1, 4, ColourspaceType::Mono8);
        let mut p = RawPacketizer::with_random_ssrc(96, 1400);
        let a = RtpPacket::parse(&p.packetize(&[0; 4], &g)[0]).unwrap().timestamp;
        let b = RtpPacket::parse(&p.packetize(&[0; 4], &g)[0]).unwrap().timestamp;
        assert_ne!(a, b);
    }
}
