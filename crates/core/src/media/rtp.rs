use rand::RngExt;

use crate::error::{MediaxError, Result, RtpErrorKind};

/// Length of the fixed RTP header without CSRCs or extensions.
pub const RTP_HEADER_LEN: usize = 12;

/// RTP media clock for video (RFC 3551 §5).
pub const VIDEO_CLOCK_RATE: u32 = 90_000;

/// Per-stream RTP sender state (RFC 3550 §5.1).
///
/// Owns the sync source, the next sequence number and the timestamp of the
/// frame being sent. [`begin_frame`](Self::begin_frame) fixes the timestamp
/// shared by every packet of a frame; each
/// [`append_header`](Self::append_header) consumes one sequence number.
/// Headers are always version 2 with no padding, extension or CSRCs.
#[derive(Debug)]
pub struct RtpSequencer {
    payload_type: u8,
    ssrc: u32,
    next_sequence: u16,
    timestamp: u32,
}

impl RtpSequencer {
    pub fn new(payload_type: u8, ssrc: u32, first_sequence: u16) -> Self {
        tracing::debug!(
            payload_type,
            ssrc = format_args!("{ssrc:#010x}"),
            first_sequence,
            "rtp sender initialised"
        );
        Self {
            payload_type: payload_type & 0x7f,
            ssrc,
            next_sequence: first_sequence,
            timestamp: 0,
        }
    }

    /// Random sync source and first sequence number (RFC 3550 §8.1).
    pub fn random(payload_type: u8) -> Self {
        let mut rng = rand::rng();
        Self::new(payload_type, rng.random::<u32>(), rng.random::<u16>())
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn payload_type(&self) -> u8 {
        self.payload_type
    }

    pub fn next_sequence(&self) -> u16 {
        self.next_sequence
    }

    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    pub fn begin_frame(&mut self, timestamp: u32) {
        self.timestamp = timestamp;
    }

    /// Append a 12-byte header to `packet`. `marker` flags the final
    /// packet of the frame.
    pub fn append_header(&mut self, packet: &mut Vec<u8>, marker: bool) {
        packet.push(0x80);
        packet.push(self.payload_type | if marker { 0x80 } else { 0 });
        packet.extend_from_slice(&self.next_sequence.to_be_bytes());
        packet.extend_from_slice(&self.timestamp.to_be_bytes());
        packet.extend_from_slice(&self.ssrc.to_be_bytes());
        self.next_sequence = self.next_sequence.wrapping_add(1);
    }
}

/// A received RTP packet with its fixed header decoded.
///
/// `payload` excludes the CSRC list, any header extension and padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket<'a> {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub csrc_count: u8,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub payload: &'a [u8],
}

impl<'a> RtpPacket<'a> {
    /// Decode an RTP packet, rejecting anything but version 2.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let truncated = || MediaxError::Rtp {
            kind: RtpErrorKind::Truncated,
        };
        if data.len() < RTP_HEADER_LEN {
            return Err(truncated());
        }

        let version = data[0] >> 6;
        if version != 2 {
            return Err(MediaxError::Rtp {
                kind: RtpErrorKind::UnsupportedVersion(version),
            });
        }
        let padding = data[0] & 0x20 != 0;
        let extension = data[0] & 0x10 != 0;
        let csrc_count = data[0] & 0x0f;
        let marker = data[1] & 0x80 != 0;
        let payload_type = data[1] & 0x7f;
        let sequence = u16::from_be_bytes([data[2], data[3]]);
        let timestamp = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let ssrc = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

        let mut start = RTP_HEADER_LEN + 4 * csrc_count as usize;
        if extension {
            // 16-bit profile id, 16-bit length in 32-bit words (RFC 3550 §5.3.1)
            let ext = data.get(start..start + 4).ok_or_else(truncated)?;
            let words = u16::from_be_bytes([ext[2], ext[3]]) as usize;
            start += 4 + 4 * words;
        }
        if start > data.len() {
            return Err(truncated());
        }

        let mut end = data.len();
        if padding {
            let pad = data[end - 1] as usize;
            if pad == 0 || pad > end - start {
                return Err(MediaxError::Rtp {
                    kind: RtpErrorKind::InvalidPadding,
                });
            }
            end -= pad;
        }

        Ok(Self {
            version,
            padding,
            extension,
            csrc_count,
            marker,
            payload_type,
            sequence,
            timestamp,
            ssrc,
            payload: &data[start..end],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(rtp: &mut RtpSequencer, marker: bool) -> Vec<u8> {
        let mut buf = Vec::new();
        rtp.append_header(&mut buf, marker);
        buf
    }

    #[test]
    fn header_fields_round_trip() {
        let mut rtp = RtpSequencer::new(96, 0xAABBCCDD, 7);
        rtp.begin_frame(0x01020304);
        let mut pkt = packet(&mut rtp, true);
        assert_eq!(pkt.len(), RTP_HEADER_LEN);
        pkt.extend_from_slice(&[9, 8, 7]);

        let p = RtpPacket::parse(&pkt).unwrap();
        assert_eq!(p.version, 2);
        assert!(p.marker);
        assert!(!p.padding && !p.extension);
        assert_eq!(p.csrc_count, 0);
        assert_eq!(p.payload_type, 96);
        assert_eq!(p.sequence, 7);
        assert_eq!(p.timestamp, 0x01020304);
        assert_eq!(p.ssrc, 0xAABBCCDD);
        assert_eq!(p.payload, &[9, 8, 7]);
    }

    #[test]
    fn one_timestamp_per_frame_and_sequence_wraps() {
        let mut rtp = RtpSequencer::new(96, 1, u16::MAX);
        rtp.begin_frame(3000);
        let a = packet(&mut rtp, false);
        let b = packet(&mut rtp, true);
        let (a, b) = (RtpPacket::parse(&a).unwrap(), RtpPacket::parse(&b).unwrap());
        assert_eq!((a.sequence, b.sequence), (u16::MAX, 0));
        assert_eq!((a.timestamp, b.timestamp), (3000, 3000));
        assert!(!a.marker && b.marker);
        assert_eq!(rtp.next_sequence(), 1);
    }

    #[test]
    fn parse_rejects_short_and_wrong_version() {
        assert!(matches!(
            RtpPacket::parse(&[0x80; 5]),
            Err(MediaxError::Rtp {
                kind: RtpErrorKind::Truncated
            })
        ));
        let mut pkt = packet(&mut RtpSequencer::new(96, 1, 0), false);
        pkt[0] = 1 << 6;
        assert!(matches!(
            RtpPacket::parse(&pkt),
            Err(MediaxError::Rtp {
                kind: RtpErrorKind::UnsupportedVersion(1)
            })
        ));
    }

    #[test]
    fn parse_skips_csrc_extension_and_padding() {
        let mut pkt = packet(&mut RtpSequencer::new(96, 1, 0), false);
        pkt[0] |= 0x20 | 0x10 | 0x01; // padding, extension, one CSRC
        pkt.extend_from_slice(&[0, 0, 0, 1]); // CSRC
        pkt.extend_from_slice(&[0xBE, 0xDE, 0, 1, 1, 2, 3, 4]); // one-word extension
        pkt.extend_from_slice(&[0xAA, 0xBB]);
        pkt.extend_from_slice(&[0, 2]); // two bytes of padding
        let p = RtpPacket::parse(&pkt).unwrap();
        assert_eq!(p.payload, &[0xAA, 0xBB]);
    }

    #[test]
    fn parse_rejects_bad_padding_count() {
        let mut pkt = packet(&mut RtpSequencer::new(96, 1, 0), false);
        pkt[0] |= 0x20;
        pkt.push(0);
        assert!(matches!(
            RtpPacket::parse(&pkt),
            Err(MediaxError::Rtp {
                kind: RtpErrorKind::InvalidPadding
            })
        ));
    }

    #[test]
    fn random_senders_use_distinct_sources() {
        let a = RtpSequencer::random(96);
        let b = RtpSequencer::random(96);
        assert_ne!(a.ssrc(), b.ssrc());
        assert_eq!(a.payload_type(), 96);
    }
}
