//! Uncompressed video over RTP (DEF-STAN 00-82, RFC 4175-style framing).
//!
//! Every RTP packet carries exactly one scanline segment: a 6-byte line
//! header followed by the segment bytes.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |            Length             |F|C|R|       Line No           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |          Byte Offset          |         Segment data ...      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! - **Length**: bytes of segment data in this packet.
//! - **F**: field identifier (always 0, progressive).
//! - **C**: continuation, set when the scanline carries on in the next packet.
//! - **Line No**: 13-bit scanline index.
//! - **Byte Offset**: offset of the segment within its scanline.
//!
//! All packets of a frame share one RTP timestamp; the last one sets the
//! marker bit.

pub mod assembler;
pub mod depayloader;
pub mod packetizer;
pub mod payloader;

pub use assembler::{CompletedFrame, FrameAssembler};
pub use depayloader::RawDepayloader;
pub use packetizer::RawPacketizer;
pub use payloader::RawPayloader;

use crate::error::{MediaxError, Result, RtpErrorKind};
use crate::stream::{ColourspaceType, Resolution};

/// Size of the per-packet line header.
pub const LINE_HEADER_LEN: usize = 6;

/// Highest scanline index representable in the 13-bit field.
pub const MAX_LINES: u32 = 1 << 13;

const FIELD_BIT: u16 = 0x8000;
const CONTINUATION_BIT: u16 = 0x4000;
const LINE_MASK: u16 = 0x1fff;

/// Line header of one scanline segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineHeader {
    pub length: u16,
    pub field: bool,
    pub continuation: bool,
    pub line: u16,
    pub offset: u16,
}

impl LineHeader {
    pub fn write(&self) -> [u8; LINE_HEADER_LEN] {
        let mut word = self.line & LINE_MASK;
        if self.field {
            word |= FIELD_BIT;
        }
        if self.continuation {
            word |= CONTINUATION_BIT;
        }

        let mut out = [0u8; LINE_HEADER_LEN];
        out[0..2].copy_from_slice(&self.length.to_be_bytes());
        out[2..4].copy_from_slice(&word.to_be_bytes());
        out[4..6].copy_from_slice(&self.offset.to_be_bytes());
        out
    }

    /// Decode the line header at the start of an RTP payload and return it
    /// with the segment bytes it describes.
    pub fn parse(payload: &[u8]) -> Result<(Self, &[u8])> {
        let truncated = || MediaxError::Rtp {
            kind: RtpErrorKind::Truncated,
        };
        let head = payload.get(..LINE_HEADER_LEN).ok_or_else(truncated)?;

        let length = u16::from_be_bytes([head[0], head[1]]);
        let word = u16::from_be_bytes([head[2], head[3]]);
        let offset = u16::from_be_bytes([head[4], head[5]]);

        let data = payload
            .get(LINE_HEADER_LEN..LINE_HEADER_LEN + length as usize)
            .ok_or_else(truncated)?;

        Ok((
            Self {
                length,
                field: word & FIELD_BIT != 0,
                continuation: word & CONTINUATION_BIT != 0,
                line: word & LINE_MASK,
                offset,
            },
            data,
        ))
    }
}

/// How a frame buffer divides into scanlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineGeometry {
    pub lines: usize,
    pub line_bytes: usize,
    /// Segments are cut on multiples of this many bytes.
    pub group_bytes: usize,
}

impl LineGeometry {
    /// Derive the scanline layout, rejecting frames the line header cannot
    /// address.
    pub fn new(resolution: Resolution, encoding: ColourspaceType) -> Result<Self> {
        if encoding.is_compressed() {
            return Err(MediaxError::InvalidStreamInfo(format!(
                "{encoding} is compressed and cannot be sent as raw scanlines"
            )));
        }
        let frame_size = encoding.frame_size(resolution.height, resolution.width);
        if frame_size == 0 {
            return Err(MediaxError::InvalidStreamInfo(format!(
                "{encoding} has no raw frame layout"
            )));
        }
        if resolution.height > MAX_LINES {
            return Err(MediaxError::InvalidStreamInfo(format!(
                "height {} exceeds {} lines",
                resolution.height, MAX_LINES
            )));
        }

        let lines = resolution.height as usize;
        if frame_size % lines != 0 {
            return Err(MediaxError::InvalidStreamInfo(format!(
                "{encoding} frame of {frame_size} bytes does not divide into {lines} lines"
            )));
        }
        let line_bytes = frame_size / lines;
        if line_bytes > u16::MAX as usize {
            return Err(MediaxError::InvalidStreamInfo(format!(
                "scanline of {line_bytes} bytes exceeds the 16-bit offset"
            )));
        }

        Ok(Self {
            lines,
            line_bytes,
            group_bytes: encoding.pixel_group_bytes(),
        })
    }

    pub fn frame_size(&self) -> usize {
        self.lines * self.line_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_header_bits() {
        let h = LineHeader {
            length: 1392,
            field: false,
            continuation: true,
            line: 479,
            offset: 1392,
        };
        let bytes = h.write();
        assert_eq!(u16::from_be_bytes([bytes[0], bytes[1]]), 1392);
        assert_eq!(bytes[2] & 0x80, 0, "field bit clear");
        assert_eq!(bytes[2] & 0x40, 0x40, "continuation bit set");
        assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]) & 0x1fff, 479);
        assert_eq!(u16::from_be_bytes([bytes[4], bytes[5]]), 1392);
    }

    #[test]
    fn line_header_parse_returns_segment() {
        let h = LineHeader {
            length: 3,
            field: true,
            continuation: false,
            line: 8191,
            offset: 6,
        };
        let mut payload = h.write().to_vec();
        payload.extend_from_slice(&[1, 2, 3, 99]);
        let (parsed, data) = LineHeader::parse(&payload).unwrap();
        assert_eq!(parsed, h);
        assert_eq!(data, &[1, 2, 3]);
    }

    #[test]
    fn line_header_parse_rejects_short_segment() {
        let h = LineHeader {
            length: 10,
            field: false,
            continuation: false,
            line: 0,
            offset: 0,
        };
        let mut payload = h.write().to_vec();
        payload.extend_from_slice(&[0; 4]);
        assert!(LineHeader::parse(&payload).is_err());
        assert!(LineHeader::parse(&[0, 1]).is_err());
    }

    #[test]
    fn geometry_for_common_formats() {
        let g = LineGeometry::new(Resolution::new(480, 640), ColourspaceType::Rgb24).unwrap();
        assert_eq!(g.lines, 480);
        assert_eq!(g.line_bytes, 1920);
        assert_eq!(g.group_bytes, 3);

        let g = LineGeometry::new(Resolution::new(480, 640), ColourspaceType::Yuv422).unwrap();
        assert_eq!(g.line_bytes, 1280);
        assert_eq!(g.frame_size(), 640 * 480 * 2);
    }

    #[test]
    fn geometry_rejects_unaddressable_frames() {
        assert!(LineGeometry::new(Resolution::new(10000, 16), ColourspaceType::Mono8).is_err());
        assert!(LineGeometry::new(Resolution::new(4, 30000), ColourspaceType::Rgba).is_err());
        assert!(LineGeometry::new(Resolution::new(4, 4), ColourspaceType::Undefined).is_err());
    }

    #[test]
    fn geometry_rejects_compressed_encodings() {
        for encoding in [ColourspaceType::H264, ColourspaceType::H265, ColourspaceType::Jpeg] {
            assert!(matches!(
                LineGeometry::new(Resolution::new(480, 640), encoding),
                Err(MediaxError::InvalidStreamInfo(_))
            ));
        }
    }
}
