use std::fmt;
use std::str::FromStr;

/// Pixel layout or codec carried by a stream.
///
/// Raw layouts travel through the scanline payloader; compressed tags are
/// only advertised so that receivers can pick a matching depayloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColourspaceType {
    #[default]
    Undefined,
    /// Packed 8-bit R, G, B.
    Rgb24,
    /// Packed 8-bit R, G, B, A.
    Rgba,
    /// Packed 4:2:2 in UYVY order (RFC 4175 `YCbCr-4:2:2`).
    Yuv422,
    /// Planar 4:2:0.
    Yuv420p,
    /// Semi-planar 4:2:0.
    Nv12,
    /// 8-bit greyscale.
    Mono8,
    /// 16-bit big-endian greyscale.
    Mono16,
    H264,
    H265,
    Jpeg,
}

impl ColourspaceType {
    /// Average bits per pixel of one decoded frame.
    ///
    /// Compressed encodings report 24 since their payloaders consume RGB24
    /// frames.
    pub fn bits_per_pixel(self) -> u32 {
        match self {
            Self::Undefined => 0,
            Self::Rgb24 => 24,
            Self::Rgba => 32,
            Self::Yuv422 => 16,
            Self::Yuv420p | Self::Nv12 => 12,
            Self::Mono8 => 8,
            Self::Mono16 => 16,
            Self::H264 | Self::H265 | Self::Jpeg => 24,
        }
    }

    /// Size in bytes of a `height` x `width` frame in this layout.
    pub fn frame_size(self, height: u32, width: u32) -> usize {
        height as usize * width as usize * self.bits_per_pixel() as usize / 8
    }

    /// Bytes in the smallest run of pixels that can be split off a scanline.
    pub fn pixel_group_bytes(self) -> usize {
        match self {
            Self::Rgb24 => 3,
            Self::Rgba | Self::Yuv422 => 4,
            Self::Mono16 => 2,
            _ => 1,
        }
    }

    pub fn is_compressed(self) -> bool {
        matches!(self, Self::H264 | Self::H265 | Self::Jpeg)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Undefined => "UNDEFINED",
            Self::Rgb24 => "RGB24",
            Self::Rgba => "RGBA",
            Self::Yuv422 => "YUV422",
            Self::Yuv420p => "YUV420P",
            Self::Nv12 => "NV12",
            Self::Mono8 => "MONO8",
            Self::Mono16 => "MONO16",
            Self::H264 => "H264",
            Self::H265 => "H265",
            Self::Jpeg => "JPEG",
        }
    }

    /// Encoding name for the SDP `a=rtpmap` attribute.
    pub fn rtpmap_encoding(self) -> &'static str {
        match self {
            Self::H264 => "H264",
            Self::H265 => "H265",
            Self::Jpeg => "JPEG",
            _ => "raw",
        }
    }

    /// `sampling=` value of the SDP `a=fmtp` attribute (RFC 4175 §6.1).
    pub fn sdp_sampling(self) -> &'static str {
        match self {
            Self::Rgb24 => "RGB",
            Self::Rgba => "RGBA",
            Self::Yuv422 => "YCbCr-4:2:2",
            Self::Yuv420p | Self::Nv12 => "YCbCr-4:2:0",
            Self::Mono8 | Self::Mono16 => "GRAYSCALE",
            Self::H264 => "H264",
            Self::H265 => "H265",
            Self::Jpeg => "JPEG",
            Self::Undefined => "UNKNOWN",
        }
    }

    /// `depth=` value of the SDP `a=fmtp` attribute, bits per sample.
    pub fn sdp_depth(self) -> u32 {
        match self {
            Self::Mono16 => 16,
            _ => 8,
        }
    }

    /// Map an SDP `sampling`/`depth` pair back to a colourspace.
    ///
    /// Unknown sampling names yield [`ColourspaceType::Undefined`].
    pub fn from_sdp(sampling: &str, depth: u32) -> Self {
        match sampling {
            "RGB" => Self::Rgb24,
            "RGBA" => Self::Rgba,
            "YCbCr-4:2:2" => Self::Yuv422,
            "YCbCr-4:2:0" => Self::Yuv420p,
            "GRAYSCALE" if depth == 16 => Self::Mono16,
            "GRAYSCALE" => Self::Mono8,
            "H264" => Self::H264,
            "H265" => Self::H265,
            "JPEG" => Self::Jpeg,
            _ => Self::Undefined,
        }
    }
}

impl fmt::Display for ColourspaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColourspaceType {
    type Err = String;

    /// Case-insensitive; accepts the short tags (`RGB24`, `YUV422`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RGB24" | "RGB" => Ok(Self::Rgb24),
            "RGBA" => Ok(Self::Rgba),
            "YUV422" | "YUV" | "UYVY" => Ok(Self::Yuv422),
            "YUV420P" => Ok(Self::Yuv420p),
            "NV12" => Ok(Self::Nv12),
            "MONO8" => Ok(Self::Mono8),
            "MONO16" => Ok(Self::Mono16),
            "H264" => Ok(Self::H264),
            "H265" => Ok(Self::H265),
            "JPEG" | "MJPEG" => Ok(Self::Jpeg),
            other => Err(format!("unknown encoding: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_sizes() {
        assert_eq!(ColourspaceType::Rgb24.frame_size(480, 640), 640 * 480 * 3);
        assert_eq!(ColourspaceType::Yuv422.frame_size(480, 640), 640 * 480 * 2);
        assert_eq!(ColourspaceType::Yuv420p.frame_size(480, 640), 640 * 480 * 3 / 2);
        assert_eq!(ColourspaceType::Undefined.frame_size(480, 640), 0);
    }

    #[test]
    fn sdp_mapping_is_reversible_for_raw_layouts() {
        for cs in [
            ColourspaceType::Rgb24,
            ColourspaceType::Rgba,
            ColourspaceType::Yuv422,
            ColourspaceType::Yuv420p,
            ColourspaceType::Mono8,
            ColourspaceType::Mono16,
            ColourspaceType::H264,
        ] {
            assert_eq!(
                ColourspaceType::from_sdp(cs.sdp_sampling(), cs.sdp_depth()),
                cs
            );
        }
    }

    #[test]
    fn unknown_sampling_is_undefined() {
        assert_eq!(
            ColourspaceType::from_sdp("XYZ", 8),
            ColourspaceType::Undefined
        );
    }

    #[test]
    fn parse_tags() {
        assert_eq!("rgb24".parse::<ColourspaceType>(), Ok(ColourspaceType::Rgb24));
        assert_eq!("YUV".parse::<ColourspaceType>(), Ok(ColourspaceType::Yuv422));
        assert!("bogus".parse::<ColourspaceType>().is_err());
    }
}
