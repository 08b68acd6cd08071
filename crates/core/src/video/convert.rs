//! CPU colourspace conversion.
//!
//! Every supported pair goes through RGB24: the source is expanded to
//! RGB24 (unless it already is) and then packed into the destination
//! format. YUV uses BT.601 limited-range coefficients. `Yuv422` is UYVY
//! (`U0 Y0 V0 Y1`); `Mono16` samples are big-endian, as sent on the wire.

use crate::error::{MediaxError, Result};
use crate::stream::{ColourspaceType, Resolution};

fn supported(format: ColourspaceType) -> bool {
    matches!(
        format,
        ColourspaceType::Rgb24
            | ColourspaceType::Rgba
            | ColourspaceType::Yuv422
            | ColourspaceType::Mono8
            | ColourspaceType::Mono16
    )
}

fn check_len(buffer: &[u8], resolution: Resolution, format: ColourspaceType) -> Result<()> {
    let expected = format.frame_size(resolution.height, resolution.width);
    if buffer.len() != expected {
        return Err(MediaxError::FrameSize {
            expected,
            actual: buffer.len(),
        });
    }
    Ok(())
}

/// Convert one frame from `src_format` to `dst_format`.
///
/// Both buffers must be exactly one frame long for their format.
pub fn convert(
    resolution: Resolution,
    src: &[u8],
    src_format: ColourspaceType,
    dst: &mut [u8],
    dst_format: ColourspaceType,
) -> Result<()> {
    if !supported(src_format) || !supported(dst_format) {
        return Err(MediaxError::UnsupportedConversion {
            from: src_format,
            to: dst_format,
        });
    }
    if (src_format == ColourspaceType::Yuv422 || dst_format == ColourspaceType::Yuv422)
        && resolution.width % 2 != 0
    {
        return Err(MediaxError::InvalidStreamInfo(format!(
            "UYVY needs an even width, got {}",
            resolution.width
        )));
    }
    check_len(src, resolution, src_format)?;
    check_len(dst, resolution, dst_format)?;

    if src_format == dst_format {
        dst.copy_from_slice(src);
        return Ok(());
    }

    match (src_format, dst_format) {
        (ColourspaceType::Rgb24, to) => from_rgb24(src, dst, to),
        (from, ColourspaceType::Rgb24) => to_rgb24(src, from, dst),
        (from, to) => {
            let mut rgb = vec![0u8; ColourspaceType::Rgb24.frame_size(resolution.height, resolution.width)];
            to_rgb24(src, from, &mut rgb);
            from_rgb24(&rgb, dst, to);
        }
    }
    Ok(())
}

fn clamp(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

fn luma(r: u8, g: u8, b: u8) -> i32 {
    ((66 * r as i32 + 129 * g as i32 + 25 * b as i32 + 128) >> 8) + 16
}

fn chroma_u(r: u8, g: u8, b: u8) -> i32 {
    ((-38 * r as i32 - 74 * g as i32 + 112 * b as i32 + 128) >> 8) + 128
}

fn chroma_v(r: u8, g: u8, b: u8) -> i32 {
    ((112 * r as i32 - 94 * g as i32 - 18 * b as i32 + 128) >> 8) + 128
}

/// Full-range grey level used for monochrome output.
fn grey(r: u8, g: u8, b: u8) -> u8 {
    ((77 * r as u32 + 150 * g as u32 + 29 * b as u32 + 128) >> 8) as u8
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = 298 * (y as i32 - 16);
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    [
        clamp((c + 409 * e + 128) >> 8),
        clamp((c - 100 * d - 208 * e + 128) >> 8),
        clamp((c + 516 * d + 128) >> 8),
    ]
}

fn from_rgb24(rgb: &[u8], dst: &mut [u8], to: ColourspaceType) {
    match to {
        ColourspaceType::Rgba => {
            for (s, d) in rgb.chunks_exact(3).zip(dst.chunks_exact_mut(4)) {
                d[..3].copy_from_slice(s);
                d[3] = 0xff;
            }
        }
        ColourspaceType::Yuv422 => {
            for (s, d) in rgb.chunks_exact(6).zip(dst.chunks_exact_mut(4)) {
                let (r0, g0, b0) = (s[0], s[1], s[2]);
                let (r1, g1, b1) = (s[3], s[4], s[5]);
                // Chroma from the average of the pair.
                let (r, g, b) = (
                    ((r0 as u16 + r1 as u16) / 2) as u8,
                    ((g0 as u16 + g1 as u16) / 2) as u8,
                    ((b0 as u16 + b1 as u16) / 2) as u8,
                );
                d[0] = clamp(chroma_u(r, g, b));
                d[1] = clamp(luma(r0, g0, b0));
                d[2] = clamp(chroma_v(r, g, b));
                d[3] = clamp(luma(r1, g1, b1));
            }
        }
        ColourspaceType::Mono8 => {
            for (s, d) in rgb.chunks_exact(3).zip(dst.iter_mut()) {
                *d = grey(s[0], s[1], s[2]);
            }
        }
        ColourspaceType::Mono16 => {
            for (s, d) in rgb.chunks_exact(3).zip(dst.chunks_exact_mut(2)) {
                let g = grey(s[0], s[1], s[2]) as u16 * 257;
                d.copy_from_slice(&g.to_be_bytes());
            }
        }
        _ => dst.copy_from_slice(rgb),
    }
}

fn to_rgb24(src: &[u8], from: ColourspaceType, rgb: &mut [u8]) {
    match from {
        ColourspaceType::Rgba => {
            for (s, d) in src.chunks_exact(4).zip(rgb.chunks_exact_mut(3)) {
                d.copy_from_slice(&s[..3]);
            }
        }
        ColourspaceType::Yuv422 => {
            for (s, d) in src.chunks_exact(4).zip(rgb.chunks_exact_mut(6)) {
                let (u, y0, v, y1) = (s[0], s[1], s[2], s[3]);
                d[..3].copy_from_slice(&yuv_to_rgb(y0, u, v));
                d[3..].copy_from_slice(&yuv_to_rgb(y1, u, v));
            }
        }
        ColourspaceType::Mono8 => {
            for (&s, d) in src.iter().zip(rgb.chunks_exact_mut(3)) {
                d.fill(s);
            }
        }
        ColourspaceType::Mono16 => {
            for (s, d) in src.chunks_exact(2).zip(rgb.chunks_exact_mut(3)) {
                d.fill(s[0]);
            }
        }
        _ => rgb.copy_from_slice(src),
    }
}
