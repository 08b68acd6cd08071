use std::fmt;
use std::str::FromStr;

use rand::RngExt;

use super::convert::convert;
use crate::error::Result;
use crate::stream::{ColourspaceType, Resolution};

/// Built-in test cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPattern {
    /// EBU 75% colour bars.
    EbuColourBars,
    /// Full-amplitude colour bars.
    ColourBars,
    /// Eight grey steps from white to black.
    GreyScaleBars,
    Checkered,
    Solid { r: u8, g: u8, b: u8 },
    WhiteNoise,
    /// White ball on black, moving diagonally and bouncing off the edges.
    BouncingBall,
}

const EBU_BARS: [[u8; 3]; 8] = [
    [191, 191, 191],
    [191, 191, 0],
    [0, 191, 191],
    [0, 191, 0],
    [191, 0, 191],
    [191, 0, 0],
    [0, 0, 191],
    [0, 0, 0],
];

const FULL_BARS: [[u8; 3]; 8] = [
    [255, 255, 255],
    [255, 255, 0],
    [0, 255, 255],
    [0, 255, 0],
    [255, 0, 255],
    [255, 0, 0],
    [0, 0, 255],
    [0, 0, 0],
];

impl TestPattern {
    /// Whether consecutive frames differ.
    pub fn is_animated(self) -> bool {
        matches!(self, Self::WhiteNoise | Self::BouncingBall)
    }

    /// Render the first frame into a new RGB24 buffer.
    pub fn render_rgb24(self, resolution: Resolution) -> Vec<u8> {
        self.render_rgb24_frame(resolution, 0)
    }

    /// Render frame number `frame` into a new RGB24 buffer. Static cards
    /// ignore `frame`.
    pub fn render_rgb24_frame(self, resolution: Resolution, frame: u64) -> Vec<u8> {
        let width = resolution.width as usize;
        let height = resolution.height as usize;
        let mut rgb = vec![0u8; width * height * 3];
        if width == 0 {
            return rgb;
        }

        match self {
            Self::EbuColourBars => bars(&mut rgb, width, |i| EBU_BARS[i]),
            Self::ColourBars => bars(&mut rgb, width, |i| FULL_BARS[i]),
            Self::GreyScaleBars => bars(&mut rgb, width, |i| {
                let level = 255 - (i * 255 / 7) as u8;
                [level; 3]
            }),
            Self::Checkered => {
                let square = (width / 8).max(1);
                for (y, row) in rgb.chunks_exact_mut(width * 3).enumerate() {
                    for (x, px) in row.chunks_exact_mut(3).enumerate() {
                        let white = (x / square + y / square) % 2 == 0;
                        px.fill(if white { 255 } else { 0 });
                    }
                }
            }
            Self::Solid { r, g, b } => {
                for px in rgb.chunks_exact_mut(3) {
                    px.copy_from_slice(&[r, g, b]);
                }
            }
            Self::WhiteNoise => {
                let mut rng = rand::rng();
                for px in rgb.chunks_exact_mut(3) {
                    px.fill(rng.random::<u8>());
                }
            }
            Self::BouncingBall => ball(&mut rgb, width, height, frame),
        }
        rgb
    }

    /// Render the first frame into `buffer`, which holds one frame of
    /// `encoding`.
    pub fn fill(self, resolution: Resolution, encoding: ColourspaceType, buffer: &mut [u8]) -> Result<()> {
        self.fill_frame(resolution, encoding, buffer, 0)
    }

    pub fn fill_frame(
        self,
        resolution: Resolution,
        encoding: ColourspaceType,
        buffer: &mut [u8],
        frame: u64,
    ) -> Result<()> {
        let rgb = self.render_rgb24_frame(resolution, frame);
        convert(resolution, &rgb, ColourspaceType::Rgb24, buffer, encoding)
    }
}

/// Position along `0..=span` after `travel` pixels, reflecting at both ends.
fn bounce(travel: u64, span: usize) -> usize {
    if span == 0 {
        return 0;
    }
    let span = span as u64;
    let phase = travel % (2 * span);
    (if phase <= span { phase } else { 2 * span - phase }) as usize
}

fn ball(rgb: &mut [u8], width: usize, height: usize, frame: u64) {
    let diameter = (width.min(height) / 8).max(1);
    let left = bounce(frame * (width / 40).max(1) as u64, width.saturating_sub(diameter));
    let top = bounce(frame * (height / 30).max(1) as u64, height.saturating_sub(diameter));

    // Doubled coordinates keep the circle test in integers.
    let d = diameter as i64;
    for y in top..(top + diameter).min(height) {
        let dy = 2 * (y - top) as i64 + 1 - d;
        for x in left..(left + diameter).min(width) {
            let dx = 2 * (x - left) as i64 + 1 - d;
            if dx * dx + dy * dy <= d * d {
                let at = (y * width + x) * 3;
                rgb[at..at + 3].fill(255);
            }
        }
    }
}

fn bars(rgb: &mut [u8], width: usize, colour: impl Fn(usize) -> [u8; 3]) {
    for row in rgb.chunks_exact_mut(width * 3) {
        for (x, px) in row.chunks_exact_mut(3).enumerate() {
            px.copy_from_slice(&colour(x * 8 / width));
        }
    }
}

impl fmt::Display for TestPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EbuColourBars => f.write_str("ebu"),
            Self::ColourBars => f.write_str("bars"),
            Self::GreyScaleBars => f.write_str("grey"),
            Self::Checkered => f.write_str("checkered"),
            Self::Solid { r, g, b } => write!(f, "#{r:02x}{g:02x}{b:02x}"),
            Self::WhiteNoise => f.write_str("noise"),
            Self::BouncingBall => f.write_str("ball"),
        }
    }
}

impl FromStr for TestPattern {
    type Err = String;

    /// Accepts the names printed by `Display`, the colour names `red`,
    /// `green`, `blue`, `black`, `white`, and `#rrggbb`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let solid = |r, g, b| Ok(Self::Solid { r, g, b });
        match s.to_ascii_lowercase().as_str() {
            "ebu" => Ok(Self::EbuColourBars),
            "bars" => Ok(Self::ColourBars),
            "grey" | "gray" => Ok(Self::GreyScaleBars),
            "checkered" => Ok(Self::Checkered),
            "noise" => Ok(Self::WhiteNoise),
            "ball" | "bouncing" => Ok(Self::BouncingBall),
            "red" => solid(255, 0, 0),
            "green" => solid(0, 255, 0),
            "blue" => solid(0, 0, 255),
            "black" => solid(0, 0, 0),
            "white" => solid(255, 255, 255),
            hex if hex.len() == 7 && hex.is_ascii() && hex.starts_with('#') => {
                let channel = |i: usize| {
                    u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| format!("invalid colour: {s}"))
                };
                solid(channel(1)?, channel(3)?, channel(5)?)
            }
            _ => Err(format!("unknown test pattern: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ebu_bars_left_to_right() {
        let rgb = TestPattern::EbuColourBars.render_rgb24(Resolution::new(2, 16));
        assert_eq!(&rgb[0..3], &[191, 191, 191]);
        assert_eq!(&rgb[2 * 3..2 * 3 + 3], &[191, 191, 0]);
        assert_eq!(&rgb[15 * 3..16 * 3], &[0, 0, 0]);
        // Second row repeats the first.
        assert_eq!(rgb[..48], rgb[48..]);
    }

    #[test]
    fn grey_steps_descend() {
        let rgb = TestPattern::GreyScaleBars.render_rgb24(Resolution::new(1, 8));
        let levels: Vec<u8> = rgb.chunks_exact(3).map(|p| p[0]).collect();
        assert_eq!(levels.first(), Some(&255));
        assert_eq!(levels.last(), Some(&0));
        assert!(levels.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn checkered_alternates() {
        let rgb = TestPattern::Checkered.render_rgb24(Resolution::new(16, 16));
        let px = |x: usize, y: usize| rgb[(y * 16 + x) * 3];
        assert_eq!(px(0, 0), 255);
        assert_eq!(px(2, 0), 0);
        assert_eq!(px(0, 2), 0);
        assert_eq!(px(2, 2), 255);
    }

    #[test]
    fn fill_converts_to_stream_encoding() {
        let res = Resolution::new(4, 4);
        let mut uyvy = vec![0u8; ColourspaceType::Yuv422.frame_size(4, 4)];
        TestPattern::Solid { r: 255, g: 255, b: 255 }
            .fill(res, ColourspaceType::Yuv422, &mut uyvy)
            .unwrap();
        assert!(uyvy.chunks_exact(4).all(|c| c == [128, 235, 128, 235]));

        let mut mono = vec![0u8; 16];
        TestPattern::Solid { r: 0, g: 0, b: 0 }
            .fill(res, ColourspaceType::Mono8, &mut mono)
            .unwrap();
        assert!(mono.iter().all(|&b| b == 0));
    }

    #[test]
    fn ball_moves_and_stays_in_frame() {
        let res = Resolution::new(48, 64);
        let lit = |rgb: &[u8]| -> Vec<usize> {
            rgb.chunks_exact(3)
                .enumerate()
                .filter(|(_, p)| p[0] == 255)
                .map(|(i, _)| i)
                .collect()
        };

        let first = lit(&TestPattern::BouncingBall.render_rgb24_frame(res, 0));
        assert!(!first.is_empty());
        // Frame 0 starts in the top-left corner.
        assert!(first.iter().all(|&i| i % 64 < 8 && i / 64 < 8));

        for frame in 1..200 {
            let pixels = lit(&TestPattern::BouncingBall.render_rgb24_frame(res, frame));
            assert_eq!(pixels.len(), first.len(), "ball clipped on frame {frame}");
        }
        assert_ne!(
            TestPattern::BouncingBall.render_rgb24_frame(res, 0),
            TestPattern::BouncingBall.render_rgb24_frame(res, 1)
        );
        assert!(TestPattern::BouncingBall.is_animated());
        assert!(!TestPattern::ColourBars.is_animated());
    }

    #[test]
    fn bounce_reflects_at_edges() {
        let positions: Vec<usize> = (0..8).map(|t| bounce(t, 3)).collect();
        assert_eq!(positions, [0, 1, 2, 3, 2, 1, 0, 1]);
        assert_eq!(bounce(17, 0), 0);
    }

    #[test]
    fn parse_names() {
        assert_eq!("ebu".parse::<TestPattern>().unwrap(), TestPattern::EbuColourBars);
        assert_eq!(
            "#ff8000".parse::<TestPattern>().unwrap(),
            TestPattern::Solid { r: 255, g: 128, b: 0 }
        );
        assert_eq!(
            "RED".parse::<TestPattern>().unwrap(),
            TestPattern::Solid { r: 255, g: 0, b: 0 }
        );
        assert!("sparkles".parse::<TestPattern>().is_err());
        assert!("#zz0000".parse::<TestPattern>().is_err());
        assert!("#aé123".parse::<TestPattern>().is_err());
        assert_eq!("ball".parse::<TestPattern>().unwrap(), TestPattern::BouncingBall);
        let p = TestPattern::Checkered;
        assert_eq!(p.to_string().parse::<TestPattern>().unwrap(), p);
    }
}
