//! Stream identity, settings storage and the lifecycle state machine shared
//! by every payloader and depayloader.
//!
//! ## Lifecycle
//!
//! ```text
//! Closed --open--> Open --start--> Started <--stop/start--> Stopped
//!   ^                |                                        |
//!   +-----close------+-------------------close----------------+
//! ```
//!
//! - `open` acquires the transport (socket, buffers) without moving traffic.
//! - `start`/`stop` toggle traffic and keep resources, for fast restart.
//! - `close` releases everything. Only a closed stream may be reopened.
//! - `start` on a started stream and `stop` on a stream that is not started
//!   are no-ops.

pub mod colourspace;

use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::error::{MediaxError, Result};
pub use colourspace::ColourspaceType;

/// Lifecycle state of a payloader or depayloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    #[default]
    Closed,
    Open,
    Started,
    Stopped,
}

/// Frame geometry in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Resolution {
    pub height: u32,
    pub width: u32,
}

impl Resolution {
    pub fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }
}

/// Identity and shape of a stream.
///
/// `(session_name, hostname)` is the key used by the SAP announcer's
/// session table. `deleted` marks a withdrawn announcement that is still
/// kept in storage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamInformation {
    pub session_name: String,
    /// Dotted IPv4 destination, unicast or multicast.
    pub hostname: String,
    pub port: u16,
    pub height: u32,
    pub width: u32,
    pub framerate: u32,
    pub encoding: ColourspaceType,
    pub deleted: bool,
}

impl StreamInformation {
    /// Check dimensions, framerate and address; returns the parsed address.
    pub fn validate(&self) -> Result<Ipv4Addr> {
        if self.session_name.is_empty() {
            return Err(MediaxError::InvalidStreamInfo(
                "session name is empty".into(),
            ));
        }
        if self.height == 0 || self.width == 0 {
            return Err(MediaxError::InvalidStreamInfo(format!(
                "resolution {}x{} must be non-zero",
                self.width, self.height
            )));
        }
        if self.framerate == 0 {
            return Err(MediaxError::InvalidStreamInfo(
                "framerate must be non-zero".into(),
            ));
        }
        parse_ipv4(&self.hostname)
    }

    /// Whether this entry matches a lookup key. `hostname: None` matches any host.
    pub fn matches(&self, session_name: &str, hostname: Option<&str>) -> bool {
        self.session_name == session_name && hostname.is_none_or(|h| self.hostname == h)
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.height, self.width)
    }

    /// Byte size of one frame of this stream.
    pub fn frame_size(&self) -> usize {
        self.encoding.frame_size(self.height, self.width)
    }
}

/// Parse a dotted IPv4 address.
pub fn parse_ipv4(hostname: &str) -> Result<Ipv4Addr> {
    hostname
        .trim()
        .parse()
        .map_err(|_| MediaxError::InvalidStreamInfo(format!("invalid IPv4 address: {hostname}")))
}

/// Bitmask of the settings that have been explicitly provided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SettingsMask(u8);

impl SettingsMask {
    pub const HOSTNAME: Self = Self(0b0000_0001);
    pub const PORT: Self = Self(0b0000_0010);
    pub const NAME: Self = Self(0b0000_0100);
    pub const HEIGHT: Self = Self(0b0000_1000);
    pub const WIDTH: Self = Self(0b0001_0000);
    pub const FRAMERATE: Self = Self(0b0010_0000);
    pub const ENCODING: Self = Self(0b0100_0000);
    pub const ALL: Self = Self(0b0111_1111);

    const NAMES: [(Self, &'static str); 7] = [
        (Self::HOSTNAME, "hostname"),
        (Self::PORT, "port"),
        (Self::NAME, "session name"),
        (Self::HEIGHT, "height"),
        (Self::WIDTH, "width"),
        (Self::FRAMERATE, "framerate"),
        (Self::ENCODING, "encoding"),
    ];

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_all(self) -> bool {
        self.contains(Self::ALL)
    }

    /// Names of the settings not yet provided.
    pub fn missing(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(bit, _)| !self.contains(*bit))
            .map(|(_, name)| *name)
            .collect()
    }
}

/// Settings storage shared by all stream implementations.
///
/// Each setter records its field in the [`SettingsMask`]; the settings are
/// valid once every field has been set, individually or through
/// [`set_stream_info`](Self::set_stream_info).
#[derive(Debug, Clone, Default)]
pub struct StreamSettings {
    info: StreamInformation,
    mask: SettingsMask,
}

impl StreamSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set every field at once.
    pub fn set_stream_info(&mut self, info: &StreamInformation) {
        self.info = StreamInformation {
            deleted: false,
            ..info.clone()
        };
        self.mask = SettingsMask::ALL;
    }

    pub fn set_session_name(&mut self, name: &str) {
        self.info.session_name = name.to_string();
        self.mask.insert(SettingsMask::NAME);
    }

    pub fn set_hostname(&mut self, hostname: &str) {
        self.info.hostname = hostname.to_string();
        self.mask.insert(SettingsMask::HOSTNAME);
    }

    pub fn set_port(&mut self, port: u16) {
        self.info.port = port;
        self.mask.insert(SettingsMask::PORT);
    }

    pub fn set_height(&mut self, height: u32) {
        self.info.height = height;
        self.mask.insert(SettingsMask::HEIGHT);
    }

    pub fn set_width(&mut self, width: u32) {
        self.info.width = width;
        self.mask.insert(SettingsMask::WIDTH);
    }

    pub fn set_framerate(&mut self, framerate: u32) {
        self.info.framerate = framerate;
        self.mask.insert(SettingsMask::FRAMERATE);
    }

    pub fn set_encoding(&mut self, encoding: ColourspaceType) {
        self.info.encoding = encoding;
        self.mask.insert(SettingsMask::ENCODING);
    }

    pub fn session_name(&self) -> &str {
        &self.info.session_name
    }

    pub fn hostname(&self) -> &str {
        &self.info.hostname
    }

    pub fn port(&self) -> u16 {
        self.info.port
    }

    pub fn height(&self) -> u32 {
        self.info.height
    }

    pub fn width(&self) -> u32 {
        self.info.width
    }

    pub fn framerate(&self) -> u32 {
        self.info.framerate
    }

    pub fn encoding(&self) -> ColourspaceType {
        self.info.encoding
    }

    pub fn info(&self) -> &StreamInformation {
        &self.info
    }

    pub fn mask(&self) -> SettingsMask {
        self.mask
    }

    pub fn is_valid(&self) -> bool {
        self.mask.is_all()
    }

    pub fn is_multicast(&self) -> bool {
        parse_ipv4(&self.info.hostname).is_ok_and(|ip| ip.is_multicast())
    }
}

/// Settings plus lifecycle state, embedded by every stream implementation.
///
/// The `begin_*` methods validate a transition without performing it; the
/// implementation acquires or releases its resources and then calls
/// [`set_state`](Self::set_state).
#[derive(Debug, Default)]
pub struct StreamCore {
    pub settings: StreamSettings,
    state: StreamState,
}

impl StreamCore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn set_state(&mut self, state: StreamState) {
        tracing::debug!(
            session = %self.settings.session_name(),
            old_state = ?self.state,
            new_state = ?state,
            "stream state transition"
        );
        self.state = state;
    }

    /// Open is allowed from `Closed` with complete settings.
    pub fn begin_open(&self) -> Result<()> {
        if self.state != StreamState::Closed {
            return Err(MediaxError::InvalidState {
                operation: "open",
                state: self.state,
            });
        }
        if !self.settings.is_valid() {
            return Err(MediaxError::SettingsInvalid {
                missing: self.settings.mask().missing(),
            });
        }
        Ok(())
    }

    /// Returns `Ok(false)` when already started (no-op), `Ok(true)` when the
    /// caller should start traffic.
    pub fn begin_start(&self) -> Result<bool> {
        match self.state {
            StreamState::Closed => Err(MediaxError::InvalidState {
                operation: "start",
                state: self.state,
            }),
            StreamState::Started => Ok(false),
            StreamState::Open | StreamState::Stopped => Ok(true),
        }
    }

    /// True only when the stream is started.
    pub fn begin_stop(&self) -> bool {
        self.state == StreamState::Started
    }
}

/// One reassembled frame.
///
/// `complete` is false when the marker packet arrived before every byte of
/// the frame; the missing ranges hold whatever the buffer held before.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RtpFrameData {
    pub resolution: Resolution,
    pub encoding: ColourspaceType,
    /// RTP timestamp (90 kHz) shared by all packets of the frame.
    pub timestamp: u32,
    pub complete: bool,
    pub data: Vec<u8>,
}

impl RtpFrameData {
    /// A zeroed frame sized for the given geometry.
    pub fn new(resolution: Resolution, encoding: ColourspaceType) -> Self {
        Self {
            resolution,
            encoding,
            timestamp: 0,
            complete: false,
            data: vec![0; encoding.frame_size(resolution.height, resolution.width)],
        }
    }
}

/// Invoked from the receive thread whenever a frame completes.
pub type FrameCallback = Arc<dyn Fn(&RtpFrameData) + Send + Sync>;
