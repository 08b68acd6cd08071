//! Error types for the mediax library.

use std::fmt;

use crate::stream::{ColourspaceType, StreamState};

/// Errors that can occur in the mediax library.
///
/// Variants map to the failure classes of the stack:
///
/// - **Resource**: [`Io`](Self::Io), [`Interfaces`](Self::Interfaces): sockets
///   and host interface enumeration. These are the only errors raised from
///   constructors.
/// - **Configuration**: [`InvalidState`](Self::InvalidState),
///   [`SettingsInvalid`](Self::SettingsInvalid),
///   [`InvalidStreamInfo`](Self::InvalidStreamInfo),
///   [`FrameSize`](Self::FrameSize).
/// - **Malformed input**: [`Sap`](Self::Sap), [`Rtp`](Self::Rtp). Background
///   receive loops log and drop these; they never reach a caller.
#[derive(Debug, thiserror::Error)]
pub enum MediaxError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A lifecycle operation was attempted from a state that does not allow it.
    #[error("cannot {operation} a stream in the {state:?} state")]
    InvalidState {
        operation: &'static str,
        state: StreamState,
    },

    /// `open` was called before every required stream setting was provided.
    #[error("stream settings incomplete, missing: {}", missing.join(", "))]
    SettingsInvalid { missing: Vec<&'static str> },

    /// Stream information failed validation (zero dimensions, bad address, ...).
    #[error("invalid stream information: {0}")]
    InvalidStreamInfo(String),

    /// Frame buffer length does not match the configured stream geometry.
    #[error("frame size mismatch: expected {expected} bytes, got {actual}")]
    FrameSize { expected: usize, actual: usize },

    /// Malformed SAP announcement or SDP body.
    #[error("SAP parse error: {kind}")]
    Sap { kind: SapErrorKind },

    /// Malformed RTP packet.
    #[error("RTP parse error: {kind}")]
    Rtp { kind: RtpErrorKind },

    /// No conversion is implemented between the two colourspaces.
    #[error("unsupported colourspace conversion {from:?} -> {to:?}")]
    UnsupportedConversion {
        from: ColourspaceType,
        to: ColourspaceType,
    },

    /// Host network interfaces could not be listed.
    #[error("interface enumeration failed: {0}")]
    Interfaces(String),
}

/// Specific kind of SAP/SDP decode failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SapErrorKind {
    /// Datagram shorter than the SAP header it announces.
    Truncated,
    /// SAP version other than 1 (RFC 2974 §3).
    UnsupportedVersion(u8),
    /// Encrypted payloads are not supported.
    Encrypted,
    /// Compressed payloads are not supported.
    Compressed,
    /// Originating source is an IPv6 address.
    Ipv6Origin,
    /// SDP body is not valid UTF-8.
    InvalidUtf8,
    /// SDP body has no `s=` line.
    MissingSessionName,
}

impl fmt::Display for SapErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "truncated datagram"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported SAP version {v}"),
            Self::Encrypted => write!(f, "encrypted payload"),
            Self::Compressed => write!(f, "compressed payload"),
            Self::Ipv6Origin => write!(f, "IPv6 originating source"),
            Self::InvalidUtf8 => write!(f, "SDP body is not UTF-8"),
            Self::MissingSessionName => write!(f, "SDP body has no session name"),
        }
    }
}

/// Specific kind of RTP decode failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtpErrorKind {
    /// Packet shorter than its fixed header, CSRC list, extension or line header.
    Truncated,
    /// RTP version other than 2.
    UnsupportedVersion(u8),
    /// Padding count exceeds the payload length.
    InvalidPadding,
}

impl fmt::Display for RtpErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "truncated packet"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported RTP version {v}"),
            Self::InvalidPadding => write!(f, "invalid padding"),
        }
    }
}

/// Convenience alias for `Result<T, MediaxError>`.
pub type Result<T> = std::result::Result<T, MediaxError>;
